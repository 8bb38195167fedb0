use super::problem::{OccupancyProblem, QuadraticForm};
use super::{
    OccupancySolver, SolverOutcome, SolverParams, SupportSolution, check_admissible, screen,
    solve_support,
};
use crate::engine::config::SolverKind;
use crate::engine::error::EngineError;
use tracing::{debug, instrument};

/// Continuous relaxation: keep the `K` heaviest screened candidates and re-solve on them with
/// the minimum-occupancy bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelaxedSolver;

impl OccupancySolver for RelaxedSolver {
    fn kind(&self) -> SolverKind {
        SolverKind::Relaxed
    }

    #[instrument(skip_all, name = "relaxed_solver", fields(candidates = problem.len()))]
    fn solve(
        &self,
        problem: &OccupancyProblem,
        params: &SolverParams,
    ) -> Result<SolverOutcome, EngineError> {
        check_admissible(problem, params)?;
        let form = problem.quadratic_form();
        let survivors = screen(&form, params);
        let solution = relaxed_solution(&form, &survivors, params);
        debug!(
            support = ?solution.support,
            objective = solution.objective,
            converged = solution.converged,
            "Relaxed solve finished"
        );
        let converged = solution.converged;
        Ok(solution.into_outcome(SolverKind::Relaxed, converged, 0))
    }
}

/// Top-`K` survivors by screened weight (ties to the lower index), shrunk from the tail until
/// `|S|·ε ≤ B`, then solved as a box QP.
pub(super) fn relaxed_solution(
    form: &QuadraticForm,
    survivors: &[(usize, f64)],
    params: &SolverParams,
) -> SupportSolution {
    let mut ranked = survivors.to_vec();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(params.cardinality_bound);
    while ranked.len() > 1
        && ranked.len() as f64 * params.min_occupancy() > params.occupancy_bound
    {
        ranked.pop();
    }
    let mut support: Vec<usize> = ranked.into_iter().map(|(i, _)| i).collect();
    support.sort_unstable();
    solve_support(form, &support, params)
}
