use super::problem::OccupancyProblem;
use super::relaxed::relaxed_solution;
use super::{
    OccupancySolver, SolverOutcome, SolverParams, SupportSolution, check_admissible, screen,
    solve_support,
};
use crate::engine::config::SolverKind;
use crate::engine::error::EngineError;
use itertools::Itertools;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Support enumeration: every subset of the screened candidates with `1 ≤ |S| ≤ K` (and
/// `|S|·ε ≤ B`) is solved as a box QP and the best objective wins.
///
/// Subsets are visited by size, then lexicographically, and only a strict improvement replaces
/// the incumbent, so ties resolve to the lowest candidate indices. The relaxed solution is kept
/// as a fallback and only wins when strictly better.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSolver;

impl OccupancySolver for ExactSolver {
    fn kind(&self) -> SolverKind {
        SolverKind::Exact
    }

    #[instrument(skip_all, name = "exact_solver", fields(candidates = problem.len()))]
    fn solve(
        &self,
        problem: &OccupancyProblem,
        params: &SolverParams,
    ) -> Result<SolverOutcome, EngineError> {
        check_admissible(problem, params)?;
        let form = problem.quadratic_form();
        let survivors = screen(&form, params);
        let relaxed = relaxed_solution(&form, &survivors, params);

        let indices: Vec<usize> = survivors.iter().map(|&(i, _)| i).collect();
        let max_size = max_support_size(params, indices.len());

        let mut best: Option<SupportSolution> = None;
        let mut evaluated = 0usize;
        let mut exhausted = false;

        'search: for size in 1..=max_size {
            for support in indices.iter().copied().combinations(size) {
                if evaluated >= params.max_subsets
                    || params.deadline.is_some_and(|d| Instant::now() >= d)
                {
                    exhausted = true;
                    break 'search;
                }
                evaluated += 1;
                let candidate = solve_support(&form, &support, params);
                if best
                    .as_ref()
                    .is_none_or(|incumbent| candidate.objective < incumbent.objective)
                {
                    best = Some(candidate);
                }
            }
        }

        if exhausted {
            warn!(
                evaluated,
                max_subsets = params.max_subsets,
                "Support enumeration stopped early, returning incumbent"
            );
        }

        let chosen = match best {
            Some(found) if relaxed.objective < found.objective => relaxed,
            Some(found) => found,
            None => relaxed,
        };
        debug!(
            support = ?chosen.support,
            objective = chosen.objective,
            evaluated,
            "Exact solve finished"
        );
        Ok(chosen.into_outcome(SolverKind::Exact, !exhausted, evaluated))
    }
}

fn max_support_size(params: &SolverParams, candidates: usize) -> usize {
    let by_occupancy =
        ((params.occupancy_bound / params.min_occupancy()) + 1e-9).floor() as usize;
    params
        .cardinality_bound
        .min(candidates)
        .min(by_occupancy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::solver::relaxed::RelaxedSolver;
    use crate::engine::solver::test_problems::{mixture, params};

    #[test]
    fn recovers_mixture_optimally() {
        let outcome = ExactSolver.solve(&mixture(), &params(2, 0.3)).unwrap();
        assert_eq!(outcome.support(), vec![0, 2]);
        assert!((outcome.occupancy_of(0) - 0.6).abs() < 1e-4);
        assert!((outcome.occupancy_of(2) - 0.4).abs() < 1e-4);
        assert!(outcome.optimal);
        // Supports of size one and two over the survivors {0, 2}.
        assert_eq!(outcome.subsets_evaluated, 3);
    }

    #[test]
    fn degenerate_candidates_resolve_to_lowest_index() {
        let model = vec![1.0, 0.5, 0.25];
        let problem =
            OccupancyProblem::new(vec![model.clone(), model.clone()], model.clone()).unwrap();
        for solver in [&ExactSolver as &dyn OccupancySolver, &RelaxedSolver] {
            let outcome = solver.solve(&problem, &params(1, 0.3)).unwrap();
            assert_eq!(outcome.support(), vec![0]);
            assert!((outcome.occupancy_of(0) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn subset_cap_marks_outcome_non_optimal() {
        let capped = SolverParams {
            max_subsets: 1,
            ..params(2, 0.3)
        };
        let outcome = ExactSolver.solve(&mixture(), &capped).unwrap();
        assert!(!outcome.optimal);
        assert_eq!(outcome.subsets_evaluated, 1);
        // The relaxed incumbent is better than the single subset {0}.
        assert_eq!(outcome.support(), vec![0, 2]);
    }

    #[test]
    fn support_size_respects_epsilon() {
        assert_eq!(max_support_size(&params(4, 0.3), 10), 3);
        assert_eq!(max_support_size(&params(2, 0.3), 1), 1);
        assert_eq!(max_support_size(&params(5, 0.0), 4), 4);
        assert_eq!(max_support_size(&params(3, 0.5), 10), 2);
    }
}
