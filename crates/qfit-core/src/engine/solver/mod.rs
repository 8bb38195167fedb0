//! Occupancy solvers.
//!
//! Given the model densities of the candidate conformers and the observed density, a solver
//! picks a sparse, occupancy-weighted subset minimizing
//! `½‖Mᵀw − t‖²/‖t‖² + λ·|support(w)|` subject to `w ≥ 0`, `Σw ≤ B`, at most `K` active
//! conformers and `w_i ≥ ε` on the support.
//!
//! Both backends share a screening QP over all candidates. The [`relaxed`] backend keeps the
//! `K` heaviest survivors; the [`exact`] backend enumerates every admissible support.

pub mod exact;
pub mod problem;
pub(crate) mod qp;
pub mod relaxed;

use crate::engine::config::{SolverConfig, SolverKind};
use crate::engine::error::EngineError;
use nalgebra::DVector;
use problem::{OccupancyProblem, QuadraticForm};
use qp::Bounds;
use std::time::Instant;
use tracing::warn;

/// Screened weights below this are treated as zero.
pub const SCREENING_THRESHOLD: f64 = 0.002;

#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    pub cardinality_bound: usize,
    pub occupancy_bound: f64,
    pub occupancy_epsilon: f64,
    pub regularization: f64,
    pub max_iterations: usize,
    pub max_subsets: usize,
    pub deadline: Option<Instant>,
}

impl SolverParams {
    /// Parameters for one solve started at `started`; the time budget becomes a deadline.
    pub fn from_config(config: &SolverConfig, started: Instant) -> Self {
        Self {
            cardinality_bound: config.cardinality_bound,
            occupancy_bound: config.occupancy_bound,
            occupancy_epsilon: config.occupancy_epsilon,
            regularization: config.regularization,
            max_iterations: config.max_iterations,
            max_subsets: config.max_subsets,
            deadline: config.time_budget.map(|budget| started + budget),
        }
    }

    /// Smallest occupancy a selected conformer may carry: `ε`, but never below the screening
    /// threshold, so a support never collapses to zero weights.
    pub fn min_occupancy(&self) -> f64 {
        self.occupancy_epsilon
            .max(SCREENING_THRESHOLD)
            .min(self.occupancy_bound)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    /// `(candidate index, occupancy)` for every selected candidate, by ascending index.
    pub weights: Vec<(usize, f64)>,
    pub objective: f64,
    pub optimal: bool,
    pub path: SolverKind,
    pub subsets_evaluated: usize,
}

impl SolverOutcome {
    pub fn total_occupancy(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    pub fn support(&self) -> Vec<usize> {
        self.weights.iter().map(|&(i, _)| i).collect()
    }

    pub fn occupancy_of(&self, index: usize) -> f64 {
        self.weights
            .iter()
            .find(|&&(i, _)| i == index)
            .map_or(0.0, |&(_, w)| w)
    }

    /// Rescales the selected occupancies to sum to `bound`. The objective is left as solved.
    pub fn normalized(mut self, bound: f64) -> Self {
        let total = self.total_occupancy();
        if total > f64::EPSILON {
            let factor = bound / total;
            for (_, w) in self.weights.iter_mut() {
                *w *= factor;
            }
        }
        self
    }
}

/// A strategy for solving the occupancy problem.
pub trait OccupancySolver: Send + Sync {
    fn kind(&self) -> SolverKind;

    fn solve(
        &self,
        problem: &OccupancyProblem,
        params: &SolverParams,
    ) -> Result<SolverOutcome, EngineError>;
}

/// Whether the backend was compiled into this build.
pub fn is_available(kind: SolverKind) -> bool {
    match kind {
        SolverKind::Relaxed => true,
        SolverKind::Exact => cfg!(feature = "exact-solver"),
    }
}

pub fn available_solvers() -> Vec<SolverKind> {
    [SolverKind::Exact, SolverKind::Relaxed]
        .into_iter()
        .filter(|&kind| is_available(kind))
        .collect()
}

/// The requested backend, or the relaxed one when the request cannot be honored.
pub fn select_solver(requested: SolverKind) -> Box<dyn OccupancySolver> {
    let kind = if is_available(requested) {
        requested
    } else {
        warn!(
            requested = %requested,
            "Solver backend not available in this build, falling back to relaxed"
        );
        SolverKind::Relaxed
    };
    match kind {
        SolverKind::Exact => Box::new(exact::ExactSolver),
        SolverKind::Relaxed => Box::new(relaxed::RelaxedSolver),
    }
}

/// Rejects problems without any admissible solution and solves that start past the deadline.
fn check_admissible(problem: &OccupancyProblem, params: &SolverParams) -> Result<(), EngineError> {
    if problem.is_empty() {
        return Err(EngineError::Infeasible(
            "no candidate conformers to choose from".to_string(),
        ));
    }
    if params.cardinality_bound == 0 {
        return Err(EngineError::Infeasible(
            "cardinality bound is zero".to_string(),
        ));
    }
    if params.occupancy_bound <= 0.0 || params.occupancy_bound < params.occupancy_epsilon {
        return Err(EngineError::Infeasible(format!(
            "occupancy bound {} cannot hold one conformer of minimum occupancy {}",
            params.occupancy_bound, params.occupancy_epsilon
        )));
    }
    if params.deadline_passed() {
        return Err(EngineError::SolverTimeout);
    }
    Ok(())
}

/// Candidates surviving the L1-penalized QP over all candidates, by ascending index, with
/// their screened weights.
fn screen(form: &QuadraticForm, params: &SolverParams) -> Vec<(usize, f64)> {
    let bounds = Bounds {
        lower: 0.0,
        upper: params.occupancy_bound,
        total: params.occupancy_bound,
    };
    let outcome = qp::minimize(
        form,
        params.regularization,
        bounds,
        params.max_iterations,
        params.deadline,
    );
    let survivors: Vec<(usize, f64)> = outcome
        .weights
        .iter()
        .enumerate()
        .filter(|&(_, &w)| w >= SCREENING_THRESHOLD)
        .map(|(i, &w)| (i, w))
        .collect();
    if !survivors.is_empty() {
        return survivors;
    }

    let mut by_linear: Vec<usize> = (0..form.dim()).collect();
    by_linear.sort_by(|&a, &b| form.linear[b].total_cmp(&form.linear[a]).then(a.cmp(&b)));
    by_linear.truncate(params.cardinality_bound);
    by_linear.sort_unstable();
    by_linear.into_iter().map(|i| (i, 0.0)).collect()
}

/// Best occupancies restricted to one support.
#[derive(Debug, Clone, PartialEq)]
struct SupportSolution {
    support: Vec<usize>,
    weights: Vec<f64>,
    objective: f64,
    converged: bool,
}

impl SupportSolution {
    fn into_outcome(self, path: SolverKind, optimal: bool, subsets_evaluated: usize) -> SolverOutcome {
        let mut weights: Vec<(usize, f64)> = self
            .support
            .into_iter()
            .zip(self.weights)
            .filter(|&(_, w)| w > 0.0)
            .collect();
        weights.sort_by_key(|&(i, _)| i);
        SolverOutcome {
            weights,
            objective: self.objective,
            optimal,
            path,
            subsets_evaluated,
        }
    }
}

/// Solves `ε ≤ w_i`, `Σw ≤ B` on `support`.
fn solve_support(form: &QuadraticForm, support: &[usize], params: &SolverParams) -> SupportSolution {
    let restricted = form.restrict(support);
    let bounds = Bounds {
        lower: params.min_occupancy(),
        upper: params.occupancy_bound,
        total: params.occupancy_bound,
    };
    let outcome = qp::minimize(
        &restricted,
        0.0,
        bounds,
        params.max_iterations,
        params.deadline,
    );
    let weights: DVector<f64> = bounds.project(&outcome.weights);
    let active = weights.iter().filter(|&&w| w > 0.0).count();
    SupportSolution {
        support: support.to_vec(),
        objective: restricted.value(&weights) + params.regularization * active as f64,
        weights: weights.iter().copied().collect(),
        converged: outcome.converged,
    }
}

#[cfg(test)]
pub(crate) mod test_problems {
    use super::SolverParams;
    use super::problem::OccupancyProblem;

    pub fn params(k: usize, epsilon: f64) -> SolverParams {
        SolverParams {
            cardinality_bound: k,
            occupancy_bound: 1.0,
            occupancy_epsilon: epsilon,
            regularization: 0.0,
            max_iterations: 5000,
            max_subsets: 100_000,
            deadline: None,
        }
    }

    /// Three candidates on a 4-voxel mask; the target is `0.6·m0 + 0.4·m2`.
    pub fn mixture() -> OccupancyProblem {
        let models = vec![
            vec![1.0, 0.2, 0.0, 0.5],
            vec![0.3, 1.0, 0.3, 0.5],
            vec![0.0, 0.2, 1.0, 0.5],
        ];
        let target: Vec<f64> = (0..4)
            .map(|v| 0.6 * models[0][v] + 0.4 * models[2][v])
            .collect();
        OccupancyProblem::new(models, target).unwrap()
    }
}
