use super::problem::QuadraticForm;
use nalgebra::DVector;
use std::time::Instant;

const STEP_TOLERANCE: f64 = 1e-10;
const BISECTION_STEPS: usize = 100;
const DEADLINE_CHECK_INTERVAL: usize = 64;

/// Feasible set `lower ≤ w_i ≤ upper`, `Σ w_i ≤ total`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Bounds {
    pub lower: f64,
    pub upper: f64,
    pub total: f64,
}

impl Bounds {
    /// Euclidean projection onto the feasible set.
    ///
    /// The box is applied first; if the sum is still too large every coordinate is shifted down
    /// by a common `τ` (found by bisection) before clamping again.
    pub fn project(&self, v: &DVector<f64>) -> DVector<f64> {
        let clamped = v.map(|x| x.clamp(self.lower, self.upper));
        if clamped.sum() <= self.total {
            return clamped;
        }
        let shifted_sum = |tau: f64| -> f64 {
            v.iter()
                .map(|x| (x - tau).clamp(self.lower, self.upper))
                .sum()
        };
        let mut low = 0.0;
        let mut high = (v.max() - self.lower).max(0.0);
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (low + high);
            if shifted_sum(mid) > self.total {
                low = mid;
            } else {
                high = mid;
            }
        }
        v.map(|x| (x - high).clamp(self.lower, self.upper))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QpOutcome {
    pub weights: DVector<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub timed_out: bool,
}

/// Minimizes `form(w) + l1·Σw` over `bounds` by accelerated projected gradient (FISTA with
/// adaptive restart).
pub(crate) fn minimize(
    form: &QuadraticForm,
    l1: f64,
    bounds: Bounds,
    max_iterations: usize,
    deadline: Option<Instant>,
) -> QpOutcome {
    let n = form.dim();
    if n == 0 {
        return QpOutcome {
            weights: DVector::zeros(0),
            iterations: 0,
            converged: true,
            timed_out: false,
        };
    }

    let step = 1.0 / form.lipschitz();
    let start = (bounds.total / n as f64).clamp(bounds.lower, bounds.upper);
    let mut x = bounds.project(&DVector::from_element(n, start));
    let mut y = x.clone();
    let mut t = 1.0_f64;

    for iteration in 1..=max_iterations {
        if iteration % DEADLINE_CHECK_INTERVAL == 0
            && deadline.is_some_and(|d| Instant::now() >= d)
        {
            return QpOutcome {
                weights: x,
                iterations: iteration,
                converged: false,
                timed_out: true,
            };
        }

        let gradient = form.gradient(&y).add_scalar(l1);
        let next = bounds.project(&(&y - gradient * step));
        let delta = &next - &x;
        if delta.amax() <= STEP_TOLERANCE {
            return QpOutcome {
                weights: next,
                iterations: iteration,
                converged: true,
                timed_out: false,
            };
        }

        // Restart the momentum when it points uphill.
        if (&y - &next).dot(&delta) > 0.0 {
            t = 1.0;
            y = next.clone();
        } else {
            let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
            y = &next + delta * ((t - 1.0) / t_next);
            t = t_next;
        }
        x = next;
    }

    QpOutcome {
        weights: x,
        iterations: max_iterations,
        converged: false,
        timed_out: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::solver::problem::OccupancyProblem;

    fn bounds(lower: f64, total: f64) -> Bounds {
        Bounds {
            lower,
            upper: total,
            total,
        }
    }

    #[test]
    fn projection_respects_box_and_sum() {
        let b = bounds(0.0, 1.0);
        let p = b.project(&DVector::from_vec(vec![0.9, 0.8, -0.3]));
        assert!(p.iter().all(|&w| (0.0..=1.0).contains(&w)));
        assert!((p.sum() - 1.0).abs() < 1e-9);
        assert!((p[0] - 0.55).abs() < 1e-9);
        assert!((p[1] - 0.45).abs() < 1e-9);
        assert_eq!(p[2], 0.0);

        let inside = DVector::from_vec(vec![0.2, 0.3]);
        assert_eq!(b.project(&inside), inside);
    }

    #[test]
    fn projection_keeps_lower_bound() {
        let b = bounds(0.3, 1.0);
        let p = b.project(&DVector::from_vec(vec![1.0, 0.0]));
        assert!((p[0] - 0.7).abs() < 1e-9);
        assert!((p[1] - 0.3).abs() < 1e-9);
    }

    #[test]
    fn recovers_exact_mixture() {
        let models = vec![vec![1.0, 0.0, 0.5], vec![0.0, 1.0, 0.5]];
        let target = vec![0.6, 0.4, 0.5];
        let form = OccupancyProblem::new(models, target)
            .unwrap()
            .quadratic_form();
        let outcome = minimize(&form, 0.0, bounds(0.0, 1.0), 5000, None);
        assert!(outcome.converged);
        assert!((outcome.weights[0] - 0.6).abs() < 1e-6);
        assert!((outcome.weights[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn sum_constraint_binds_when_target_is_too_strong() {
        let form = OccupancyProblem::new(vec![vec![1.0], vec![1.0]], vec![3.0])
            .unwrap()
            .quadratic_form();
        let outcome = minimize(&form, 0.0, bounds(0.0, 1.0), 5000, None);
        assert!((outcome.weights.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l1_penalty_shrinks_weights() {
        let form = OccupancyProblem::new(vec![vec![1.0, 0.0]], vec![0.5, 0.0])
            .unwrap()
            .quadratic_form();
        let free = minimize(&form, 0.0, bounds(0.0, 1.0), 5000, None);
        let penalized = minimize(&form, 1.0, bounds(0.0, 1.0), 5000, None);
        assert!((free.weights[0] - 0.5).abs() < 1e-6);
        assert!(penalized.weights[0] < free.weights[0]);
    }

    #[test]
    fn expired_deadline_stops_early() {
        let form = OccupancyProblem::new(vec![vec![1.0, 0.9], vec![0.9, 1.0]], vec![1.0, 0.0])
            .unwrap()
            .quadratic_form();
        let outcome = minimize(&form, 0.0, bounds(0.0, 1.0), 1_000_000, Some(Instant::now()));
        assert!(outcome.timed_out || outcome.converged);
    }
}
