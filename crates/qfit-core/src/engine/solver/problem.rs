use crate::engine::error::EngineError;
use nalgebra::{DMatrix, DVector};

/// Model densities of the candidate conformers and the observed target, all sampled on the
/// same footprint mask.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyProblem {
    models: Vec<Vec<f64>>,
    target: Vec<f64>,
}

impl OccupancyProblem {
    pub fn new(models: Vec<Vec<f64>>, target: Vec<f64>) -> Result<Self, EngineError> {
        if let Some((i, m)) = models
            .iter()
            .enumerate()
            .find(|(_, m)| m.len() != target.len())
        {
            return Err(EngineError::Internal(format!(
                "model {} has {} mask values, target has {}",
                i,
                m.len(),
                target.len()
            )));
        }
        Ok(Self { models, target })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> &[Vec<f64>] {
        &self.models
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// The least-squares misfit as a quadratic form, normalized by `‖t‖²`.
    pub(crate) fn quadratic_form(&self) -> QuadraticForm {
        let n = self.models.len();
        let tt: f64 = self.target.iter().map(|v| v * v).sum();
        let (scale, constant) = if tt > f64::EPSILON {
            (1.0 / tt, 1.0)
        } else {
            (1.0, 0.0)
        };

        let gram = DMatrix::from_fn(n, n, |i, j| {
            scale * dot(&self.models[i], &self.models[j])
        });
        let linear = DVector::from_fn(n, |i, _| scale * dot(&self.models[i], &self.target));
        QuadraticForm {
            gram,
            linear,
            constant,
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `f(w) = ½ wᵀGw − cᵀw + ½·k`, which equals `½‖Mᵀw − t‖²/‖t‖²`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuadraticForm {
    pub gram: DMatrix<f64>,
    pub linear: DVector<f64>,
    pub constant: f64,
}

impl QuadraticForm {
    pub fn dim(&self) -> usize {
        self.linear.len()
    }

    pub fn value(&self, w: &DVector<f64>) -> f64 {
        let quad = w.dot(&(&self.gram * w));
        (0.5 * quad - self.linear.dot(w) + 0.5 * self.constant).max(0.0)
    }

    pub fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
        &self.gram * w - &self.linear
    }

    /// The form over the candidates in `support`, in that order.
    pub fn restrict(&self, support: &[usize]) -> QuadraticForm {
        let k = support.len();
        QuadraticForm {
            gram: DMatrix::from_fn(k, k, |i, j| self.gram[(support[i], support[j])]),
            linear: DVector::from_fn(k, |i, _| self.linear[support[i]]),
            constant: self.constant,
        }
    }

    /// Largest eigenvalue of the Gram matrix by power iteration; the gradient's Lipschitz
    /// constant.
    pub fn lipschitz(&self) -> f64 {
        let n = self.dim();
        if n == 0 {
            return 1.0;
        }
        let mut v = DVector::from_element(n, 1.0 / (n as f64).sqrt());
        let mut lambda = 0.0;
        for _ in 0..100 {
            let next = &self.gram * &v;
            let norm = next.norm();
            if norm <= f64::EPSILON {
                return 1.0;
            }
            let converged = (norm - lambda).abs() <= 1e-12 * norm;
            lambda = norm;
            v = next / norm;
            if converged {
                break;
            }
        }
        // Small margin so the step stays below 1/L when the iteration undershoots.
        lambda * 1.01
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_combination_has_zero_objective() {
        let models = vec![vec![1.0, 0.0, 1.0], vec![0.0, 1.0, 1.0]];
        let target = vec![0.6, 0.4, 1.0];
        let problem = OccupancyProblem::new(models, target).unwrap();
        let form = problem.quadratic_form();
        let w = DVector::from_vec(vec![0.6, 0.4]);
        assert!(form.value(&w) < 1e-12);
        assert!(form.gradient(&w).norm() < 1e-12);
        // Empty ensemble explains nothing: half the normalized target norm.
        assert!((form.value(&DVector::zeros(2)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_target_keeps_unscaled_form() {
        let problem = OccupancyProblem::new(vec![vec![2.0, 0.0]], vec![0.0, 0.0]).unwrap();
        let form = problem.quadratic_form();
        assert_eq!(form.constant, 0.0);
        assert_eq!(form.gram[(0, 0)], 4.0);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(matches!(
            OccupancyProblem::new(vec![vec![1.0]], vec![1.0, 2.0]),
            Err(EngineError::Internal(_))
        ));
    }

    #[test]
    fn restriction_selects_rows_and_columns() {
        let models = vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0]];
        let problem = OccupancyProblem::new(models, vec![1.0, 1.0]).unwrap();
        let form = problem.quadratic_form();
        let sub = form.restrict(&[2, 0]);
        assert_eq!(sub.dim(), 2);
        assert_eq!(sub.gram[(0, 1)], form.gram[(2, 0)]);
        assert_eq!(sub.linear[0], form.linear[2]);
    }

    #[test]
    fn lipschitz_bounds_the_largest_eigenvalue() {
        let problem =
            OccupancyProblem::new(vec![vec![3.0, 0.0], vec![0.0, 1.0]], vec![1.0, 0.0]).unwrap();
        let form = problem.quadratic_form();
        let l = form.lipschitz();
        assert!(l >= 9.0 && l < 9.0 * 1.02);
    }
}
