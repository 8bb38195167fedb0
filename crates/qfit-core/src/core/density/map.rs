use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Behavior of interpolation for points outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryMode {
    /// Points outside the grid are an error.
    #[default]
    Fail,
    /// Points outside the grid take the value of the nearest edge.
    Clamp,
}

#[derive(Debug, Error, PartialEq)]
pub enum DensityMapError {
    #[error("Grid shape {0:?} has an empty axis")]
    EmptyGrid([usize; 3]),
    #[error("Grid shape {shape:?} needs {expected} values, got {actual}")]
    ShapeMismatch {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },
    #[error("Grid spacing must be positive and finite, got {0:?}")]
    InvalidSpacing([f64; 3]),
    #[error("Point ({x:.3}, {y:.3}, {z:.3}) lies outside the density map")]
    OutOfBounds { x: f64, y: f64, z: f64 },
}

/// Electron density sampled on an orthogonal grid.
///
/// Voxel `(i, j, k)` sits at `origin + (i·sx, j·sy, k·sz)` and is stored at
/// `values[(k·ny + j)·nx + i]` (x fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct DensityMap {
    origin: Vector3<f64>,
    spacing: Vector3<f64>,
    shape: [usize; 3],
    values: Vec<f64>,
    resolution: Option<f64>,
}

impl DensityMap {
    pub fn new(
        origin: [f64; 3],
        spacing: [f64; 3],
        shape: [usize; 3],
        values: Vec<f64>,
    ) -> Result<Self, DensityMapError> {
        if shape.contains(&0) {
            return Err(DensityMapError::EmptyGrid(shape));
        }
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(DensityMapError::InvalidSpacing(spacing));
        }
        let expected = shape[0] * shape[1] * shape[2];
        if values.len() != expected {
            return Err(DensityMapError::ShapeMismatch {
                shape,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            origin: Vector3::from(origin),
            spacing: Vector3::from(spacing),
            shape,
            values,
            resolution: None,
        })
    }

    /// Attaches the nominal resolution (Å) of the data the map was computed from.
    pub fn with_resolution(mut self, resolution: Option<f64>) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin.into()
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing.into()
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn resolution(&self) -> Option<f64> {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.shape[1] + j) * self.shape[0] + i
    }

    #[inline]
    pub fn value_at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[self.index(i, j, k)]
    }

    /// Cartesian position of the voxel with the given flat index.
    pub fn position_of(&self, flat: usize) -> Point3<f64> {
        let i = flat % self.shape[0];
        let j = (flat / self.shape[0]) % self.shape[1];
        let k = flat / (self.shape[0] * self.shape[1]);
        Point3::from(
            self.origin
                + Vector3::new(
                    i as f64 * self.spacing.x,
                    j as f64 * self.spacing.y,
                    k as f64 * self.spacing.z,
                ),
        )
    }

    /// Continuous grid coordinates of a Cartesian point.
    fn grid_coords(&self, p: &Point3<f64>) -> Vector3<f64> {
        (p.coords - self.origin).component_div(&self.spacing)
    }

    /// Trilinearly interpolated density at `p`.
    pub fn interpolate(&self, p: &Point3<f64>, mode: BoundaryMode) -> Result<f64, DensityMapError> {
        const EDGE_TOLERANCE: f64 = 1e-9;
        let g = self.grid_coords(p);

        let mut base = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let n = self.shape[axis];
            let upper = (n - 1) as f64;
            let mut c = g[axis];
            if !c.is_finite() || c < -EDGE_TOLERANCE || c > upper + EDGE_TOLERANCE {
                match mode {
                    BoundaryMode::Fail => {
                        return Err(DensityMapError::OutOfBounds {
                            x: p.x,
                            y: p.y,
                            z: p.z,
                        });
                    }
                    BoundaryMode::Clamp => {
                        c = if c.is_finite() { c.clamp(0.0, upper) } else { 0.0 };
                    }
                }
            }
            let c = c.clamp(0.0, upper);
            if n == 1 {
                base[axis] = 0;
                frac[axis] = 0.0;
            } else {
                let i0 = (c.floor() as usize).min(n - 2);
                base[axis] = i0;
                frac[axis] = c - i0 as f64;
            }
        }

        let step = |axis: usize| usize::from(self.shape[axis] > 1);
        let (i0, j0, k0) = (base[0], base[1], base[2]);
        let (i1, j1, k1) = (i0 + step(0), j0 + step(1), k0 + step(2));
        let (tx, ty, tz) = (frac[0], frac[1], frac[2]);

        let c00 = self.value_at(i0, j0, k0) * (1.0 - tx) + self.value_at(i1, j0, k0) * tx;
        let c10 = self.value_at(i0, j1, k0) * (1.0 - tx) + self.value_at(i1, j1, k0) * tx;
        let c01 = self.value_at(i0, j0, k1) * (1.0 - tx) + self.value_at(i1, j0, k1) * tx;
        let c11 = self.value_at(i0, j1, k1) * (1.0 - tx) + self.value_at(i1, j1, k1) * tx;
        let c0 = c00 * (1.0 - ty) + c10 * ty;
        let c1 = c01 * (1.0 - ty) + c11 * ty;
        Ok(c0 * (1.0 - tz) + c1 * tz)
    }

    /// Flat indices of grid voxels within `radius` of `center`, in ascending order.
    pub fn voxels_within(&self, center: &Point3<f64>, radius: f64) -> Vec<usize> {
        let g = self.grid_coords(center);
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for axis in 0..3 {
            let reach = radius / self.spacing[axis];
            let upper = (self.shape[axis] - 1) as f64;
            let a = (g[axis] - reach).ceil().max(0.0);
            let b = (g[axis] + reach).floor().min(upper);
            if a > b {
                return Vec::new();
            }
            lo[axis] = a as usize;
            hi[axis] = b as usize;
        }

        let r2 = radius * radius;
        let mut out = Vec::new();
        for k in lo[2]..=hi[2] {
            for j in lo[1]..=hi[1] {
                for i in lo[0]..=hi[0] {
                    let flat = self.index(i, j, k);
                    if (self.position_of(flat) - center).norm_squared() <= r2 {
                        out.push(flat);
                    }
                }
            }
        }
        out
    }

    /// Mean and population standard deviation of the grid values.
    pub fn statistics(&self) -> (f64, f64) {
        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let var = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    /// Rescales the map in place to mean 0 and standard deviation 1.
    ///
    /// A constant map becomes all zeros.
    pub fn normalize(&mut self) {
        let (mean, std) = self.statistics();
        let scale = if std > 1e-12 { 1.0 / std } else { 0.0 };
        for v in self.values.iter_mut() {
            *v = (*v - mean) * scale;
        }
        debug!(mean, std, "Normalized density map");
    }
}
