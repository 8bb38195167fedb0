use super::map::DensityMap;
use super::scattering::ScatteringFactors;
use crate::core::models::atom::Element;
use nalgebra::Point3;
use std::collections::{BTreeSet, HashMap};

/// An atom as seen by the density calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityAtom {
    pub position: Point3<f64>,
    pub element: Element,
    pub b_factor: f64,
}

/// Grid voxels over which observed and calculated density are compared.
#[derive(Debug, Clone)]
pub struct FootprintMask {
    indices: Vec<usize>,
    slots: HashMap<usize, usize>,
}

impl FootprintMask {
    /// Union of the voxels within `radius` of any of `points`, in ascending grid order.
    pub fn around<'a>(
        map: &DensityMap,
        points: impl IntoIterator<Item = &'a Point3<f64>>,
        radius: f64,
    ) -> Self {
        let mut set = BTreeSet::new();
        for p in points {
            set.extend(map.voxels_within(p, radius));
        }
        let indices: Vec<usize> = set.into_iter().collect();
        let slots = indices
            .iter()
            .enumerate()
            .map(|(slot, &flat)| (flat, slot))
            .collect();
        Self { indices, slots }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Observed map values on the mask.
    pub fn extract(&self, map: &DensityMap) -> Vec<f64> {
        self.indices.iter().map(|&i| map.values()[i]).collect()
    }

    /// Calculated density of `atoms` on the mask, truncated at `cutoff` Å from each atom.
    pub fn render(&self, map: &DensityMap, atoms: &[DensityAtom], cutoff: f64) -> Vec<f64> {
        let mut out = vec![0.0; self.indices.len()];
        if self.indices.is_empty() {
            return out;
        }
        for atom in atoms {
            let factors = ScatteringFactors::for_element(atom.element);
            for flat in map.voxels_within(&atom.position, cutoff) {
                if let Some(&slot) = self.slots.get(&flat) {
                    let r2 = (map.position_of(flat) - atom.position).norm_squared();
                    out[slot] += factors.density(r2, atom.b_factor);
                }
            }
        }
        out
    }
}

/// Pearson correlation of two equally long vectors; zero when either has no variance.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_a = a[..n].iter().sum::<f64>() / nf;
    let mean_b = b[..n].iter().sum::<f64>() / nf;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_map(n: usize) -> DensityMap {
        DensityMap::new([0.0; 3], [0.5; 3], [n, n, n], vec![0.0; n * n * n]).unwrap()
    }

    fn carbon_at(x: f64, y: f64, z: f64) -> DensityAtom {
        DensityAtom {
            position: Point3::new(x, y, z),
            element: Element::C,
            b_factor: 20.0,
        }
    }

    #[test]
    fn mask_is_union_of_spheres() {
        let map = flat_map(11);
        let a = Point3::new(1.0, 1.0, 1.0);
        let b = Point3::new(4.0, 4.0, 4.0);
        let single = FootprintMask::around(&map, [&a], 1.0);
        let both = FootprintMask::around(&map, [&a, &b], 1.0);
        assert_eq!(both.len(), 2 * single.len());
        let overlap = FootprintMask::around(&map, [&a, &a], 1.0);
        assert_eq!(overlap.len(), single.len());
        assert!(both.indices().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn rendered_density_peaks_at_atom_center() {
        let map = flat_map(11);
        let center = Point3::new(2.5, 2.5, 2.5);
        let mask = FootprintMask::around(&map, [&center], 1.5);
        let rendered = mask.render(&map, &[carbon_at(2.5, 2.5, 2.5)], 3.0);
        let center_slot = mask
            .indices()
            .iter()
            .position(|&i| i == map.index(5, 5, 5))
            .unwrap();
        let max = rendered.iter().cloned().fold(f64::MIN, f64::max);
        assert_eq!(rendered[center_slot], max);
        assert!(rendered.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn cutoff_truncates_far_atoms() {
        let map = flat_map(11);
        let center = Point3::new(1.0, 1.0, 1.0);
        let mask = FootprintMask::around(&map, [&center], 0.5);
        let rendered = mask.render(&map, &[carbon_at(4.5, 4.5, 4.5)], 2.0);
        assert!(rendered.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn correlation_handles_perfect_and_degenerate_inputs() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [4.0, 3.0, 2.0, 1.0];
        assert!((correlation(&a, &b) - 1.0).abs() < 1e-12);
        assert!((correlation(&a, &c) + 1.0).abs() < 1e-12);
        assert_eq!(correlation(&a, &[5.0; 4]), 0.0);
        assert_eq!(correlation(&[], &[]), 0.0);
    }
}
