use crate::core::utils::geometry::calculate_rmsd;
use nalgebra::Point3;

/// One candidate geometry of a region.
///
/// `positions` holds a coordinate for every region atom, in region order, so two conformers of
/// the same region can be compared position by position. `chis` records, per region residue,
/// the chi vector that produced the geometry (empty for residues without chi angles).
#[derive(Debug, Clone, PartialEq)]
pub struct Conformer {
    /// Position in the sampler output, reassigned after deduplication.
    pub index: usize,
    pub positions: Vec<Point3<f64>>,
    pub chis: Vec<Vec<f64>>,
    /// Density score, set once by the scorer.
    pub score: Option<f64>,
    /// Occupancy, zero until the solver assigns one.
    pub occupancy: f64,
}

impl Conformer {
    pub fn new(index: usize, positions: Vec<Point3<f64>>, chis: Vec<Vec<f64>>) -> Self {
        Self {
            index,
            positions,
            chis,
            score: None,
            occupancy: 0.0,
        }
    }

    /// RMSD over the given subset of atom indices, or over all atoms when `subset` is `None`.
    pub fn rmsd_to(&self, other: &Conformer, subset: Option<&[usize]>) -> Option<f64> {
        match subset {
            None => calculate_rmsd(&self.positions, &other.positions),
            Some(indices) => {
                let a: Vec<Point3<f64>> = indices
                    .iter()
                    .filter_map(|&i| self.positions.get(i).copied())
                    .collect();
                let b: Vec<Point3<f64>> = indices
                    .iter()
                    .filter_map(|&i| other.positions.get(i).copied())
                    .collect();
                calculate_rmsd(&a, &b)
            }
        }
    }
}
