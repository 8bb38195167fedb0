//! File adapters.
//!
//! A fixed-column PDB reader/writer for coordinates with alternate locations and occupancies,
//! and a JSON encoding of the orthogonal-grid [`DensityMap`](crate::core::density::map::DensityMap).

pub mod map;
pub mod pdb;
pub mod traits;
