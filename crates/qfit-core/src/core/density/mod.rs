//! Electron density: the experimental grid map, atomic scattering factors and the calculated
//! density of a model placed on a footprint of grid voxels.

pub mod map;
pub mod model;
pub mod scattering;
