//! # Core Module
//!
//! Fundamental building blocks for multi-conformer refinement: molecular data structures,
//! density maps, conformational libraries and file adapters.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Atoms, elements, residues, chains, systems and
//!   candidate conformers
//! - **Electron Density** ([`density`]) - Grid maps, interpolation, scattering factors and
//!   calculated model density
//! - **Conformational Libraries** ([`rotamers`]) - Chi definitions and rotamer chi tables
//! - **File I/O** ([`io`]) - PDB reading/writing and density map serialization
//! - **Geometry** ([`utils`]) - Dihedrals, axis rotations and RMSD

pub mod density;
pub mod io;
pub mod models;
pub mod rotamers;
pub mod utils;
