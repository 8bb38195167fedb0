//! Molecular data structures.
//!
//! Atoms, residues and chains live in slot maps inside [`system::MolecularSystem`] and are
//! referenced through the stable keys declared here. Candidate geometries produced during
//! refinement are represented separately as [`conformer::Conformer`] values.

pub mod atom;
pub mod chain;
pub mod conformer;
pub mod residue;
pub mod system;

use slotmap::new_key_type;

new_key_type! {
    /// Stable identifier of an atom inside a `MolecularSystem`.
    pub struct AtomId;
    /// Stable identifier of a residue inside a `MolecularSystem`.
    pub struct ResidueId;
    /// Stable identifier of a chain inside a `MolecularSystem`.
    pub struct ChainId;
}
