//! Side-chain conformational libraries.
//!
//! - [`chi`] - which four atoms define each chi torsion of each amino acid
//! - [`library`] - rotameric chi vectors per residue type, built in or loaded from TOML

pub mod chi;
pub mod library;
