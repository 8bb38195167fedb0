//! # Engine Module
//!
//! The region-by-region refinement machinery: everything between a loaded structure plus map
//! and the selected, occupancy-weighted conformers.
//!
//! ## Overview
//!
//! The structure is cut into overlapping windows of residues ([`region`]). Each region passes
//! through the same pipeline ([`tasks`]): conformer sampling, steric filtering and density
//! scoring, after which an occupancy solver ([`solver`]) picks a sparse ensemble. Regions are
//! independent of each other until the final merge, which reconciles residues claimed by
//! several regions.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Sampling, clash, density, solver and partition parameters
//! - **Regions** ([`region`]) - Partitioning, inferred bond graphs and fixed context
//! - **Tasks** ([`tasks`]) - Sampling, clash filtering, density scoring and merging
//! - **Solvers** ([`solver`]) - Exact and relaxed occupancy solvers behind one trait
//! - **State Tracking** ([`state`]) - The per-region lifecycle and failure records
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - The engine error taxonomy

pub mod config;
pub(crate) mod context;
pub mod error;
pub mod progress;
pub mod region;
pub mod solver;
pub mod state;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_support;
