//! # qFit Core Library
//!
//! A library for multi-conformer modeling of protein side chains against an experimental
//! electron-density map, following the scientific approach of qFit: sample an over-complete set
//! of candidate conformations per local region, discard sterically impossible ones, and select a
//! sparse, occupancy-weighted subset that best explains the density.
//!
//! ## Architectural Philosophy
//!
//! - **[`core`]: The Foundation.** Stateless data models (`MolecularSystem`, `Conformer`),
//!   density maps and calculated density, rotamer and chi libraries, geometry and I/O adapters.
//!
//! - **[`engine`]: The Logic Core.** Region partitioning, the per-region tasks (conformer
//!   sampling, clash filtering, density scoring), the occupancy solver strategies (exact MIQP
//!   and relaxed QP), the region state machine and the boundary merge.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together into the complete
//!   refinement procedure with a single entry point, [`workflows::refine::run`].

pub mod core;
pub mod engine;
pub mod workflows;
