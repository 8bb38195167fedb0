//! # Workflows Module
//!
//! High-level entry points that run the complete multi-conformer refinement.
//!
//! ## Overview
//!
//! A workflow owns everything a caller should not have to assemble by hand: validating the
//! configuration, loading the rotamer library, preparing the density map, choosing the
//! occupancy solver, partitioning the structure and fanning regions out over worker threads.
//! It returns the merged multi-conformer structure together with one diagnostic record per
//! region, successful or not.
//!
//! ## Architecture
//!
//! - **Refinement Workflow** ([`refine`]) - Partition, per-region sampling, filtering, scoring
//!   and solving, followed by the boundary merge.

pub mod refine;
