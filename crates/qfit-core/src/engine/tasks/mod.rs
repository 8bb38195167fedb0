//! Per-region pipeline stages.
//!
//! Each stage reads a [`Region`](super::region::Region) and the output of the stage before it:
//! conformer sampling, steric filtering and density scoring run independently per region;
//! merging reconciles the solved regions afterwards.

pub mod clash_filter;
pub mod density_scoring;
pub mod merge;
pub mod sampling;
