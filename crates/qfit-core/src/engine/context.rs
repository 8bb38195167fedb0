use super::config::RefineConfig;
use super::progress::ProgressReporter;
use super::region::StructureIndex;
use super::solver::OccupancySolver;
use crate::core::density::map::DensityMap;
use crate::core::models::system::MolecularSystem;
use crate::core::rotamers::library::RotamerLibrary;

/// Read-only inputs shared by every region worker.
#[derive(Clone, Copy)]
pub struct RefineContext<'a> {
    pub system: &'a MolecularSystem,
    pub map: &'a DensityMap,
    pub config: &'a RefineConfig,
    pub rotamer_library: &'a RotamerLibrary,
    pub structure: &'a StructureIndex,
    pub solver: &'a dyn OccupancySolver,
    pub reporter: &'a ProgressReporter<'a>,
}
