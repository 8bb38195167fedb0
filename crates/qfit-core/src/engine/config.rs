use crate::core::density::map::BoundaryMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// Largest cardinality bound: every selected conformer needs its own altloc letter.
pub const MAX_CARDINALITY: usize = 26;

fn invalid(parameter: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        parameter,
        reason: reason.into(),
    }
}

/// Which occupancy solver backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    /// Support enumeration over the screened candidates (MIQP semantics).
    #[default]
    Exact,
    /// Continuous QP followed by top-K selection.
    Relaxed,
}

impl FromStr for SolverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" | "miqp" => Ok(SolverKind::Exact),
            "relaxed" | "qp" => Ok(SolverKind::Relaxed),
            other => Err(invalid(
                "solver",
                format!("unknown solver '{}', expected 'exact' or 'relaxed'", other),
            )),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::Exact => f.write_str("exact"),
            SolverKind::Relaxed => f.write_str("relaxed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResidueSpecifier {
    pub chain_id: char,
    pub residue_number: isize,
}

impl FromStr for ResidueSpecifier {
    type Err = ConfigError;

    /// Parses `A:42` or `A42`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let chain_id = chars
            .next()
            .ok_or_else(|| invalid("residue", "empty residue specifier"))?;
        let rest = chars.as_str().trim_start_matches(':');
        let residue_number = rest
            .parse()
            .map_err(|_| invalid("residue", format!("cannot parse '{}'", s)))?;
        Ok(Self {
            chain_id,
            residue_number,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResidueSelection {
    #[default]
    All,
    List {
        include: Vec<ResidueSpecifier>,
        exclude: Vec<ResidueSpecifier>,
    },
}

impl ResidueSelection {
    pub fn contains(&self, spec: &ResidueSpecifier) -> bool {
        match self {
            ResidueSelection::All => true,
            ResidueSelection::List { include, exclude } => {
                (include.is_empty() || include.contains(spec)) && !exclude.contains(spec)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Custom rotamer library (TOML); the built-in library is used when absent.
    pub rotamer_library_path: Option<PathBuf>,
    pub include_input_conformation: bool,
    /// Half-width of the chi window sampled around each base rotamer, degrees.
    pub neighborhood: f64,
    /// Grid step inside the window, degrees.
    pub step_size: f64,
    /// Number of leading chis that are perturbed.
    pub perturbed_chis: usize,
    /// Chi angles added per build-up step. A step never spans two residues, so the last step of
    /// a residue may add fewer.
    pub dofs_per_iteration: usize,
    pub random_perturbations: usize,
    pub seed: u64,
    pub max_candidates: usize,
    /// Candidates closer than this RMSD (Å) to an accepted one are dropped.
    pub dedup_rmsd: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rotamer_library_path: None,
            include_input_conformation: true,
            neighborhood: 40.0,
            step_size: 8.0,
            perturbed_chis: 2,
            dofs_per_iteration: 2,
            random_perturbations: 0,
            seed: 0,
            max_candidates: 10_000,
            dedup_rmsd: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClashConfig {
    pub scaling_factor: f64,
    pub tolerance: f64,
    pub bond_length_tolerance: f64,
    /// Atoms of the rest of the structure within this distance (Å) of the region form its
    /// fixed context.
    pub context_margin: f64,
}

impl Default for ClashConfig {
    fn default() -> Self {
        Self {
            scaling_factor: 0.80,
            tolerance: 0.0,
            bond_length_tolerance: 0.1,
            context_margin: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityConfig {
    pub boundary_mode: BoundaryMode,
    pub normalize_map: bool,
    pub mask_radius: f64,
    pub density_cutoff: f64,
    /// Low-resolution limit (Å); when set the mask radius becomes `resolution_min / 3 + 0.5`.
    pub resolution_min: Option<f64>,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            boundary_mode: BoundaryMode::Fail,
            normalize_map: true,
            mask_radius: 1.5,
            density_cutoff: 3.0,
            resolution_min: None,
        }
    }
}

impl DensityConfig {
    pub fn effective_mask_radius(&self) -> f64 {
        match self.resolution_min {
            Some(res) => res / 3.0 + 0.5,
            None => self.mask_radius,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub kind: SolverKind,
    /// Maximum number of conformers with non-zero occupancy (K).
    pub cardinality_bound: usize,
    /// Upper bound on the occupancy sum (B).
    pub occupancy_bound: f64,
    /// Minimum occupancy of every selected conformer (ε).
    pub occupancy_epsilon: f64,
    /// Per-conformer penalty on the support size (λ).
    pub regularization: f64,
    pub time_budget: Option<Duration>,
    pub max_iterations: usize,
    pub max_subsets: usize,
    pub normalize_occupancies: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::Exact,
            cardinality_bound: 2,
            occupancy_bound: 1.0,
            occupancy_epsilon: 0.30,
            regularization: 0.0,
            time_budget: None,
            max_iterations: 5_000,
            max_subsets: 100_000,
            normalize_occupancies: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionConfig {
    pub region_size: usize,
    pub overlap: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            region_size: 1,
            overlap: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RefineConfig {
    pub sampling: SamplingConfig,
    pub clash: ClashConfig,
    pub density: DensityConfig,
    pub solver: SolverConfig,
    pub partition: PartitionConfig,
    pub residues_to_refine: ResidueSelection,
}

impl RefineConfig {
    pub fn builder() -> RefineConfigBuilder {
        RefineConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.sampling;
        if !(s.step_size.is_finite() && s.step_size > 0.0) {
            return Err(invalid("sampling.step-size", "must be positive"));
        }
        if !(s.neighborhood.is_finite() && s.neighborhood >= 0.0) {
            return Err(invalid("sampling.neighborhood", "must be non-negative"));
        }
        if s.dofs_per_iteration == 0 {
            return Err(invalid("sampling.dofs-per-iteration", "must be at least 1"));
        }
        if s.max_candidates == 0 {
            return Err(invalid("sampling.max-candidates", "must be at least 1"));
        }
        if !(s.dedup_rmsd.is_finite() && s.dedup_rmsd >= 0.0) {
            return Err(invalid("sampling.dedup-rmsd", "must be non-negative"));
        }

        let c = &self.clash;
        if !(c.scaling_factor.is_finite() && c.scaling_factor > 0.0) {
            return Err(invalid("clash.scaling-factor", "must be positive"));
        }
        if !(c.bond_length_tolerance.is_finite() && c.bond_length_tolerance >= 0.0) {
            return Err(invalid("clash.bond-length-tolerance", "must be non-negative"));
        }
        if !(c.context_margin.is_finite() && c.context_margin >= 0.0) {
            return Err(invalid("clash.context-margin", "must be non-negative"));
        }

        let d = &self.density;
        if !(d.effective_mask_radius().is_finite() && d.effective_mask_radius() > 0.0) {
            return Err(invalid("density.mask-radius", "must be positive"));
        }
        if !(d.density_cutoff.is_finite() && d.density_cutoff > 0.0) {
            return Err(invalid("density.density-cutoff", "must be positive"));
        }

        let sv = &self.solver;
        if !(sv.occupancy_bound >= 0.0 && sv.occupancy_bound <= 1.0) {
            return Err(invalid("solver.occupancy-bound", "must lie in [0, 1]"));
        }
        if sv.cardinality_bound > MAX_CARDINALITY {
            return Err(invalid(
                "solver.cardinality-bound",
                format!("at most {} conformers can be named by altlocs", MAX_CARDINALITY),
            ));
        }
        if !(sv.occupancy_epsilon.is_finite() && sv.occupancy_epsilon >= 0.0) {
            return Err(invalid("solver.occupancy-epsilon", "must be non-negative"));
        }
        if !(sv.regularization.is_finite() && sv.regularization >= 0.0) {
            return Err(invalid("solver.regularization", "must be non-negative"));
        }
        if sv.max_iterations == 0 {
            return Err(invalid("solver.max-iterations", "must be at least 1"));
        }

        let p = &self.partition;
        if p.region_size == 0 {
            return Err(invalid("partition.region-size", "must be at least 1"));
        }
        if p.overlap >= p.region_size {
            return Err(invalid(
                "partition.overlap",
                format!("must be smaller than region size {}", p.region_size),
            ));
        }
        Ok(())
    }
}

/// Builds a validated [`RefineConfig`]; every parameter not set keeps its default.
#[derive(Default)]
pub struct RefineConfigBuilder {
    config: RefineConfig,
}

impl RefineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sampling(mut self, sampling: SamplingConfig) -> Self {
        self.config.sampling = sampling;
        self
    }
    pub fn clash(mut self, clash: ClashConfig) -> Self {
        self.config.clash = clash;
        self
    }
    pub fn density(mut self, density: DensityConfig) -> Self {
        self.config.density = density;
        self
    }
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.config.solver = solver;
        self
    }
    pub fn partition(mut self, partition: PartitionConfig) -> Self {
        self.config.partition = partition;
        self
    }
    pub fn residues_to_refine(mut self, selection: ResidueSelection) -> Self {
        self.config.residues_to_refine = selection;
        self
    }
    pub fn rotamer_library_path(mut self, path: PathBuf) -> Self {
        self.config.sampling.rotamer_library_path = Some(path);
        self
    }
    pub fn solver_kind(mut self, kind: SolverKind) -> Self {
        self.config.solver.kind = kind;
        self
    }
    pub fn cardinality_bound(mut self, k: usize) -> Self {
        self.config.solver.cardinality_bound = k;
        self
    }
    pub fn occupancy_epsilon(mut self, epsilon: f64) -> Self {
        self.config.solver.occupancy_epsilon = epsilon;
        self
    }
    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.config.solver.time_budget = Some(budget);
        self
    }
    pub fn region_size(mut self, size: usize) -> Self {
        self.config.partition.region_size = size;
        self
    }
    pub fn overlap(mut self, overlap: usize) -> Self {
        self.config.partition.overlap = overlap;
        self
    }

    pub fn build(self) -> Result<RefineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
