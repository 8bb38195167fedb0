use crate::error::{CliError, Result};
use qfit::core::density::map::BoundaryMode;
use qfit::engine::config::{self as core_config, SolverKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileResidueSpecifier {
    pub chain_id: char,
    pub residue_number: isize,
}

impl From<FileResidueSpecifier> for core_config::ResidueSpecifier {
    fn from(p: FileResidueSpecifier) -> Self {
        Self {
            chain_id: p.chain_id,
            residue_number: p.residue_number,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum FileResidueSelection {
    All,
    List {
        #[serde(default)]
        include: Vec<FileResidueSpecifier>,
        #[serde(default)]
        exclude: Vec<FileResidueSpecifier>,
    },
}

impl From<FileResidueSelection> for core_config::ResidueSelection {
    fn from(p: FileResidueSelection) -> Self {
        match p {
            FileResidueSelection::All => core_config::ResidueSelection::All,
            FileResidueSelection::List { include, exclude } => core_config::ResidueSelection::List {
                include: include.into_iter().map(Into::into).collect(),
                exclude: exclude.into_iter().map(Into::into).collect(),
            },
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSamplingConfig {
    pub rotamer_library: Option<PathBuf>,
    pub include_input_conformation: Option<bool>,
    pub neighborhood: Option<f64>,
    pub step_size: Option<f64>,
    pub perturbed_chis: Option<usize>,
    pub dofs_per_iteration: Option<usize>,
    pub random_perturbations: Option<usize>,
    pub seed: Option<u64>,
    pub max_candidates: Option<usize>,
    pub dedup_rmsd: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileClashConfig {
    pub scaling_factor: Option<f64>,
    pub tolerance: Option<f64>,
    pub bond_length_tolerance: Option<f64>,
    pub context_margin: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileDensityConfig {
    pub boundary_mode: Option<BoundaryMode>,
    pub normalize_map: Option<bool>,
    pub mask_radius: Option<f64>,
    pub density_cutoff: Option<f64>,
    pub resolution_min: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSolverConfig {
    pub kind: Option<SolverKind>,
    pub cardinality_bound: Option<usize>,
    pub occupancy_bound: Option<f64>,
    pub occupancy_epsilon: Option<f64>,
    pub regularization: Option<f64>,
    /// Seconds.
    pub time_budget: Option<f64>,
    pub max_iterations: Option<usize>,
    pub max_subsets: Option<usize>,
    pub normalize_occupancies: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePartitionConfig {
    pub region_size: Option<usize>,
    pub overlap: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileOutputConfig {
    pub directory: Option<PathBuf>,
    pub max_non_optimal_fraction: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub sampling: Option<FileSamplingConfig>,
    pub clash: Option<FileClashConfig>,
    pub density: Option<FileDensityConfig>,
    pub solver: Option<FileSolverConfig>,
    pub partition: Option<FilePartitionConfig>,
    pub output: Option<FileOutputConfig>,
    pub residues_to_refine: Option<FileResidueSelection>,
}

/// Reads a config file as a raw table so `-S` overrides can be applied before validation.
pub fn read_table(path: &Path) -> Result<toml::Table> {
    debug!("Loading configuration from file: {:?}", path);
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

impl FileConfig {
    pub fn from_table(table: toml::Table) -> Result<Self> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| CliError::Config(e.to_string()))
    }
}
