use super::defaults::DefaultsConfig;
use super::file::{
    self, FileClashConfig, FileConfig, FileDensityConfig, FilePartitionConfig, FileSamplingConfig,
    FileSolverConfig,
};
use super::models::AppConfig;
use crate::cli::RefineArgs;
use crate::error::{CliError, Result};
use qfit::engine::config as core_config;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Resolves the final configuration. Precedence: CLI flag > `-S` > config file > defaults.
pub fn build_config(args: &RefineArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let mut table = match &args.config {
        Some(path) => file::read_table(path)?,
        None => toml::Table::new(),
    };
    apply_set_values(&mut table, &args.set_values)?;
    let file_config = FileConfig::from_table(table)?;

    let mut core = core_config::RefineConfig::default();
    if let Some(sampling) = file_config.sampling {
        merge_sampling(&mut core.sampling, sampling)?;
    }
    if let Some(clash) = file_config.clash {
        merge_clash(&mut core.clash, clash);
    }
    if let Some(density) = file_config.density {
        merge_density(&mut core.density, density);
    }
    if let Some(solver) = file_config.solver {
        merge_solver(&mut core.solver, solver)?;
    }
    if let Some(partition) = file_config.partition {
        merge_partition(&mut core.partition, partition);
    }
    if let Some(selection) = file_config.residues_to_refine {
        core.residues_to_refine = selection.into();
    }

    if let Some(kind) = args.solver {
        core.solver.kind = kind;
    }
    if let Some(k) = args.cardinality_bound {
        core.solver.cardinality_bound = k;
    }
    if let Some(epsilon) = args.occupancy_epsilon {
        core.solver.occupancy_epsilon = epsilon;
    }
    if let Some(seconds) = args.time_budget {
        core.solver.time_budget = Some(seconds_to_duration("--time-budget", seconds)?);
    }
    if let Some(size) = args.region_size {
        core.partition.region_size = size;
    }
    if let Some(overlap) = args.overlap {
        core.partition.overlap = overlap;
    }

    core.validate()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let output = file_config.output.unwrap_or_default();
    let output_dir = args
        .output_dir
        .clone()
        .or(output.directory)
        .unwrap_or(defaults.output_dir);
    let max_non_optimal_fraction = output
        .max_non_optimal_fraction
        .unwrap_or(defaults.max_non_optimal_fraction);
    if !(0.0..=1.0).contains(&max_non_optimal_fraction) {
        return Err(CliError::Config(format!(
            "output.max-non-optimal-fraction must lie in [0, 1], got {}",
            max_non_optimal_fraction
        )));
    }

    debug!(?core, "Resolved refinement configuration");
    Ok(AppConfig {
        structure_path: args.structure.clone(),
        map_path: args.map.clone(),
        output_dir,
        max_non_optimal_fraction,
        core_config: core,
    })
}

fn merge_sampling(
    target: &mut core_config::SamplingConfig,
    file: FileSamplingConfig,
) -> Result<()> {
    if let Some(path) = file.rotamer_library {
        ensure_exists(&path)?;
        target.rotamer_library_path = Some(path);
    }
    if let Some(v) = file.include_input_conformation {
        target.include_input_conformation = v;
    }
    if let Some(v) = file.neighborhood {
        target.neighborhood = v;
    }
    if let Some(v) = file.step_size {
        target.step_size = v;
    }
    if let Some(v) = file.perturbed_chis {
        target.perturbed_chis = v;
    }
    if let Some(v) = file.dofs_per_iteration {
        target.dofs_per_iteration = v;
    }
    if let Some(v) = file.random_perturbations {
        target.random_perturbations = v;
    }
    if let Some(v) = file.seed {
        target.seed = v;
    }
    if let Some(v) = file.max_candidates {
        target.max_candidates = v;
    }
    if let Some(v) = file.dedup_rmsd {
        target.dedup_rmsd = v;
    }
    Ok(())
}

fn merge_clash(target: &mut core_config::ClashConfig, file: FileClashConfig) {
    if let Some(v) = file.scaling_factor {
        target.scaling_factor = v;
    }
    if let Some(v) = file.tolerance {
        target.tolerance = v;
    }
    if let Some(v) = file.bond_length_tolerance {
        target.bond_length_tolerance = v;
    }
    if let Some(v) = file.context_margin {
        target.context_margin = v;
    }
}

fn merge_density(target: &mut core_config::DensityConfig, file: FileDensityConfig) {
    if let Some(v) = file.boundary_mode {
        target.boundary_mode = v;
    }
    if let Some(v) = file.normalize_map {
        target.normalize_map = v;
    }
    if let Some(v) = file.mask_radius {
        target.mask_radius = v;
    }
    if let Some(v) = file.density_cutoff {
        target.density_cutoff = v;
    }
    if file.resolution_min.is_some() {
        target.resolution_min = file.resolution_min;
    }
}

fn merge_solver(target: &mut core_config::SolverConfig, file: FileSolverConfig) -> Result<()> {
    if let Some(v) = file.kind {
        target.kind = v;
    }
    if let Some(v) = file.cardinality_bound {
        target.cardinality_bound = v;
    }
    if let Some(v) = file.occupancy_bound {
        target.occupancy_bound = v;
    }
    if let Some(v) = file.occupancy_epsilon {
        target.occupancy_epsilon = v;
    }
    if let Some(v) = file.regularization {
        target.regularization = v;
    }
    if let Some(seconds) = file.time_budget {
        target.time_budget = Some(seconds_to_duration("solver.time-budget", seconds)?);
    }
    if let Some(v) = file.max_iterations {
        target.max_iterations = v;
    }
    if let Some(v) = file.max_subsets {
        target.max_subsets = v;
    }
    if let Some(v) = file.normalize_occupancies {
        target.normalize_occupancies = v;
    }
    Ok(())
}

fn merge_partition(target: &mut core_config::PartitionConfig, file: FilePartitionConfig) {
    if let Some(v) = file.region_size {
        target.region_size = v;
    }
    if let Some(v) = file.overlap {
        target.overlap = v;
    }
}

fn seconds_to_duration(key: &str, seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        CliError::Config(format!(
            "{} must be a non-negative number of seconds, got {}",
            key, seconds
        ))
    })
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(CliError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Provided path does not exist: {}", path.display()),
        )));
    }
    Ok(())
}

/// Writes each `section.key=value` into the raw table. Values are read as TOML literals and
/// fall back to plain strings, so `-S solver.kind=relaxed` needs no quoting.
fn apply_set_values(table: &mut toml::Table, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();
        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(CliError::Config(format!(
                "Invalid --set key: '{}'. Expected SECTION.KEY.",
                key
            )));
        }
        let Some((last, sections)) = segments.split_last() else {
            continue;
        };

        let mut current = &mut *table;
        for section in sections {
            current = current
                .entry(section.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()))
                .as_table_mut()
                .ok_or_else(|| {
                    CliError::Config(format!(
                        "Cannot set '{}': '{}' is not a section",
                        key, section
                    ))
                })?;
        }
        current.insert(last.to_string(), parse_value(value_str));
    }
    Ok(())
}

fn parse_value(raw: &str) -> toml::Value {
    let raw = raw.trim();
    format!("value = {}", raw)
        .parse::<toml::Table>()
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}
