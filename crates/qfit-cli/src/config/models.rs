use qfit::engine::config as core_config;
use std::path::PathBuf;

pub struct AppConfig {
    pub structure_path: PathBuf,
    pub map_path: PathBuf,
    pub output_dir: PathBuf,
    /// Largest share of non-optimal regions still reported as full success.
    pub max_non_optimal_fraction: f64,
    pub core_config: core_config::RefineConfig,
}
