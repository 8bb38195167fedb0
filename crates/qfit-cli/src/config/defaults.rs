use std::path::PathBuf;

/// CLI-level defaults; engine parameters default through `RefineConfig::default()`.
pub struct DefaultsConfig {
    pub output_dir: PathBuf,
    pub max_non_optimal_fraction: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("qfit_output"),
            max_non_optimal_fraction: 0.0,
        }
    }
}
