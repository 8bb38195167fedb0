//! Layered configuration for the `refine` command: built-in defaults, a TOML file, `-S`
//! overrides and command-line flags, resolved into an [`AppConfig`].

mod builder;
mod defaults;
mod file;
mod models;

pub use builder::build_config;
pub use models::AppConfig;
