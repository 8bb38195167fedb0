use clap::{Args, Parser, Subcommand};
use qfit::engine::config::SolverKind;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "qFit CLI - Multi-conformer modeling of protein side chains against an electron-density map.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used to refine regions in parallel.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a multi-conformer model of the selected side chains against a density map.
    Refine(RefineArgs),
    /// List the occupancy solver backends compiled into this build.
    Solvers,
}

/// Arguments for the `refine` subcommand.
#[derive(Args, Debug)]
pub struct RefineArgs {
    // --- Inputs and outputs ---
    /// Path to the input structure (PDB format).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub structure: PathBuf,

    /// Path to the density map (JSON grid).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub map: PathBuf,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory receiving multiconformer.pdb and diagnostics.csv.
    #[arg(short, long, env = "QFIT_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    // --- Solver overrides ---
    /// Occupancy solver backend.
    #[arg(long, env = "QFIT_SOLVER", value_name = "exact|relaxed")]
    pub solver: Option<SolverKind>,

    /// Maximum number of conformers kept per region.
    #[arg(short = 'k', long, value_name = "INT")]
    pub cardinality_bound: Option<usize>,

    /// Minimum occupancy of every kept conformer.
    #[arg(long, value_name = "FLOAT")]
    pub occupancy_epsilon: Option<f64>,

    /// Time budget per occupancy solve, in seconds.
    #[arg(long, value_name = "SECS")]
    pub time_budget: Option<f64>,

    // --- Partition overrides ---
    /// Number of consecutive residues per region.
    #[arg(long, value_name = "INT")]
    pub region_size: Option<usize>,

    /// Number of residues shared by neighboring regions.
    #[arg(long, value_name = "INT")]
    pub overlap: Option<usize>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S solver.regularization=0.01
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_refine_with_overrides() {
        let cli = Cli::try_parse_from([
            "qfit", "-vv", "-j", "4", "refine", "-s", "in.pdb", "-m", "map.json", "--solver",
            "relaxed", "-k", "3", "-S", "clash.tolerance=0.1", "-S", "solver.regularization=0.01",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.threads, Some(4));
        let Commands::Refine(args) = cli.command else {
            panic!("expected refine");
        };
        assert_eq!(args.structure, PathBuf::from("in.pdb"));
        assert_eq!(args.solver, Some(SolverKind::Relaxed));
        assert_eq!(args.cardinality_bound, Some(3));
        assert_eq!(args.set_values.len(), 2);
    }

    #[test]
    fn refine_requires_structure_and_map() {
        assert!(Cli::try_parse_from(["qfit", "refine", "-s", "in.pdb"]).is_err());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["qfit", "-q", "-v", "solvers"]).is_err());
    }
}
