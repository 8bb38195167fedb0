use super::CommandStatus;
use crate::cli::RefineArgs;
use crate::config::{AppConfig, build_config};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use crate::utils::report::{self, RunSummary};
use qfit::{
    core::io::{
        map::read_map_from_path,
        pdb::{PdbFile, PdbMetadata},
        traits::MolecularFile,
    },
    engine::progress::ProgressReporter,
    workflows::{self, refine::RefinementResult},
};
use std::path::Path;
use tracing::{info, warn};

const STRUCTURE_FILE: &str = "multiconformer.pdb";
const DIAGNOSTICS_FILE: &str = "diagnostics.csv";
const SUMMARY_FILE: &str = "summary.toml";

pub async fn run(args: RefineArgs) -> Result<CommandStatus> {
    info!("Merging configuration from file, overrides and CLI arguments...");
    let mut app_config = build_config(&args)?;

    info!("Loading input structure from {:?}", &app_config.structure_path);
    let (system, metadata) =
        PdbFile::read_from_path(&app_config.structure_path).map_err(|e| {
            CliError::FileParsing {
                path: app_config.structure_path.clone(),
                source: e.into(),
            }
        })?;

    info!("Loading density map from {:?}", &app_config.map_path);
    let map = read_map_from_path(&app_config.map_path).map_err(|e| CliError::FileParsing {
        path: app_config.map_path.clone(),
        source: e.into(),
    })?;

    let density = &mut app_config.core_config.density;
    if density.resolution_min.is_none() {
        if let Some(resolution) = map.resolution() {
            info!(resolution, "Using the map resolution as the low-resolution limit.");
            density.resolution_min = Some(resolution);
        }
    }

    std::fs::create_dir_all(&app_config.output_dir)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting multi-conformer refinement...");
    info!("Invoking the core refinement workflow...");

    let result = tokio::task::block_in_place(|| {
        workflows::refine::run(&system, &map, &app_config.core_config, &reporter)
    })?;

    let status = classify(&result, app_config.max_non_optimal_fraction);
    write_outputs(&app_config, &result, &metadata, status)?;
    print_summary(&app_config.output_dir, &result);

    Ok(status)
}

/// Full success needs every region merged and few enough regions without an optimality proof.
fn classify(result: &RefinementResult, max_non_optimal_fraction: f64) -> CommandStatus {
    let fraction = result.non_optimal_fraction();
    if !result.is_complete() {
        warn!(
            failed = result.failed_regions().count(),
            "Some regions failed; their residues keep the input coordinates."
        );
        CommandStatus::PartialSuccess
    } else if fraction > max_non_optimal_fraction {
        warn!(
            fraction,
            max = max_non_optimal_fraction,
            "Too many regions were solved without an optimality proof."
        );
        CommandStatus::PartialSuccess
    } else {
        CommandStatus::Success
    }
}

fn write_outputs(
    app_config: &AppConfig,
    result: &RefinementResult,
    metadata: &PdbMetadata,
    status: CommandStatus,
) -> Result<()> {
    let dir = &app_config.output_dir;

    let structure_path = dir.join(STRUCTURE_FILE);
    info!("Writing multi-conformer structure to {:?}", &structure_path);
    PdbFile::write_to_path(&result.system, metadata, &structure_path).map_err(|e| {
        CliError::FileWriting {
            path: structure_path.clone(),
            source: e.into(),
        }
    })?;

    report::write_diagnostics(&dir.join(DIAGNOSTICS_FILE), &result.diagnostics)?;
    report::write_summary(
        &dir.join(SUMMARY_FILE),
        &RunSummary::new(result, status.exit_code()),
    )?;
    Ok(())
}

fn print_summary(output_dir: &Path, result: &RefinementResult) {
    let summary = RunSummary::new(result, 0);
    println!(
        "Refined {} residue(s) in {} region(s): {} solved, {} failed, {} non-optimal; {} with alternates.",
        summary.residues_refined,
        summary.regions,
        summary.solved,
        summary.failed,
        summary.non_optimal,
        summary.multi_conformer_residues
    );
    for failed in result.failed_regions() {
        println!(
            "  Region {} [{}] failed at {}: {}",
            failed.index,
            failed.residues.join(" "),
            failed
                .failed_stage()
                .map(|s| s.to_string())
                .unwrap_or_default(),
            failed.error_message().unwrap_or_default()
        );
    }
    println!("✓ Results written to: {}", output_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use qfit::core::density::map::DensityMap;
    use qfit::core::density::scattering::ScatteringFactors;
    use qfit::core::io::map::write_map_to_path;
    use qfit::core::models::atom::Element;
    use qfit::core::models::system::MolecularSystem;
    use qfit::engine::config::SolverKind;
    use qfit::engine::error::ErrorKind;
    use qfit::engine::state::{RegionState, Stage};
    use qfit::engine::tasks::merge::SolutionSet;
    use qfit::workflows::refine::RegionReport;
    use std::ffi::OsString;
    use std::time::Duration;

    const SERINE_PDB: &str = "\
ATOM      1  N   SER A   1       4.500   5.500   6.500  1.00 20.00           N
ATOM      2  CA  SER A   1       5.958   5.500   6.500  1.00 20.00           C
ATOM      3  C   SER A   1       6.505   6.924   6.500  1.00 20.00           C
ATOM      4  O   SER A   1       7.719   7.127   6.500  1.00 20.00           O
ATOM      5  CB  SER A   1       6.494   4.730   5.291  1.00 20.00           C
ATOM      6  OG  SER A   1       6.128   5.368   4.080  1.00 20.00           O
END
";

    fn report(index: usize, state: RegionState, optimal: bool) -> RegionReport {
        let solved = state.is_success();
        RegionReport {
            index,
            residues: vec![format!("A:{}", index + 1)],
            state,
            solver_path: solved.then_some(SolverKind::Relaxed),
            objective: solved.then_some(0.1),
            optimal: solved.then_some(optimal),
            sampled: 4,
            passed: 4,
            selected: 1,
            density_score: solved.then_some(0.5),
            rscc: solved.then_some(0.9),
            elapsed: Duration::from_millis(1),
        }
    }

    fn result(diagnostics: Vec<RegionReport>) -> RefinementResult {
        RefinementResult {
            solution_set: SolutionSet::default(),
            diagnostics,
            system: MolecularSystem::new(),
        }
    }

    #[test]
    fn complete_optimal_run_is_a_success() {
        let r = result(vec![
            report(0, RegionState::Merged, true),
            report(1, RegionState::Merged, true),
        ]);
        assert_eq!(classify(&r, 0.0), CommandStatus::Success);
    }

    #[test]
    fn any_failed_region_makes_a_partial_success() {
        let failed = RegionState::Failed {
            stage: Stage::Sampling,
            kind: ErrorKind::ExhaustedBudget,
            message: "budget exhausted".to_string(),
        };
        let r = result(vec![
            report(0, RegionState::Merged, true),
            report(1, failed, false),
        ]);
        assert_eq!(classify(&r, 1.0), CommandStatus::PartialSuccess);
        assert_eq!(CommandStatus::PartialSuccess.exit_code(), 2);
    }

    #[test]
    fn non_optimal_share_is_compared_against_the_threshold() {
        let r = result(vec![
            report(0, RegionState::Merged, true),
            report(1, RegionState::Merged, false),
        ]);
        assert_eq!(classify(&r, 0.0), CommandStatus::PartialSuccess);
        assert_eq!(classify(&r, 0.5), CommandStatus::Success);
    }

    fn argv(args: &[OsString]) -> Vec<OsString> {
        std::iter::once(OsString::from("qfit"))
            .chain(args.iter().cloned())
            .collect()
    }

    /// Renders the serine's atoms onto a 12 Å box with 0.5 Å voxels.
    fn write_serine_map(path: &Path) {
        let atoms = [
            (Element::N, [4.500, 5.500, 6.500]),
            (Element::C, [5.958, 5.500, 6.500]),
            (Element::C, [6.505, 6.924, 6.500]),
            (Element::O, [7.719, 7.127, 6.500]),
            (Element::C, [6.494, 4.730, 5.291]),
            (Element::O, [6.128, 5.368, 4.080]),
        ];
        let (n, spacing) = (24usize, 0.5);
        let mut values = vec![0.0; n * n * n];
        for (flat, value) in values.iter_mut().enumerate() {
            let voxel = [
                (flat % n) as f64 * spacing,
                ((flat / n) % n) as f64 * spacing,
                (flat / (n * n)) as f64 * spacing,
            ];
            for (element, position) in &atoms {
                let r2: f64 = (0..3).map(|d| (voxel[d] - position[d]).powi(2)).sum();
                if r2 <= 9.0 {
                    *value += ScatteringFactors::for_element(*element).density(r2, 20.0);
                }
            }
        }
        let map = DensityMap::new([0.0; 3], [spacing; 3], [n; 3], values)
            .unwrap()
            .with_resolution(Some(1.5));
        write_map_to_path(&map, path).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refines_a_single_serine_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let structure = dir.path().join("input.pdb");
        let map = dir.path().join("map.json");
        let output = dir.path().join("out");
        std::fs::write(&structure, SERINE_PDB).unwrap();
        write_serine_map(&map);

        let cli = Cli::try_parse_from(argv(&[
            "refine".into(),
            "-s".into(),
            structure.into_os_string(),
            "-m".into(),
            map.into_os_string(),
            "-o".into(),
            output.clone().into_os_string(),
            "-S".into(),
            "density.boundary-mode=clamp".into(),
        ]))
        .unwrap();
        let Commands::Refine(args) = cli.command else {
            panic!("expected refine");
        };

        let status = run(args).await.unwrap();
        assert_eq!(status, CommandStatus::Success);

        let pdb = std::fs::read_to_string(output.join(STRUCTURE_FILE)).unwrap();
        assert!(pdb.lines().any(|l| l.starts_with("ATOM") && l.contains(" OG ")));

        let mut reader = csv::Reader::from_path(output.join(DIAGNOSTICS_FILE)).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);

        let summary: toml::Table =
            toml::from_str(&std::fs::read_to_string(output.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary["failed"].as_integer(), Some(0));
        assert_eq!(summary["exit-code"].as_integer(), Some(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreadable_structure_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pdb");
        let cli = Cli::try_parse_from(argv(&[
            "refine".into(),
            "-s".into(),
            missing.clone().into_os_string(),
            "-m".into(),
            dir.path().join("map.json").into_os_string(),
        ]))
        .unwrap();
        let Commands::Refine(args) = cli.command else {
            panic!("expected refine");
        };

        match run(args).await {
            Err(CliError::FileParsing { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected a parsing error, got {:?}", other.map(|_| ())),
        }
    }
}
