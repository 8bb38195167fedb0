use crate::error::{CliError, Result};
use qfit::workflows::refine::{RefinementResult, RegionReport};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// One `diagnostics.csv` row.
#[derive(Debug, Serialize)]
struct DiagnosticsRow<'a> {
    region: usize,
    residues: String,
    state: &'static str,
    failed_stage: Option<String>,
    error_kind: Option<String>,
    error_message: Option<&'a str>,
    solver: Option<String>,
    objective: Option<f64>,
    optimal: Option<bool>,
    sampled: usize,
    passed: usize,
    selected: usize,
    density_score: Option<f64>,
    rscc: Option<f64>,
    elapsed_ms: f64,
}

impl<'a> From<&'a RegionReport> for DiagnosticsRow<'a> {
    fn from(report: &'a RegionReport) -> Self {
        Self {
            region: report.index,
            residues: report.residues.join(" "),
            state: report.state.label(),
            failed_stage: report.failed_stage().map(|s| s.to_string()),
            error_kind: report.error_kind().map(|k| k.to_string()),
            error_message: report.error_message(),
            solver: report.solver_path.map(|p| p.to_string()),
            objective: report.objective,
            optimal: report.optimal,
            sampled: report.sampled,
            passed: report.passed,
            selected: report.selected,
            density_score: report.density_score,
            rscc: report.rscc,
            elapsed_ms: report.elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Writes one row per region, in region order.
pub fn write_diagnostics(path: &Path, diagnostics: &[RegionReport]) -> Result<()> {
    let to_error = |e: csv::Error| CliError::FileWriting {
        path: path.to_path_buf(),
        source: e.into(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(to_error)?;
    for report in diagnostics {
        writer.serialize(DiagnosticsRow::from(report)).map_err(to_error)?;
    }
    writer.flush()?;
    debug!(rows = diagnostics.len(), "Wrote diagnostics to {:?}", path);
    Ok(())
}

/// Run totals written to `summary.toml`.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummary {
    pub regions: usize,
    pub solved: usize,
    pub failed: usize,
    pub non_optimal: usize,
    pub residues_refined: usize,
    pub multi_conformer_residues: usize,
    pub exit_code: i32,
}

impl RunSummary {
    pub fn new(result: &RefinementResult, exit_code: i32) -> Self {
        let failed = result.failed_regions().count();
        Self {
            regions: result.diagnostics.len(),
            solved: result.diagnostics.len() - failed,
            failed,
            non_optimal: result.non_optimal_regions().count(),
            residues_refined: result.solution_set.residues.len(),
            multi_conformer_residues: result
                .solution_set
                .residues
                .iter()
                .filter(|r| r.alternates.len() > 1)
                .count(),
            exit_code,
        }
    }
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let content = toml::to_string_pretty(summary).map_err(|e| CliError::FileWriting {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    std::fs::write(path, content)?;
    Ok(())
}
