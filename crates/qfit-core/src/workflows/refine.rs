use crate::core::density::map::DensityMap;
use crate::core::models::ResidueId;
use crate::core::models::conformer::Conformer;
use crate::core::models::system::MolecularSystem;
use crate::core::rotamers::library::RotamerLibrary;
use crate::engine::config::{DensityConfig, RefineConfig, SolverKind};
use crate::engine::context::RefineContext;
use crate::engine::error::{EngineError, ErrorKind};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::region::{self, Region, StructureIndex};
use crate::engine::solver::{self, SolverParams};
use crate::engine::state::{RegionState, Stage};
use crate::engine::tasks::clash_filter::ClashFilter;
use crate::engine::tasks::density_scoring::DensityScorer;
use crate::engine::tasks::merge::{self, RegionSolution, SolutionSet};
use crate::engine::tasks::sampling::ConformerSampler;
use std::borrow::Cow;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Diagnostics of one region, whatever its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionReport {
    pub index: usize,
    /// Residue labels such as `A:42`.
    pub residues: Vec<String>,
    pub state: RegionState,
    pub solver_path: Option<SolverKind>,
    pub objective: Option<f64>,
    pub optimal: Option<bool>,
    /// Candidates generated over every build-up step, after deduplication.
    pub sampled: usize,
    /// Candidates that survived the clash filter.
    pub passed: usize,
    pub selected: usize,
    /// Occupancy-weighted density score of the selected conformers.
    pub density_score: Option<f64>,
    /// Real-space correlation of the selected ensemble with the observed density.
    pub rscc: Option<f64>,
    pub elapsed: Duration,
}

impl RegionReport {
    fn new(index: usize, residues: Vec<String>) -> Self {
        Self {
            index,
            residues,
            state: RegionState::Pending,
            solver_path: None,
            objective: None,
            optimal: None,
            sampled: 0,
            passed: 0,
            selected: 0,
            density_score: None,
            rscc: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.state {
            RegionState::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.state {
            RegionState::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            RegionState::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Solved, but the solver could not prove its answer optimal.
    pub fn is_non_optimal(&self) -> bool {
        self.state.is_success() && self.optimal == Some(false)
    }
}

/// The outcome of a refinement run.
#[derive(Debug, Clone)]
pub struct RefinementResult {
    pub solution_set: SolutionSet,
    /// One report per region, ordered by region index.
    pub diagnostics: Vec<RegionReport>,
    /// The multi-conformer structure.
    pub system: MolecularSystem,
}

impl RefinementResult {
    pub fn failed_regions(&self) -> impl Iterator<Item = &RegionReport> {
        self.diagnostics.iter().filter(|r| r.state.is_failed())
    }

    pub fn non_optimal_regions(&self) -> impl Iterator<Item = &RegionReport> {
        self.diagnostics.iter().filter(|r| r.is_non_optimal())
    }

    /// Share of all regions that were solved without an optimality proof.
    pub fn non_optimal_fraction(&self) -> f64 {
        if self.diagnostics.is_empty() {
            return 0.0;
        }
        self.non_optimal_regions().count() as f64 / self.diagnostics.len() as f64
    }

    /// Every region reached `Merged`.
    pub fn is_complete(&self) -> bool {
        self.diagnostics.iter().all(|r| r.state.is_success())
    }
}

/// Refines the selected residues of `system` against `map`.
///
/// Regions fail independently: a region error is recorded in its [`RegionReport`] and its
/// residues keep their input coordinates. Only configuration and rotamer library errors abort
/// the run.
#[instrument(skip_all, name = "refine_workflow")]
pub fn run(
    system: &MolecularSystem,
    map: &DensityMap,
    config: &RefineConfig,
    reporter: &ProgressReporter,
) -> Result<RefinementResult, EngineError> {
    config.validate()?;
    info!("Starting multi-conformer refinement workflow.");

    // === Phase 1: Load resources and prepare the map ===
    reporter.report(Progress::PhaseStart {
        name: "Preparing Inputs",
    });
    let rotamer_library = match &config.sampling.rotamer_library_path {
        Some(path) => RotamerLibrary::load(path)?,
        None => RotamerLibrary::builtin(),
    };
    let map = prepare_map(map, &config.density);
    let solver = solver::select_solver(config.solver.kind);
    let structure = StructureIndex::new(system);
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Partition ===
    let plans = region::partition(system, &config.residues_to_refine, &config.partition);
    info!(
        regions = plans.len(),
        solver = %solver.kind(),
        "Partitioned structure into regions."
    );

    let context = RefineContext {
        system,
        map: &map,
        config,
        rotamer_library: &rotamer_library,
        structure: &structure,
        solver: &*solver,
        reporter,
    };

    // === Phase 3: Refine regions ===
    reporter.report(Progress::PhaseStart {
        name: "Refining Regions",
    });
    reporter.report(Progress::RegionsPlanned {
        total: plans.len() as u64,
    });
    let runs = refine_regions(&context, &plans);
    reporter.report(Progress::PhaseFinish);

    // === Phase 4: Merge ===
    reporter.report(Progress::PhaseStart {
        name: "Merging Regions",
    });
    let mut regions = Vec::with_capacity(runs.len());
    let mut solutions = Vec::new();
    let mut diagnostics = Vec::with_capacity(runs.len());
    for run in runs {
        if let Some(solution) = run.solution {
            solutions.push(solution);
        }
        regions.push(run.region);
        diagnostics.push(run.report);
    }
    let solution_set = merge::merge(&regions, solutions, config.sampling.dedup_rmsd);
    for report in diagnostics.iter_mut() {
        if report.state == RegionState::Solved {
            report.state.advance();
        }
    }
    let output = merge::build_output_system(system, &solution_set);
    reporter.report(Progress::PhaseFinish);

    let result = RefinementResult {
        solution_set,
        diagnostics,
        system: output,
    };
    info!(
        regions = result.diagnostics.len(),
        failed = result.failed_regions().count(),
        non_optimal = result.non_optimal_regions().count(),
        residues = result.solution_set.residues.len(),
        "Workflow complete."
    );
    Ok(result)
}

/// The map scored against: normalized to zero mean and unit variance when configured.
fn prepare_map<'m>(map: &'m DensityMap, config: &DensityConfig) -> Cow<'m, DensityMap> {
    if !config.normalize_map {
        return Cow::Borrowed(map);
    }
    let mut normalized = map.clone();
    normalized.normalize();
    Cow::Owned(normalized)
}

struct RegionRun {
    region: Region,
    report: RegionReport,
    solution: Option<RegionSolution>,
}

fn refine_regions(context: &RefineContext, plans: &[Vec<ResidueId>]) -> Vec<RegionRun> {
    #[cfg(not(feature = "parallel"))]
    let iterator = plans.iter().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = plans.par_iter().enumerate();

    iterator
        .map(|(index, residue_ids)| refine_region(context, index, residue_ids))
        .collect()
}

fn refine_region(context: &RefineContext, index: usize, residue_ids: &[ResidueId]) -> RegionRun {
    let started = Instant::now();
    let region = Region::build(
        index,
        context.system,
        residue_ids,
        context.structure,
        context.config.clash.context_margin,
    );
    let labels = region.residues.iter().map(|r| r.label.clone()).collect();
    let mut report = RegionReport::new(index, labels);
    let mut state = RegionState::Pending;

    let solution = match run_stages(context, &region, &mut state, &mut report) {
        Ok(solution) => Some(solution),
        Err(e) => {
            let stage = state.next_stage().unwrap_or(Stage::Merging);
            state.fail(&e);
            warn!(
                region = index,
                residues = ?report.residues,
                %stage,
                error = %e,
                "Region failed"
            );
            None
        }
    };

    report.state = state;
    report.elapsed = started.elapsed();
    context.reporter.report(Progress::RegionFinished {
        index,
        solved: solution.is_some(),
    });
    RegionRun {
        region,
        report,
        solution,
    }
}

/// Samples the region a block of chis at a time, keeping only the conformers the solver selects
/// before expanding the next block. Atoms not yet placed are left out of each screen.
///
/// Returns the unscreened candidates of the final block; `report.sampled` counts every
/// candidate generated along the way.
fn build_up(
    context: &RefineContext,
    region: &Region,
    report: &mut RegionReport,
) -> Result<Vec<Conformer>, EngineError> {
    let config = context.config;
    let sampler = ConformerSampler::new(context.rotamer_library, &config.sampling);
    let steps = sampler.steps(region);
    let mut parents = vec![sampler.seed(region)];
    report.sampled = 0;

    let Some((last, screened)) = steps.split_last() else {
        report.sampled = parents.len();
        return Ok(parents);
    };
    for step in screened {
        let candidates = sampler.extend(region, &parents, step)?;
        report.sampled += candidates.len();

        let active = region.active_atoms(step.slot, step.chis.end);
        let passed = ClashFilter::new(region, &config.clash)
            .with_active(active.clone())
            .filter(candidates)
            .passed;
        if passed.is_empty() {
            parents = passed;
            break;
        }
        let problem = DensityScorer::new(context.map, region, &config.density)
            .with_active(active)
            .occupancy_problem(&passed)?;
        let params = SolverParams::from_config(&config.solver, Instant::now());
        let outcome = context.solver.solve(&problem, &params)?;
        parents = outcome
            .weights
            .iter()
            .filter_map(|&(i, _)| passed.get(i).cloned())
            .collect();
        debug!(
            region = region.index,
            slot = step.slot,
            chis = ?step.chis,
            kept = parents.len(),
            "Screened build-up step"
        );
    }

    let candidates = if parents.is_empty() {
        parents
    } else {
        sampler.extend(region, &parents, last)?
    };
    report.sampled += candidates.len();
    Ok(candidates)
}

/// Drives one region from `Pending` to `Solved`, advancing `state` after every stage.
fn run_stages(
    context: &RefineContext,
    region: &Region,
    state: &mut RegionState,
    report: &mut RegionReport,
) -> Result<RegionSolution, EngineError> {
    let config = context.config;

    let candidates = build_up(context, region, report)?;
    state.advance();

    let filtered = ClashFilter::new(region, &config.clash).filter(candidates);
    let mut conformers = filtered.passed;
    report.passed = conformers.len();
    state.advance();

    let scorer = DensityScorer::new(context.map, region, &config.density);
    scorer.score_all(&mut conformers)?;
    let problem = scorer.occupancy_problem(&conformers)?;
    state.advance();

    let params = SolverParams::from_config(&config.solver, Instant::now());
    let mut outcome = context.solver.solve(&problem, &params)?;
    if config.solver.normalize_occupancies {
        outcome = outcome.normalized(config.solver.occupancy_bound);
    }
    report.solver_path = Some(outcome.path);
    report.objective = Some(outcome.objective);
    report.optimal = Some(outcome.optimal);
    report.selected = outcome.weights.len();
    report.rscc = Some(DensityScorer::ensemble_correlation(&problem, &outcome.weights));

    let selected: Vec<Conformer> = outcome
        .weights
        .iter()
        .filter_map(|&(i, occupancy)| {
            conformers.get(i).map(|c| Conformer {
                occupancy,
                ..c.clone()
            })
        })
        .collect();
    let solution = RegionSolution {
        region_index: region.index,
        conformers: selected,
    };
    report.density_score = Some(solution.weighted_score());
    state.advance();

    debug!(
        region = region.index,
        sampled = report.sampled,
        passed = report.passed,
        selected = report.selected,
        objective = outcome.objective,
        optimal = outcome.optimal,
        "Region solved"
    );
    Ok(solution)
}
