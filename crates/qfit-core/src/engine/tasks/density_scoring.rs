use crate::core::density::map::DensityMap;
use crate::core::density::model::{DensityAtom, FootprintMask, correlation};
use crate::core::density::scattering::ScatteringFactors;
use crate::core::models::conformer::Conformer;
use crate::engine::config::DensityConfig;
use crate::engine::error::EngineError;
use crate::engine::region::Region;
use crate::engine::solver::problem::OccupancyProblem;
use tracing::{debug, instrument};

/// Scores conformers against the observed map and builds the occupancy problem of a region.
pub struct DensityScorer<'a> {
    map: &'a DensityMap,
    region: &'a Region,
    config: &'a DensityConfig,
    /// Region atoms entering the score with their scattering weights.
    scored: Vec<(usize, f64)>,
    /// Region atoms contributing to the footprint and the calculated density.
    active: Vec<bool>,
}

impl<'a> DensityScorer<'a> {
    pub fn new(map: &'a DensityMap, region: &'a Region, config: &'a DensityConfig) -> Self {
        let active = vec![true; region.atoms.len()];
        Self {
            map,
            region,
            config,
            scored: scored_atoms(region, &active),
            active,
        }
    }

    /// Leaves atoms not flagged in `active` out of the score, the footprint and the calculated
    /// density.
    pub fn with_active(mut self, active: Vec<bool>) -> Self {
        self.scored = scored_atoms(self.region, &active);
        self.active = active;
        self
    }

    /// `tanh(Σ f_a ρ(x_a) / Σ f_a)` over the mobile heavy atoms (all heavy atoms when nothing
    /// moves), with `ρ` interpolated from the map.
    pub fn score(&self, conformer: &Conformer) -> Result<f64, EngineError> {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for &(i, weight) in &self.scored {
            let p = conformer.positions[i];
            let rho = self
                .map
                .interpolate(&p, self.config.boundary_mode)
                .map_err(|_| EngineError::OutOfBounds {
                    atom: self.region.atom_label(i),
                    x: p.x,
                    y: p.y,
                    z: p.z,
                })?;
            weighted += weight * rho;
            total_weight += weight;
        }
        if total_weight <= 0.0 {
            return Ok(0.0);
        }
        Ok((weighted / total_weight).tanh())
    }

    #[instrument(skip_all, name = "density_scoring", fields(region = self.region.index, conformers = conformers.len()))]
    pub fn score_all(&self, conformers: &mut [Conformer]) -> Result<(), EngineError> {
        for conformer in conformers.iter_mut() {
            conformer.score = Some(self.score(conformer)?);
        }
        Ok(())
    }

    /// Observed density on the footprint of all candidates and each candidate's calculated
    /// density on the same voxels.
    pub fn occupancy_problem(&self, conformers: &[Conformer]) -> Result<OccupancyProblem, EngineError> {
        let mask = FootprintMask::around(
            self.map,
            conformers.iter().flat_map(|c| {
                c.positions
                    .iter()
                    .zip(&self.active)
                    .filter_map(|(p, &on)| on.then_some(p))
            }),
            self.config.effective_mask_radius(),
        );
        let target = mask.extract(self.map);
        let models = conformers
            .iter()
            .map(|c| mask.render(self.map, &self.density_atoms(c), self.config.density_cutoff))
            .collect();
        debug!(voxels = mask.len(), candidates = conformers.len(), "Built occupancy problem");
        OccupancyProblem::new(models, target)
    }

    fn density_atoms(&self, conformer: &Conformer) -> Vec<DensityAtom> {
        self.region
            .atoms
            .iter()
            .zip(&conformer.positions)
            .zip(&self.active)
            .filter(|(_, on)| **on)
            .map(|((atom, &position), _)| DensityAtom {
                position,
                element: atom.element,
                b_factor: atom.b_factor,
            })
            .collect()
    }

    /// Real-space correlation between the target and the occupancy-weighted ensemble.
    pub fn ensemble_correlation(problem: &OccupancyProblem, weights: &[(usize, f64)]) -> f64 {
        let mut ensemble = vec![0.0; problem.target().len()];
        for &(i, w) in weights {
            if let Some(model) = problem.models().get(i) {
                for (e, m) in ensemble.iter_mut().zip(model) {
                    *e += w * m;
                }
            }
        }
        correlation(&ensemble, problem.target())
    }
}

/// Mobile heavy atoms, falling back to all heavy atoms and then to every atom, restricted to
/// `active`.
fn scored_atoms(region: &Region, active: &[bool]) -> Vec<(usize, f64)> {
    let heavy = |i: &usize| active[*i] && !region.atoms[*i].element.is_hydrogen();
    let mut indices: Vec<usize> = region.mobile_indices().into_iter().filter(heavy).collect();
    if indices.is_empty() {
        indices = (0..region.atoms.len()).filter(heavy).collect();
    }
    if indices.is_empty() {
        indices = (0..region.atoms.len()).filter(|&i| active[i]).collect();
    }
    indices
        .into_iter()
        .map(|i| (i, ScatteringFactors::for_element(region.atoms[i].element).weight()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::density::map::BoundaryMode;
    use crate::core::rotamers::library::RotamerLibrary;
    use crate::engine::config::SamplingConfig;
    use crate::engine::region::StructureIndex;
    use crate::engine::tasks::sampling::ConformerSampler;
    use crate::engine::test_support::{rendered_map, serine_ensemble, serine_offset, serine_system};
    use nalgebra::Vector3;

    fn setup(states: &[(f64, f64)]) -> (Region, Vec<Conformer>, DensityMap) {
        let (system, id) = serine_system(64.0);
        let index = StructureIndex::new(&system);
        let region = Region::build(0, &system, &[id], &index, 12.0);
        let library = RotamerLibrary::builtin();
        let sampling = SamplingConfig {
            neighborhood: 0.0,
            ..SamplingConfig::default()
        };
        let conformers = ConformerSampler::new(&library, &sampling)
            .sample(&region)
            .unwrap();
        let map = rendered_map([24, 24, 24], &serine_ensemble(serine_offset(), states));
        (region, conformers, map)
    }

    #[test]
    fn modelled_rotamer_scores_highest() {
        let (region, conformers, map) = setup(&[(-65.0, 1.0)]);
        let config = DensityConfig::default();
        let scorer = DensityScorer::new(&map, &region, &config);
        let scores: Vec<f64> = conformers.iter().map(|c| scorer.score(c).unwrap()).collect();
        // Candidates are 64, 178, -65.
        assert!(scores[2] > scores[0] && scores[2] > scores[1]);
        assert!(scores.iter().all(|s| (-1.0..1.0).contains(s)));
    }

    #[test]
    fn score_is_monotone_in_map_values() {
        let (region, conformers, map) = setup(&[(64.0, 1.0)]);
        let config = DensityConfig::default();
        let base = DensityScorer::new(&map, &region, &config)
            .score(&conformers[0])
            .unwrap();
        let mut previous = base;
        for shift in [0.1, 0.5, 1.0] {
            let raised = DensityMap::new(
                map.origin(),
                map.spacing(),
                map.shape(),
                map.values().iter().map(|v| v + shift).collect(),
            )
            .unwrap();
            let score = DensityScorer::new(&raised, &region, &config)
                .score(&conformers[0])
                .unwrap();
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn atoms_outside_map_fail_or_clamp() {
        let (region, mut conformers, map) = setup(&[(64.0, 1.0)]);
        for p in conformers[0].positions.iter_mut() {
            *p += Vector3::new(100.0, 0.0, 0.0);
        }
        let fail = DensityConfig::default();
        let err = DensityScorer::new(&map, &region, &fail)
            .score(&conformers[0])
            .unwrap_err();
        assert!(matches!(err, EngineError::OutOfBounds { ref atom, .. } if atom == "A:1 OG"));

        let clamp = DensityConfig {
            boundary_mode: BoundaryMode::Clamp,
            ..DensityConfig::default()
        };
        assert!(
            DensityScorer::new(&map, &region, &clamp)
                .score(&conformers[0])
                .is_ok()
        );
    }

    #[test]
    fn occupancy_problem_target_is_the_true_mixture() {
        let (region, conformers, map) = setup(&[(64.0, 0.6), (-65.0, 0.4)]);
        let config = DensityConfig::default();
        let scorer = DensityScorer::new(&map, &region, &config);
        let problem = scorer.occupancy_problem(&conformers).unwrap();
        assert_eq!(problem.len(), 3);
        for (v, t) in problem.target().iter().enumerate() {
            let mixed = 0.6 * problem.models()[0][v] + 0.4 * problem.models()[2][v];
            assert!((mixed - t).abs() < 1e-9);
        }
        let rscc = DensityScorer::ensemble_correlation(&problem, &[(0, 0.6), (2, 0.4)]);
        assert!((rscc - 1.0).abs() < 1e-9);
        assert!(DensityScorer::ensemble_correlation(&problem, &[(1, 1.0)]) < rscc);
    }

    #[test]
    fn inactive_atoms_leave_the_problem() {
        let (region, conformers, map) = setup(&[(64.0, 1.0)]);
        let config = DensityConfig::default();
        let scorer = DensityScorer::new(&map, &region, &config).with_active(region.active_atoms(0, 0));
        let problem = scorer.occupancy_problem(&conformers).unwrap();
        // Only the fixed backbone remains, which every candidate shares.
        for model in &problem.models()[1..] {
            assert_eq!(model, &problem.models()[0]);
        }
        let first = scorer.score(&conformers[0]).unwrap();
        assert!(conformers.iter().all(|c| (scorer.score(c).unwrap() - first).abs() < 1e-12));
    }
}
