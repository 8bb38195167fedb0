use crate::core::models::conformer::Conformer;
use crate::core::rotamers::library::RotamerLibrary;
use crate::core::utils::geometry::{dihedral_angle, rotate_about_bond, wrap_angle};
use crate::engine::config::SamplingConfig;
use crate::engine::error::EngineError;
use crate::engine::region::{ChiDof, Region};
use itertools::Itertools;
use nalgebra::Point3;
use rand::rngs::StdRng;
use std::ops::Range;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};

/// One build-up step: a block of consecutive chis of a single residue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingStep {
    pub slot: usize,
    pub chis: Range<usize>,
}

/// Generates candidate conformers of a region from rotamers and local chi perturbations.
///
/// Conformers are built up a block of chis at a time. [`ConformerSampler::sample`] expands every
/// block without pruning; the refinement workflow screens the survivors between blocks.
pub struct ConformerSampler<'a> {
    library: &'a RotamerLibrary,
    config: &'a SamplingConfig,
}

impl<'a> ConformerSampler<'a> {
    pub fn new(library: &'a RotamerLibrary, config: &'a SamplingConfig) -> Self {
        Self { library, config }
    }

    /// Build-up steps of the region in residue order, `dofs_per_iteration` chis at a time.
    pub fn steps(&self, region: &Region) -> Vec<SamplingStep> {
        let width = self.config.dofs_per_iteration.max(1);
        let mut steps = Vec::new();
        for (slot, residue) in region.residues.iter().enumerate() {
            let n_chis = residue.chis.len();
            let mut start = 0;
            while start < n_chis {
                let end = (start + width).min(n_chis);
                steps.push(SamplingStep { slot, chis: start..end });
                start = end;
            }
        }
        steps
    }

    /// The input coordinates, with no chi assigned yet.
    pub fn seed(&self, region: &Region) -> Conformer {
        Conformer::new(
            0,
            region.input_positions.clone(),
            vec![Vec::new(); region.residues.len()],
        )
    }

    /// Values for chis `chis` of one residue, given the values already chosen for the chis
    /// before them.
    ///
    /// Base rotamers whose leading chis lie more than the neighborhood away from `prefix` are
    /// skipped; the surviving bases are expanded by the offset grid and random perturbations.
    pub fn chi_options(
        &self,
        region: &Region,
        slot: usize,
        prefix: &[f64],
        chis: Range<usize>,
    ) -> Vec<Vec<f64>> {
        let residue = &region.residues[slot];
        let n_chis = residue.chis.len();
        if chis.is_empty() || chis.end > n_chis {
            return vec![Vec::new()];
        }

        let mut bases: Vec<&[f64]> = Vec::new();
        if self.config.include_input_conformation {
            bases.push(&residue.input_chis);
        }
        bases.extend(
            self.library
                .rotamers_for(&residue.name)
                .iter()
                .filter(|rotamer| rotamer.len() == n_chis)
                .map(Vec::as_slice),
        );
        let compatible: Vec<&[f64]> = bases
            .iter()
            .copied()
            .filter(|base| {
                prefix
                    .iter()
                    .zip(base.iter())
                    .all(|(p, b)| wrap_angle(p - b).abs() <= self.config.neighborhood + 1e-6)
            })
            .collect();
        let bases = if compatible.is_empty() { bases } else { compatible };

        let perturbed = chis
            .clone()
            .filter(|&i| i < self.config.perturbed_chis)
            .count();
        let offsets = self.offset_grid();
        let grid: Vec<Vec<f64>> = if perturbed == 0 {
            vec![Vec::new()]
        } else {
            (0..perturbed)
                .map(|_| offsets.iter().copied())
                .multi_cartesian_product()
                .collect()
        };

        let mut rng = StdRng::seed_from_u64(
            self.config
                .seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add((region.index as u64) << 20)
                .wrapping_add((chis.start as u64) << 40)
                .wrapping_add(residue.number as u64),
        );

        let mut options = Vec::with_capacity(bases.len() * (grid.len() + self.config.random_perturbations));
        for base in &bases {
            let block = &base[chis.clone()];
            for delta in &grid {
                options.push(perturb(block, delta));
            }
            for _ in 0..self.config.random_perturbations {
                let delta: Vec<f64> = (0..perturbed)
                    .map(|_| {
                        if self.config.neighborhood > 0.0 {
                            rng.gen_range(-self.config.neighborhood..=self.config.neighborhood)
                        } else {
                            0.0
                        }
                    })
                    .collect();
                options.push(perturb(block, &delta));
            }
        }
        options
    }

    /// `-neighborhood, -neighborhood + step, …, +neighborhood`.
    fn offset_grid(&self) -> Vec<f64> {
        let steps = (self.config.neighborhood / self.config.step_size + 1e-9).floor() as i64;
        (-steps..=steps)
            .map(|k| k as f64 * self.config.step_size)
            .collect()
    }

    /// Expands every parent by every option of `step`, parents outermost, then drops duplicates
    /// and re-indexes from zero.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ExhaustedBudget`] when the expansion would exceed
    /// `max_candidates`.
    #[instrument(skip_all, name = "conformer_extension", fields(region = region.index, slot = step.slot))]
    pub fn extend(
        &self,
        region: &Region,
        parents: &[Conformer],
        step: &SamplingStep,
    ) -> Result<Vec<Conformer>, EngineError> {
        let residue = &region.residues[step.slot];
        let options: Vec<Vec<Vec<f64>>> = parents
            .iter()
            .map(|parent| {
                let assigned = &parent.chis[step.slot];
                let prefix = &assigned[..step.chis.start.min(assigned.len())];
                self.chi_options(region, step.slot, prefix, step.chis.clone())
            })
            .collect();

        let requested: u128 = options.iter().map(|o| o.len() as u128).sum();
        if requested > self.config.max_candidates as u128 {
            return Err(EngineError::ExhaustedBudget {
                requested,
                limit: self.config.max_candidates,
            });
        }

        let mut raw = Vec::with_capacity(requested as usize);
        for (parent, parent_options) in parents.iter().zip(&options) {
            for values in parent_options {
                let mut positions = parent.positions.clone();
                for (dof, &target) in residue.chis[step.chis.clone()].iter().zip(values) {
                    set_chi(&mut positions, dof, target);
                }
                let mut chis = parent.chis.clone();
                chis[step.slot].truncate(step.chis.start);
                chis[step.slot].extend_from_slice(values);
                raw.push(Conformer::new(raw.len(), positions, chis));
            }
        }

        let generated = raw.len();
        let conformers = deduplicate(raw, &region.mobile_indices(), self.config.dedup_rmsd);
        debug!(
            generated,
            unique = conformers.len(),
            "Extended region conformers"
        );
        Ok(conformers)
    }

    /// All candidate conformers of the region, built up step by step without pruning.
    #[instrument(skip_all, name = "conformer_sampling", fields(region = region.index))]
    pub fn sample(&self, region: &Region) -> Result<Vec<Conformer>, EngineError> {
        self.steps(region)
            .iter()
            .try_fold(vec![self.seed(region)], |parents, step| {
                self.extend(region, &parents, step)
            })
    }
}

fn perturb(base: &[f64], delta: &[f64]) -> Vec<f64> {
    base.iter()
        .enumerate()
        .map(|(i, &chi)| wrap_angle(chi + delta.get(i).copied().unwrap_or(0.0)))
        .collect()
}

fn set_chi(positions: &mut [Point3<f64>], dof: &ChiDof, target: f64) {
    let [a, b, c, d] = dof.atoms;
    let Some(current) = dihedral_angle(&positions[a], &positions[b], &positions[c], &positions[d])
    else {
        return;
    };
    let delta = wrap_angle(target - current);
    if delta.abs() < 1e-12 {
        return;
    }
    let (axis_start, axis_end) = (positions[b], positions[c]);
    let mut moving: Vec<Point3<f64>> = dof.moving.iter().map(|&i| positions[i]).collect();
    rotate_about_bond(&mut moving, &axis_start, &axis_end, delta);
    for (&i, p) in dof.moving.iter().zip(moving) {
        positions[i] = p;
    }
}

/// Drops candidates within `threshold` RMSD of an earlier accepted one and re-indexes the rest.
fn deduplicate(candidates: Vec<Conformer>, mobile: &[usize], threshold: f64) -> Vec<Conformer> {
    let subset = (!mobile.is_empty()).then_some(mobile);
    let mut accepted: Vec<Conformer> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let duplicate = accepted.iter().any(|kept| {
            candidate
                .rmsd_to(kept, subset)
                .is_some_and(|rmsd| rmsd < threshold)
        });
        if !duplicate {
            accepted.push(candidate);
        }
    }
    for (index, conformer) in accepted.iter_mut().enumerate() {
        conformer.index = index;
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::region::StructureIndex;
    use crate::engine::test_support::{polyserine_system, serine_system};

    fn serine_region(chi1: f64) -> Region {
        let (system, id) = serine_system(chi1);
        let index = StructureIndex::new(&system);
        Region::build(0, &system, &[id], &index, 12.0)
    }

    fn og_chi(region: &Region, conformer: &Conformer) -> f64 {
        let dof = &region.residues[0].chis[0];
        let p = &conformer.positions;
        let [a, b, c, d] = dof.atoms;
        dihedral_angle(&p[a], &p[b], &p[c], &p[d]).unwrap()
    }

    fn config(neighborhood: f64) -> SamplingConfig {
        SamplingConfig {
            neighborhood,
            ..SamplingConfig::default()
        }
    }

    #[test]
    fn input_conformation_comes_first_and_duplicates_are_dropped() {
        let region = serine_region(64.0);
        let library = RotamerLibrary::builtin();
        let cfg = config(0.0);
        let conformers = ConformerSampler::new(&library, &cfg).sample(&region).unwrap();

        // Input 64 plus library 64, 178, -65; the library 64 duplicates the input.
        assert_eq!(conformers.len(), 3);
        let chis: Vec<f64> = conformers.iter().map(|c| og_chi(&region, c)).collect();
        assert!((chis[0] - 64.0).abs() < 1e-6);
        assert!((chis[1] - 178.0).abs() < 1e-6);
        assert!((chis[2] + 65.0).abs() < 1e-6);
        assert!(conformers.iter().enumerate().all(|(i, c)| c.index == i));
        assert_eq!(conformers[0].positions, region.input_positions);
    }

    #[test]
    fn only_moving_atoms_change() {
        let region = serine_region(64.0);
        let library = RotamerLibrary::builtin();
        let cfg = config(0.0);
        let conformers = ConformerSampler::new(&library, &cfg).sample(&region).unwrap();
        let mobile = region.mobile_indices();
        for conformer in &conformers {
            for (i, p) in conformer.positions.iter().enumerate() {
                if !mobile.contains(&i) {
                    assert!((p - region.input_positions[i]).norm() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn neighborhood_grid_expands_each_base() {
        let region = serine_region(64.0);
        let library = RotamerLibrary::builtin();
        let cfg = SamplingConfig {
            neighborhood: 10.0,
            step_size: 5.0,
            include_input_conformation: false,
            ..SamplingConfig::default()
        };
        let sampler = ConformerSampler::new(&library, &cfg);
        let options = sampler.chi_options(&region, 0, &[], 0..1);
        assert_eq!(options.len(), 3 * 5);
        assert_eq!(options[0], vec![54.0]);
        assert_eq!(options[4], vec![74.0]);
    }

    #[test]
    fn random_perturbations_are_seeded() {
        let region = serine_region(64.0);
        let library = RotamerLibrary::builtin();
        let cfg = SamplingConfig {
            random_perturbations: 4,
            seed: 7,
            ..config(20.0)
        };
        let sampler = ConformerSampler::new(&library, &cfg);
        let first = sampler.chi_options(&region, 0, &[], 0..1);
        let second = sampler.chi_options(&region, 0, &[], 0..1);
        assert_eq!(first, second);

        let other_seed = SamplingConfig { seed: 8, ..cfg.clone() };
        let third = ConformerSampler::new(&library, &other_seed).chi_options(&region, 0, &[], 0..1);
        assert_ne!(first, third);
    }

    #[test]
    fn oversized_search_space_exhausts_budget() {
        let region = serine_region(64.0);
        let library = RotamerLibrary::builtin();
        let cfg = SamplingConfig {
            max_candidates: 2,
            ..config(0.0)
        };
        let err = ConformerSampler::new(&library, &cfg)
            .sample(&region)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ExhaustedBudget {
                requested: 4,
                limit: 2
            }
        ));
    }

    #[test]
    fn multi_residue_regions_use_odometer_order() {
        let (system, ids) = polyserine_system(2);
        let index = StructureIndex::new(&system);
        let region = Region::build(0, &system, &ids, &index, 12.0);
        let library = RotamerLibrary::builtin();
        let cfg = config(0.0);
        let conformers = ConformerSampler::new(&library, &cfg).sample(&region).unwrap();
        // Each residue offers 64 (input), 64, 178, -65; only exact repeats collapse.
        assert_eq!(conformers.len(), 9);
        assert_eq!(conformers[0].chis[1].len(), 1);
        assert!((conformers[1].chis[1][0] - 178.0).abs() < 1e-9);
        assert!((conformers[1].chis[0][0] - 64.0).abs() < 1e-6);
    }

    #[test]
    fn build_up_steps_stay_within_one_residue() {
        let (system, ids) = polyserine_system(2);
        let index = StructureIndex::new(&system);
        let region = Region::build(0, &system, &ids, &index, 12.0);
        let library = RotamerLibrary::builtin();
        let cfg = config(0.0);
        let sampler = ConformerSampler::new(&library, &cfg);
        assert_eq!(
            sampler.steps(&region),
            vec![
                SamplingStep { slot: 0, chis: 0..1 },
                SamplingStep { slot: 1, chis: 0..1 },
            ]
        );

        let seed = sampler.seed(&region);
        let first = sampler.extend(&region, &[seed], &sampler.steps(&region)[0]).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|c| c.chis[0].len() == 1 && c.chis[1].is_empty()));
        // The second residue is untouched until its own step.
        let og = region
            .atoms
            .iter()
            .position(|a| a.residue_slot == 1 && a.name == "OG")
            .unwrap();
        assert!(first.iter().all(|c| c.positions[og] == region.input_positions[og]));
    }

    #[test]
    fn extension_budget_counts_every_parent() {
        let (system, ids) = polyserine_system(2);
        let index = StructureIndex::new(&system);
        let region = Region::build(0, &system, &ids, &index, 12.0);
        let library = RotamerLibrary::builtin();
        let cfg = SamplingConfig {
            max_candidates: 10,
            ..config(0.0)
        };
        let sampler = ConformerSampler::new(&library, &cfg);
        let steps = sampler.steps(&region);
        let parents = sampler.extend(&region, &[sampler.seed(&region)], &steps[0]).unwrap();
        let err = sampler.extend(&region, &parents, &steps[1]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ExhaustedBudget {
                requested: 12,
                limit: 10
            }
        ));
        assert!(sampler.extend(&region, &parents[..2], &steps[1]).is_ok());
    }
}
