use crate::core::models::conformer::Conformer;
use crate::engine::config::ClashConfig;
use crate::engine::region::Region;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use tracing::{debug, instrument};

/// The most severe contact found in a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClashPair {
    pub first: String,
    pub second: String,
    /// How far the pair violates its limit, in Å.
    pub overlap: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClashVerdict {
    pub index: usize,
    pub passed: bool,
    /// Sum of all violations beyond the tolerance.
    pub severity: f64,
    pub worst_pair: Option<ClashPair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub passed: Vec<Conformer>,
    pub verdicts: Vec<ClashVerdict>,
}

/// Rejects candidates with steric overlaps or distorted bonds.
///
/// Only heavy atoms are considered. Two atoms clash when
/// `scaling_factor · (r_i + r_j) − d > tolerance`; pairs within three covalent bonds are never
/// tested.
pub struct ClashFilter<'a> {
    region: &'a Region,
    config: &'a ClashConfig,
    context_tree: KdTree<f64, 3>,
    context_heavy: Vec<bool>,
    max_context_radius: f64,
    /// Region atoms taking part in the checks; all of them unless restricted.
    active: Vec<bool>,
}

impl<'a> ClashFilter<'a> {
    pub fn new(region: &'a Region, config: &'a ClashConfig) -> Self {
        let points: Vec<[f64; 3]> = region
            .context
            .iter()
            .map(|c| [c.position.x, c.position.y, c.position.z])
            .collect();
        let context_tree: KdTree<f64, 3> = (&points).into();
        let context_heavy = region
            .context
            .iter()
            .map(|c| !c.element.is_hydrogen())
            .collect();
        let max_context_radius = region
            .context
            .iter()
            .map(|c| c.element.vdw_radius())
            .fold(0.0, f64::max);
        Self {
            region,
            config,
            context_tree,
            context_heavy,
            max_context_radius,
            active: vec![true; region.atoms.len()],
        }
    }

    /// Restricts every check to the atoms flagged in `active`, indexed like the region atoms.
    pub fn with_active(mut self, active: Vec<bool>) -> Self {
        self.active = active;
        self
    }

    #[instrument(skip_all, name = "clash_filter", fields(region = self.region.index, candidates = candidates.len()))]
    pub fn filter(&self, candidates: Vec<Conformer>) -> FilterOutcome {
        let mut passed = Vec::with_capacity(candidates.len());
        let mut verdicts = Vec::with_capacity(candidates.len());
        for conformer in candidates {
            let verdict = self.check(&conformer);
            if verdict.passed {
                passed.push(conformer);
            }
            verdicts.push(verdict);
        }
        debug!(passed = passed.len(), "Clash filtering finished");
        FilterOutcome { passed, verdicts }
    }

    pub fn check(&self, conformer: &Conformer) -> ClashVerdict {
        let mut tally = Tally::default();
        let positions = &conformer.positions;
        self.check_internal(positions, &mut tally);
        self.check_context(positions, &mut tally);
        self.check_bonds(positions, &mut tally);
        ClashVerdict {
            index: conformer.index,
            passed: tally.severity == 0.0,
            severity: tally.severity,
            worst_pair: tally.worst,
        }
    }

    fn limit(&self, r_i: f64, r_j: f64) -> f64 {
        self.config.scaling_factor * (r_i + r_j)
    }

    /// Mobile atoms against every other region atom.
    fn check_internal(&self, positions: &[Point3<f64>], tally: &mut Tally) {
        let atoms = &self.region.atoms;
        let considered = |k: usize| self.active[k] && !atoms[k].element.is_hydrogen();
        for i in (0..atoms.len()).filter(|&i| atoms[i].mobile && considered(i)) {
            for j in 0..atoms.len() {
                if i == j || !considered(j) || (atoms[j].mobile && j < i) {
                    continue;
                }
                if self.region.is_excluded(i, j) {
                    continue;
                }
                let d = (positions[i] - positions[j]).norm();
                let overlap =
                    self.limit(atoms[i].element.vdw_radius(), atoms[j].element.vdw_radius()) - d;
                if overlap > self.config.tolerance {
                    tally.record(overlap - self.config.tolerance, || {
                        (self.region.atom_label(i), self.region.atom_label(j))
                    });
                }
            }
        }
    }

    /// Every region atom against the fixed context.
    fn check_context(&self, positions: &[Point3<f64>], tally: &mut Tally) {
        if self.region.context.is_empty() {
            return;
        }
        let n = self.region.atoms.len();
        for (i, atom) in self.region.atoms.iter().enumerate() {
            if !self.active[i] || atom.element.is_hydrogen() {
                continue;
            }
            let r_i = atom.element.vdw_radius();
            let reach = self.limit(r_i, self.max_context_radius);
            let p = positions[i];
            let mut hits: Vec<(usize, f64)> = self
                .context_tree
                .within_unsorted::<SquaredEuclidean>(&[p.x, p.y, p.z], reach * reach)
                .into_iter()
                .map(|hit| (hit.item as usize, hit.distance.sqrt()))
                .collect();
            hits.sort_by_key(|&(j, _)| j);
            for (j, d) in hits {
                if !self.context_heavy[j] || self.region.is_excluded(i, n + j) {
                    continue;
                }
                let context = &self.region.context[j];
                let overlap = self.limit(r_i, context.element.vdw_radius()) - d;
                if overlap > self.config.tolerance {
                    tally.record(overlap - self.config.tolerance, || {
                        (self.region.atom_label(i), context.label.clone())
                    });
                }
            }
        }
    }

    /// Bonds touching a mobile atom must keep their input length.
    fn check_bonds(&self, positions: &[Point3<f64>], tally: &mut Tally) {
        let n = self.region.atoms.len();
        let position = |k: usize| {
            if k < n {
                positions[k]
            } else {
                self.region.context[k - n].position
            }
        };
        let label = |k: usize| {
            if k < n {
                self.region.atom_label(k)
            } else {
                self.region.context[k - n].label.clone()
            }
        };
        for &(i, j, length) in &self.region.bonds {
            let touches_mobile = [i, j]
                .iter()
                .any(|&k| k < n && self.region.atoms[k].mobile);
            let settled = [i, j].iter().all(|&k| k >= n || self.active[k]);
            if !touches_mobile || !settled {
                continue;
            }
            let deviation = ((position(i) - position(j)).norm() - length).abs();
            if deviation > self.config.bond_length_tolerance {
                tally.record(deviation - self.config.bond_length_tolerance, || {
                    (label(i), label(j))
                });
            }
        }
    }
}

#[derive(Default)]
struct Tally {
    severity: f64,
    worst: Option<ClashPair>,
}

impl Tally {
    fn record(&mut self, excess: f64, names: impl FnOnce() -> (String, String)) {
        let excess = excess.max(f64::MIN_POSITIVE);
        self.severity += excess;
        if self.worst.as_ref().is_none_or(|w| excess > w.overlap) {
            let (first, second) = names();
            self.worst = Some(ClashPair {
                first,
                second,
                overlap: excess,
            });
        }
    }
}
