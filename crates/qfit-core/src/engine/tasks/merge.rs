use crate::core::models::atom::Atom;
use crate::core::models::conformer::Conformer;
use crate::core::models::system::MolecularSystem;
use crate::core::models::{AtomId, ResidueId};
use crate::core::utils::geometry::calculate_rmsd;
use crate::engine::region::Region;
use nalgebra::Point3;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// The selected conformers of one solved region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSolution {
    pub region_index: usize,
    /// Selected conformers with occupancy and score set, by ascending candidate index.
    pub conformers: Vec<Conformer>,
}

impl RegionSolution {
    /// `Σ occupancy · score` over the selected conformers.
    pub fn weighted_score(&self) -> f64 {
        self.conformers
            .iter()
            .map(|c| c.occupancy * c.score.unwrap_or(0.0))
            .sum()
    }

    pub fn total_occupancy(&self) -> f64 {
        self.conformers.iter().map(|c| c.occupancy).sum()
    }
}

/// One alternate location of a residue in the merged model.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueAlternate {
    pub altloc: char,
    pub occupancy: f64,
    pub chis: Vec<f64>,
    /// Coordinates of the residue's atoms, aligned with [`ResidueAssignment::atom_ids`].
    pub positions: Vec<Point3<f64>>,
}

/// The authoritative alternates of one refined residue.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueAssignment {
    pub residue_id: ResidueId,
    pub label: String,
    /// The region whose solution the residue took.
    pub region_index: usize,
    pub atom_ids: Vec<AtomId>,
    pub mobile: Vec<bool>,
    pub alternates: Vec<ResidueAlternate>,
}

impl ResidueAssignment {
    pub fn total_occupancy(&self) -> f64 {
        self.alternates.iter().map(|a| a.occupancy).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolutionSet {
    pub regions: Vec<RegionSolution>,
    pub residues: Vec<ResidueAssignment>,
}

impl SolutionSet {
    pub fn residue(&self, residue_id: ResidueId) -> Option<&ResidueAssignment> {
        self.residues.iter().find(|r| r.residue_id == residue_id)
    }
}

/// Reconciles solved regions into per-residue alternates.
///
/// A residue claimed by several regions takes the solution of the region with the highest
/// occupancy-weighted density score; exact ties go to the lower region index. Alternates of a
/// residue closer than `dedup_rmsd` are collapsed into one and their occupancies summed, then
/// named `A`, `B`, … by decreasing occupancy.
#[instrument(skip_all, name = "merge_regions")]
pub fn merge(regions: &[Region], solutions: Vec<RegionSolution>, dedup_rmsd: f64) -> SolutionSet {
    let by_index: HashMap<usize, &Region> = regions.iter().map(|r| (r.index, r)).collect();

    let mut owners: Vec<(ResidueId, usize, usize, f64)> = Vec::new();
    let mut ordered = solutions.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|s| s.region_index);
    for (position, solution) in ordered.iter().enumerate() {
        let Some(region) = by_index.get(&solution.region_index) else {
            continue;
        };
        let score = solution.weighted_score();
        for (slot, residue) in region.residues.iter().enumerate() {
            let claim = (residue.residue_id, position, slot, score);
            match owners.iter().position(|o| o.0 == residue.residue_id) {
                Some(k) if score > owners[k].3 => owners[k] = claim,
                Some(_) => {}
                None => owners.push(claim),
            }
        }
    }

    let mut residues = Vec::with_capacity(owners.len());
    for (_, position, slot, _) in owners {
        let solution = ordered[position];
        let Some(region) = by_index.get(&solution.region_index) else {
            continue;
        };
        residues.push(assign_residue(region, solution, slot, dedup_rmsd));
    }
    debug!(residues = residues.len(), "Merged region solutions");

    let mut regions_out = solutions;
    regions_out.sort_by_key(|s| s.region_index);
    SolutionSet {
        regions: regions_out,
        residues,
    }
}

fn assign_residue(
    region: &Region,
    solution: &RegionSolution,
    slot: usize,
    dedup_rmsd: f64,
) -> ResidueAssignment {
    let residue = &region.residues[slot];
    let range = residue.atoms.clone();
    let mobile: Vec<bool> = region.atoms[range.clone()].iter().map(|a| a.mobile).collect();
    let compared: Vec<usize> = if mobile.iter().any(|&m| m) {
        (0..mobile.len()).filter(|&k| mobile[k]).collect()
    } else {
        (0..mobile.len()).collect()
    };

    let mut alternates: Vec<ResidueAlternate> = Vec::new();
    for conformer in &solution.conformers {
        let positions = conformer.positions[range.clone()].to_vec();
        let subset = |p: &[Point3<f64>]| compared.iter().map(|&k| p[k]).collect::<Vec<_>>();
        let mine = subset(&positions);
        let existing = alternates.iter_mut().find(|alt| {
            calculate_rmsd(&subset(&alt.positions), &mine).is_some_and(|rmsd| rmsd < dedup_rmsd)
        });
        match existing {
            Some(alt) => alt.occupancy += conformer.occupancy,
            None => alternates.push(ResidueAlternate {
                altloc: ' ',
                occupancy: conformer.occupancy,
                chis: conformer.chis.get(slot).cloned().unwrap_or_default(),
                positions,
            }),
        }
    }

    // Stable sort keeps candidate order among equal occupancies.
    alternates.sort_by(|a, b| b.occupancy.total_cmp(&a.occupancy));
    for (k, alt) in alternates.iter_mut().enumerate() {
        alt.altloc = altloc_for(k);
    }

    ResidueAssignment {
        residue_id: residue.residue_id,
        label: residue.label.clone(),
        region_index: region.index,
        atom_ids: region.atoms[range].iter().map(|a| a.atom_id).collect(),
        mobile,
        alternates,
    }
}

/// `k` stays below `MAX_CARDINALITY`, which configuration validation enforces.
fn altloc_for(k: usize) -> char {
    const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    LETTERS.get(k).map_or('Z', |&b| b as char)
}

/// The multi-conformer structure: refined residues carry their alternates, everything else is
/// copied from `input`.
///
/// Atoms that no chi moves are written once without altloc, with the residue's total
/// occupancy. A residue with a single alternate is written without altlocs.
pub fn build_output_system(input: &MolecularSystem, solution: &SolutionSet) -> MolecularSystem {
    let assignments: HashMap<ResidueId, &ResidueAssignment> =
        solution.residues.iter().map(|r| (r.residue_id, r)).collect();
    let mut output = MolecularSystem::new();

    for (_, chain) in input.chains_iter() {
        let chain_id = output.add_chain(chain.id, chain.chain_type);
        for &residue_id in chain.residues() {
            let Some(residue) = input.residue(residue_id) else {
                continue;
            };
            let Some(new_residue) = output.add_residue(
                chain_id,
                residue.number,
                residue.insertion_code,
                &residue.name,
                residue.residue_type,
            ) else {
                continue;
            };

            match assignments.get(&residue_id) {
                Some(assignment) if !assignment.alternates.is_empty() => {
                    write_alternates(input, &mut output, new_residue, assignment);
                }
                _ => {
                    for &atom_id in residue.atoms() {
                        if let Some(atom) = input.atom(atom_id) {
                            output.add_atom_to_residue(new_residue, atom.clone());
                        }
                    }
                }
            }
        }
    }
    output
}

fn write_alternates(
    input: &MolecularSystem,
    output: &mut MolecularSystem,
    residue_id: ResidueId,
    assignment: &ResidueAssignment,
) {
    let total = assignment.total_occupancy();
    let single = assignment.alternates.len() == 1;
    for (k, &atom_id) in assignment.atom_ids.iter().enumerate() {
        let Some(template) = input.atom(atom_id) else {
            continue;
        };
        if !assignment.mobile[k] || single {
            let atom = Atom {
                alt_loc: None,
                occupancy: total,
                position: if single {
                    assignment.alternates[0].positions[k]
                } else {
                    template.position
                },
                ..template.clone()
            };
            output.add_atom_to_residue(residue_id, atom);
            continue;
        }
        for alt in &assignment.alternates {
            let atom = Atom {
                alt_loc: Some(alt.altloc),
                occupancy: alt.occupancy,
                position: alt.positions[k],
                ..template.clone()
            };
            output.add_atom_to_residue(residue_id, atom);
        }
    }
}
