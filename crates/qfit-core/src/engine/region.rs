use super::config::{PartitionConfig, ResidueSelection, ResidueSpecifier};
use crate::core::models::atom::{AtomRole, Element};
use crate::core::models::system::MolecularSystem;
use crate::core::models::{AtomId, ResidueId};
use crate::core::rotamers::chi::chi_atoms;
use crate::core::utils::geometry::dihedral_angle;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use tracing::{debug, warn};

/// Slack (Å) added to the sum of covalent radii when inferring bonds from coordinates.
pub const BOND_TOLERANCE: f64 = 0.45;
/// Pairs separated by this many bonds or fewer are never tested for clashes.
pub const EXCLUDED_BOND_SEPARATION: usize = 3;
const MIN_BOND_DISTANCE: f64 = 0.4;

/// An atom of the region being refined, in region order.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionAtom {
    pub atom_id: AtomId,
    pub name: String,
    /// Index into [`Region::residues`].
    pub residue_slot: usize,
    pub element: Element,
    pub b_factor: f64,
    /// Whether any chi rotation moves this atom.
    pub mobile: bool,
}

/// One torsional degree of freedom: the four defining atoms and the atoms it rotates, all as
/// region atom indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ChiDof {
    pub atoms: [usize; 4],
    pub moving: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionResidue {
    pub residue_id: ResidueId,
    pub name: String,
    pub label: String,
    pub number: isize,
    pub atoms: Range<usize>,
    pub chis: Vec<ChiDof>,
    /// Chi angles of the input coordinates, one per entry of `chis`.
    pub input_chis: Vec<f64>,
}

/// A fixed atom of the surrounding structure.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextAtom {
    pub atom_id: AtomId,
    /// Residue label and atom name, e.g. `A:43 CB`.
    pub label: String,
    pub position: Point3<f64>,
    pub element: Element,
}

/// A window of consecutive residues refined together, plus everything needed to sample,
/// filter and score its conformers without touching the rest of the structure.
#[derive(Debug, Clone)]
pub struct Region {
    pub index: usize,
    pub residues: Vec<RegionResidue>,
    pub atoms: Vec<RegionAtom>,
    pub input_positions: Vec<Point3<f64>>,
    pub context: Vec<ContextAtom>,
    /// Inferred covalent bonds over region atoms (`0..n`) and context atoms (`n..n+m`), with
    /// their input length.
    pub bonds: Vec<(usize, usize, f64)>,
    excluded: HashSet<(usize, usize)>,
}

impl Region {
    /// Builds the region for `residue_ids`, taking context atoms from `index`.
    pub fn build(
        index: usize,
        system: &MolecularSystem,
        residue_ids: &[ResidueId],
        structure: &StructureIndex,
        context_margin: f64,
    ) -> Self {
        let mut atoms = Vec::new();
        let mut input_positions = Vec::new();
        let mut residues = Vec::with_capacity(residue_ids.len());

        for (slot, &residue_id) in residue_ids.iter().enumerate() {
            let Some(residue) = system.residue(residue_id) else {
                continue;
            };
            let start = atoms.len();
            for atom_id in system.primary_atoms_of(residue_id) {
                if let Some(atom) = system.atom(atom_id) {
                    atoms.push(RegionAtom {
                        atom_id,
                        name: atom.name.clone(),
                        residue_slot: slot,
                        element: atom.element,
                        b_factor: atom.b_factor,
                        mobile: false,
                    });
                    input_positions.push(atom.position);
                }
            }
            residues.push(RegionResidue {
                residue_id,
                name: residue.name.clone(),
                label: system.residue_label(residue_id),
                number: residue.number,
                atoms: start..atoms.len(),
                chis: Vec::new(),
                input_chis: Vec::new(),
            });
        }

        let region_ids: HashSet<AtomId> = atoms.iter().map(|a| a.atom_id).collect();
        let context = structure.context_for(&input_positions, &region_ids, context_margin);

        let mut all_positions = input_positions.clone();
        all_positions.extend(context.iter().map(|c| c.position));
        let mut all_elements: Vec<Element> = atoms.iter().map(|a| a.element).collect();
        all_elements.extend(context.iter().map(|c| c.element));

        let bonds = infer_bonds(&all_positions, &all_elements);
        let adjacency = adjacency_list(all_positions.len(), &bonds);
        let excluded = excluded_pairs(atoms.len(), &adjacency, EXCLUDED_BOND_SEPARATION);

        let mut region = Self {
            index,
            residues,
            atoms,
            input_positions,
            context,
            bonds,
            excluded,
        };
        region.assign_chis(system, &adjacency);
        debug!(
            region = index,
            atoms = region.atoms.len(),
            context = region.context.len(),
            "Built region"
        );
        region
    }

    fn assign_chis(&mut self, system: &MolecularSystem, adjacency: &[Vec<usize>]) {
        for slot in 0..self.residues.len() {
            let residue = &self.residues[slot];
            let range = residue.atoms.clone();
            let names: HashMap<&str, usize> = range
                .clone()
                .rev()
                .map(|i| (self.atoms[i].name.as_str(), i))
                .collect();

            let mut chis = Vec::new();
            let mut input_chis = Vec::new();
            let mut complete = true;
            for quad in chi_atoms(&residue.name) {
                let resolved: Option<Vec<usize>> =
                    quad.iter().map(|n| names.get(n).copied()).collect();
                let Some(idx) = resolved else {
                    warn!(
                        residue = %residue.label,
                        chi = ?quad,
                        "Missing chi atoms, residue keeps its input conformation"
                    );
                    complete = false;
                    break;
                };
                let quad_idx = [idx[0], idx[1], idx[2], idx[3]];
                let Some(moving) =
                    moving_atoms(system, &self.atoms, adjacency, &range, quad_idx)
                else {
                    warn!(residue = %residue.label, chi = ?quad, "Chi rotation is not a tree, residue kept fixed");
                    complete = false;
                    break;
                };
                let p = &self.input_positions;
                let Some(angle) =
                    dihedral_angle(&p[idx[0]], &p[idx[1]], &p[idx[2]], &p[idx[3]])
                else {
                    warn!(residue = %residue.label, chi = ?quad, "Degenerate chi geometry, residue kept fixed");
                    complete = false;
                    break;
                };
                chis.push(ChiDof {
                    atoms: quad_idx,
                    moving,
                });
                input_chis.push(angle);
            }
            if !complete {
                continue;
            }
            for chi in &chis {
                for &i in &chi.moving {
                    self.atoms[i].mobile = true;
                }
            }
            let residue = &mut self.residues[slot];
            residue.chis = chis;
            residue.input_chis = input_chis;
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn mobile_indices(&self) -> Vec<usize> {
        (0..self.atoms.len()).filter(|&i| self.atoms[i].mobile).collect()
    }

    /// Atoms whose placement is settled once chis `0..built` of residue `slot` (and every chi of
    /// the residues before it) are assigned.
    ///
    /// Fixed atoms are always active. Side chains of later residues, and the atoms moved by chi
    /// `built` of `slot`, are not.
    pub fn active_atoms(&self, slot: usize, built: usize) -> Vec<bool> {
        let mut active: Vec<bool> = self
            .atoms
            .iter()
            .map(|atom| !atom.mobile || atom.residue_slot <= slot)
            .collect();
        if let Some(next) = self.residues.get(slot).and_then(|r| r.chis.get(built)) {
            for &i in &next.moving {
                active[i] = false;
            }
        }
        active
    }

    /// Whether two atoms (combined region/context indexing) are within three bonds.
    pub fn is_excluded(&self, i: usize, j: usize) -> bool {
        self.excluded.contains(&(i.min(j), i.max(j)))
    }

    /// Residue label and atom name of a region atom, e.g. `A:42 OG`.
    pub fn atom_label(&self, index: usize) -> String {
        let atom = &self.atoms[index];
        format!("{} {}", self.residues[atom.residue_slot].label, atom.name)
    }
}

/// Atoms that rotate with chi `a-b-c-d`: everything reachable from `c` without crossing `b`,
/// limited to the residue's own atoms. `None` when the walk closes a ring back onto the
/// main chain.
fn moving_atoms(
    system: &MolecularSystem,
    atoms: &[RegionAtom],
    adjacency: &[Vec<usize>],
    residue_range: &Range<usize>,
    quad: [usize; 4],
) -> Option<Vec<usize>> {
    let [a, b, c, _] = quad;
    let mut visited = HashSet::from([c]);
    let mut queue = VecDeque::from([c]);
    while let Some(current) = queue.pop_front() {
        for &next in &adjacency[current] {
            if next == b || !residue_range.contains(&next) || !visited.insert(next) {
                continue;
            }
            let is_backbone = system
                .atom(atoms[next].atom_id)
                .is_some_and(|atom| atom.role == AtomRole::Backbone);
            if next == a || is_backbone {
                return None;
            }
            queue.push_back(next);
        }
    }
    let mut moving: Vec<usize> = visited.into_iter().filter(|&i| i != c).collect();
    moving.sort_unstable();
    Some(moving)
}

/// Bonds between atoms closer than the sum of their covalent radii plus a tolerance.
pub fn infer_bonds(positions: &[Point3<f64>], elements: &[Element]) -> Vec<(usize, usize, f64)> {
    if positions.is_empty() {
        return Vec::new();
    }
    let points: Vec<[f64; 3]> = positions.iter().map(|p| [p.x, p.y, p.z]).collect();
    let tree: KdTree<f64, 3> = (&points).into();
    let max_radius = elements
        .iter()
        .map(|e| e.covalent_radius())
        .fold(0.0, f64::max);
    let search = 2.0 * max_radius + BOND_TOLERANCE;

    let mut bonds = Vec::new();
    for (i, query) in points.iter().enumerate() {
        let mut neighbours: Vec<(usize, f64)> = tree
            .within_unsorted::<SquaredEuclidean>(query, search * search)
            .into_iter()
            .map(|n| (n.item as usize, n.distance.sqrt()))
            .filter(|&(j, _)| j > i)
            .collect();
        neighbours.sort_by_key(|&(j, _)| j);
        for (j, d) in neighbours {
            let limit = elements[i].covalent_radius() + elements[j].covalent_radius() + BOND_TOLERANCE;
            if d > MIN_BOND_DISTANCE && d <= limit {
                bonds.push((i, j, d));
            }
        }
    }
    bonds
}

fn adjacency_list(n: usize, bonds: &[(usize, usize, f64)]) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); n];
    for &(i, j, _) in bonds {
        adjacency[i].push(j);
        adjacency[j].push(i);
    }
    adjacency
}

/// Pairs `(i, j)`, `i < j`, with at least one region atom (`i < n_region`) separated by at
/// most `depth` bonds.
fn excluded_pairs(
    n_region: usize,
    adjacency: &[Vec<usize>],
    depth: usize,
) -> HashSet<(usize, usize)> {
    let mut pairs = HashSet::new();
    for start in 0..n_region {
        let mut seen = HashMap::from([(start, 0usize)]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            let dist = seen[&current];
            if dist == depth {
                continue;
            }
            for &next in &adjacency[current] {
                if !seen.contains_key(&next) {
                    seen.insert(next, dist + 1);
                    queue.push_back(next);
                }
            }
        }
        for (&other, _) in seen.iter().filter(|(o, _)| **o != start) {
            pairs.insert((start.min(other), start.max(other)));
        }
    }
    pairs
}

/// Spatial index over the primary-conformer atoms of the whole structure.
pub struct StructureIndex {
    atom_ids: Vec<AtomId>,
    labels: Vec<String>,
    positions: Vec<Point3<f64>>,
    elements: Vec<Element>,
    tree: KdTree<f64, 3>,
}

impl StructureIndex {
    pub fn new(system: &MolecularSystem) -> Self {
        let mut atom_ids = Vec::new();
        let mut labels = Vec::new();
        let mut positions = Vec::new();
        let mut elements = Vec::new();
        for id in system.primary_atom_ids() {
            if let Some(atom) = system.atom(id) {
                atom_ids.push(id);
                labels.push(format!("{} {}", system.residue_label(atom.residue_id), atom.name));
                positions.push(atom.position);
                elements.push(atom.element);
            }
        }
        let points: Vec<[f64; 3]> = positions.iter().map(|p| [p.x, p.y, p.z]).collect();
        let tree: KdTree<f64, 3> = (&points).into();
        Self {
            atom_ids,
            labels,
            positions,
            elements,
            tree,
        }
    }

    /// Atoms not in `exclude` within `margin` of any of `around`, in structure order.
    pub fn context_for(
        &self,
        around: &[Point3<f64>],
        exclude: &HashSet<AtomId>,
        margin: f64,
    ) -> Vec<ContextAtom> {
        let mut found = HashSet::new();
        for p in around {
            for n in self
                .tree
                .within_unsorted::<SquaredEuclidean>(&[p.x, p.y, p.z], margin * margin)
            {
                found.insert(n.item as usize);
            }
        }
        let mut indices: Vec<usize> = found
            .into_iter()
            .filter(|&i| i < self.atom_ids.len() && !exclude.contains(&self.atom_ids[i]))
            .collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|i| ContextAtom {
                atom_id: self.atom_ids[i],
                label: self.labels[i].clone(),
                position: self.positions[i],
                element: self.elements[i],
            })
            .collect()
    }
}

/// Splits the selected amino-acid residues of every chain into windows of
/// `region_size` residues with stride `region_size - overlap`; the last window of a chain is
/// aligned to the chain end.
pub fn partition(
    system: &MolecularSystem,
    selection: &ResidueSelection,
    config: &PartitionConfig,
) -> Vec<Vec<ResidueId>> {
    let size = config.region_size.max(1);
    let stride = size.saturating_sub(config.overlap).max(1);
    let mut regions = Vec::new();

    for (_, chain) in system.chains_iter() {
        let selected: Vec<ResidueId> = chain
            .residues()
            .iter()
            .copied()
            .filter(|&id| {
                system.residue(id).is_some_and(|r| {
                    r.residue_type.is_some()
                        && selection.contains(&ResidueSpecifier {
                            chain_id: chain.id,
                            residue_number: r.number,
                        })
                })
            })
            .collect();
        let n = selected.len();
        if n == 0 {
            continue;
        }
        if n <= size {
            regions.push(selected);
            continue;
        }
        let mut start = 0;
        loop {
            if start + size >= n {
                let last = n - size;
                regions.push(selected[last..].to_vec());
                break;
            }
            regions.push(selected[start..start + size].to_vec());
            start += stride;
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{serine_system, two_serine_system};

    #[test]
    fn serine_region_has_one_chi_moving_og() {
        let (system, residue_id) = serine_system(64.0);
        let index = StructureIndex::new(&system);
        let region = Region::build(0, &system, &[residue_id], &index, 12.0);

        assert_eq!(region.residues.len(), 1);
        let residue = &region.residues[0];
        assert_eq!(residue.chis.len(), 1);
        assert!((residue.input_chis[0] - 64.0).abs() < 1e-6);

        let mobile: Vec<&str> = region
            .mobile_indices()
            .iter()
            .map(|&i| region.atoms[i].name.as_str())
            .collect();
        assert_eq!(mobile, vec!["OG"]);
        assert!(region.context.is_empty());
    }

    #[test]
    fn exclusions_cover_three_bonds() {
        let (system, residue_id) = serine_system(64.0);
        let index = StructureIndex::new(&system);
        let region = Region::build(0, &system, &[residue_id], &index, 12.0);
        let idx = |name: &str| region.atoms.iter().position(|a| a.name == name).unwrap();

        assert!(region.is_excluded(idx("OG"), idx("CB")));
        assert!(region.is_excluded(idx("OG"), idx("CA")));
        assert!(region.is_excluded(idx("N"), idx("OG")));
        assert!(region.is_excluded(idx("OG"), idx("C")));
        assert!(!region.is_excluded(idx("OG"), idx("O")));
    }

    #[test]
    fn context_contains_other_residues_only() {
        let (system, first, second) = two_serine_system(10.0);
        let index = StructureIndex::new(&system);
        let region = Region::build(0, &system, &[first], &index, 12.0);
        let second_atoms: HashSet<AtomId> =
            system.primary_atoms_of(second).into_iter().collect();
        assert!(!region.context.is_empty());
        assert!(region.context.iter().all(|c| second_atoms.contains(&c.atom_id)));

        let narrow = Region::build(0, &system, &[first], &index, 2.0);
        assert!(narrow.context.is_empty());
    }

    #[test]
    fn side_chains_ahead_of_the_build_up_are_inactive() {
        let (system, ids) = crate::engine::test_support::polyserine_system(2);
        let index = StructureIndex::new(&system);
        let region = Region::build(0, &system, &ids, &index, 12.0);
        let find = |slot: usize, name: &str| {
            region
                .atoms
                .iter()
                .position(|a| a.residue_slot == slot && a.name == name)
                .unwrap()
        };

        let before = region.active_atoms(0, 0);
        assert!(!before[find(0, "OG")]);
        assert!(before[find(0, "CB")]);
        assert!(!before[find(1, "OG")]);
        assert!(before[find(1, "CA")]);

        let first_done = region.active_atoms(0, 1);
        assert!(first_done[find(0, "OG")]);
        assert!(!first_done[find(1, "OG")]);

        let all_done = region.active_atoms(1, 1);
        assert!(all_done.iter().all(|&a| a));
    }

    #[test]
    fn bonds_are_inferred_from_covalent_radii() {
        let positions = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.53, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
        ];
        let elements = [Element::C, Element::C, Element::O];
        let bonds = infer_bonds(&positions, &elements);
        assert_eq!(bonds.len(), 1);
        assert_eq!((bonds[0].0, bonds[0].1), (0, 1));
    }

    #[test]
    fn partition_windows_align_last_region_to_chain_end() {
        let (system, ids) = crate::engine::test_support::polyserine_system(5);
        let windows = partition(
            &system,
            &ResidueSelection::All,
            &PartitionConfig {
                region_size: 2,
                overlap: 0,
            },
        );
        assert_eq!(
            windows,
            vec![
                vec![ids[0], ids[1]],
                vec![ids[2], ids[3]],
                vec![ids[3], ids[4]]
            ]
        );

        let overlapping = partition(
            &system,
            &ResidueSelection::All,
            &PartitionConfig {
                region_size: 3,
                overlap: 1,
            },
        );
        assert_eq!(
            overlapping,
            vec![vec![ids[0], ids[1], ids[2]], vec![ids[2], ids[3], ids[4]]]
        );

        let singles = partition(&system, &ResidueSelection::All, &PartitionConfig::default());
        assert_eq!(singles.len(), 5);
    }

    #[test]
    fn partition_respects_selection() {
        let (system, ids) = crate::engine::test_support::polyserine_system(3);
        let selection = ResidueSelection::List {
            include: vec![],
            exclude: vec![ResidueSpecifier {
                chain_id: 'A',
                residue_number: 2,
            }],
        };
        let windows = partition(&system, &selection, &PartitionConfig::default());
        assert_eq!(windows, vec![vec![ids[0]], vec![ids[2]]]);
    }
}
