//! Synthetic structures and maps shared by the engine and workflow tests.

use crate::core::density::map::DensityMap;
use crate::core::density::model::DensityAtom;
use crate::core::density::scattering::ScatteringFactors;
use crate::core::models::atom::{Atom, AtomRole, Element};
use crate::core::models::chain::ChainType;
use crate::core::models::residue::AminoAcidType;
use crate::core::models::system::MolecularSystem;
use crate::core::models::ResidueId;
use nalgebra::{Point3, Vector3};

pub const MAP_SPACING: f64 = 0.5;
pub const RENDER_CUTOFF: f64 = 3.0;

/// Places `d` so that `|cd| = bond`, angle `b-c-d = angle` and dihedral `a-b-c-d = torsion`.
pub fn place_atom(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    bond: f64,
    angle: f64,
    torsion: f64,
) -> Point3<f64> {
    let (angle, torsion) = (angle.to_radians(), torsion.to_radians());
    let bc = (c - b).normalize();
    let n = (b - a).cross(&bc).normalize();
    let m = n.cross(&bc);
    let local = Vector3::new(
        -bond * angle.cos(),
        bond * angle.sin() * torsion.cos(),
        bond * angle.sin() * torsion.sin(),
    );
    c + bc * local.x + m * local.y + n * local.z
}

/// Serine heavy atoms with the given chi1, translated by `offset`.
pub fn serine_atoms(offset: Vector3<f64>, chi1: f64) -> Vec<(&'static str, Point3<f64>)> {
    let n = Point3::new(0.0, 0.0, 0.0);
    let ca = Point3::new(1.458, 0.0, 0.0);
    let theta = 111.0_f64.to_radians();
    let c = ca + Vector3::new(-theta.cos(), theta.sin(), 0.0) * 1.525;
    let o = place_atom(&n, &ca, &c, 1.231, 120.5, 180.0);
    let cb = place_atom(&c, &n, &ca, 1.53, 110.5, -122.5);
    let og = place_atom(&n, &ca, &cb, 1.417, 111.0, chi1);
    [("N", n), ("CA", ca), ("C", c), ("O", o), ("CB", cb), ("OG", og)]
        .into_iter()
        .map(|(name, p)| (name, p + offset))
        .collect()
}

pub fn add_serine(
    system: &mut MolecularSystem,
    chain: char,
    number: isize,
    offset: Vector3<f64>,
    chi1: f64,
) -> ResidueId {
    let chain_id = system.add_chain(chain, ChainType::Protein);
    let residue_id = system
        .add_residue(chain_id, number, None, "SER", Some(AminoAcidType::Serine))
        .unwrap();
    for (name, position) in serine_atoms(offset, chi1) {
        let mut atom = Atom::new(name, residue_id, position);
        atom.role = if matches!(name, "N" | "CA" | "C" | "O") {
            AtomRole::Backbone
        } else {
            AtomRole::Sidechain
        };
        system.add_atom_to_residue(residue_id, atom).unwrap();
    }
    residue_id
}

pub fn add_water(system: &mut MolecularSystem, chain: char, number: isize, position: Point3<f64>) {
    let chain_id = system.add_chain(chain, ChainType::Water);
    let residue_id = system
        .add_residue(chain_id, number, None, "HOH", None)
        .unwrap();
    let mut atom = Atom::new("O", residue_id, position);
    atom.role = AtomRole::Water;
    system.add_atom_to_residue(residue_id, atom).unwrap();
}

/// Origin of the serine used by the single-residue fixtures, centered in a 24³ map.
pub fn serine_offset() -> Vector3<f64> {
    Vector3::new(4.5, 5.5, 6.5)
}

pub fn serine_system(chi1: f64) -> (MolecularSystem, ResidueId) {
    let mut system = MolecularSystem::new();
    let id = add_serine(&mut system, 'A', 1, serine_offset(), chi1);
    (system, id)
}

/// Serines on chains `A` and `B`, the second shifted by `separation` Å along x.
pub fn two_serine_system(separation: f64) -> (MolecularSystem, ResidueId, ResidueId) {
    let mut system = MolecularSystem::new();
    let first = add_serine(&mut system, 'A', 1, serine_offset(), 64.0);
    let second = add_serine(
        &mut system,
        'B',
        1,
        serine_offset() + Vector3::new(separation, 0.0, 0.0),
        64.0,
    );
    (system, first, second)
}

/// Offset of the `i`-th serine of [`polyserine_system`].
pub fn polyserine_offset(i: usize) -> Vector3<f64> {
    serine_offset() + Vector3::new(10.0 * i as f64, 0.0, 0.0)
}

/// `n` unbonded serines on chain `A`, numbered from 1 and spaced 10 Å apart along x.
pub fn polyserine_system(n: usize) -> (MolecularSystem, Vec<ResidueId>) {
    let mut system = MolecularSystem::new();
    let ids = (0..n)
        .map(|i| add_serine(&mut system, 'A', i as isize + 1, polyserine_offset(i), 64.0))
        .collect();
    (system, ids)
}

/// Density atoms of a serine whose OG is split over `(chi1, occupancy)` states; the other
/// atoms have full occupancy.
pub fn serine_ensemble(offset: Vector3<f64>, states: &[(f64, f64)]) -> Vec<(DensityAtom, f64)> {
    let mut atoms = Vec::new();
    for (k, &(chi1, occupancy)) in states.iter().enumerate() {
        for (name, position) in serine_atoms(offset, chi1) {
            let shared = name != "OG";
            if shared && k > 0 {
                continue;
            }
            let weight = if shared { 1.0 } else { occupancy };
            atoms.push((
                DensityAtom {
                    position,
                    element: Element::from_atom_name(name),
                    b_factor: 20.0,
                },
                weight,
            ));
        }
    }
    atoms
}

/// Map of `shape` voxels at [`MAP_SPACING`] from the origin, rendered from weighted atoms
/// exactly as the scorer renders model density.
pub fn rendered_map(shape: [usize; 3], atoms: &[(DensityAtom, f64)]) -> DensityMap {
    let empty = DensityMap::new(
        [0.0; 3],
        [MAP_SPACING; 3],
        shape,
        vec![0.0; shape[0] * shape[1] * shape[2]],
    )
    .unwrap();
    let mut values = vec![0.0; empty.len()];
    for (atom, weight) in atoms {
        let factors = ScatteringFactors::for_element(atom.element);
        for flat in empty.voxels_within(&atom.position, RENDER_CUTOFF) {
            let r2 = (empty.position_of(flat) - atom.position).norm_squared();
            values[flat] += weight * factors.density(r2, atom.b_factor);
        }
    }
    DensityMap::new([0.0; 3], [MAP_SPACING; 3], shape, values).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::geometry::dihedral_angle;

    #[test]
    fn placed_atoms_reproduce_requested_torsion() {
        for chi in [-65.0, 64.0, 178.0] {
            let atoms = serine_atoms(Vector3::zeros(), chi);
            let p = |name: &str| atoms.iter().find(|(n, _)| *n == name).unwrap().1;
            let measured = dihedral_angle(&p("N"), &p("CA"), &p("CB"), &p("OG")).unwrap();
            assert!((measured - chi).abs() < 1e-9);
            assert!(((p("OG") - p("CB")).norm() - 1.417).abs() < 1e-9);
        }
    }
}
