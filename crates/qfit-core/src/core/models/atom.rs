use super::ResidueId;
use nalgebra::Point3;
use std::fmt;
use std::str::FromStr;

/// Default isotropic B-factor assigned to atoms created without one, in Å².
pub const DEFAULT_B_FACTOR: f64 = 20.0;

/// Represents the role or classification of an atom within a molecular structure.
///
/// Refinement only moves side-chain atoms; the role is used to decide which atoms are
/// candidates for torsional sampling and which belong to the fixed context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum AtomRole {
    /// Main-chain atom of an amino acid (N, CA, C, O and their hydrogens).
    Backbone,
    /// Side-chain atom of an amino acid.
    Sidechain,
    /// Atom of a small molecule or other hetero group.
    Ligand,
    /// Atom of a solvent molecule.
    Water,
    /// Unknown or unclassified atom role.
    #[default]
    Other,
}

impl FromStr for AtomRole {
    type Err = ();

    /// Parses a role name case-insensitively ("side-chain" and "side_chain" are accepted).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backbone" => Ok(AtomRole::Backbone),
            "sidechain" | "side-chain" | "side_chain" => Ok(AtomRole::Sidechain),
            "ligand" => Ok(AtomRole::Ligand),
            "water" => Ok(AtomRole::Water),
            "other" | "unknown" => Ok(AtomRole::Other),
            _ => Err(()),
        }
    }
}

/// Chemical element of an atom.
///
/// Only the elements that occur in proteins and common cofactors are distinguished; everything
/// else maps to [`Element::Other`] and receives carbon-like parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Element {
    H,
    #[default]
    C,
    N,
    O,
    P,
    S,
    Se,
    Other,
}

impl Element {
    /// Returns the element symbol as written in PDB columns 77-78.
    pub fn symbol(&self) -> &'static str {
        match self {
            Element::H => "H",
            Element::C => "C",
            Element::N => "N",
            Element::O => "O",
            Element::P => "P",
            Element::S => "S",
            Element::Se => "SE",
            Element::Other => "X",
        }
    }

    /// Van der Waals radius in Å (Bondi).
    pub fn vdw_radius(&self) -> f64 {
        match self {
            Element::H => 1.20,
            Element::C => 1.70,
            Element::N => 1.55,
            Element::O => 1.52,
            Element::P => 1.80,
            Element::S => 1.80,
            Element::Se => 1.90,
            Element::Other => 1.70,
        }
    }

    /// Single-bond covalent radius in Å, used to infer connectivity from coordinates.
    pub fn covalent_radius(&self) -> f64 {
        match self {
            Element::H => 0.31,
            Element::C => 0.76,
            Element::N => 0.71,
            Element::O => 0.66,
            Element::P => 1.07,
            Element::S => 1.05,
            Element::Se => 1.20,
            Element::Other => 0.77,
        }
    }

    pub fn is_hydrogen(&self) -> bool {
        matches!(self, Element::H)
    }

    /// Guesses the element from a PDB atom name when the element columns are blank.
    ///
    /// The first alphabetic character decides, except for selenium ("SE") which is the only
    /// two-letter element recognised.
    pub fn from_atom_name(name: &str) -> Self {
        let trimmed = name.trim_start_matches(|c: char| c.is_ascii_digit());
        if trimmed.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("SE")) {
            return Element::Se;
        }
        match trimmed.chars().next() {
            Some(c) => Element::from_str(&c.to_string()).unwrap_or(Element::Other),
            None => Element::Other,
        }
    }
}

impl FromStr for Element {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "H" | "D" => Ok(Element::H),
            "C" => Ok(Element::C),
            "N" => Ok(Element::N),
            "O" => Ok(Element::O),
            "P" => Ok(Element::P),
            "S" => Ok(Element::S),
            "SE" => Ok(Element::Se),
            "" => Err(()),
            _ => Ok(Element::Other),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Represents an atom in a molecular structure.
///
/// Besides identity and coordinates, an atom carries the crystallographic quantities the
/// refinement reads and writes: B-factor, occupancy and alternate-location indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Serial number from the source file; reassigned on output.
    pub serial: usize,
    /// The name of the atom (e.g., "CA", "CB", "OG1").
    pub name: String,
    /// The ID of the parent residue this atom belongs to.
    pub residue_id: ResidueId,
    /// Chemical element.
    pub element: Element,
    /// The role or classification of the atom in the molecular structure.
    pub role: AtomRole,
    /// The 3D coordinates of the atom in Angstroms.
    pub position: Point3<f64>,
    /// Isotropic displacement parameter in Å².
    pub b_factor: f64,
    /// Fractional occupancy in `[0, 1]`.
    pub occupancy: f64,
    /// Alternate-location indicator, `None` for atoms present in every conformer.
    pub alt_loc: Option<char>,
}

impl Atom {
    /// Creates a new `Atom` with the element guessed from its name, full occupancy and the
    /// default B-factor. Other fields can be modified afterwards.
    pub fn new(name: &str, residue_id: ResidueId, position: Point3<f64>) -> Self {
        Self {
            serial: 0,
            name: name.to_string(),
            residue_id,
            element: Element::from_atom_name(name),
            role: AtomRole::default(),
            position,
            b_factor: DEFAULT_B_FACTOR,
            occupancy: 1.0,
            alt_loc: None,
        }
    }

    pub fn is_heavy(&self) -> bool {
        !self.element.is_hydrogen()
    }

    /// Whether this atom belongs to the primary conformer (no altloc, or altloc `A`).
    pub fn is_primary(&self) -> bool {
        matches!(self.alt_loc, None | Some('A'))
    }
}
