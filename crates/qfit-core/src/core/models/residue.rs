use super::{AtomId, ChainId};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The twenty standard amino acids plus selenomethionine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AminoAcidType {
    Alanine,
    Arginine,
    Asparagine,
    AsparticAcid,
    Cysteine,
    Glutamine,
    GlutamicAcid,
    Glycine,
    Histidine,
    Isoleucine,
    Leucine,
    Lysine,
    Methionine,
    Selenomethionine,
    Phenylalanine,
    Proline,
    Serine,
    Threonine,
    Tryptophan,
    Tyrosine,
    Valine,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown amino acid residue name: '{0}'")]
pub struct ParseAminoAcidError(pub String);

impl AminoAcidType {
    pub fn to_three_letter(&self) -> &'static str {
        match self {
            AminoAcidType::Alanine => "ALA",
            AminoAcidType::Arginine => "ARG",
            AminoAcidType::Asparagine => "ASN",
            AminoAcidType::AsparticAcid => "ASP",
            AminoAcidType::Cysteine => "CYS",
            AminoAcidType::Glutamine => "GLN",
            AminoAcidType::GlutamicAcid => "GLU",
            AminoAcidType::Glycine => "GLY",
            AminoAcidType::Histidine => "HIS",
            AminoAcidType::Isoleucine => "ILE",
            AminoAcidType::Leucine => "LEU",
            AminoAcidType::Lysine => "LYS",
            AminoAcidType::Methionine => "MET",
            AminoAcidType::Selenomethionine => "MSE",
            AminoAcidType::Phenylalanine => "PHE",
            AminoAcidType::Proline => "PRO",
            AminoAcidType::Serine => "SER",
            AminoAcidType::Threonine => "THR",
            AminoAcidType::Tryptophan => "TRP",
            AminoAcidType::Tyrosine => "TYR",
            AminoAcidType::Valine => "VAL",
        }
    }
}

impl FromStr for AminoAcidType {
    type Err = ParseAminoAcidError;

    /// Parses a three-letter residue name. Common protonation-state variants of histidine
    /// (HSD, HSE, HSP, HID, HIE, HIP) all map to [`AminoAcidType::Histidine`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALA" => Ok(AminoAcidType::Alanine),
            "ARG" => Ok(AminoAcidType::Arginine),
            "ASN" => Ok(AminoAcidType::Asparagine),
            "ASP" => Ok(AminoAcidType::AsparticAcid),
            "CYS" => Ok(AminoAcidType::Cysteine),
            "GLN" => Ok(AminoAcidType::Glutamine),
            "GLU" => Ok(AminoAcidType::GlutamicAcid),
            "GLY" => Ok(AminoAcidType::Glycine),
            "HIS" | "HSD" | "HSE" | "HSP" | "HID" | "HIE" | "HIP" => Ok(AminoAcidType::Histidine),
            "ILE" => Ok(AminoAcidType::Isoleucine),
            "LEU" => Ok(AminoAcidType::Leucine),
            "LYS" => Ok(AminoAcidType::Lysine),
            "MET" => Ok(AminoAcidType::Methionine),
            "MSE" => Ok(AminoAcidType::Selenomethionine),
            "PHE" => Ok(AminoAcidType::Phenylalanine),
            "PRO" => Ok(AminoAcidType::Proline),
            "SER" => Ok(AminoAcidType::Serine),
            "THR" => Ok(AminoAcidType::Threonine),
            "TRP" => Ok(AminoAcidType::Tryptophan),
            "TYR" => Ok(AminoAcidType::Tyrosine),
            "VAL" => Ok(AminoAcidType::Valine),
            other => Err(ParseAminoAcidError(other.to_string())),
        }
    }
}

impl fmt::Display for AminoAcidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_three_letter())
    }
}

/// Atom names of the amino-acid main chain; everything else in an amino acid is side chain.
pub const BACKBONE_ATOM_NAMES: &[&str] = &["N", "CA", "C", "O", "OXT", "H", "HA", "HA2", "HA3"];

pub fn is_backbone_atom_name(name: &str) -> bool {
    BACKBONE_ATOM_NAMES.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub number: isize,                   // Residue sequence number from source file
    pub insertion_code: Option<char>,    // PDB insertion code
    pub name: String,                    // Residue name (e.g., "SER", "HOH")
    pub chain_id: ChainId,               // ID of the parent chain
    pub residue_type: Option<AminoAcidType>,
    pub(crate) atoms: Vec<AtomId>,       // Atoms in file order, all altlocs included
    atom_name_map: HashMap<(String, Option<char>), AtomId>,
}

impl Residue {
    pub(crate) fn new(
        number: isize,
        name: &str,
        chain_id: ChainId,
        residue_type: Option<AminoAcidType>,
    ) -> Self {
        Self {
            number,
            insertion_code: None,
            name: name.to_string(),
            chain_id,
            residue_type,
            atoms: Vec::new(),
            atom_name_map: HashMap::new(),
        }
    }

    pub(crate) fn add_atom(&mut self, atom_name: &str, alt_loc: Option<char>, atom_id: AtomId) {
        self.atoms.push(atom_id);
        self.atom_name_map
            .insert((atom_name.to_string(), alt_loc), atom_id);
    }

    pub fn atoms(&self) -> &[AtomId] {
        &self.atoms
    }

    /// Looks up an atom by name, preferring the shared (no altloc) copy, then altloc `A`.
    pub fn get_atom_id_by_name(&self, name: &str) -> Option<AtomId> {
        self.atom_name_map
            .get(&(name.to_string(), None))
            .or_else(|| self.atom_name_map.get(&(name.to_string(), Some('A'))))
            .copied()
    }

    pub fn get_atom_id(&self, name: &str, alt_loc: Option<char>) -> Option<AtomId> {
        self.atom_name_map.get(&(name.to_string(), alt_loc)).copied()
    }
}
