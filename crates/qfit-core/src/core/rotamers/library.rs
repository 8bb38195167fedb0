use super::chi::chi_count;
use crate::core::models::residue::AminoAcidType;
use phf::{Map, phf_map};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Raw layout of a custom library file: residue name to a list of chi vectors (degrees).
///
/// ```toml
/// SER = [[64.0], [178.0], [-65.0]]
/// LEU = [[62.0, 80.0], [-177.0, 65.0]]
/// ```
type RawRotamerFile = HashMap<String, Vec<Vec<f64>>>;

#[rustfmt::skip]
static PENULTIMATE_ROTAMERS: Map<&'static str, &'static [&'static [f64]]> = phf_map! {
    "SER" => &[&[64.0], &[178.0], &[-65.0]],
    "THR" => &[&[59.0], &[-171.0], &[-61.0]],
    "CYS" => &[&[62.0], &[-177.0], &[-65.0]],
    "VAL" => &[&[63.0], &[175.0], &[-60.0]],
    "ASN" => &[&[62.0, -10.0], &[62.0, 30.0], &[-174.0, -20.0], &[-177.0, 30.0], &[-65.0, -20.0], &[-65.0, -75.0], &[-65.0, 120.0]],
    "ASP" => &[&[62.0, -10.0], &[62.0, 30.0], &[-177.0, 1.0], &[-177.0, 65.0], &[-70.0, -15.0]],
    "HIS" => &[&[62.0, -75.0], &[62.0, 80.0], &[-177.0, -165.0], &[-177.0, -80.0], &[-177.0, 60.0], &[-65.0, -70.0], &[-65.0, 165.0], &[-65.0, 80.0]],
    "ILE" => &[&[62.0, 100.0], &[62.0, 170.0], &[-177.0, 66.0], &[-177.0, 165.0], &[-65.0, 100.0], &[-57.0, 170.0], &[-65.0, -60.0]],
    "LEU" => &[&[62.0, 80.0], &[-177.0, 65.0], &[-172.0, 145.0], &[-85.0, 65.0], &[-65.0, 175.0]],
    "PHE" => &[&[62.0, 90.0], &[-177.0, 80.0], &[-65.0, -85.0], &[-65.0, -30.0]],
    "TYR" => &[&[62.0, 90.0], &[-177.0, 80.0], &[-65.0, -85.0], &[-65.0, -30.0]],
    "TRP" => &[&[62.0, -90.0], &[62.0, 90.0], &[-177.0, -105.0], &[-177.0, 90.0], &[-65.0, -90.0], &[-65.0, -5.0], &[-65.0, 95.0]],
    "MET" => &[
        &[62.0, 180.0, 75.0], &[62.0, 180.0, -75.0], &[-177.0, 65.0, 75.0], &[-177.0, 65.0, 180.0],
        &[-177.0, 180.0, 75.0], &[-177.0, 180.0, 180.0], &[-177.0, 180.0, -75.0], &[-67.0, 180.0, 75.0],
        &[-67.0, 180.0, 180.0], &[-67.0, 180.0, -75.0], &[-65.0, -65.0, 103.0], &[-65.0, -65.0, 180.0],
        &[-65.0, -65.0, -70.0],
    ],
    "MSE" => &[
        &[62.0, 180.0, 75.0], &[62.0, 180.0, -75.0], &[-177.0, 65.0, 75.0], &[-177.0, 65.0, 180.0],
        &[-177.0, 180.0, 75.0], &[-177.0, 180.0, 180.0], &[-177.0, 180.0, -75.0], &[-67.0, 180.0, 75.0],
        &[-67.0, 180.0, 180.0], &[-67.0, 180.0, -75.0], &[-65.0, -65.0, 103.0], &[-65.0, -65.0, 180.0],
        &[-65.0, -65.0, -70.0],
    ],
    "GLU" => &[
        &[62.0, 180.0, -20.0], &[70.0, -80.0, 0.0], &[-177.0, 65.0, 10.0], &[-177.0, 180.0, 0.0],
        &[-177.0, -80.0, -25.0], &[-65.0, 85.0, 0.0], &[-67.0, 180.0, -10.0], &[-65.0, -65.0, -40.0],
    ],
    "GLN" => &[
        &[62.0, 180.0, 20.0], &[70.0, -75.0, 0.0], &[-177.0, 65.0, -100.0], &[-177.0, 65.0, 60.0],
        &[-177.0, 180.0, 0.0], &[-65.0, 85.0, 0.0], &[-67.0, 180.0, -25.0], &[-65.0, -65.0, -40.0],
        &[-65.0, -65.0, 100.0],
    ],
    "LYS" => &[
        &[62.0, 180.0, 68.0, 180.0], &[62.0, 180.0, 180.0, 65.0], &[62.0, 180.0, 180.0, 180.0],
        &[62.0, 180.0, 180.0, -65.0], &[-177.0, 68.0, 180.0, 180.0], &[-177.0, 180.0, 68.0, 180.0],
        &[-177.0, 180.0, 180.0, 65.0], &[-177.0, 180.0, 180.0, 180.0], &[-177.0, 180.0, 180.0, -65.0],
        &[-67.0, 180.0, 68.0, 180.0], &[-67.0, 180.0, 180.0, 65.0], &[-67.0, 180.0, 180.0, 180.0],
        &[-67.0, 180.0, 180.0, -65.0],
    ],
    "ARG" => &[
        &[62.0, 180.0, 65.0, 85.0], &[62.0, 180.0, 180.0, 85.0], &[62.0, 180.0, 180.0, 180.0],
        &[-177.0, 65.0, 65.0, 85.0], &[-177.0, 180.0, 65.0, 85.0], &[-177.0, 180.0, 180.0, 85.0],
        &[-177.0, 180.0, 180.0, 180.0], &[-67.0, 180.0, 65.0, 85.0], &[-67.0, 180.0, 180.0, 85.0],
        &[-67.0, 180.0, 180.0, 180.0],
    ],
};

#[derive(Debug, Error)]
pub enum LibraryLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Unknown residue type '{0}' found in library file")]
    UnknownResidueType(String),
    #[error("Rotamer for '{residue}' has {found} chi angles, residue defines {expected}")]
    ChiCountMismatch {
        residue: String,
        expected: usize,
        found: usize,
    },
}

/// Rotameric chi vectors (degrees) per residue name.
#[derive(Debug, Clone, Default)]
pub struct RotamerLibrary {
    rotamers: HashMap<String, Vec<Vec<f64>>>,
}

impl RotamerLibrary {
    /// The built-in penultimate rotamer library.
    pub fn builtin() -> Self {
        let rotamers = PENULTIMATE_ROTAMERS
            .entries()
            .map(|(name, chis)| {
                (
                    name.to_string(),
                    chis.iter().map(|chi| chi.to_vec()).collect(),
                )
            })
            .collect();
        Self { rotamers }
    }

    /// Loads a custom library from a TOML file on top of the built-in one.
    ///
    /// Residues listed in the file replace the built-in rotamers of that residue; residues
    /// not listed keep the built-in set.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LibraryLoadError> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| LibraryLoadError::Io {
            path: path_str.clone(),
            source: e,
        })?;
        let raw: RawRotamerFile = toml::from_str(&content).map_err(|e| LibraryLoadError::Toml {
            path: path_str.clone(),
            source: e,
        })?;

        let mut library = Self::builtin();
        let mut names: Vec<String> = raw.keys().cloned().collect();
        names.sort();
        for name in names {
            let upper = name.to_ascii_uppercase();
            AminoAcidType::from_str(&upper)
                .map_err(|_| LibraryLoadError::UnknownResidueType(name.clone()))?;
            let expected = chi_count(&upper);
            let entries = raw.get(&name).cloned().unwrap_or_default();
            if let Some(bad) = entries.iter().find(|chis| chis.len() != expected) {
                return Err(LibraryLoadError::ChiCountMismatch {
                    residue: upper,
                    expected,
                    found: bad.len(),
                });
            }
            library.rotamers.insert(upper, entries);
        }

        info!(
            path = %path_str,
            residues = library.rotamers.len(),
            "Loaded rotamer library"
        );
        Ok(library)
    }

    /// Rotamers for a residue name, empty if the residue has none.
    pub fn rotamers_for(&self, residue_name: &str) -> &[Vec<f64>] {
        self.rotamers
            .get(&residue_name.trim().to_ascii_uppercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
