use phf::{Map, phf_map};

/// Atom quadruple `a-b-c-d` defining a torsion; rotating the chi moves the atoms beyond `c`.
pub type ChiAtoms = [&'static str; 4];

#[rustfmt::skip]
static CHI_DEFINITIONS: Map<&'static str, &'static [ChiAtoms]> = phf_map! {
    "ARG" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD"], ["CB", "CG", "CD", "NE"], ["CG", "CD", "NE", "CZ"]],
    "ASN" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "OD1"]],
    "ASP" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "OD1"]],
    "CYS" => &[["N", "CA", "CB", "SG"]],
    "GLN" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD"], ["CB", "CG", "CD", "OE1"]],
    "GLU" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD"], ["CB", "CG", "CD", "OE1"]],
    "HIS" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "ND1"]],
    "ILE" => &[["N", "CA", "CB", "CG1"], ["CA", "CB", "CG1", "CD1"]],
    "LEU" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD1"]],
    "LYS" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD"], ["CB", "CG", "CD", "CE"], ["CG", "CD", "CE", "NZ"]],
    "MET" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "SD"], ["CB", "CG", "SD", "CE"]],
    "MSE" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "SE"], ["CB", "CG", "SE", "CE"]],
    "PHE" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD1"]],
    "SER" => &[["N", "CA", "CB", "OG"]],
    "THR" => &[["N", "CA", "CB", "OG1"]],
    "TRP" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD1"]],
    "TYR" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD1"]],
    "VAL" => &[["N", "CA", "CB", "CG1"]],
};

/// Chi definitions of a residue, empty for residues without rotatable side chains
/// (GLY, ALA, PRO) and for non-amino-acid residues.
pub fn chi_atoms(residue_name: &str) -> &'static [ChiAtoms] {
    CHI_DEFINITIONS
        .get(residue_name.trim().to_ascii_uppercase().as_str())
        .copied()
        .unwrap_or(&[])
}

pub fn chi_count(residue_name: &str) -> usize {
    chi_atoms(residue_name).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chi_counts_match_side_chain_topology() {
        assert_eq!(chi_count("ARG"), 4);
        assert_eq!(chi_count("LYS"), 4);
        assert_eq!(chi_count("MET"), 3);
        assert_eq!(chi_count("phe"), 2);
        assert_eq!(chi_count("SER"), 1);
        assert_eq!(chi_count("GLY"), 0);
        assert_eq!(chi_count("ALA"), 0);
        assert_eq!(chi_count("PRO"), 0);
        assert_eq!(chi_count("HOH"), 0);
    }

    #[test]
    fn consecutive_chis_share_three_atoms() {
        for name in ["ARG", "LYS", "GLN", "MET", "ILE"] {
            let chis = chi_atoms(name);
            for pair in chis.windows(2) {
                assert_eq!(pair[0][1..], pair[1][..3], "{name}");
            }
        }
    }
}
