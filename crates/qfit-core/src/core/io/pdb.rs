use crate::core::io::traits::MolecularFile;
use crate::core::models::atom::{Atom, AtomRole, Element};
use crate::core::models::chain::ChainType;
use crate::core::models::residue::{AminoAcidType, is_backbone_atom_name};
use crate::core::models::system::MolecularSystem;
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use thiserror::Error;

const WATER_NAMES: &[&str] = &["HOH", "WAT", "H2O", "DOD", "TIP", "TIP3", "SOL"];

/// Records outside ATOM/HETATM that are carried through unchanged (CRYST1, SCALE, REMARK...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdbMetadata {
    pub header_lines: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PdbParseErrorKind },
    #[error("Missing required record: {0}")]
    MissingRecord(String),
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Required field in columns {columns} is empty")]
    MissingRequiredField { columns: String },
    #[error("Line is too short for ATOM/HETATM record (must be at least 54 chars)")]
    LineTooShort,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn parse_float(line: &str, line_num: usize, start: usize, end: usize) -> Result<f64, PdbError> {
    let s = slice_and_trim(line, start, end);
    s.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns: format!("{}-{}", start + 1, end),
            value: s.into(),
        },
    })
}

fn parse_optional_float(line: &str, start: usize, end: usize) -> Option<f64> {
    slice_and_trim(line, start, end).parse().ok()
}

fn optional_char(line: &str, col: usize) -> Option<char> {
    line.get(col..col + 1)
        .and_then(|s| s.chars().next())
        .filter(|c| !c.is_whitespace())
}

fn atom_role(residue_name: &str, residue_type: Option<AminoAcidType>, atom_name: &str) -> AtomRole {
    if residue_type.is_some() {
        if is_backbone_atom_name(atom_name) {
            AtomRole::Backbone
        } else {
            AtomRole::Sidechain
        }
    } else if WATER_NAMES.contains(&residue_name) {
        AtomRole::Water
    } else {
        AtomRole::Ligand
    }
}

/// Formats an atom name in columns 13-16 following the PDB alignment convention.
fn format_atom_name(name: &str, element: Element) -> String {
    if name.len() < 4 && element.symbol().len() == 1 {
        format!(" {:<3}", name)
    } else {
        format!("{:<4}", name)
    }
}

/// Fixed-column PDB coordinate file (ATOM/HETATM, altloc, occupancy, B-factor, element).
pub struct PdbFile;

impl MolecularFile for PdbFile {
    type Metadata = PdbMetadata;
    type Error = PdbError;

    fn read_from(
        reader: &mut impl BufRead,
    ) -> Result<(MolecularSystem, Self::Metadata), Self::Error> {
        let mut system = MolecularSystem::new();
        let mut metadata = PdbMetadata::default();
        let mut atom_count = 0usize;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let record_type = slice_and_trim(&line, 0, 6);

            match record_type {
                "ATOM" | "HETATM" => {
                    if line.len() < 54 {
                        return Err(PdbError::Parse {
                            line: line_num,
                            kind: PdbParseErrorKind::LineTooShort,
                        });
                    }

                    let serial_str = slice_and_trim(&line, 6, 11);
                    let name = slice_and_trim(&line, 12, 16);
                    let alt_loc = optional_char(&line, 16);
                    let res_name = slice_and_trim(&line, 17, 21);
                    let chain_char = optional_char(&line, 21).unwrap_or('A');
                    let res_seq_str = slice_and_trim(&line, 22, 26);
                    let insertion_code = optional_char(&line, 26);

                    if name.is_empty() {
                        return Err(PdbError::Parse {
                            line: line_num,
                            kind: PdbParseErrorKind::MissingRequiredField {
                                columns: "13-16".into(),
                            },
                        });
                    }
                    let serial: usize = serial_str.parse().unwrap_or(atom_count + 1);
                    let res_seq: isize = res_seq_str.parse().map_err(|_| PdbError::Parse {
                        line: line_num,
                        kind: PdbParseErrorKind::InvalidInt {
                            columns: "23-26".into(),
                            value: res_seq_str.into(),
                        },
                    })?;
                    let x = parse_float(&line, line_num, 30, 38)?;
                    let y = parse_float(&line, line_num, 38, 46)?;
                    let z = parse_float(&line, line_num, 46, 54)?;
                    let occupancy = parse_optional_float(&line, 54, 60).unwrap_or(1.0);
                    let b_factor = parse_optional_float(&line, 60, 66)
                        .unwrap_or(crate::core::models::atom::DEFAULT_B_FACTOR);
                    let element = Element::from_str(slice_and_trim(&line, 76, 78))
                        .unwrap_or_else(|_| Element::from_atom_name(name));

                    let residue_type = AminoAcidType::from_str(res_name).ok();
                    let chain_type = if residue_type.is_some() {
                        ChainType::Protein
                    } else if WATER_NAMES.contains(&res_name) {
                        ChainType::Water
                    } else {
                        ChainType::Ligand
                    };

                    let chain_id = system.add_chain(chain_char, chain_type);
                    let residue_id = system
                        .add_residue(chain_id, res_seq, insertion_code, res_name, residue_type)
                        .ok_or_else(|| {
                            PdbError::MissingRecord(format!("chain '{}'", chain_char))
                        })?;

                    let mut atom = Atom::new(name, residue_id, Point3::new(x, y, z));
                    atom.serial = serial;
                    atom.element = element;
                    atom.role = atom_role(res_name, residue_type, name);
                    atom.occupancy = occupancy;
                    atom.b_factor = b_factor;
                    atom.alt_loc = alt_loc;
                    system.add_atom_to_residue(residue_id, atom);
                    atom_count += 1;
                }
                "END" => break,
                "TER" | "ANISOU" | "MODEL" | "ENDMDL" | "CONECT" | "MASTER" => {}
                _ => {
                    if !line.trim().is_empty() {
                        metadata.header_lines.push(line);
                    }
                }
            }
        }

        if atom_count == 0 {
            return Err(PdbError::MissingRecord("ATOM/HETATM records".into()));
        }
        Ok((system, metadata))
    }

    fn write_to(
        system: &MolecularSystem,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        for line in &metadata.header_lines {
            writeln!(writer, "{}", line)?;
        }

        let mut serial = 1usize;
        for (_, chain) in system.chains_iter() {
            let mut wrote_any = false;
            for &residue_id in chain.residues() {
                let Some(residue) = system.residue(residue_id) else {
                    continue;
                };
                for &atom_id in residue.atoms() {
                    let Some(atom) = system.atom(atom_id) else {
                        continue;
                    };
                    let record_type = if residue.residue_type.is_some() {
                        "ATOM"
                    } else {
                        "HETATM"
                    };
                    writeln!(
                        writer,
                        "{:<6}{:>5} {}{}{:>3} {}{:>4}{}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}",
                        record_type,
                        serial % 100_000,
                        format_atom_name(&atom.name, atom.element),
                        atom.alt_loc.unwrap_or(' '),
                        residue.name,
                        chain.id,
                        residue.number,
                        residue.insertion_code.unwrap_or(' '),
                        atom.position.x,
                        atom.position.y,
                        atom.position.z,
                        atom.occupancy,
                        atom.b_factor,
                        atom.element.symbol(),
                    )?;
                    serial += 1;
                    wrote_any = true;
                }
            }
            if wrote_any && chain.chain_type == ChainType::Protein {
                writeln!(writer, "TER")?;
            }
        }

        writeln!(writer, "END")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    const SAMPLE: &str = "\
CRYST1   20.000   20.000   20.000  90.00  90.00  90.00 P 1           1
ATOM      1  N   SER A  10       1.000   2.000   3.000  1.00 12.50           N
ATOM      2  CA  SER A  10       2.458   2.000   3.000  1.00 13.00           C
ATOM      3  CB ASER A  10       3.000   3.400   3.000  0.60 15.00           C
ATOM      4  CB BSER A  10       3.000   0.600   3.000  0.40 15.00           C
HETATM    5  O   HOH A 101       8.000   8.000   8.000  1.00 30.00           O
END
";

    fn read_sample() -> (MolecularSystem, PdbMetadata) {
        PdbFile::read_from(&mut Cursor::new(SAMPLE)).unwrap()
    }

    #[test]
    fn reads_atoms_altlocs_and_roles() {
        let (system, metadata) = read_sample();
        assert_eq!(metadata.header_lines.len(), 1);
        assert_eq!(system.atom_count(), 5);

        let chain = system.find_chain_by_id('A').unwrap();
        let ser = system.find_residue_by_id(chain, 10, None).unwrap();
        let residue = system.residue(ser).unwrap();
        assert_eq!(residue.residue_type, Some(AminoAcidType::Serine));

        let cb_b = residue.get_atom_id("CB", Some('B')).unwrap();
        let atom = system.atom(cb_b).unwrap();
        assert_eq!(atom.role, AtomRole::Sidechain);
        assert!((atom.occupancy - 0.4).abs() < 1e-12);
        assert!((atom.position.y - 0.6).abs() < 1e-12);

        let ca = residue.get_atom_id_by_name("CA").unwrap();
        assert_eq!(system.atom(ca).unwrap().role, AtomRole::Backbone);

        let water = system.find_residue_by_id(chain, 101, None).unwrap();
        let o = system.residue(water).unwrap().get_atom_id_by_name("O").unwrap();
        assert_eq!(system.atom(o).unwrap().role, AtomRole::Water);
    }

    #[test]
    fn write_then_read_preserves_coordinates_and_altlocs() {
        let (system, metadata) = read_sample();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.pdb");
        PdbFile::write_to_path(&system, &metadata, &path).unwrap();

        let (reread, _) = PdbFile::read_from_path(&path).unwrap();
        assert_eq!(reread.atom_count(), system.atom_count());
        let chain = reread.find_chain_by_id('A').unwrap();
        let ser = reread.find_residue_by_id(chain, 10, None).unwrap();
        let cb_a = reread
            .residue(ser)
            .unwrap()
            .get_atom_id("CB", Some('A'))
            .unwrap();
        let atom = reread.atom(cb_a).unwrap();
        assert!((atom.position.y - 3.4).abs() < 1e-9);
        assert!((atom.occupancy - 0.6).abs() < 1e-9);
        assert_eq!(atom.element, Element::C);
    }

    #[test]
    fn written_lines_use_standard_columns() {
        let (system, metadata) = read_sample();
        let mut out = Vec::new();
        PdbFile::write_to(&system, &metadata, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let ca_line = text.lines().find(|l| l.contains(" CA ")).unwrap();
        assert_eq!(&ca_line[12..16], " CA ");
        assert_eq!(&ca_line[17..20], "SER");
        assert_eq!(&ca_line[21..22], "A");
        assert_eq!(ca_line[30..38].trim(), "2.458");
        assert_eq!(ca_line[76..78].trim(), "C");
        assert!(text.trim_end().ends_with("END"));
    }

    #[test]
    fn missing_atoms_is_an_error() {
        let result = PdbFile::read_from(&mut Cursor::new("REMARK nothing\nEND\n"));
        assert!(matches!(result, Err(PdbError::MissingRecord(_))));
    }

    #[test]
    fn bad_coordinate_reports_line_number() {
        let bad = "ATOM      1  N   SER A  10       x.000   2.000   3.000  1.00 12.50           N\n";
        match PdbFile::read_from(&mut Cursor::new(bad)) {
            Err(PdbError::Parse { line, .. }) => assert_eq!(line, 1),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
