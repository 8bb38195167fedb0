use super::atom::{Atom, AtomRole};
use super::chain::{Chain, ChainType};
use super::residue::{AminoAcidType, Residue};
use super::{AtomId, ChainId, ResidueId};
use slotmap::SlotMap;
use std::collections::HashMap;

/// A complete molecular structure: chains of residues made of atoms.
///
/// Components are stored in slot maps and referenced by stable ids. Chains and residues keep
/// their file order, which is also the order used for region partitioning and output.
#[derive(Debug, Clone, Default)]
pub struct MolecularSystem {
    atoms: SlotMap<AtomId, Atom>,
    residues: SlotMap<ResidueId, Residue>,
    chains: SlotMap<ChainId, Chain>,
    /// Chains in insertion order.
    chain_order: Vec<ChainId>,
    /// Lookup map for finding residues by chain, residue number and insertion code.
    residue_id_map: HashMap<(ChainId, isize, Option<char>), ResidueId>,
    /// Lookup map for finding chains by their single-character identifier.
    chain_id_map: HashMap<char, ChainId>,
}

impl MolecularSystem {
    /// Creates a new, empty molecular system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an atom.
    ///
    /// # Arguments
    ///
    /// * `id` - The atom to look up.
    ///
    /// # Return
    ///
    /// Returns `Some(&Atom)` while the atom belongs to the system, otherwise `None`.
    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    /// Looks up an atom for modification.
    ///
    /// # Arguments
    ///
    /// * `id` - The atom to look up.
    ///
    /// # Return
    ///
    /// Returns `Some(&mut Atom)` while the atom belongs to the system, otherwise `None`.
    pub fn atom_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.atoms.get_mut(id)
    }

    /// Iterates over every atom, alternate locations included.
    ///
    /// # Return
    ///
    /// Returns `(id, atom)` pairs in slot order, which is not file order.
    pub fn atoms_iter(&self) -> impl Iterator<Item = (AtomId, &Atom)> {
        self.atoms.iter()
    }

    /// Number of atoms, counting every alternate location separately.
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Looks up a residue.
    ///
    /// # Arguments
    ///
    /// * `id` - The residue to look up.
    ///
    /// # Return
    ///
    /// Returns `Some(&Residue)` while the residue belongs to the system, otherwise `None`.
    pub fn residue(&self, id: ResidueId) -> Option<&Residue> {
        self.residues.get(id)
    }

    /// Looks up a residue for modification.
    ///
    /// # Arguments
    ///
    /// * `id` - The residue to look up.
    ///
    /// # Return
    ///
    /// Returns `Some(&mut Residue)` while the residue belongs to the system, otherwise `None`.
    pub fn residue_mut(&mut self, id: ResidueId) -> Option<&mut Residue> {
        self.residues.get_mut(id)
    }

    /// Iterates over every residue.
    ///
    /// # Return
    ///
    /// Returns `(id, residue)` pairs in slot order; use [`MolecularSystem::chains_iter`] for file
    /// order.
    pub fn residues_iter(&self) -> impl Iterator<Item = (ResidueId, &Residue)> {
        self.residues.iter()
    }

    pub fn residue_count(&self) -> usize {
        self.residues.len()
    }

    /// Looks up a chain.
    ///
    /// # Arguments
    ///
    /// * `id` - The chain to look up.
    ///
    /// # Return
    ///
    /// Returns `Some(&Chain)` while the chain belongs to the system, otherwise `None`.
    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id)
    }

    /// Iterates over the chains in the order they were added.
    ///
    /// # Return
    ///
    /// Returns `(id, chain)` pairs; residues of each chain keep their own insertion order.
    pub fn chains_iter(&self) -> impl Iterator<Item = (ChainId, &Chain)> {
        self.chain_order
            .iter()
            .filter_map(|&id| self.chains.get(id).map(|chain| (id, chain)))
    }

    /// Finds a chain by its single-character identifier.
    ///
    /// # Arguments
    ///
    /// * `id` - The chain identifier as written in the coordinate file, e.g. `'A'`.
    ///
    /// # Return
    ///
    /// Returns the chain's id if it exists, otherwise `None`.
    pub fn find_chain_by_id(&self, id: char) -> Option<ChainId> {
        self.chain_id_map.get(&id).copied()
    }

    /// Finds a residue by chain, sequence number and insertion code.
    ///
    /// # Arguments
    ///
    /// * `chain_id` - The chain holding the residue.
    /// * `residue_number` - The residue sequence number.
    /// * `insertion_code` - The insertion code, `None` for plain numbering.
    ///
    /// # Return
    ///
    /// Returns the residue's id if all three match, otherwise `None`.
    pub fn find_residue_by_id(
        &self,
        chain_id: ChainId,
        residue_number: isize,
        insertion_code: Option<char>,
    ) -> Option<ResidueId> {
        self.residue_id_map
            .get(&(chain_id, residue_number, insertion_code))
            .copied()
    }

    /// Adds a chain, or returns the existing one with the same identifier.
    ///
    /// # Arguments
    ///
    /// * `id` - The chain identifier.
    /// * `chain_type` - Kind of chain; ignored when the chain already exists.
    ///
    /// # Return
    ///
    /// Returns the id of the new or existing chain.
    pub fn add_chain(&mut self, id: char, chain_type: ChainType) -> ChainId {
        if let Some(&existing) = self.chain_id_map.get(&id) {
            return existing;
        }
        let chain_id = self.chains.insert(Chain::new(id, chain_type));
        self.chain_id_map.insert(id, chain_id);
        self.chain_order.push(chain_id);
        chain_id
    }

    /// Adds a residue to a chain, or returns the existing one with the same number and
    /// insertion code.
    ///
    /// # Arguments
    ///
    /// * `chain_id` - The chain receiving the residue.
    /// * `residue_number` - The residue sequence number.
    /// * `insertion_code` - The insertion code, `None` for plain numbering.
    /// * `name` - Three-letter residue name.
    /// * `residue_type` - Standard amino acid type, `None` for ligands and waters.
    ///
    /// # Return
    ///
    /// Returns the id of the new or existing residue, or `None` if the chain does not exist.
    pub fn add_residue(
        &mut self,
        chain_id: ChainId,
        residue_number: isize,
        insertion_code: Option<char>,
        name: &str,
        residue_type: Option<AminoAcidType>,
    ) -> Option<ResidueId> {
        let chain = self.chains.get_mut(chain_id)?;
        let key = (chain_id, residue_number, insertion_code);

        let residue_id = *self.residue_id_map.entry(key).or_insert_with(|| {
            let mut residue = Residue::new(residue_number, name, chain_id, residue_type);
            residue.insertion_code = insertion_code;
            self.residues.insert(residue)
        });

        if !chain.residues.contains(&residue_id) {
            chain.residues.push(residue_id);
        }

        Some(residue_id)
    }

    /// Adds an atom to a residue.
    ///
    /// The atom's `residue_id` is overwritten with the target residue.
    ///
    /// # Arguments
    ///
    /// * `residue_id` - The residue receiving the atom.
    /// * `atom` - The atom, with its alternate location already set.
    ///
    /// # Return
    ///
    /// Returns the new atom's id, or `None` if the residue does not exist.
    pub fn add_atom_to_residue(&mut self, residue_id: ResidueId, mut atom: Atom) -> Option<AtomId> {
        if !self.residues.contains_key(residue_id) {
            return None;
        }

        atom.residue_id = residue_id;
        let name = atom.name.clone();
        let alt_loc = atom.alt_loc;
        let atom_id = self.atoms.insert(atom);

        let residue = self.residues.get_mut(residue_id)?;
        residue.add_atom(&name, alt_loc, atom_id);

        Some(atom_id)
    }

    /// Primary-conformer atoms of a residue (no altloc or altloc `A`), in file order.
    ///
    /// # Arguments
    ///
    /// * `residue_id` - The residue to inspect.
    ///
    /// # Return
    ///
    /// Returns the atom ids, or an empty vector if the residue does not exist.
    pub fn primary_atoms_of(&self, residue_id: ResidueId) -> Vec<AtomId> {
        self.residues
            .get(residue_id)
            .map(|residue| {
                residue
                    .atoms()
                    .iter()
                    .copied()
                    .filter(|&id| self.atoms.get(id).is_some_and(|a| a.is_primary()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All primary-conformer atoms of the system in chain/residue/file order.
    pub fn primary_atom_ids(&self) -> Vec<AtomId> {
        self.chains_iter()
            .flat_map(|(_, chain)| chain.residues().iter().copied())
            .flat_map(|residue_id| self.primary_atoms_of(residue_id))
            .collect()
    }

    pub fn atoms_by_role(&self, role: AtomRole) -> impl Iterator<Item = (AtomId, &Atom)> {
        self.atoms.iter().filter(move |(_, atom)| atom.role == role)
    }

    /// Human-readable label such as `A:42` or `A:42B` used in logs and reports.
    ///
    /// # Arguments
    ///
    /// * `residue_id` - The residue to label.
    ///
    /// # Return
    ///
    /// Returns the chain, number and insertion code joined as above, or `?` for an unknown
    /// residue.
    pub fn residue_label(&self, residue_id: ResidueId) -> String {
        match self.residues.get(residue_id) {
            Some(residue) => {
                let chain = self
                    .chains
                    .get(residue.chain_id)
                    .map(|c| c.id)
                    .unwrap_or('?');
                match residue.insertion_code {
                    Some(icode) => format!("{}:{}{}", chain, residue.number, icode),
                    None => format!("{}:{}", chain, residue.number),
                }
            }
            None => "?".to_string(),
        }
    }
}
