//! Hierarchy check.
//!
//! A query is hierarchical when, for every two variables `x` and `y`,
//! `Atoms(x)` and `Atoms(y)` are nested or disjoint. Exactly these
//! (non-repeating) queries always have a root variable or an independent
//! split at every step of the decomposition.

use probdb_dsl::{Atom, Query};
use roaring::RoaringBitmap;

use crate::error::UnsupportedQueryError;

/// `Atoms(variable)`: indices of the atoms that mention `variable`.
pub fn occurrences(atoms: &[Atom], variable: &str) -> RoaringBitmap {
    atoms
        .iter()
        .enumerate()
        .filter(|(_, atom)| atom.contains_variable(variable))
        .map(|(idx, _)| idx as u32)
        .collect()
}

pub fn check_hierarchical(query: &Query) -> Result<(), UnsupportedQueryError> {
    let atoms = query.atoms();
    let sets: Vec<(&str, RoaringBitmap)> = query
        .variables_in_atoms()
        .into_iter()
        .map(|variable| (variable, occurrences(atoms, variable)))
        .collect();

    for (i, (left, left_atoms)) in sets.iter().enumerate() {
        for (right, right_atoms) in &sets[i + 1..] {
            if left_atoms.is_subset(right_atoms)
                || right_atoms.is_subset(left_atoms)
                || left_atoms.is_disjoint(right_atoms)
            {
                continue;
            }
            let shared_relation = (left_atoms & right_atoms)
                .min()
                .and_then(|idx| atoms.get(idx as usize))
                .map(|atom| atom.relation.clone())
                .unwrap_or_default();
            return Err(UnsupportedQueryError::NotHierarchical {
                left: left.to_string(),
                right: right.to_string(),
                shared_relation,
            });
        }
    }
    Ok(())
}

pub fn is_hierarchical(query: &Query) -> bool {
    check_hierarchical(query).is_ok()
}
