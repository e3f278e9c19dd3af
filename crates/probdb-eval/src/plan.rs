//! Rule selection for one sub-formula of the decomposition.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use probdb_dsl::{Atom, Name};

use crate::error::UnsupportedQueryError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step<'a> {
    /// No variables left: one `(relation, tuple)` lookup per atom.
    Ground(Vec<(&'a str, Vec<&'a str>)>),
    /// Two or more groups of atoms with pairwise disjoint variables.
    Split(Vec<Vec<Atom>>),
    /// `variable` occurs in every atom; ground it over the active domain.
    Eliminate(&'a str),
}

/// Pick the decomposition rule for `atoms`.
///
/// `order` is the query's declared variable order; ties between root
/// variables go to the first declared.
pub(crate) fn classify<'a>(
    atoms: &'a [Atom],
    order: &'a [Name],
) -> Result<Step<'a>, UnsupportedQueryError> {
    let ground: Option<Vec<_>> = atoms
        .iter()
        .map(|atom| {
            atom.ground_tuple()
                .map(|tuple| (atom.relation.as_str(), tuple))
        })
        .collect();
    if let Some(lookups) = ground {
        return Ok(Step::Ground(lookups));
    }

    let groups = components(atoms);
    if groups.len() > 1 {
        let groups = groups
            .into_iter()
            .map(|group| group.into_iter().map(|idx| atoms[idx].clone()).collect())
            .collect();
        return Ok(Step::Split(groups));
    }

    order
        .iter()
        .map(String::as_str)
        .find(|variable| atoms.iter().all(|atom| atom.contains_variable(variable)))
        .map(Step::Eliminate)
        .ok_or_else(|| UnsupportedQueryError::NoRootVariable {
            formula: describe(atoms, order),
        })
}

/// Connected components of atoms under "shares a variable".
///
/// Groups are listed by their first atom; atoms keep their relative order.
/// A ground atom is always a group of its own.
pub(crate) fn components(atoms: &[Atom]) -> Vec<Vec<usize>> {
    components_where(atoms, |_| true)
}

/// Like [`components`], linking atoms only through variables that pass `links`.
pub(crate) fn components_where(atoms: &[Atom], links: impl Fn(&str) -> bool) -> Vec<Vec<usize>> {
    let mut sets = DisjointSet::new(atoms.len());
    let mut first_atom: HashMap<&str, usize> = HashMap::new();
    for (idx, atom) in atoms.iter().enumerate() {
        for variable in atom.variables().filter(|variable| links(variable)) {
            match first_atom.entry(variable) {
                Entry::Occupied(entry) => sets.unite(*entry.get(), idx),
                Entry::Vacant(entry) => {
                    entry.insert(idx);
                }
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    for idx in 0..atoms.len() {
        let root = sets.find(idx);
        let group = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(idx);
    }
    groups
}

/// `∃y R(a, y) ∧ S(a)`: the sub-formula as it reads at this step.
pub(crate) fn describe(atoms: &[Atom], order: &[Name]) -> String {
    let mut out = String::new();
    for variable in order
        .iter()
        .filter(|variable| atoms.iter().any(|atom| atom.contains_variable(variable)))
    {
        out.push('∃');
        out.push_str(variable);
        out.push(' ');
    }
    if atoms.is_empty() {
        out.push_str("true");
    } else {
        let conjuncts: Vec<String> = atoms.iter().map(ToString::to_string).collect();
        out.push_str(&conjuncts.join(" ∧ "));
    }
    out
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn unite(&mut self, x: usize, y: usize) {
        let x = self.find(x);
        let y = self.find(y);
        if x != y {
            self.parent[y] = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probdb_dsl::parse_query;

    #[test]
    fn ground_atoms_become_lookups() {
        let query = parse_query("R(a, b), S(a)").unwrap();
        assert_eq!(
            classify(query.atoms(), query.variables()).unwrap(),
            Step::Ground(vec![("R", vec!["a", "b"]), ("S", vec!["a"])])
        );
    }

    #[test]
    fn empty_conjunction_is_ground() {
        assert_eq!(classify(&[], &[]).unwrap(), Step::Ground(vec![]));
    }

    #[test]
    fn disjoint_variables_split() {
        let query = parse_query("x, y | R(x, c), S(y), T(a)").unwrap();
        let Step::Split(groups) = classify(query.atoms(), query.variables()).unwrap() else {
            panic!("expected a split");
        };
        let relations: Vec<Vec<&str>> = groups
            .iter()
            .map(|group| group.iter().map(|atom| atom.relation.as_str()).collect())
            .collect();
        assert_eq!(relations, vec![vec!["R"], vec!["S"], vec!["T"]]);
    }

    #[test]
    fn connected_atoms_eliminate_root_variable() {
        let query = parse_query("x, y | R(x, y), S(x)").unwrap();
        assert_eq!(
            classify(query.atoms(), query.variables()).unwrap(),
            Step::Eliminate("x")
        );

        // Tie: both occur everywhere, the first declared wins.
        let tied = parse_query("y, x | R(x, y)").unwrap();
        assert_eq!(
            classify(tied.atoms(), tied.variables()).unwrap(),
            Step::Eliminate("y")
        );
    }

    #[test]
    fn components_follow_shared_variables() {
        let query = parse_query("x, y, z | A(x), B(y), C(x, z), D(z)").unwrap();
        assert_eq!(components(query.atoms()), vec![vec![0, 2, 3], vec![1]]);
    }

    #[test]
    fn components_where_ignores_unlinked_variables() {
        let query = parse_query("x, y | R(x, y), S(x), T(y)").unwrap();
        assert_eq!(
            components_where(query.atoms(), |variable| variable != "x"),
            vec![vec![0, 2], vec![1]]
        );
    }

    #[test]
    fn non_hierarchical_component_has_no_root() {
        let query = parse_query("x, y | R(x), S(x, y), T(y)").unwrap();
        assert_eq!(
            classify(query.atoms(), query.variables()),
            Err(UnsupportedQueryError::NoRootVariable {
                formula: "∃x ∃y R(x) ∧ S(x, y) ∧ T(y)".into()
            })
        );
    }

    #[test]
    fn describe_lists_remaining_variables() {
        let query = parse_query("x, y | R(x, y), S(x)").unwrap();
        let grounded: Vec<Atom> = query
            .atoms()
            .iter()
            .map(|atom| atom.substitute("x", "a"))
            .collect();
        assert_eq!(describe(&grounded, query.variables()), "∃y R(a, y) ∧ S(a)");
    }
}
