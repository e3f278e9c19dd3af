//! Rule selection for general formulas.
//!
//! - `¬φ`: `1 − P(φ)`;
//! - `φ ∧ ψ`, `φ ∨ ψ`: product and independent union, when the two sides
//!   read no common relation;
//! - `∃x φ`, `∀x φ`: independent union and product over the active domain,
//!   when `x` is a separator variable of `φ`.
//!
//! Anything else is rejected. Hierarchical conjunctive queries compile into
//! this fragment through [`query_formula`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use probdb_dsl::{Atom, Formula, Name, Query};

use crate::error::UnsupportedQueryError;
use crate::hierarchy::check_hierarchical;
use crate::plan::{components_where, describe};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FormulaStep<'a> {
    /// A ground atom, or `None` for `true`.
    Lookup(Option<(&'a str, Vec<&'a str>)>),
    Negate(&'a Formula),
    Conjoin(&'a Formula, &'a Formula),
    Disjoin(&'a Formula, &'a Formula),
    Exists(&'a str, &'a Formula),
    ForAll(&'a str, &'a Formula),
}

pub(crate) fn classify_formula(formula: &Formula) -> Result<FormulaStep<'_>, UnsupportedQueryError> {
    match formula {
        Formula::True => Ok(FormulaStep::Lookup(None)),
        Formula::Atom(atom) => match atom.ground_tuple() {
            Some(tuple) => Ok(FormulaStep::Lookup(Some((atom.relation.as_str(), tuple)))),
            None => Err(UnsupportedQueryError::FreeVariable {
                variable: atom.variables().next().unwrap_or_default().to_string(),
                formula: formula.to_string(),
            }),
        },
        Formula::Not(inner) => Ok(FormulaStep::Negate(inner)),
        Formula::And(left, right) => {
            independent(formula, left, right)?;
            Ok(FormulaStep::Conjoin(left, right))
        }
        Formula::Or(left, right) => {
            independent(formula, left, right)?;
            Ok(FormulaStep::Disjoin(left, right))
        }
        Formula::Exists(variable, body) => {
            separates(formula, variable, body)?;
            Ok(FormulaStep::Exists(variable, body))
        }
        Formula::ForAll(variable, body) => {
            separates(formula, variable, body)?;
            Ok(FormulaStep::ForAll(variable, body))
        }
    }
}

fn independent(formula: &Formula, left: &Formula, right: &Formula) -> Result<(), UnsupportedQueryError> {
    let left_relations = left.relations();
    match right
        .relations()
        .into_iter()
        .find(|relation| left_relations.contains(relation))
    {
        Some(relation) => Err(UnsupportedQueryError::SharedRelation {
            relation: relation.to_string(),
            formula: formula.to_string(),
        }),
        None => Ok(()),
    }
}

fn separates(formula: &Formula, variable: &str, body: &Formula) -> Result<(), UnsupportedQueryError> {
    if is_separator(variable, body) {
        Ok(())
    } else {
        Err(UnsupportedQueryError::NotSeparator {
            variable: variable.to_string(),
            formula: formula.to_string(),
        })
    }
}

/// `variable` separates `body` when it occurs free in every atom, at the same
/// positions in every atom of a given relation. Distinct constants for it
/// then ground `body` over disjoint sets of tuples.
pub fn is_separator(variable: &str, body: &Formula) -> bool {
    let mut positions_of: HashMap<&str, Vec<usize>> = HashMap::new();
    for (atom, positions) in body.free_positions(variable) {
        if positions.is_empty() {
            return false;
        }
        match positions_of.entry(atom.relation.as_str()) {
            Entry::Occupied(entry) => {
                if *entry.get() != positions {
                    return false;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(positions);
            }
        }
    }
    true
}

/// Rewrite a hierarchical query as an equivalent formula, with each
/// quantifier pushed down to the atoms that use it.
///
/// `x, y | R(x, y), S(x), T(a)` becomes `(∃x (∃y R(x, y) ∧ S(x)) ∧ T(a))`.
/// The result always classifies, and evaluates to the query's probability.
pub fn query_formula(query: &Query) -> Result<Formula, UnsupportedQueryError> {
    check_hierarchical(query)?;
    compile(query.atoms(), query.variables(), &[])
}

fn compile(atoms: &[Atom], order: &[Name], bound: &[&str]) -> Result<Formula, UnsupportedQueryError> {
    let is_free = |variable: &str| !bound.contains(&variable);

    let groups = components_where(atoms, is_free);
    if groups.len() != 1 {
        let parts = groups
            .into_iter()
            .map(|group| {
                let group: Vec<Atom> = group.into_iter().map(|idx| atoms[idx].clone()).collect();
                compile(&group, order, bound)
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Formula::conjunction(parts));
    }

    if let [atom] = atoms {
        if !atom.variables().any(is_free) {
            return Ok(atom.clone().into());
        }
    }

    let root = order
        .iter()
        .map(String::as_str)
        .filter(|&variable| is_free(variable))
        .find(|variable| atoms.iter().all(|atom| atom.contains_variable(variable)))
        .ok_or_else(|| UnsupportedQueryError::NoRootVariable {
            formula: describe(atoms, order),
        })?;
    let mut inner = bound.to_vec();
    inner.push(root);
    Ok(Formula::exists(root, compile(atoms, order, &inner)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use probdb_dsl::{parse_formula, parse_query};

    fn classify_text(text: &str) -> Result<String, UnsupportedQueryError> {
        let formula = parse_formula(text).expect("parse");
        let step = match classify_formula(&formula)? {
            FormulaStep::Lookup(None) => "lookup(true)".to_string(),
            FormulaStep::Lookup(Some((relation, tuple))) => format!("lookup({relation}{tuple:?})"),
            FormulaStep::Negate(_) => "negate".to_string(),
            FormulaStep::Conjoin(..) => "conjoin".to_string(),
            FormulaStep::Disjoin(..) => "disjoin".to_string(),
            FormulaStep::Exists(variable, _) => format!("exists({variable})"),
            FormulaStep::ForAll(variable, _) => format!("forall({variable})"),
        };
        Ok(step)
    }

    #[test]
    fn each_connective_has_a_rule() {
        assert_eq!(classify_text("true").unwrap(), "lookup(true)");
        assert_eq!(classify_text("R(a, b)").unwrap(), r#"lookup(R["a", "b"])"#);
        assert_eq!(classify_text("not(R(a))").unwrap(), "negate");
        assert_eq!(classify_text("and(R(a), S(a))").unwrap(), "conjoin");
        assert_eq!(classify_text("or(R(a), S(a))").unwrap(), "disjoin");
        assert_eq!(classify_text("exist(x, R(x, c))").unwrap(), "exists(x)");
        assert_eq!(classify_text("forall(x, or(R(x), S(x)))").unwrap(), "forall(x)");
    }

    #[test]
    fn shared_relations_are_not_independent() {
        assert_eq!(
            classify_text("or(R(a), not(R(b)))"),
            Err(UnsupportedQueryError::SharedRelation {
                relation: "R".into(),
                formula: "(R(a) ∨ ¬R(b))".into(),
            })
        );
    }

    #[test]
    fn separator_needs_every_atom_at_fixed_positions() {
        let sep = |text: &str| {
            let Formula::Exists(variable, body) = parse_formula(text).expect("parse") else {
                panic!("expected a quantifier");
            };
            is_separator(&variable, &body)
        };
        assert!(sep("exist(x, and(R(x, c), S(x)))"));
        assert!(sep("exist(x, R(x, x))"));
        assert!(sep("exist(x, true)"));
        assert!(!sep("exist(x, and(R(x, c), S(a)))"));
        assert!(!sep("exist(x, or(R(x, c), exist(x, S(x))))"));
        assert!(matches!(
            classify_text("forall(x, and(R(x), S(b)))"),
            Err(UnsupportedQueryError::NotSeparator { .. })
        ));
    }

    #[test]
    fn open_atoms_are_rejected() {
        let formula = Formula::from(Atom::new("R", vec![probdb_dsl::Term::variable("x")]));
        assert!(matches!(
            classify_formula(&formula),
            Err(UnsupportedQueryError::FreeVariable { ref variable, .. }) if variable == "x"
        ));
    }

    #[test]
    fn queries_compile_with_pushed_quantifiers() {
        let query = parse_query("x, y | R(x, y), S(x), T(a)").unwrap();
        assert_eq!(
            query_formula(&query).unwrap().to_string(),
            "(∃x (∃y R(x, y) ∧ S(x)) ∧ T(a))"
        );

        let split = parse_query("x, y | S(x), T(y, a)").unwrap();
        assert_eq!(
            query_formula(&split).unwrap().to_string(),
            "(∃x S(x) ∧ ∃y T(y, a))"
        );

        assert_eq!(
            query_formula(&Query::ground(vec![]).unwrap()).unwrap(),
            Formula::True
        );
        let unused = parse_query("z | R(a, b)").unwrap();
        assert_eq!(query_formula(&unused).unwrap().to_string(), "R(a, b)");
    }

    #[test]
    fn non_hierarchical_queries_do_not_compile() {
        let query = parse_query("x, y | R(x), S(x, y), T(y)").unwrap();
        assert!(matches!(
            query_formula(&query),
            Err(UnsupportedQueryError::NotHierarchical { .. })
        ));
    }
}
