//! First-order formulas over atoms: negation, binary connectives and
//! quantifiers.
//!
//! A conjunctive [`Query`](crate::Query) is the special case built from
//! `Exists` and `And` alone. Bound names appear in atoms as
//! [`Term::Variable`](crate::Term::Variable); a quantifier that rebinds a
//! name shadows the outer binding inside its body.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::{Atom, Name};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    /// The empty conjunction.
    True,
    Atom(Atom),
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Exists(Name, Box<Formula>),
    ForAll(Name, Box<Formula>),
}

impl From<Atom> for Formula {
    fn from(atom: Atom) -> Self {
        Formula::Atom(atom)
    }
}

impl Formula {
    pub fn negate(self) -> Self {
        Formula::Not(Box::new(self))
    }

    pub fn and(self, other: Formula) -> Self {
        Formula::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Formula) -> Self {
        Formula::Or(Box::new(self), Box::new(other))
    }

    pub fn exists(variable: impl Into<Name>, body: Formula) -> Self {
        Formula::Exists(variable.into(), Box::new(body))
    }

    pub fn for_all(variable: impl Into<Name>, body: Formula) -> Self {
        Formula::ForAll(variable.into(), Box::new(body))
    }

    /// Left-nested conjunction of `parts`; `True` when empty.
    pub fn conjunction(parts: impl IntoIterator<Item = Formula>) -> Self {
        parts
            .into_iter()
            .reduce(Formula::and)
            .unwrap_or(Formula::True)
    }

    /// Every atom, left to right.
    pub fn atoms(&self) -> Vec<&Atom> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a Atom>) {
        match self {
            Formula::True => {}
            Formula::Atom(atom) => out.push(atom),
            Formula::Not(inner) | Formula::Exists(_, inner) | Formula::ForAll(_, inner) => {
                inner.collect_atoms(out)
            }
            Formula::And(left, right) | Formula::Or(left, right) => {
                left.collect_atoms(out);
                right.collect_atoms(out);
            }
        }
    }

    pub fn relations(&self) -> BTreeSet<&str> {
        self.atoms()
            .into_iter()
            .map(|atom| atom.relation.as_str())
            .collect()
    }

    /// Variables with an occurrence outside any quantifier binding them.
    pub fn free_variables(&self) -> BTreeSet<&str> {
        let mut free = BTreeSet::new();
        self.collect_free(&mut Vec::new(), &mut free);
        free
    }

    fn collect_free<'a>(&'a self, bound: &mut Vec<&'a str>, free: &mut BTreeSet<&'a str>) {
        match self {
            Formula::True => {}
            Formula::Atom(atom) => free.extend(atom.variables().filter(|v| !bound.contains(v))),
            Formula::Not(inner) => inner.collect_free(bound, free),
            Formula::And(left, right) | Formula::Or(left, right) => {
                left.collect_free(bound, free);
                right.collect_free(bound, free);
            }
            Formula::Exists(variable, inner) | Formula::ForAll(variable, inner) => {
                bound.push(variable);
                inner.collect_free(bound, free);
                bound.pop();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.free_variables().is_empty()
    }

    /// For each atom, the positions where `variable` occurs free.
    ///
    /// Atoms under a quantifier that rebinds `variable` report no positions.
    pub fn free_positions(&self, variable: &str) -> Vec<(&Atom, Vec<usize>)> {
        let mut out = Vec::new();
        self.collect_positions(variable, true, &mut out);
        out
    }

    fn collect_positions<'a>(
        &'a self,
        variable: &str,
        visible: bool,
        out: &mut Vec<(&'a Atom, Vec<usize>)>,
    ) {
        match self {
            Formula::True => {}
            Formula::Atom(atom) => {
                let positions = if visible {
                    atom.terms
                        .iter()
                        .enumerate()
                        .filter(|(_, term)| term.as_variable() == Some(variable))
                        .map(|(idx, _)| idx)
                        .collect()
                } else {
                    Vec::new()
                };
                out.push((atom, positions));
            }
            Formula::Not(inner) => inner.collect_positions(variable, visible, out),
            Formula::And(left, right) | Formula::Or(left, right) => {
                left.collect_positions(variable, visible, out);
                right.collect_positions(variable, visible, out);
            }
            Formula::Exists(bound, inner) | Formula::ForAll(bound, inner) => {
                inner.collect_positions(variable, visible && bound != variable, out)
            }
        }
    }

    /// Replace the free occurrences of `variable` with `constant`.
    pub fn substitute(&self, variable: &str, constant: &str) -> Formula {
        match self {
            Formula::True => Formula::True,
            Formula::Atom(atom) => Formula::Atom(atom.substitute(variable, constant)),
            Formula::Not(inner) => inner.substitute(variable, constant).negate(),
            Formula::And(left, right) => left
                .substitute(variable, constant)
                .and(right.substitute(variable, constant)),
            Formula::Or(left, right) => left
                .substitute(variable, constant)
                .or(right.substitute(variable, constant)),
            Formula::Exists(bound, _) | Formula::ForAll(bound, _) if bound == variable => {
                self.clone()
            }
            Formula::Exists(bound, inner) => {
                Formula::exists(bound.clone(), inner.substitute(variable, constant))
            }
            Formula::ForAll(bound, inner) => {
                Formula::for_all(bound.clone(), inner.substitute(variable, constant))
            }
        }
    }
}

/// Logical form, e.g. `∃x (R(x, c) ∧ ¬S(x))`.
impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => f.write_str("true"),
            Formula::Atom(atom) => write!(f, "{atom}"),
            Formula::Not(inner) => write!(f, "¬{inner}"),
            Formula::And(left, right) => write!(f, "({left} ∧ {right})"),
            Formula::Or(left, right) => write!(f, "({left} ∨ {right})"),
            Formula::Exists(variable, inner) => write!(f, "∃{variable} {inner}"),
            Formula::ForAll(variable, inner) => write!(f, "∀{variable} {inner}"),
        }
    }
}

/// Render a formula in the syntax accepted by [`crate::parse_formula`].
///
/// A constant spelled like a variable bound around it would read back as
/// that variable.
pub fn format_formula(formula: &Formula) -> String {
    match formula {
        Formula::True => "true".to_string(),
        Formula::Atom(atom) => atom.to_string(),
        Formula::Not(inner) => format!("not({})", format_formula(inner)),
        Formula::And(left, right) => {
            format!("and({}, {})", format_formula(left), format_formula(right))
        }
        Formula::Or(left, right) => {
            format!("or({}, {})", format_formula(left), format_formula(right))
        }
        Formula::Exists(variable, inner) => format!("exist({variable}, {})", format_formula(inner)),
        Formula::ForAll(variable, inner) => format!("forall({variable}, {})", format_formula(inner)),
    }
}
