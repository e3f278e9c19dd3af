//! Query data model: terms, atoms and non-repeating conjunctive queries.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Name = String;

// ============================================================================
// Terms and atoms
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "tag", content = "name", rename_all = "snake_case")]
pub enum Term {
    Constant(Name),
    Variable(Name),
}

impl Term {
    pub fn constant(name: impl Into<Name>) -> Self {
        Term::Constant(name.into())
    }

    pub fn variable(name: impl Into<Name>) -> Self {
        Term::Variable(name.into())
    }

    pub fn is_ground(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&str> {
        match self {
            Term::Constant(name) => Some(name),
            Term::Variable(_) => None,
        }
    }

    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Term::Variable(name) => Some(name),
            Term::Constant(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Term::Constant(name) | Term::Variable(name) => name,
        }
    }
}

/// Bare strings are constants; variables are always explicit.
impl From<&str> for Term {
    fn from(name: &str) -> Self {
        Term::Constant(name.to_string())
    }
}

impl From<String> for Term {
    fn from(name: String) -> Self {
        Term::Constant(name)
    }
}

impl From<&String> for Term {
    fn from(name: &String) -> Self {
        Term::Constant(name.clone())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    pub relation: Name,
    pub terms: Vec<Term>,
}

impl Atom {
    pub fn new(relation: impl Into<Name>, terms: Vec<Term>) -> Self {
        Self {
            relation: relation.into(),
            terms,
        }
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_ground)
    }

    /// Variable names in positional order (repeats included).
    pub fn variables(&self) -> impl Iterator<Item = &str> + '_ {
        self.terms.iter().filter_map(Term::as_variable)
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.variables().any(|v| v == name)
    }

    /// The constants of a ground atom, or `None` if any variable remains.
    pub fn ground_tuple(&self) -> Option<Vec<&str>> {
        self.terms.iter().map(Term::as_constant).collect()
    }

    /// Replace every occurrence of `variable` with `constant`.
    ///
    /// A new atom is returned; `self` is left untouched.
    pub fn substitute(&self, variable: &str, constant: &str) -> Atom {
        let terms = self
            .terms
            .iter()
            .map(|term| match term {
                Term::Variable(name) if name == variable => Term::constant(constant),
                other => other.clone(),
            })
            .collect();
        Atom {
            relation: self.relation.clone(),
            terms,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.relation)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{term}")?;
        }
        f.write_str(")")
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("variable `{0}` is declared more than once")]
    DuplicateVariable(Name),
    #[error("variable `{variable}` in `{relation}` is not declared")]
    FreeVariable { variable: Name, relation: Name },
    #[error("relation `{0}` appears in more than one atom")]
    RepeatedRelation(Name),
    #[error("constant `{0}` has the same name as a declared variable")]
    ShadowedConstant(Name),
    #[error("relation name must not be empty")]
    EmptyRelation,
}

/// `∃ variables. atom_1 ∧ … ∧ atom_m`, with each relation used at most once.
///
/// Built through [`Query::new`] (or deserialization, which runs the same
/// checks), so a `Query` value always satisfies:
/// - every variable in an atom is declared,
/// - no relation name is repeated across atoms,
/// - no constant is spelled like a declared variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QueryRepr")]
pub struct Query {
    variables: Vec<Name>,
    atoms: Vec<Atom>,
}

#[derive(Deserialize)]
struct QueryRepr {
    #[serde(default)]
    variables: Vec<Name>,
    atoms: Vec<Atom>,
}

impl TryFrom<QueryRepr> for Query {
    type Error = QueryError;

    fn try_from(repr: QueryRepr) -> Result<Self, Self::Error> {
        Query::new(repr.variables, repr.atoms)
    }
}

impl Query {
    pub fn new(variables: Vec<Name>, atoms: Vec<Atom>) -> Result<Self, QueryError> {
        let mut declared = HashSet::new();
        for variable in &variables {
            if !declared.insert(variable.as_str()) {
                return Err(QueryError::DuplicateVariable(variable.clone()));
            }
        }

        let mut relations = HashSet::new();
        for atom in &atoms {
            if atom.relation.is_empty() {
                return Err(QueryError::EmptyRelation);
            }
            if !relations.insert(atom.relation.as_str()) {
                return Err(QueryError::RepeatedRelation(atom.relation.clone()));
            }
            for term in &atom.terms {
                match term {
                    Term::Variable(name) if !declared.contains(name.as_str()) => {
                        return Err(QueryError::FreeVariable {
                            variable: name.clone(),
                            relation: atom.relation.clone(),
                        });
                    }
                    Term::Constant(name) if declared.contains(name.as_str()) => {
                        return Err(QueryError::ShadowedConstant(name.clone()));
                    }
                    _ => {}
                }
            }
        }

        Ok(Self { variables, atoms })
    }

    /// A query without quantified variables.
    pub fn ground(atoms: Vec<Atom>) -> Result<Self, QueryError> {
        Self::new(Vec::new(), atoms)
    }

    /// Declared variables, in declaration order.
    pub fn variables(&self) -> &[Name] {
        &self.variables
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> + '_ {
        self.atoms.iter().map(|atom| atom.relation.as_str())
    }

    /// Declared variables that occur in at least one atom, in declaration order.
    pub fn variables_in_atoms(&self) -> Vec<&str> {
        self.variables
            .iter()
            .map(String::as_str)
            .filter(|v| self.atoms.iter().any(|atom| atom.contains_variable(v)))
            .collect()
    }

    pub fn is_ground(&self) -> bool {
        self.atoms.iter().all(Atom::is_ground)
    }
}

/// Logical form, e.g. `∃x ∃y R(x, y) ∧ S(x)`.
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for variable in &self.variables {
            write!(f, "∃{variable} ")?;
        }
        if self.atoms.is_empty() {
            return f.write_str("true");
        }
        for (i, atom) in self.atoms.iter().enumerate() {
            if i > 0 {
                f.write_str(" ∧ ")?;
            }
            write!(f, "{atom}")?;
        }
        Ok(())
    }
}

/// Render a query in the surface syntax accepted by [`crate::parse_query`].
pub fn format_query(query: &Query) -> String {
    let atoms = query
        .atoms
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if query.variables.is_empty() {
        atoms
    } else {
        format!("{} | {atoms}", query.variables.join(", "))
    }
}
