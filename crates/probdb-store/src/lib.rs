//! Tuple-independent probabilistic relation store.
//!
//! Every stored `(relation, tuple)` pair is an independent Bernoulli random
//! variable with the stored probability. Tuples that were never added are
//! certainly absent (probability 0), not unknown.
//!
//! The store is populated through [`Store::add`] and then read by any
//! number of evaluations through `&Store`; reads never mutate it.
//!
//! Constants are interned internally; the ids never leave the crate.
//!
//! ```compile_fail
//! use probdb_store::ConstId;
//! ```

mod interner;

use std::collections::BTreeSet;

use ahash::AHashMap;
use probdb_dsl::{Name, Term};
use thiserror::Error;

use interner::{ConstId, ConstInterner};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("relation name must not be empty")]
    EmptyRelation,
    #[error("probability {probability} for `{relation}` is not a number in [0, 1]")]
    ProbabilityOutOfRange { relation: Name, probability: f64 },
    #[error("element {position} of the `{relation}` tuple is the variable `{variable}`, expected a constant")]
    NonGroundElement {
        relation: Name,
        position: usize,
        variable: Name,
    },
    #[error("`{relation}` has arity {expected} but the tuple has {found} elements")]
    ArityMismatch {
        relation: Name,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone)]
struct Relation {
    /// Fixed by the first tuple added.
    arity: usize,
    tuples: AHashMap<Vec<ConstId>, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Store {
    relations: AHashMap<Name, Relation>,
    constants: ConstInterner,
    /// Constants of stored tuples, extended on every successful `add`.
    domain: BTreeSet<Name>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the probability of a ground tuple.
    ///
    /// Tuple elements convert into [`Term`]s; plain strings are constants.
    /// Nothing is written unless every check passes.
    pub fn add<I, T>(&mut self, relation: &str, tuple: I, probability: f64) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Term>,
    {
        if relation.is_empty() {
            return Err(ValidationError::EmptyRelation);
        }
        if !(0.0..=1.0).contains(&probability) {
            return Err(ValidationError::ProbabilityOutOfRange {
                relation: relation.to_string(),
                probability,
            });
        }
        // Store +0.0 for -0.0.
        let probability = probability + 0.0;

        let mut constants = Vec::new();
        for (position, item) in tuple.into_iter().enumerate() {
            match item.into() {
                Term::Constant(name) => constants.push(name),
                Term::Variable(variable) => {
                    return Err(ValidationError::NonGroundElement {
                        relation: relation.to_string(),
                        position,
                        variable,
                    });
                }
            }
        }

        if let Some(existing) = self.relations.get(relation) {
            if existing.arity != constants.len() {
                return Err(ValidationError::ArityMismatch {
                    relation: relation.to_string(),
                    expected: existing.arity,
                    found: constants.len(),
                });
            }
        }

        let key: Vec<ConstId> = constants
            .iter()
            .map(|name| self.constants.intern(name))
            .collect();
        self.domain.extend(constants);
        let entry = self
            .relations
            .entry(relation.to_string())
            .or_insert_with(|| Relation {
                arity: key.len(),
                tuples: AHashMap::new(),
            });
        if let Some(previous) = entry.tuples.insert(key, probability) {
            tracing::debug!(relation, previous, probability, "overwrote tuple probability");
        }
        Ok(())
    }

    /// Stored probability of a ground tuple; 0 for anything never added.
    pub fn lookup<S: AsRef<str>>(&self, relation: &str, tuple: &[S]) -> f64 {
        let Some(rel) = self.relations.get(relation) else {
            return 0.0;
        };
        if rel.arity != tuple.len() {
            return 0.0;
        }
        let mut key = Vec::with_capacity(tuple.len());
        for item in tuple {
            let Some(id) = self.constants.id_of(item.as_ref()) else {
                return 0.0;
            };
            key.push(id);
        }
        rel.tuples.get(key.as_slice()).copied().unwrap_or(0.0)
    }

    /// The active domain: every constant that occurs in a stored tuple, sorted.
    pub fn domain(&self) -> &BTreeSet<Name> {
        &self.domain
    }

    /// Constants occurring at `position` in `relation`.
    pub fn values_at(&self, relation: &str, position: usize) -> BTreeSet<&str> {
        let Some(rel) = self.relations.get(relation) else {
            return BTreeSet::new();
        };
        self.constants_in(rel.tuples.keys().filter_map(|key| key.get(position)))
    }

    fn constants_in<'a>(&'a self, ids: impl Iterator<Item = &'a ConstId>) -> BTreeSet<&'a str> {
        ids.filter_map(|id| self.constants.name(*id)).collect()
    }

    /// Stored tuples of `relation` with their probabilities, in no particular order.
    pub fn tuples<'a>(&'a self, relation: &str) -> impl Iterator<Item = (Vec<&'a str>, f64)> + 'a {
        self.relations
            .get(relation)
            .into_iter()
            .flat_map(|rel| rel.tuples.iter())
            .map(move |(key, probability)| {
                let tuple = key
                    .iter()
                    .filter_map(|id| self.constants.name(*id))
                    .collect();
                (tuple, *probability)
            })
    }

    pub fn arity(&self, relation: &str) -> Option<usize> {
        self.relations.get(relation).map(|rel| rel.arity)
    }

    /// Relation names, sorted.
    pub fn relations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.relations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of stored tuples across all relations.
    pub fn len(&self) -> usize {
        self.relations.values().map(|rel| rel.tuples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
