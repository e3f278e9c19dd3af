//! Recursive evaluation of hierarchical, non-repeating conjunctive queries.
//!
//! Each sub-formula is classified into one rule (see [`crate::plan`]):
//!
//! - ground: `∏ lookup(atom)`, independent tuples of distinct relations;
//! - split: `∏ P(group)`, groups share no variable and so no tuple;
//! - eliminate `x`: `1 − ∏_v (1 − P(φ[x := v]))`, since distinct `v` put
//!   distinct constants in the same column of every atom and the branches
//!   therefore read disjoint tuples.
//!
//! General [`Formula`]s add negation, disjunction and universal
//! quantification when each step is independent or separable (see
//! [`is_separator`](crate::is_separator)).
//!
//! The active domain is snapshotted once per evaluation and threaded
//! through the recursion, so a call depends only on `(query, store)`.

use std::fmt;

use parking_lot::Mutex;
use probdb_dsl::{parse_formula, parse_query, Atom, Formula, Name, Query};
use probdb_store::Store;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, UnsupportedQueryError};
use crate::formula::{classify_formula, FormulaStep};
use crate::hierarchy::check_hierarchical;
use crate::plan::{classify, describe, Step};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalOptions {
    /// Emit a `tracing` event and record a [`TraceStep`] per sub-formula.
    pub trace: bool,
    /// Evaluate independent branches on the rayon pool. Ignored without the
    /// `parallel` feature.
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    Ground { atoms: usize },
    Split { groups: usize },
    Eliminate { variable: Name, branches: usize },
    Negate,
    Disjoin,
    Universal { variable: Name, branches: usize },
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Ground { atoms } => write!(f, "ground({atoms})"),
            Rule::Split { groups } => write!(f, "split({groups})"),
            Rule::Eliminate { variable, branches } => write!(f, "eliminate({variable}, {branches})"),
            Rule::Negate => f.write_str("negate"),
            Rule::Disjoin => f.write_str("disjoin"),
            Rule::Universal { variable, branches } => write!(f, "universal({variable}, {branches})"),
        }
    }
}

/// One evaluated sub-formula.
///
/// Steps are recorded children-first. With `parallel` set, sibling order
/// is unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub depth: usize,
    pub rule: Rule,
    pub formula: String,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub probability: f64,
    /// Empty unless [`EvalOptions::trace`] is set.
    pub trace: Vec<TraceStep>,
}

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    options: EvalOptions,
}

impl Evaluator {
    pub fn new(options: EvalOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn evaluate(&self, query: &Query, store: &Store) -> Result<Evaluation, UnsupportedQueryError> {
        if let Err(err) = check_hierarchical(query) {
            tracing::warn!(query = %query, error = %err, "rejected query");
            return Err(err);
        }

        tracing::debug!(
            query = %query,
            atoms = query.atoms().len(),
            domain = store.domain().len(),
            "evaluating query"
        );
        self.run(store, query.variables(), |run| run.eval(query.atoms(), 0))
    }

    /// Evaluate a closed formula. Each step must be a lookup, a negation,
    /// a connective over disjoint relations, or a quantifier over a
    /// separator variable; the first that is not is reported.
    pub fn evaluate_formula(
        &self,
        formula: &Formula,
        store: &Store,
    ) -> Result<Evaluation, UnsupportedQueryError> {
        if let Some(variable) = formula.free_variables().into_iter().next() {
            let err = UnsupportedQueryError::FreeVariable {
                variable: variable.to_string(),
                formula: formula.to_string(),
            };
            tracing::warn!(formula = %formula, error = %err, "rejected formula");
            return Err(err);
        }

        tracing::debug!(formula = %formula, domain = store.domain().len(), "evaluating formula");
        self.run(store, &[], |run| run.eval_formula(formula, 0))
            .map_err(|err| {
                tracing::warn!(formula = %formula, error = %err, "rejected formula");
                err
            })
    }

    fn run<F>(&self, store: &Store, order: &[Name], eval: F) -> Result<Evaluation, UnsupportedQueryError>
    where
        F: FnOnce(&Run<'_>) -> Result<f64, UnsupportedQueryError>,
    {
        let domain: Vec<&str> = store.domain().iter().map(String::as_str).collect();
        let sink = self.options.trace.then(|| Mutex::new(Vec::new()));
        let run = Run {
            store,
            domain: &domain,
            order,
            #[cfg(feature = "parallel")]
            parallel: self.options.parallel,
            sink: sink.as_ref(),
        };
        let probability = eval(&run)?;
        let trace = sink.map(Mutex::into_inner).unwrap_or_default();
        Ok(Evaluation { probability, trace })
    }
}

/// Probability that `query` holds in a random world of `store`.
pub fn evaluate(query: &Query, store: &Store) -> Result<f64, UnsupportedQueryError> {
    Evaluator::default()
        .evaluate(query, store)
        .map(|evaluation| evaluation.probability)
}

pub fn evaluate_with(
    query: &Query,
    store: &Store,
    options: &EvalOptions,
) -> Result<Evaluation, UnsupportedQueryError> {
    Evaluator::new(*options).evaluate(query, store)
}

/// Parse `text` and evaluate it against `store`.
pub fn probability(text: &str, store: &Store, options: &EvalOptions) -> Result<f64, Error> {
    let query = parse_query(text)?;
    Ok(evaluate_with(&query, store, options)?.probability)
}

pub fn evaluate_formula(formula: &Formula, store: &Store) -> Result<f64, UnsupportedQueryError> {
    Evaluator::default()
        .evaluate_formula(formula, store)
        .map(|evaluation| evaluation.probability)
}

pub fn evaluate_formula_with(
    formula: &Formula,
    store: &Store,
    options: &EvalOptions,
) -> Result<Evaluation, UnsupportedQueryError> {
    Evaluator::new(*options).evaluate_formula(formula, store)
}

/// Parse `text` as a formula and evaluate it against `store`.
pub fn formula_probability(text: &str, store: &Store, options: &EvalOptions) -> Result<f64, Error> {
    let formula = parse_formula(text)?;
    Ok(evaluate_formula_with(&formula, store, options)?.probability)
}

struct Run<'a> {
    store: &'a Store,
    domain: &'a [&'a str],
    order: &'a [Name],
    #[cfg(feature = "parallel")]
    parallel: bool,
    sink: Option<&'a Mutex<Vec<TraceStep>>>,
}

impl Run<'_> {
    fn eval(&self, atoms: &[Atom], depth: usize) -> Result<f64, UnsupportedQueryError> {
        let (rule, probability) = match classify(atoms, self.order)? {
            Step::Ground(lookups) => {
                let p = lookups
                    .iter()
                    .map(|(relation, tuple)| self.store.lookup(relation, tuple))
                    .product::<f64>();
                (Rule::Ground { atoms: lookups.len() }, p)
            }
            Step::Split(groups) => {
                let p = self
                    .branches(&groups, |group| self.eval(group, depth + 1))?
                    .into_iter()
                    .product::<f64>();
                (Rule::Split { groups: groups.len() }, p)
            }
            Step::Eliminate(variable) => {
                let none = self
                    .branches(self.domain, |constant| {
                        let grounded: Vec<Atom> = atoms
                            .iter()
                            .map(|atom| atom.substitute(variable, constant))
                            .collect();
                        self.eval(&grounded, depth + 1)
                    })?
                    .into_iter()
                    .map(|p| 1.0 - p)
                    .product::<f64>();
                let rule = Rule::Eliminate {
                    variable: variable.to_string(),
                    branches: self.domain.len(),
                };
                (rule, 1.0 - none)
            }
        };

        self.record(depth, rule, || describe(atoms, self.order), probability);
        Ok(probability)
    }

    fn eval_formula(&self, formula: &Formula, depth: usize) -> Result<f64, UnsupportedQueryError> {
        let (rule, probability) = match classify_formula(formula)? {
            FormulaStep::Lookup(None) => (Rule::Ground { atoms: 0 }, 1.0),
            FormulaStep::Lookup(Some((relation, tuple))) => {
                (Rule::Ground { atoms: 1 }, self.store.lookup(relation, &tuple[..]))
            }
            FormulaStep::Negate(inner) => (Rule::Negate, 1.0 - self.eval_formula(inner, depth + 1)?),
            FormulaStep::Conjoin(left, right) => {
                let operands = [left, right];
                let p = self
                    .branches(&operands[..], |operand| self.eval_formula(operand, depth + 1))?
                    .into_iter()
                    .product::<f64>();
                (Rule::Split { groups: 2 }, p)
            }
            FormulaStep::Disjoin(left, right) => {
                let operands = [left, right];
                let none = self
                    .branches(&operands[..], |operand| self.eval_formula(operand, depth + 1))?
                    .into_iter()
                    .map(|p| 1.0 - p)
                    .product::<f64>();
                (Rule::Disjoin, 1.0 - none)
            }
            FormulaStep::Exists(variable, body) => {
                let none = self
                    .branches(self.domain, |constant| {
                        self.eval_formula(&body.substitute(variable, constant), depth + 1)
                    })?
                    .into_iter()
                    .map(|p| 1.0 - p)
                    .product::<f64>();
                let rule = Rule::Eliminate {
                    variable: variable.to_string(),
                    branches: self.domain.len(),
                };
                (rule, 1.0 - none)
            }
            FormulaStep::ForAll(variable, body) => {
                let all = self
                    .branches(self.domain, |constant| {
                        self.eval_formula(&body.substitute(variable, constant), depth + 1)
                    })?
                    .into_iter()
                    .product::<f64>();
                let rule = Rule::Universal {
                    variable: variable.to_string(),
                    branches: self.domain.len(),
                };
                (rule, all)
            }
        };

        self.record(depth, rule, || formula.to_string(), probability);
        Ok(probability)
    }

    fn record(&self, depth: usize, rule: Rule, formula: impl FnOnce() -> String, probability: f64) {
        if let Some(sink) = self.sink {
            let formula = formula();
            tracing::debug!(depth, rule = %rule, formula = %formula, probability, "evaluated sub-formula");
            sink.lock().push(TraceStep {
                depth,
                rule,
                formula,
                probability,
            });
        }
    }

    /// Evaluate independent branches; results come back in `items` order.
    fn branches<T, F>(&self, items: &[T], f: F) -> Result<Vec<f64>, UnsupportedQueryError>
    where
        T: Sync,
        F: Fn(&T) -> Result<f64, UnsupportedQueryError> + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            if self.parallel && items.len() > 1 {
                return items.par_iter().map(f).collect();
            }
        }
        items.iter().map(f).collect()
    }
}
