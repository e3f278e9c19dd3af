//! Exact query probabilities over tuple-independent stores.
//!
//! Supports boolean conjunctive queries that are non-repeating (each
//! relation in at most one atom) and hierarchical (any two variables'
//! atom sets are nested or disjoint). On that class the probability is
//! computed exactly, in time polynomial in the active domain, by the
//! recursion in [`evaluator`]. Anything else is rejected up front with
//! [`UnsupportedQueryError`].
//!
//! Closed first-order [`Formula`](probdb_dsl::Formula)s with negation,
//! disjunction and universal quantifiers are evaluated by
//! [`evaluate_formula`] when every step is independent or separable; see
//! [`query_formula`] for the conjunctive case written as a formula.
//!
//! ```
//! use probdb_dsl::parse_query;
//! use probdb_eval::evaluate;
//! use probdb_store::Store;
//!
//! let mut store = Store::new();
//! store.add("R", ["a", "c"], 0.6)?;
//! store.add("R", ["b", "c"], 0.7)?;
//!
//! let query = parse_query("x | R(x, c)")?;
//! let p = evaluate(&query, &store)?;
//! assert!((p - 0.88).abs() < 1e-9);
//!
//! let none = probdb_eval::formula_probability(
//!     "forall(x, not(R(x, c)))",
//!     &store,
//!     &Default::default(),
//! )?;
//! assert!((none - 0.12).abs() < 1e-9);
//! # Ok::<(), probdb_eval::Error>(())
//! ```

mod error;
pub mod evaluator;
mod formula;
mod hierarchy;
mod plan;

pub use error::{Error, UnsupportedQueryError};
pub use evaluator::{
    evaluate, evaluate_formula, evaluate_formula_with, evaluate_with, formula_probability,
    probability, EvalOptions, Evaluation, Evaluator, Rule, TraceStep,
};
pub use formula::{is_separator, query_formula};
pub use hierarchy::{check_hierarchical, is_hierarchical, occurrences};
