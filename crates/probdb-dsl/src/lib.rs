//! Boolean conjunctive queries over probabilistic relations.
//!
//! This crate holds the query data model (`Term`, `Atom`, `Query`) and the
//! parser for the textual surface syntax:
//!
//! ```text
//! x, y | R(x, y), S(x)
//! ```
//!
//! Names listed before `|` are existentially quantified variables; every
//! other bare name in an atom is a constant.
//!
//! General formulas with negation, disjunction and universal quantifiers
//! use a prefix syntax instead:
//!
//! ```text
//! exist(x, and(R(x, c), not(forall(y, S(x, y)))))
//! ```

pub mod formula;
pub mod parser;
pub mod query;

pub use formula::{format_formula, Formula};
pub use parser::{parse_formula, parse_query, ParseError};
pub use query::{format_query, Atom, Name, Query, QueryError, Term};
