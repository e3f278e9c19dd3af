//! Surface syntax for conjunctive queries.
//!
//! ```text
//! query    := [varlist "|"] atomlist
//! varlist  := ident ("," ident)*
//! atomlist := atom ("," atom)*
//! atom     := ident "(" [term ("," term)*] ")"
//! ```
//!
//! A term is a variable iff its name is listed in `varlist`; everything else
//! is a constant. Whitespace between tokens is ignored. Arity is not checked
//! here: each atom keeps the number of terms it was written with.
//!
//! [`parse_formula`] reads the prefix syntax for general formulas
//! (`and`, `or`, `not`, `exist`, `forall`).

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char as pchar, multispace0},
    combinator::{all_consuming, recognize},
    multi::{many1, separated_list0, separated_list1},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

use crate::formula::Formula;
use crate::query::{Atom, Name, Query, QueryError, Term};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("query is empty")]
    Empty,
    #[error("unbalanced parentheses at offset {offset}")]
    UnbalancedParens { offset: usize },
    #[error("`|` may appear at most once (another one at offset {offset})")]
    MultipleSeparators { offset: usize },
    #[error("parse error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("invalid query: {0}")]
    Invalid(#[from] QueryError),
}

pub fn parse_query(text: &str) -> Result<Query, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    check_balanced_parens(text)?;

    let mut bars = text.match_indices('|').map(|(idx, _)| idx);
    let (variables, atoms_text, atoms_offset) = match bars.next() {
        None => (Vec::new(), text, 0),
        Some(bar) => {
            if let Some(offset) = bars.next() {
                return Err(ParseError::MultipleSeparators { offset });
            }
            let variables = parse_variable_list(&text[..bar])?;
            (variables, &text[bar + 1..], bar + 1)
        }
    };

    let atoms = parse_atom_list(atoms_text, atoms_offset)?
        .into_iter()
        .map(|(relation, terms)| {
            let terms = terms
                .into_iter()
                .map(|name| {
                    if variables.iter().any(|v| v == name) {
                        Term::variable(name)
                    } else {
                        Term::constant(name)
                    }
                })
                .collect();
            Atom::new(relation, terms)
        })
        .collect();

    Ok(Query::new(variables, atoms)?)
}

/// Reports a stray `)` or the innermost `(` left open.
fn check_balanced_parens(text: &str) -> Result<(), ParseError> {
    let mut open = Vec::new();
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => open.push(idx),
            ')' => {
                if open.pop().is_none() {
                    return Err(ParseError::UnbalancedParens { offset: idx });
                }
            }
            _ => {}
        }
    }
    match open.last() {
        Some(&offset) => Err(ParseError::UnbalancedParens { offset }),
        None => Ok(()),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_term_char(c: char) -> bool {
    is_ident_continue(c) || c == '-' || c == '.'
}

fn parse_ident(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        take_while1(is_ident_start),
        take_while(is_ident_continue),
    )))(input)
}

fn parse_term(input: &str) -> IResult<&str, &str> {
    take_while1(is_term_char)(input)
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn parse_variable_list(text: &str) -> Result<Vec<Name>, ParseError> {
    fn parser(input: &str) -> IResult<&str, Vec<&str>> {
        terminated(separated_list1(pchar(','), ws(parse_ident)), multispace0)(input)
    }

    all_consuming(parser)(text)
        .map(|(_, names)| names.into_iter().map(str::to_string).collect())
        .map_err(|err| {
            syntax_error(
                text,
                0,
                err,
                "expected variable names separated by `,` before `|`",
            )
        })
}

type RawAtom<'a> = (&'a str, Vec<&'a str>);

fn parse_atom_list(text: &str, base: usize) -> Result<Vec<RawAtom<'_>>, ParseError> {
    fn atom(input: &str) -> IResult<&str, RawAtom<'_>> {
        let (input, relation) = preceded(multispace0, parse_ident)(input)?;
        let (input, _) = preceded(multispace0, pchar('('))(input)?;
        let (input, terms) = separated_list0(pchar(','), ws(parse_term))(input)?;
        let (input, _) = preceded(multispace0, pchar(')'))(input)?;
        let (input, _) = multispace0(input)?;
        Ok((input, (relation, terms)))
    }

    all_consuming(separated_list1(pchar(','), atom))(text)
        .map(|(_, atoms)| atoms)
        .map_err(|err| {
            syntax_error(
                text,
                base,
                err,
                "expected atoms `Name(term, ...)` separated by `,`",
            )
        })
}

// ============================================================================
// Formulas
// ============================================================================

/// Parse a formula in prefix syntax:
///
/// ```text
/// formula := "true" | atom
///          | "not" "(" formula ")"
///          | ("and" | "or") "(" formula ("," formula)+ ")"
///          | ("exist" | "forall") "(" ident "," formula ")"
/// ```
///
/// A name is a variable inside the body of a quantifier that binds it and a
/// constant everywhere else. `and`/`or` with more than two operands nest to
/// the left. The keywords are not available as relation names.
pub fn parse_formula(text: &str) -> Result<Formula, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    check_balanced_parens(text)?;

    let (_, raw) = all_consuming(terminated(raw_formula, multispace0))(text)
        .map_err(|err| syntax_error(text, 0, err, "expected a formula"))?;
    Ok(resolve(raw, &mut Vec::new()))
}

/// A formula whose names are not yet split into variables and constants.
enum RawFormula<'a> {
    True,
    Atom(&'a str, Vec<&'a str>),
    Not(Box<RawFormula<'a>>),
    And(Box<RawFormula<'a>>, Vec<RawFormula<'a>>),
    Or(Box<RawFormula<'a>>, Vec<RawFormula<'a>>),
    Exists(&'a str, Box<RawFormula<'a>>),
    ForAll(&'a str, Box<RawFormula<'a>>),
}

fn comma(input: &str) -> IResult<&str, char> {
    preceded(multispace0, pchar(','))(input)
}

fn raw_formula(input: &str) -> IResult<&str, RawFormula<'_>> {
    let (rest, name) = preceded(multispace0, parse_ident)(input)?;
    if name == "true" {
        return Ok((rest, RawFormula::True));
    }
    let (rest, _) = preceded(multispace0, pchar('('))(rest)?;

    let (rest, formula) = match name {
        "not" => {
            let (rest, inner) = raw_formula(rest)?;
            (rest, RawFormula::Not(Box::new(inner)))
        }
        "and" | "or" => {
            let (rest, first) = raw_formula(rest)?;
            let (rest, others) = many1(preceded(comma, raw_formula))(rest)?;
            let first = Box::new(first);
            if name == "and" {
                (rest, RawFormula::And(first, others))
            } else {
                (rest, RawFormula::Or(first, others))
            }
        }
        "exist" | "forall" => {
            let (rest, variable) = preceded(multispace0, parse_ident)(rest)?;
            let (rest, body) = preceded(comma, raw_formula)(rest)?;
            let body = Box::new(body);
            if name == "exist" {
                (rest, RawFormula::Exists(variable, body))
            } else {
                (rest, RawFormula::ForAll(variable, body))
            }
        }
        relation => {
            let (rest, terms) = separated_list0(pchar(','), ws(parse_term))(rest)?;
            (rest, RawFormula::Atom(relation, terms))
        }
    };

    let (rest, _) = preceded(multispace0, pchar(')'))(rest)?;
    Ok((rest, formula))
}

fn resolve<'a>(raw: RawFormula<'a>, scope: &mut Vec<&'a str>) -> Formula {
    match raw {
        RawFormula::True => Formula::True,
        RawFormula::Atom(relation, names) => {
            let terms = names
                .into_iter()
                .map(|name| {
                    if scope.contains(&name) {
                        Term::variable(name)
                    } else {
                        Term::constant(name)
                    }
                })
                .collect();
            Formula::Atom(Atom::new(relation, terms))
        }
        RawFormula::Not(inner) => resolve(*inner, scope).negate(),
        RawFormula::And(first, others) => {
            let first = resolve(*first, scope);
            others
                .into_iter()
                .fold(first, |acc, part| acc.and(resolve(part, scope)))
        }
        RawFormula::Or(first, others) => {
            let first = resolve(*first, scope);
            others
                .into_iter()
                .fold(first, |acc, part| acc.or(resolve(part, scope)))
        }
        RawFormula::Exists(variable, body) => {
            scope.push(variable);
            let body = resolve(*body, scope);
            scope.pop();
            Formula::exists(variable, body)
        }
        RawFormula::ForAll(variable, body) => {
            scope.push(variable);
            let body = resolve(*body, scope);
            scope.pop();
            Formula::for_all(variable, body)
        }
    }
}

fn syntax_error(
    text: &str,
    base: usize,
    err: nom::Err<nom::error::Error<&str>>,
    message: &str,
) -> ParseError {
    let offset = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => base + text.len() - e.input.len(),
        nom::Err::Incomplete(_) => base + text.len(),
    };
    ParseError::Syntax {
        offset,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::format_formula;

    #[test]
    fn parses_ground_atom() {
        let query = parse_query("R(a, b)").expect("parse");
        assert!(query.variables().is_empty());
        assert_eq!(
            query.atoms(),
            &[Atom::new("R", vec![Term::constant("a"), Term::constant("b")])]
        );
        assert!(query.is_ground());
    }

    #[test]
    fn declared_names_become_variables() {
        let query = parse_query("x, y | R(x, y), S(x)").expect("parse");
        assert_eq!(query.variables(), ["x".to_string(), "y".to_string()].as_slice());
        assert_eq!(
            query.atoms()[0].terms,
            vec![Term::variable("x"), Term::variable("y")]
        );
        assert_eq!(query.atoms()[1].terms, vec![Term::variable("x")]);

        let mixed = parse_query("x | R(x, c)").expect("parse");
        assert_eq!(
            mixed.atoms()[0].terms,
            vec![Term::variable("x"), Term::constant("c")]
        );
    }

    #[test]
    fn whitespace_is_insignificant() {
        let spaced = parse_query("  x ,y|R ( x , y ) ,S(x)  ").expect("parse");
        let tight = parse_query("x,y|R(x,y),S(x)").expect("parse");
        assert_eq!(spaced, tight);
    }

    #[test]
    fn accepts_nullary_atoms_and_numeric_constants() {
        let query = parse_query("Flag(), Age(alice, 42), Born(alice, 1990-01-02)").expect("parse");
        assert_eq!(query.atoms()[0].arity(), 0);
        assert_eq!(
            query.atoms()[2].ground_tuple(),
            Some(vec!["alice", "1990-01-02"])
        );
    }

    #[test]
    fn rejects_unbalanced_parentheses() {
        assert_eq!(
            parse_query("R(a, b"),
            Err(ParseError::UnbalancedParens { offset: 1 })
        );
        assert_eq!(
            parse_query("R(a))"),
            Err(ParseError::UnbalancedParens { offset: 4 })
        );
    }

    #[test]
    fn rejects_empty_relation_name_and_bad_terms() {
        assert!(matches!(
            parse_query("(a)"),
            Err(ParseError::Syntax { offset: 0, .. })
        ));
        assert!(matches!(parse_query("R(a, b!)"), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse_query("R(a,,b)"), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse_query("R(a,)"), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn reports_offset_of_missing_separator() {
        assert!(matches!(
            parse_query("R(a) S(b)"),
            Err(ParseError::Syntax { offset: 5, .. })
        ));
        assert!(matches!(
            parse_query("x | R(x) S(x)"),
            Err(ParseError::Syntax { offset: 9, .. })
        ));
    }

    #[test]
    fn rejects_malformed_variable_lists() {
        assert!(matches!(parse_query("| R(a)"), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse_query("x, | R(x)"), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse_query("x |"), Err(ParseError::Syntax { .. })));
        assert_eq!(
            parse_query("x | y | R(x)"),
            Err(ParseError::MultipleSeparators { offset: 6 })
        );
        assert_eq!(parse_query("   "), Err(ParseError::Empty));
    }

    #[test]
    fn parses_prefix_formulas() {
        let or = parse_formula("or(r1(x, y, z), r2(u, v, w))").expect("parse");
        assert_eq!(format_formula(&or), "or(r1(x, y, z), r2(u, v, w))");
        assert!(or.atoms().iter().all(|atom| atom.is_ground()));

        let forall = parse_formula("forall(x, r(x, y))").expect("parse");
        assert_eq!(
            forall,
            Formula::for_all(
                "x",
                Atom::new("r", vec![Term::variable("x"), Term::constant("y")]).into()
            )
        );

        let exist = parse_formula("exist(y, and(r1(x, y), r2(y, z)))").expect("parse");
        assert_eq!(exist.to_string(), "∃y (r1(x, y) ∧ r2(y, z))");
        assert_eq!(exist.free_variables().len(), 0);
        assert_eq!(
            exist.atoms()[1].terms,
            vec![Term::variable("y"), Term::constant("z")]
        );
    }

    #[test]
    fn formula_connectives_nest_left() {
        let formula = parse_formula(" and( A() , B(), not( C(a) ), true )").expect("parse");
        let a: Formula = Atom::new("A", vec![]).into();
        let b: Formula = Atom::new("B", vec![]).into();
        let c: Formula = Atom::new("C", vec![Term::constant("a")]).into();
        assert_eq!(formula, a.and(b).and(c.negate()).and(Formula::True));
    }

    #[test]
    fn rebinding_quantifier_scopes_its_body() {
        let formula = parse_formula("exist(x, or(R(x), forall(x, S(x, y))))").expect("parse");
        assert!(formula.is_closed());
        assert_eq!(
            format_formula(&formula),
            "exist(x, or(R(x), forall(x, S(x, y))))"
        );
    }

    #[test]
    fn rejects_malformed_formulas() {
        assert_eq!(parse_formula(""), Err(ParseError::Empty));
        assert_eq!(
            parse_formula("not(R(a)"),
            Err(ParseError::UnbalancedParens { offset: 3 })
        );
        assert!(matches!(parse_formula("and(R(a))"), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse_formula("forall(R(a))"), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse_formula("not"), Err(ParseError::Syntax { .. })));
        assert!(matches!(
            parse_formula("R(a) S(b)"),
            Err(ParseError::Syntax { offset: 5, .. })
        ));
    }

    #[test]
    fn surfaces_query_invariant_violations() {
        assert_eq!(
            parse_query("x, x | R(x)"),
            Err(ParseError::Invalid(QueryError::DuplicateVariable("x".into())))
        );
        assert_eq!(
            parse_query("x | R(x), R(a)"),
            Err(ParseError::Invalid(QueryError::RepeatedRelation("R".into())))
        );
    }
}
