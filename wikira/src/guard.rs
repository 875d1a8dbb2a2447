use std::collections::HashMap;
use std::fmt::{self, Write};

use chumsky::prelude::*;
use itertools::Itertools;
use thiserror::Error;

use crate::ParseError;

/// The binary relations of the guard language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `==`
    Eq,
    /// `!=`
    Neq,
    /// `>=`
    Geq,
    /// `>`
    Gt,
    /// `<=`
    Leq,
    /// `<`
    Lt,
}

impl Relation {
    /// Whether the relation holds between two concrete values.
    pub fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Relation::Eq => left == right,
            Relation::Neq => left != right,
            Relation::Geq => left >= right,
            Relation::Gt => left > right,
            Relation::Leq => left <= right,
            Relation::Lt => left < right,
        }
    }

    /// The operator token of the relation.
    pub fn token(self) -> &'static str {
        match self {
            Relation::Eq => "==",
            Relation::Neq => "!=",
            Relation::Geq => ">=",
            Relation::Gt => ">",
            Relation::Leq => "<=",
            Relation::Lt => "<",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A guard operand: a named variable (parameter, register or constant name)
/// or an integer literal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expression {
    /// A named variable.
    Variable(String),
    /// An integer literal.
    Constant(i64),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Variable(name) => f.write_str(name),
            Expression::Constant(value) => write!(f, "{value}"),
        }
    }
}

/// A guard formula over [`Expression`] leaves, mirroring the inequality
/// theory of the generator model. The parser builds the tree exactly as
/// grouped in the input and does not flatten nested chains.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WikiGuard {
    /// The trivial guard, printed as the empty string.
    True,
    /// Conjunction of the children.
    And(Vec<WikiGuard>),
    /// Disjunction of the children.
    Or(Vec<WikiGuard>),
    /// A binary relation between two operands.
    Rel {
        /// The relation.
        rel: Relation,
        /// Left operand.
        left: Expression,
        /// Right operand.
        right: Expression,
    },
}

impl WikiGuard {
    /// Creates a binary relation guard.
    pub fn rel(rel: Relation, left: Expression, right: Expression) -> Self {
        WikiGuard::Rel { rel, left, right }
    }

    /// Whether the guard trivially holds.
    pub fn is_trivially_true(&self) -> bool {
        match self {
            WikiGuard::True => true,
            WikiGuard::And(children) => children.is_empty(),
            _ => false,
        }
    }

    /// Evaluates the guard; integer literals stand for themselves, variables
    /// are looked up in `valuation`. Yields `None` if a variable is unbound.
    pub fn evaluate(&self, valuation: &HashMap<String, i64>) -> Option<bool> {
        match self {
            WikiGuard::True => Some(true),
            WikiGuard::And(children) => children
                .iter()
                .map(|child| child.evaluate(valuation))
                .fold_options(true, |acc, holds| acc && holds),
            WikiGuard::Or(children) => children
                .iter()
                .map(|child| child.evaluate(valuation))
                .fold_options(false, |acc, holds| acc || holds),
            WikiGuard::Rel { rel, left, right } => {
                let resolve = |expression: &Expression| match expression {
                    Expression::Variable(name) => valuation.get(name).copied(),
                    Expression::Constant(value) => Some(*value),
                };
                Some(rel.holds(resolve(left)?, resolve(right)?))
            }
        }
    }

    /// Rewrites `>=` into `> ∨ ==` and `<=` into `< ∨ ==`, recursively.
    pub fn simplify_inequalities(&self) -> WikiGuard {
        match self {
            WikiGuard::True => WikiGuard::True,
            WikiGuard::And(children) => {
                WikiGuard::And(children.iter().map(WikiGuard::simplify_inequalities).collect())
            }
            WikiGuard::Or(children) => {
                WikiGuard::Or(children.iter().map(WikiGuard::simplify_inequalities).collect())
            }
            WikiGuard::Rel { rel: Relation::Geq, left, right } => WikiGuard::Or(vec![
                WikiGuard::rel(Relation::Gt, left.clone(), right.clone()),
                WikiGuard::rel(Relation::Eq, left.clone(), right.clone()),
            ]),
            WikiGuard::Rel { rel: Relation::Leq, left, right } => WikiGuard::Or(vec![
                WikiGuard::rel(Relation::Lt, left.clone(), right.clone()),
                WikiGuard::rel(Relation::Eq, left.clone(), right.clone()),
            ]),
            rel @ WikiGuard::Rel { .. } => rel.clone(),
        }
    }

    /// Converts the guard into disjunctive normal form by distributing
    /// conjunctions over disjunctions, preserving child order.
    pub fn dnf(&self) -> DnfOr {
        match self {
            WikiGuard::True => DnfOr(vec![]),
            WikiGuard::Rel { .. } => DnfOr(vec![DnfAnd(vec![self.clone()])]),
            WikiGuard::Or(children) => {
                DnfOr(children.iter().flat_map(|child| child.dnf().0).collect())
            }
            WikiGuard::And(children) => children
                .iter()
                .map(WikiGuard::dnf)
                .reduce(DnfOr::distribute)
                .unwrap_or(DnfOr(vec![])),
        }
    }

    /// Formats the guard in the full Wiki dialect: every compound subformula
    /// and every relation is parenthesised, the trivial guard is the empty
    /// string.
    pub fn to_wiki_string(&self) -> String {
        let mut out = String::new();
        self.write_wiki(&mut out).unwrap();
        out
    }

    fn write_wiki<W: Write>(&self, w: &mut W) -> fmt::Result {
        match self {
            WikiGuard::True => Ok(()),
            WikiGuard::And(children) => {
                w.write_char('(')?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        w.write_str(" && ")?;
                    }
                    child.write_wiki(w)?;
                }
                w.write_char(')')
            }
            WikiGuard::Or(children) => {
                w.write_char('(')?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        w.write_str(" || ")?;
                    }
                    child.write_wiki(w)?;
                }
                w.write_char(')')
            }
            WikiGuard::Rel { rel, left, right } => write!(w, "({left} {rel} {right})"),
        }
    }
}

/// A disjunction of conjunctions of relational atoms; the empty disjunction
/// stands for the trivial guard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnfOr(pub Vec<DnfAnd>);

/// A conjunction of relational atoms inside a [`DnfOr`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnfAnd(pub Vec<WikiGuard>);

/// Raised when a guard reaches the RALib printer without prior inequality
/// desugaring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialectError {
    /// The RALib dialect has no `<=`/`>=` operators.
    #[error("`<=` and `>=` cannot be expressed in the RALib dialect; desugar inequalities first")]
    UnsupportedInRALibDialect,
}

impl DnfOr {
    fn distribute(self, other: DnfOr) -> DnfOr {
        DnfOr(
            self.0
                .iter()
                .flat_map(|left| {
                    other.0.iter().map(move |right| {
                        DnfAnd(left.0.iter().chain(right.0.iter()).cloned().collect())
                    })
                })
                .collect(),
        )
    }

    /// Formats the normal form in the RALib-safe dialect: conjuncts joined by
    /// `&&`, disjuncts by `||`, no spaces, no parentheses. Only `==`, `!=`,
    /// `<` and `>` may appear; the trivial guard is the empty string.
    pub fn to_ralib_string(&self) -> Result<String, DialectError> {
        let mut out = String::new();
        for (i, conjunct) in self.0.iter().enumerate() {
            if i > 0 {
                out.push_str("||");
            }
            for (j, atom) in conjunct.0.iter().enumerate() {
                if j > 0 {
                    out.push_str("&&");
                }
                let WikiGuard::Rel { rel, left, right } = atom else {
                    unreachable!("normal forms only contain relational atoms")
                };
                if matches!(rel, Relation::Geq | Relation::Leq) {
                    return Err(DialectError::UnsupportedInRALibDialect);
                }
                write!(out, "{left}{rel}{right}").unwrap();
            }
        }
        Ok(out)
    }
}

/// The guard dialect to use when serialising.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GuardDialect {
    /// Fully parenthesised, accepts the whole theory.
    #[default]
    Wiki,
    /// The restricted `||`-of-`&&` form RALib understands; guards are
    /// desugared and normalised before printing.
    RalibSafe,
}

/// Formats a guard in the given dialect.
pub fn format_guard(guard: &WikiGuard, dialect: GuardDialect) -> Result<String, DialectError> {
    match dialect {
        GuardDialect::Wiki => Ok(guard.to_wiki_string()),
        GuardDialect::RalibSafe => guard.simplify_inequalities().dnf().to_ralib_string(),
    }
}

/// Parses a guard string. The empty string is the trivial guard. `||` binds
/// tighter than `&&`, parentheses group; the tree is built exactly as
/// written.
pub fn parse_guard(input: &str) -> Result<WikiGuard, ParseError> {
    if input.trim().is_empty() {
        return Ok(WikiGuard::True);
    }
    guard_parser()
        .padded()
        .then_ignore(end())
        .parse(input)
        .map_err(ParseError::from_chumsky)
}

/// Parses a bare operand, as used by assignment sources.
pub fn parse_expression(input: &str) -> Result<Expression, ParseError> {
    expression_parser()
        .padded()
        .then_ignore(end())
        .parse(input)
        .map_err(ParseError::from_chumsky)
}

fn expression_parser() -> impl Parser<char, Expression, Error = Simple<char>> + Clone {
    let variable = text::ident().map(Expression::Variable);
    let number = just('-')
        .or_not()
        .then(text::int(10))
        .try_map(|(sign, digits): (Option<char>, String), span| {
            let value: i64 = digits
                .parse()
                .map_err(|_| Simple::custom(span, "integer literal out of range"))?;
            Ok(Expression::Constant(if sign.is_some() { -value } else { value }))
        });
    variable.or(number)
}

fn guard_parser() -> impl Parser<char, WikiGuard, Error = Simple<char>> {
    recursive(|and_chain| {
        let operand = expression_parser().padded();

        let relop = choice((
            just("==").to(Relation::Eq),
            just("!=").to(Relation::Neq),
            just(">=").to(Relation::Geq),
            just(">").to(Relation::Gt),
            just("<=").to(Relation::Leq),
            just("<").to(Relation::Lt),
        ))
        .padded();

        let comparison = operand
            .clone()
            .then(relop)
            .then(operand)
            .map(|((left, rel), right)| WikiGuard::Rel { rel, left, right });

        let clause = comparison
            .or(and_chain.delimited_by(just('(').padded(), just(')').padded()));

        let or_chain = clause
            .separated_by(just("||").padded())
            .at_least(1)
            .map(|mut parts: Vec<WikiGuard>| {
                if parts.len() == 1 {
                    parts.pop().unwrap()
                } else {
                    WikiGuard::Or(parts)
                }
            });

        or_chain
            .separated_by(just("&&").padded())
            .at_least(1)
            .map(|mut parts: Vec<WikiGuard>| {
                if parts.len() == 1 {
                    parts.pop().unwrap()
                } else {
                    WikiGuard::And(parts)
                }
            })
    })
}

#[cfg(test)]
mod tests {
    use super::{
        format_guard, parse_guard, DialectError, Expression, GuardDialect, Relation, WikiGuard,
    };
    use std::collections::HashMap;

    fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    fn rel(rel: Relation, left: Expression, right: Expression) -> WikiGuard {
        WikiGuard::Rel { rel, left, right }
    }

    #[test]
    fn empty_string_is_the_trivial_guard() {
        assert_eq!(parse_guard(""), Ok(WikiGuard::True));
        assert_eq!(parse_guard("   "), Ok(WikiGuard::True));
    }

    #[test]
    fn reference_guard_parses_as_grouped() {
        let guard = parse_guard("(a==b && a!=1000) || a>=x_0").unwrap();
        assert_eq!(
            guard,
            WikiGuard::Or(vec![
                WikiGuard::And(vec![
                    rel(Relation::Eq, var("a"), var("b")),
                    rel(Relation::Neq, var("a"), Expression::Constant(1000)),
                ]),
                rel(Relation::Geq, var("a"), var("x_0")),
            ])
        );
    }

    #[test]
    fn disjunction_binds_tighter_than_conjunction() {
        let guard = parse_guard("a==b || c==d && e==f").unwrap();
        assert_eq!(
            guard,
            WikiGuard::And(vec![
                WikiGuard::Or(vec![
                    rel(Relation::Eq, var("a"), var("b")),
                    rel(Relation::Eq, var("c"), var("d")),
                ]),
                rel(Relation::Eq, var("e"), var("f")),
            ])
        );
    }

    #[test]
    fn negative_literals_and_offsets() {
        let guard = parse_guard("x > -3").unwrap();
        assert_eq!(guard, rel(Relation::Gt, var("x"), Expression::Constant(-3)));

        let error = parse_guard("x >").unwrap_err();
        assert!(error.offset <= 3);
    }

    #[test]
    fn wiki_dialect_round_trips_through_the_parser() {
        let guard = parse_guard("(a==b && a!=1000) || a>=x_0").unwrap();
        let printed = guard.to_wiki_string();
        assert_eq!(printed, "(((a == b) && (a != 1000)) || (a >= x_0))");
        assert_eq!(parse_guard(&printed), Ok(guard));
    }

    #[test]
    fn ralib_dialect_requires_desugared_guards() {
        let guard = parse_guard("(a==b && a!=1000) || a>=x_0").unwrap();
        assert_eq!(
            guard.dnf().to_ralib_string(),
            Err(DialectError::UnsupportedInRALibDialect)
        );

        let printed = format_guard(&guard, GuardDialect::RalibSafe).unwrap();
        assert_eq!(printed, "a==b&&a!=1000||a>x_0||a==x_0");
    }

    #[test]
    fn normalisation_preserves_semantics() {
        let guard = parse_guard("(a==b && a!=1000) || a>=x_0").unwrap();
        let dnf = guard.simplify_inequalities().dnf();
        let as_guard = WikiGuard::Or(
            dnf.0.iter().map(|conjunct| WikiGuard::And(conjunct.0.clone())).collect(),
        );

        for a in [-1, 0, 1000] {
            for b in [-1, 0, 1000] {
                for x in [-1, 0, 1000] {
                    let valuation: HashMap<String, i64> = [
                        ("a".to_string(), a),
                        ("b".to_string(), b),
                        ("x_0".to_string(), x),
                    ]
                    .into_iter()
                    .collect();
                    assert_eq!(guard.evaluate(&valuation), as_guard.evaluate(&valuation));
                }
            }
        }
    }

    #[test]
    fn dnf_distributes_in_order() {
        let guard = parse_guard("(a==b || c==d) && (e==f || g==h)").unwrap();
        let dnf = guard.dnf();
        let printed = dnf.to_ralib_string().unwrap();
        assert_eq!(printed, "a==b&&e==f||a==b&&g==h||c==d&&e==f||c==d&&g==h");
    }
}
