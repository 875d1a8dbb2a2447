use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use crate::math::{Map, Set};
use crate::symbol::Symbol;

/// The binary relations of the inequality theory.
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
    /// The relation that holds exactly when `self` does not.
    pub fn negated(self) -> Self {
        match self {
            Relation::Eq => Relation::Neq,
            Relation::Neq => Relation::Eq,
            Relation::Geq => Relation::Lt,
            Relation::Lt => Relation::Geq,
            Relation::Gt => Relation::Leq,
            Relation::Leq => Relation::Gt,
        }
    }

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

/// Errors raised by guard transformations and evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// The negation of the trivial guard is not expressible in this theory.
    #[error("the trivial guard cannot be negated in the inequality theory")]
    TrueNotInvertible,
    /// Evaluation encountered a symbol the valuation does not bind.
    #[error("no value bound for `{0}`")]
    UnboundSymbol(Symbol),
}

/// A transition guard over the inequality theory. `And`/`Or` are variadic and
/// keep the order of their children; all transformations preserve that order.
/// An empty `And` is the trivial guard by convention.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Guard {
    /// The trivial guard that always holds.
    True,
    /// Conjunction of the children.
    And(Vec<Guard>),
    /// Disjunction of the children.
    Or(Vec<Guard>),
    /// A binary relation between two symbols.
    Rel {
        /// The relation.
        rel: Relation,
        /// Left operand.
        left: Symbol,
        /// Right operand.
        right: Symbol,
    },
}

impl Guard {
    /// Creates a binary relation guard.
    pub fn rel(rel: Relation, left: Symbol, right: Symbol) -> Self {
        Guard::Rel { rel, left, right }
    }

    /// Shorthand for an equality guard.
    pub fn eq(left: Symbol, right: Symbol) -> Self {
        Self::rel(Relation::Eq, left, right)
    }

    /// Shorthand for an inequality guard.
    pub fn neq(left: Symbol, right: Symbol) -> Self {
        Self::rel(Relation::Neq, left, right)
    }

    /// Whether the guard trivially holds, i.e. is `True` or an empty conjunction.
    pub fn is_trivially_true(&self) -> bool {
        match self {
            Guard::True => true,
            Guard::And(children) => children.is_empty(),
            _ => false,
        }
    }

    /// Evaluates the guard under the given valuation. Both operands of every
    /// reached relation must be bound.
    pub fn evaluate(&self, valuation: &Map<Symbol, i64>) -> Result<bool, GuardError> {
        match self {
            Guard::True => Ok(true),
            Guard::And(children) => {
                for child in children {
                    if !child.evaluate(valuation)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Guard::Or(children) => {
                for child in children {
                    if child.evaluate(valuation)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Guard::Rel { rel, left, right } => {
                let left = *valuation
                    .get(left)
                    .ok_or_else(|| GuardError::UnboundSymbol(left.clone()))?;
                let right = *valuation
                    .get(right)
                    .ok_or_else(|| GuardError::UnboundSymbol(right.clone()))?;
                Ok(rel.holds(left, right))
            }
        }
    }

    /// The set of symbols appearing as leaves of the guard.
    pub fn free_variables(&self) -> Set<Symbol> {
        let mut variables = Set::default();
        self.collect_free_variables(&mut variables);
        variables
    }

    fn collect_free_variables(&self, into: &mut Set<Symbol>) {
        match self {
            Guard::True => {}
            Guard::And(children) | Guard::Or(children) => {
                for child in children {
                    child.collect_free_variables(into);
                }
            }
            Guard::Rel { left, right, .. } => {
                into.insert(left.clone());
                into.insert(right.clone());
            }
        }
    }

    /// Negates the guard by pushing the negation to the leaves with De
    /// Morgan's laws and flipping each relation. Fails with
    /// [`GuardError::TrueNotInvertible`] if any subterm is the trivial guard,
    /// whose negation the theory cannot express.
    pub fn invert(&self) -> Result<Guard, GuardError> {
        match self {
            Guard::True => Err(GuardError::TrueNotInvertible),
            Guard::And(children) => Ok(Guard::Or(
                children.iter().map(Guard::invert).collect::<Result<_, _>>()?,
            )),
            Guard::Or(children) => Ok(Guard::And(
                children.iter().map(Guard::invert).collect::<Result<_, _>>()?,
            )),
            Guard::Rel { rel, left, right } => Ok(Guard::Rel {
                rel: rel.negated(),
                left: left.clone(),
                right: right.clone(),
            }),
        }
    }

    /// Rewrites `x >= y` into `x > y ∨ x == y` and `x <= y` into
    /// `x < y ∨ x == y`, recursively through conjunctions and disjunctions.
    /// All other guards are fixed points.
    pub fn simplify_inequalities(&self) -> Guard {
        match self {
            Guard::True => Guard::True,
            Guard::And(children) => {
                Guard::And(children.iter().map(Guard::simplify_inequalities).collect())
            }
            Guard::Or(children) => {
                Guard::Or(children.iter().map(Guard::simplify_inequalities).collect())
            }
            Guard::Rel { rel: Relation::Geq, left, right } => Guard::Or(vec![
                Guard::rel(Relation::Gt, left.clone(), right.clone()),
                Guard::rel(Relation::Eq, left.clone(), right.clone()),
            ]),
            Guard::Rel { rel: Relation::Leq, left, right } => Guard::Or(vec![
                Guard::rel(Relation::Lt, left.clone(), right.clone()),
                Guard::rel(Relation::Eq, left.clone(), right.clone()),
            ]),
            rel @ Guard::Rel { .. } => rel.clone(),
        }
    }

    /// Converts the guard into disjunctive normal form. Conjunctions are
    /// expanded by pairwise cartesian products, so this is exponential in the
    /// depth of nested ands-over-ors; guards built by the generators are
    /// shallow.
    pub fn dnf(&self) -> DnfOr {
        match self {
            // the empty disjunction; downstream code treats it as trivially true
            Guard::True => DnfOr(vec![]),
            Guard::Rel { rel, left, right } => DnfOr(vec![DnfAnd(vec![Guard::Rel {
                rel: *rel,
                left: left.clone(),
                right: right.clone(),
            }])]),
            Guard::Or(children) => {
                DnfOr(children.iter().flat_map(|child| child.dnf().0).collect())
            }
            Guard::And(children) => children
                .iter()
                .map(Guard::dnf)
                .reduce(DnfOr::distribute)
                .unwrap_or(DnfOr(vec![])),
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::True => f.write_str("true"),
            Guard::And(children) => {
                write!(f, "({})", children.iter().map(|c| c.to_string()).join(" ∧ "))
            }
            Guard::Or(children) => {
                write!(f, "({})", children.iter().map(|c| c.to_string()).join(" ∨ "))
            }
            Guard::Rel { rel, left, right } => write!(f, "{left} {rel} {right}"),
        }
    }
}

/// A disjunction of conjunctions of relational atoms. The empty disjunction
/// stands for the trivial guard, see [`Guard::dnf`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnfOr(pub Vec<DnfAnd>);

/// A conjunction of relational atoms inside a [`DnfOr`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnfAnd(pub Vec<Guard>);

impl DnfOr {
    /// Combines two DNFs into the DNF of their conjunction by concatenating
    /// every pair of conjuncts, left-major.
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

    /// Evaluates the normal form under the given valuation. The empty
    /// disjunction evaluates to `true`, matching the guard it was produced
    /// from.
    pub fn evaluate(&self, valuation: &Map<Symbol, i64>) -> Result<bool, GuardError> {
        if self.0.is_empty() {
            return Ok(true);
        }
        for conjunct in &self.0 {
            if conjunct
                .0
                .iter()
                .map(|atom| atom.evaluate(valuation))
                .fold_ok(true, |acc, holds| acc && holds)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
