use thiserror::Error;

use crate::automaton::BuildError;
use crate::guard::{GuardError, Relation};

/// Import of Wiki documents into the generator model.
pub mod input;
/// Totalising export of the generator model into the Wiki form.
pub mod output;

pub use input::wiki_to_ra;
pub use output::ra_to_wiki;

/// Errors raised while converting between the two models.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WikiConversionError {
    /// The document does not have exactly one initial location.
    #[error("expected exactly one initial location, found {0}")]
    InitialLocationCount(usize),
    /// A transition reads a symbol the alphabet does not declare.
    #[error("transition reads undeclared symbol `{0}`")]
    UnknownSymbol(String),
    /// A guard or assignment names an unresolvable variable.
    #[error("`{0}` is neither a parameter of the transition nor a register")]
    UnknownVariable(String),
    /// A guard literal has no constant register representing it.
    #[error("no constant stands for the literal {0}")]
    UnknownConstant(i64),
    /// A transition binds the wrong number of parameter names.
    #[error("transition on `{symbol}` binds {given} parameters, the symbol has {arity}")]
    ParameterCountMismatch {
        /// The symbol being read.
        symbol: String,
        /// Number of names the transition binds.
        given: usize,
        /// The symbol's arity.
        arity: usize,
    },
    /// A constant's textual value is not an integer.
    #[error("constant `{name}` has malformed value `{value}`")]
    MalformedConstant {
        /// The constant's name.
        name: String,
        /// Its textual value.
        value: String,
    },
    /// Re-assembling the converted automaton failed.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Negating the coverage guard failed.
    #[error(transparent)]
    Guard(#[from] GuardError),
}

pub(crate) fn to_internal_relation(rel: wikira::Relation) -> Relation {
    match rel {
        wikira::Relation::Eq => Relation::Eq,
        wikira::Relation::Neq => Relation::Neq,
        wikira::Relation::Geq => Relation::Geq,
        wikira::Relation::Gt => Relation::Gt,
        wikira::Relation::Leq => Relation::Leq,
        wikira::Relation::Lt => Relation::Lt,
    }
}

pub(crate) fn to_wiki_relation(rel: Relation) -> wikira::Relation {
    match rel {
        Relation::Eq => wikira::Relation::Eq,
        Relation::Neq => wikira::Relation::Neq,
        Relation::Geq => wikira::Relation::Geq,
        Relation::Gt => wikira::Relation::Gt,
        Relation::Leq => wikira::Relation::Leq,
        Relation::Lt => wikira::Relation::Lt,
    }
}
