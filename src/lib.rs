#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The prelude is supposed to make using this package easier. Including everything, i.e.
/// `use raben::prelude::*;` should be enough to use the package.
pub mod prelude {
    pub use crate::automaton::{BuildError, Location, LocationId, RegisterAutomaton, Transition, TransitionId};
    pub use crate::compose::{concat, find_first_terminal, partial_replacement, split_single, ComposeError};
    pub use crate::guard::{DnfAnd, DnfOr, Guard, GuardError, Relation};
    pub use crate::math;
    pub use crate::math::bucketed;
    pub use crate::random::{champarnaud_paranthoen_ra, CountingTable, ExtendedTree};
    pub use crate::symbol::{LabeledSymbol, Symbol};
    pub use crate::wiki::{ra_to_wiki, wiki_to_ra, WikiConversionError};
}

/// This module contains some definitions of mathematical objects which are used throughout the
/// crate and do not really fit to the top level.
pub mod math;

/// Data symbols and labeled input symbols.
pub mod symbol;

/// The boolean guard algebra over inequalities.
pub mod guard;

/// The register automaton data model and its builder.
pub mod automaton;

/// Implements the uniform generation of random register automata.
pub mod random;

/// Structural composition operators over register automata.
pub mod compose;

/// Conversion between the internal model and the Automata-Wiki form.
pub mod wiki;

/// Parameter ranges and file-writing helpers for generation tasks.
pub mod tasks;
