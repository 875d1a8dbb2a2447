use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::guard::Guard;
use crate::math::Map;
use crate::symbol::{LabeledSymbol, Symbol};

/// Index of a location in the arena of its owning [`RegisterAutomaton`].
pub type LocationId = usize;
/// Index of a transition in the arena of its owning [`RegisterAutomaton`].
pub type TransitionId = usize;

/// A named control location. Whether a location is initial is fixed when the
/// automaton is constructed; incoming and outgoing transitions are derived
/// views maintained by the owning automaton.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    name: String,
    initial: bool,
    accepting: bool,
}

impl Location {
    /// The unique name of the location.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the initial location of its automaton.
    pub fn is_initial(&self) -> bool {
        self.initial
    }

    /// Whether the location is accepting.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }
}

/// A guarded, assigning transition. Endpoints are stored as arena indices
/// into the owning automaton, which keeps the structure free of reference
/// cycles and makes copies cheap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    from: LocationId,
    symbol: LabeledSymbol,
    guard: Guard,
    assignment: Map<String, Symbol>,
    to: LocationId,
}

impl Transition {
    /// The source location.
    pub fn from(&self) -> LocationId {
        self.from
    }

    /// The input symbol read by the transition.
    pub fn symbol(&self) -> &LabeledSymbol {
        &self.symbol
    }

    /// The guard of the transition.
    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    /// The register updates, keyed by target register name.
    pub fn assignment(&self) -> &Map<String, Symbol> {
        &self.assignment
    }

    /// The target location.
    pub fn to(&self) -> LocationId {
        self.to
    }

    /// Whether source and target coincide.
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Errors raised while growing a [`RegisterAutomaton`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A location or register was re-declared with conflicting properties.
    #[error("`{name}` re-declared with conflicting properties: {details}")]
    InconsistentDeclaration {
        /// Name of the re-declared entity.
        name: String,
        /// What changed between the declarations.
        details: String,
    },
    /// A transition endpoint does not exist.
    #[error("unknown location `{0}`")]
    UnknownLocation(String),
    /// An assignment targets a register the automaton does not have.
    #[error("assignment targets unknown register `{0}`")]
    UnknownAssignmentTarget(String),
    /// A guard or assignment uses a symbol that is neither a register of the
    /// automaton nor a parameter of the transition's input symbol.
    #[error("`{used}` is neither a register nor a parameter of `{symbol}`")]
    UnresolvedSymbol {
        /// The offending symbol.
        used: Symbol,
        /// The input symbol of the transition being added.
        symbol: String,
    },
}

/// A register automaton under construction. Locations, registers and
/// transitions live in dense arenas owned by the automaton; the structure is
/// append-only and never shrinks. Exactly one location is initial, fixed at
/// construction time.
#[derive(Clone, Debug)]
pub struct RegisterAutomaton {
    locations: Vec<Location>,
    location_ids: Map<String, LocationId>,
    registers: Map<String, Option<i64>>,
    transitions: Vec<Transition>,
    outgoing: Vec<Vec<TransitionId>>,
    incoming: Vec<Vec<TransitionId>>,
}

impl RegisterAutomaton {
    /// Creates an empty automaton whose initial location carries the given
    /// name and acceptance.
    pub fn new(initial_name: impl Into<String>, accepting: bool) -> Self {
        let name = initial_name.into();
        let mut location_ids = Map::default();
        location_ids.insert(name.clone(), 0);
        Self {
            locations: vec![Location { name, initial: true, accepting }],
            location_ids,
            registers: Map::default(),
            transitions: Vec::new(),
            outgoing: vec![Vec::new()],
            incoming: vec![Vec::new()],
        }
    }

    /// The initial location.
    pub fn initial_location(&self) -> &Location {
        &self.locations[0]
    }

    /// The arena index of the initial location.
    pub fn initial_id(&self) -> LocationId {
        0
    }

    /// The number of locations.
    pub fn size(&self) -> usize {
        self.locations.len()
    }

    /// The location stored at the given arena index.
    pub fn location(&self, id: LocationId) -> &Location {
        &self.locations[id]
    }

    /// Looks a location up by name.
    pub fn location_id(&self, name: &str) -> Option<LocationId> {
        self.location_ids.get(name).copied()
    }

    /// All locations in insertion order, with their arena indices.
    pub fn locations(&self) -> impl Iterator<Item = (LocationId, &Location)> {
        self.locations.iter().enumerate()
    }

    /// The accepting locations, in insertion order.
    pub fn accepting_locations(&self) -> impl Iterator<Item = (LocationId, &Location)> {
        self.locations().filter(|(_, location)| location.is_accepting())
    }

    /// The registers with their optional initial values, in insertion order.
    pub fn registers(&self) -> impl Iterator<Item = (&str, Option<i64>)> {
        self.registers.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Whether the automaton declares a register with the given name.
    pub fn has_register(&self, name: &str) -> bool {
        self.registers.contains_key(name)
    }

    /// The partial initial valuation, restricted to initialised registers.
    pub fn initial_valuation(&self) -> impl Iterator<Item = (&str, i64)> {
        self.registers
            .iter()
            .filter_map(|(name, value)| value.map(|value| (name.as_str(), value)))
    }

    /// Whether any register carries an initial value.
    pub fn has_initialized_register(&self) -> bool {
        self.registers.values().any(Option::is_some)
    }

    /// All transitions in insertion order, with their arena indices.
    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions.iter().enumerate()
    }

    /// The number of transitions.
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// The transition stored at the given arena index.
    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id]
    }

    /// Indices of the transitions leaving the given location.
    pub fn outgoing(&self, location: LocationId) -> &[TransitionId] {
        &self.outgoing[location]
    }

    /// Indices of the transitions entering the given location.
    pub fn incoming(&self, location: LocationId) -> &[TransitionId] {
        &self.incoming[location]
    }

    /// Indices of the self-loop transitions on the given location.
    pub fn self_loops(&self, location: LocationId) -> Vec<TransitionId> {
        self.outgoing[location]
            .iter()
            .copied()
            .filter(|&id| self.transitions[id].is_self_loop())
            .collect()
    }

    /// Declares a location. Re-declaring a known location with the same
    /// acceptance returns the existing index, a conflicting re-declaration
    /// fails.
    pub fn add_location(&mut self, name: &str, accepting: bool) -> Result<LocationId, BuildError> {
        if let Some(&id) = self.location_ids.get(name) {
            let existing = &self.locations[id];
            if existing.accepting != accepting {
                return Err(BuildError::InconsistentDeclaration {
                    name: name.to_string(),
                    details: format!(
                        "accepting changed from {} to {accepting}",
                        existing.accepting
                    ),
                });
            }
            return Ok(id);
        }

        let id = self.locations.len();
        self.locations.push(Location { name: name.to_string(), initial: false, accepting });
        self.location_ids.insert(name.to_string(), id);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        trace!("added location `{name}` at index {id}");
        Ok(id)
    }

    /// Declares an uninitialised register. Idempotent; an existing initial
    /// value is kept.
    pub fn add_register(&mut self, name: &str) -> Result<(), BuildError> {
        self.declare_register(name, None)
    }

    /// Declares a register with an initial value. Re-declaring may neither
    /// introduce nor change an initial valuation.
    pub fn add_initialized_register(&mut self, name: &str, value: i64) -> Result<(), BuildError> {
        self.declare_register(name, Some(value))
    }

    fn declare_register(&mut self, name: &str, value: Option<i64>) -> Result<(), BuildError> {
        match (self.registers.get(name), value) {
            (None, _) => {
                self.registers.insert(name.to_string(), value);
                Ok(())
            }
            // re-declaration without a value keeps whatever is there
            (Some(_), None) => Ok(()),
            (Some(Some(existing)), Some(new)) if *existing == new => Ok(()),
            (Some(existing), Some(new)) => Err(BuildError::InconsistentDeclaration {
                name: name.to_string(),
                details: format!("initial value changed from {existing:?} to {new}"),
            }),
        }
    }

    /// Appends a transition. No deduplication is performed; adding a
    /// structurally identical transition twice yields two transitions. The
    /// endpoints must exist, assignment targets must be registers, and every
    /// symbol used by the guard or the assignment sources must be a register
    /// of the automaton or a parameter of `symbol`.
    pub fn add_transition(
        &mut self,
        from: &str,
        symbol: LabeledSymbol,
        guard: Guard,
        assignment: Map<String, Symbol>,
        to: &str,
    ) -> Result<TransitionId, BuildError> {
        let from_id = self
            .location_id(from)
            .ok_or_else(|| BuildError::UnknownLocation(from.to_string()))?;
        let to_id = self
            .location_id(to)
            .ok_or_else(|| BuildError::UnknownLocation(to.to_string()))?;

        for used in guard.free_variables() {
            self.check_resolvable(&used, &symbol)?;
        }
        for (target, source) in &assignment {
            if !self.registers.contains_key(target) {
                return Err(BuildError::UnknownAssignmentTarget(target.clone()));
            }
            self.check_resolvable(source, &symbol)?;
        }

        let id = self.transitions.len();
        self.transitions.push(Transition { from: from_id, symbol, guard, assignment, to: to_id });
        self.outgoing[from_id].push(id);
        self.incoming[to_id].push(id);
        Ok(id)
    }

    fn check_resolvable(&self, used: &Symbol, symbol: &LabeledSymbol) -> Result<(), BuildError> {
        let known = match used {
            Symbol::Register(name) => self.registers.contains_key(name),
            Symbol::Parameter(_) => symbol.binds(used),
        };
        if known {
            Ok(())
        } else {
            Err(BuildError::UnresolvedSymbol {
                used: used.clone(),
                symbol: symbol.label().to_string(),
            })
        }
    }
}

impl fmt::Display for RegisterAutomaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "initial: {}", self.initial_location().name())?;
        for (_, location) in self.locations() {
            writeln!(
                f,
                "location {}{}",
                location.name(),
                if location.is_accepting() { " (accepting)" } else { "" }
            )?;
        }
        for (_, transition) in self.transitions() {
            writeln!(
                f,
                "  {} --{}[{}]--> {}",
                self.locations[transition.from()].name(),
                transition.symbol(),
                transition.guard(),
                self.locations[transition.to()].name(),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BuildError, RegisterAutomaton};
    use crate::guard::Guard;
    use crate::math::Map;
    use crate::symbol::{LabeledSymbol, Symbol};

    fn letter(label: &str) -> LabeledSymbol {
        LabeledSymbol::with_arity(label, 1)
    }

    #[test]
    fn location_declaration_is_idempotent() {
        let mut ra = RegisterAutomaton::new("q0", false);
        let q1 = ra.add_location("q1", true).unwrap();
        assert_eq!(ra.add_location("q1", true), Ok(q1));
        assert!(matches!(
            ra.add_location("q1", false),
            Err(BuildError::InconsistentDeclaration { .. })
        ));
        assert_eq!(ra.size(), 2);
    }

    #[test]
    fn initial_location_is_the_constructed_one() {
        let mut ra = RegisterAutomaton::new("q0", false);
        ra.add_location("q1", true).unwrap();
        assert_eq!(ra.initial_location().name(), "q0");
        assert!(ra.initial_location().is_initial());
        assert!(!ra.location(1).is_initial());
    }

    #[test]
    fn register_redeclaration_must_not_change_the_valuation() {
        let mut ra = RegisterAutomaton::new("q0", false);
        ra.add_register("x").unwrap();
        assert_eq!(ra.add_register("x"), Ok(()));
        assert!(matches!(
            ra.add_initialized_register("x", 3),
            Err(BuildError::InconsistentDeclaration { .. })
        ));

        ra.add_initialized_register("y", 7).unwrap();
        assert_eq!(ra.add_initialized_register("y", 7), Ok(()));
        assert_eq!(ra.add_register("y"), Ok(()));
        assert_eq!(ra.initial_valuation().collect::<Vec<_>>(), vec![("y", 7)]);
    }

    #[test]
    fn transitions_resolve_endpoints_and_symbols() {
        let mut ra = RegisterAutomaton::new("q0", false);
        ra.add_location("q1", true).unwrap();
        ra.add_register("x").unwrap();

        let guard = Guard::eq(Symbol::parameter("p0"), Symbol::register("x"));
        let mut assignment = Map::default();
        assignment.insert("x".to_string(), Symbol::parameter("p0"));
        ra.add_transition("q0", letter("a"), guard, assignment, "q1").unwrap();

        assert_eq!(ra.outgoing(0), &[0]);
        assert_eq!(ra.incoming(1), &[0]);
        assert!(ra.self_loops(0).is_empty());

        assert!(matches!(
            ra.add_transition("q0", letter("a"), Guard::True, Map::default(), "nowhere"),
            Err(BuildError::UnknownLocation(_))
        ));
        assert!(matches!(
            ra.add_transition(
                "q0",
                letter("a"),
                Guard::eq(Symbol::register("unknown"), Symbol::parameter("p0")),
                Map::default(),
                "q1"
            ),
            Err(BuildError::UnresolvedSymbol { .. })
        ));
        let mut bad = Map::default();
        bad.insert("nope".to_string(), Symbol::parameter("p0"));
        assert!(matches!(
            ra.add_transition("q0", letter("a"), Guard::True, bad, "q1"),
            Err(BuildError::UnknownAssignmentTarget(_))
        ));
    }

    #[test]
    fn identical_transitions_are_not_deduplicated() {
        let mut ra = RegisterAutomaton::new("q0", true);
        ra.add_transition("q0", letter("a"), Guard::True, Map::default(), "q0").unwrap();
        ra.add_transition("q0", letter("a"), Guard::True, Map::default(), "q0").unwrap();
        assert_eq!(ra.transition_count(), 2);
        assert_eq!(ra.self_loops(0).len(), 2);
    }
}
