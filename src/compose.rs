use std::collections::VecDeque;

use rand::{seq::SliceRandom, Rng};
use thiserror::Error;
use tracing::debug;

use crate::automaton::{BuildError, LocationId, RegisterAutomaton, TransitionId};
use crate::math::{bucketed, Set};

/// Errors raised by the composition operators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComposeError {
    /// The replacement share lies outside the unit interval.
    #[error("share must lie within [0, 1], got {0}")]
    InvalidShare(f64),
    /// `partial_replacement` needs at least one replacement automaton.
    #[error("at least one replacement automaton is required")]
    NoReplacements,
    /// No accepting location is reachable, so the automaton has no terminal.
    #[error("no accepting location is reachable from the initial location")]
    NoTerminalLocation,
    /// Concatenation would re-initialise a register of the left operand.
    #[error("register `{0}` would be re-initialised by the right-hand automaton")]
    RegisterConflict(String),
    /// Replacement automata must not initialise registers.
    #[error("replacement automata must not initialise registers")]
    InitializedReplacement,
    /// Discriminator automata must not initialise registers.
    #[error("discriminator automata must not initialise registers")]
    InitializedDiscriminator,
    /// No location satisfies the splitting requirements.
    #[error("no location with enough non-loop traffic to split")]
    NoSplittableLocation,
    /// Re-assembling the composed automaton failed.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// The rendezvous location of an automaton: an accepting location maximising
/// breadth-first distance from the initial location, ties broken by insertion
/// order. Composition merges further automata onto this location.
pub fn find_first_terminal(ra: &RegisterAutomaton) -> Result<LocationId, ComposeError> {
    const UNREACHED: usize = usize::MAX;
    let mut distance = vec![UNREACHED; ra.size()];
    let mut queue = VecDeque::from([ra.initial_id()]);
    distance[ra.initial_id()] = 0;
    while let Some(location) = queue.pop_front() {
        for &t in ra.outgoing(location) {
            let to = ra.transition(t).to();
            if distance[to] == UNREACHED {
                distance[to] = distance[location] + 1;
                queue.push_back(to);
            }
        }
    }

    let mut best: Option<(LocationId, usize)> = None;
    for (id, location) in ra.locations() {
        if !location.is_accepting() || distance[id] == UNREACHED {
            continue;
        }
        if best.map_or(true, |(_, d)| distance[id] > d) {
            best = Some((id, distance[id]));
        }
    }
    best.map(|(id, _)| id).ok_or(ComposeError::NoTerminalLocation)
}

/// Concatenates two automata by merging `b`'s initial location onto the
/// rendezvous location of `a`. Locations of `a` are prefixed `l_`, non-initial
/// locations of `b` are prefixed `r_`, and the merged location is named after
/// both of its origins. The merged location takes the acceptance of `b`'s
/// initial location. Registers union-merge by name, but `b` must not
/// re-initialise a register `a` already has. Neither input is mutated.
pub fn concat(
    a: &RegisterAutomaton,
    b: &RegisterAutomaton,
) -> Result<RegisterAutomaton, ComposeError> {
    let rendezvous = find_first_terminal(a)?;
    let merged = format!(
        "l_{}+r_{}",
        a.location(rendezvous).name(),
        b.initial_location().name()
    );

    let a_name = |id: LocationId| {
        if id == rendezvous {
            merged.clone()
        } else {
            format!("l_{}", a.location(id).name())
        }
    };
    let b_name = |id: LocationId| {
        if id == b.initial_id() {
            merged.clone()
        } else {
            format!("r_{}", b.location(id).name())
        }
    };
    let a_accepting = |id: LocationId| {
        if id == rendezvous {
            b.initial_location().is_accepting()
        } else {
            a.location(id).is_accepting()
        }
    };

    let mut out =
        RegisterAutomaton::new(a_name(a.initial_id()), a_accepting(a.initial_id()));
    for (id, _) in a.locations() {
        if id != a.initial_id() {
            out.add_location(&a_name(id), a_accepting(id))?;
        }
    }
    for (id, location) in b.locations() {
        if id != b.initial_id() {
            out.add_location(&b_name(id), location.is_accepting())?;
        }
    }

    for (name, value) in a.registers() {
        declare(&mut out, name, value)?;
    }
    for (name, value) in b.registers() {
        if value.is_some() && a.has_register(name) {
            return Err(ComposeError::RegisterConflict(name.to_string()));
        }
        declare(&mut out, name, value)?;
    }

    for (_, t) in a.transitions() {
        out.add_transition(
            &a_name(t.from()),
            t.symbol().clone(),
            t.guard().clone(),
            t.assignment().clone(),
            &a_name(t.to()),
        )?;
    }
    for (_, t) in b.transitions() {
        out.add_transition(
            &b_name(t.from()),
            t.symbol().clone(),
            t.guard().clone(),
            t.assignment().clone(),
            &b_name(t.to()),
        )?;
    }
    Ok(out)
}

/// Replaces a randomly chosen share of `a`'s transitions with copies of the
/// given replacement automata.
///
/// A maximal independent edge set (no two chosen transitions share an
/// endpoint) is collected by repeatedly picking a random remaining transition
/// and discarding everything touching its endpoints. Of those candidates,
/// `floor(count * share)` survive a shuffle and are distributed over the
/// replacements in round-robin buckets of near-equal size. Each surviving
/// transition is deleted and its replacement spliced between its former
/// endpoints, with locations renamed `g<i>_` per splice. Replacements must
/// not initialise registers.
pub fn partial_replacement<R: Rng>(
    a: &RegisterAutomaton,
    share: f64,
    replacements: &[RegisterAutomaton],
    rng: &mut R,
) -> Result<RegisterAutomaton, ComposeError> {
    if !(0.0..=1.0).contains(&share) {
        return Err(ComposeError::InvalidShare(share));
    }
    if replacements.is_empty() {
        return Err(ComposeError::NoReplacements);
    }
    for replacement in replacements {
        if replacement.has_initialized_register() {
            return Err(ComposeError::InitializedReplacement);
        }
    }

    let mut remaining: Vec<TransitionId> = a.transitions().map(|(id, _)| id).collect();
    let mut candidates = Vec::new();
    while !remaining.is_empty() {
        let pick = remaining[rng.gen_range(0..remaining.len())];
        candidates.push(pick);
        let (from, to) = (a.transition(pick).from(), a.transition(pick).to());
        remaining.retain(|&id| {
            let t = a.transition(id);
            t.from() != from && t.from() != to && t.to() != from && t.to() != to
        });
    }

    let count = (candidates.len() as f64 * share).floor() as usize;
    candidates.shuffle(rng);
    candidates.truncate(count);
    debug!("replacing {count} of the independent transitions");

    let buckets = bucketed(candidates, replacements.len());
    let skip: Set<TransitionId> = buckets.iter().flatten().copied().collect();
    let mut out = copy_without(a, &skip)?;

    let mut splices = 0usize;
    for (replacement, bucket) in replacements.iter().zip(&buckets) {
        for &transition in bucket {
            let from = a.location(a.transition(transition).from()).name().to_string();
            let to = a.location(a.transition(transition).to()).name().to_string();
            splice(&mut out, &from, &to, replacement, &format!("g{splices}_"))?;
            splices += 1;
        }
    }
    Ok(out)
}

/// Splits a single location of `a` with the given discriminator.
///
/// The split location is drawn uniformly from the locations that are neither
/// initial nor accepting and carry at least two non-loop incoming and two
/// non-loop outgoing transitions. Its incoming traffic is shuffled into two
/// halves entering fresh locations, its outgoing traffic likewise into two
/// halves leaving fresh locations, self-loops are dropped, and two
/// independent copies of the discriminator (prefixes `dl_` and `dr_`) connect
/// the halves. The split location stays behind without any transitions.
pub fn split_single<R: Rng>(
    a: &RegisterAutomaton,
    discriminator: &RegisterAutomaton,
    rng: &mut R,
) -> Result<RegisterAutomaton, ComposeError> {
    if discriminator.has_initialized_register() {
        return Err(ComposeError::InitializedDiscriminator);
    }

    let candidates: Vec<LocationId> = a
        .locations()
        .filter(|(id, location)| {
            !location.is_initial()
                && !location.is_accepting()
                && non_loops(a, a.incoming(*id)).len() >= 2
                && non_loops(a, a.outgoing(*id)).len() >= 2
        })
        .map(|(id, _)| id)
        .collect();
    if candidates.is_empty() {
        return Err(ComposeError::NoSplittableLocation);
    }
    let q = candidates[rng.gen_range(0..candidates.len())];
    let q_name = a.location(q).name();
    let accepting = a.location(q).is_accepting();
    debug!("splitting location `{q_name}`");

    let in_left = format!("{q_name}_il");
    let in_right = format!("{q_name}_ir");
    let out_left = format!("{q_name}_ol");
    let out_right = format!("{q_name}_or");

    let mut incoming = non_loops(a, a.incoming(q));
    incoming.shuffle(rng);
    let incoming_halves = bucketed(incoming, 2);
    let mut outgoing = non_loops(a, a.outgoing(q));
    outgoing.shuffle(rng);
    let outgoing_halves = bucketed(outgoing, 2);

    let skip: Set<TransitionId> =
        a.incoming(q).iter().chain(a.outgoing(q)).copied().collect();
    let mut out = copy_without(a, &skip)?;
    for name in [&in_left, &in_right, &out_left, &out_right] {
        out.add_location(name, accepting)?;
    }

    for (half, target) in incoming_halves.iter().zip([in_left.as_str(), in_right.as_str()]) {
        for &id in half {
            let t = a.transition(id);
            out.add_transition(
                a.location(t.from()).name(),
                t.symbol().clone(),
                t.guard().clone(),
                t.assignment().clone(),
                target,
            )?;
        }
    }
    for (half, source) in outgoing_halves.iter().zip([out_left.as_str(), out_right.as_str()]) {
        for &id in half {
            let t = a.transition(id);
            out.add_transition(
                source,
                t.symbol().clone(),
                t.guard().clone(),
                t.assignment().clone(),
                a.location(t.to()).name(),
            )?;
        }
    }

    splice(&mut out, &in_left, &out_left, discriminator, "dl_")?;
    splice(&mut out, &in_right, &out_right, discriminator, "dr_")?;
    Ok(out)
}

/// Copies `a` into a fresh automaton, leaving out the transitions in `skip`.
fn copy_without(
    a: &RegisterAutomaton,
    skip: &Set<TransitionId>,
) -> Result<RegisterAutomaton, BuildError> {
    let mut out = RegisterAutomaton::new(
        a.initial_location().name(),
        a.initial_location().is_accepting(),
    );
    for (id, location) in a.locations() {
        if id != a.initial_id() {
            out.add_location(location.name(), location.is_accepting())?;
        }
    }
    for (name, value) in a.registers() {
        declare(&mut out, name, value)?;
    }
    for (id, t) in a.transitions() {
        if skip.contains(&id) {
            continue;
        }
        out.add_transition(
            a.location(t.from()).name(),
            t.symbol().clone(),
            t.guard().clone(),
            t.assignment().clone(),
            a.location(t.to()).name(),
        )?;
    }
    Ok(out)
}

/// Splices a copy of `gadget` into `host` between the locations named `from`
/// and `to`: the gadget's initial location is identified with `from`, its
/// rendezvous with `to`, and everything in between is added under `prefix`.
fn splice(
    host: &mut RegisterAutomaton,
    from: &str,
    to: &str,
    gadget: &RegisterAutomaton,
    prefix: &str,
) -> Result<(), ComposeError> {
    let terminal = find_first_terminal(gadget)?;
    let name = |id: LocationId| -> String {
        if id == gadget.initial_id() {
            from.to_string()
        } else if id == terminal {
            to.to_string()
        } else {
            format!("{prefix}{}", gadget.location(id).name())
        }
    };

    for (id, location) in gadget.locations() {
        if id == gadget.initial_id() || id == terminal {
            continue;
        }
        host.add_location(&name(id), location.is_accepting())?;
    }
    for (register, value) in gadget.registers() {
        debug_assert!(value.is_none(), "spliced gadgets carry no initial valuation");
        host.add_register(register)?;
    }
    for (_, t) in gadget.transitions() {
        host.add_transition(
            &name(t.from()),
            t.symbol().clone(),
            t.guard().clone(),
            t.assignment().clone(),
            &name(t.to()),
        )?;
    }
    Ok(())
}

fn declare(
    out: &mut RegisterAutomaton,
    name: &str,
    value: Option<i64>,
) -> Result<(), BuildError> {
    match value {
        Some(value) => out.add_initialized_register(name, value),
        None => out.add_register(name),
    }
}

fn non_loops(a: &RegisterAutomaton, ids: &[TransitionId]) -> Vec<TransitionId> {
    ids.iter().copied().filter(|&id| !a.transition(id).is_self_loop()).collect()
}

#[cfg(test)]
mod tests {
    use super::{concat, find_first_terminal, partial_replacement, split_single, ComposeError};
    use crate::automaton::RegisterAutomaton;
    use crate::guard::Guard;
    use crate::math::Map;
    use crate::symbol::{LabeledSymbol, Symbol};
    use rand::{rngs::StdRng, SeedableRng};

    fn letter(label: &str) -> LabeledSymbol {
        LabeledSymbol::with_arity(label, 1)
    }

    /// A line automaton `q0 -> q1 -> ... -> qn` with accepting last location.
    fn line(n: usize) -> RegisterAutomaton {
        let mut ra = RegisterAutomaton::new("q0", n == 0);
        for i in 1..=n {
            ra.add_location(&format!("q{i}"), i == n).unwrap();
        }
        for i in 0..n {
            ra.add_transition(
                &format!("q{i}"),
                letter("a"),
                Guard::True,
                Map::default(),
                &format!("q{}", i + 1),
            )
            .unwrap();
        }
        ra
    }

    /// A three-location gadget storing its parameter and checking it later.
    fn store_gadget() -> RegisterAutomaton {
        let mut ra = RegisterAutomaton::new("g0", false);
        ra.add_location("g1", false).unwrap();
        ra.add_location("g2", true).unwrap();
        ra.add_register("x").unwrap();
        let mut assignment = Map::default();
        assignment.insert("x".to_string(), Symbol::parameter("p0"));
        ra.add_transition("g0", letter("store"), Guard::True, assignment, "g1").unwrap();
        ra.add_transition(
            "g1",
            letter("check"),
            Guard::eq(Symbol::parameter("p0"), Symbol::register("x")),
            Map::default(),
            "g2",
        )
        .unwrap();
        ra
    }

    #[test]
    fn first_terminal_maximises_bfs_distance() {
        let mut ra = line(3);
        // a second accepting location closer to the start must lose
        ra.add_location("near", true).unwrap();
        ra.add_transition("q0", letter("b"), Guard::True, Map::default(), "near").unwrap();
        let terminal = find_first_terminal(&ra).unwrap();
        assert_eq!(ra.location(terminal).name(), "q3");
    }

    #[test]
    fn first_terminal_breaks_ties_by_insertion_order() {
        let mut ra = RegisterAutomaton::new("q0", false);
        ra.add_location("q1", true).unwrap();
        ra.add_location("q2", true).unwrap();
        ra.add_transition("q0", letter("a"), Guard::True, Map::default(), "q1").unwrap();
        ra.add_transition("q0", letter("b"), Guard::True, Map::default(), "q2").unwrap();
        let terminal = find_first_terminal(&ra).unwrap();
        assert_eq!(ra.location(terminal).name(), "q1");
    }

    #[test]
    fn unreachable_accepting_locations_are_no_terminals() {
        let mut ra = RegisterAutomaton::new("q0", false);
        ra.add_location("island", true).unwrap();
        assert_eq!(find_first_terminal(&ra), Err(ComposeError::NoTerminalLocation));
    }

    #[test]
    fn concat_merges_onto_the_rendezvous() {
        let a = line(2);
        let b = store_gadget();
        let out = concat(&a, &b).unwrap();

        assert_eq!(out.initial_location().name(), "l_q0");
        let merged = out.location_id("l_q2+r_g0").expect("merged location exists");
        // b's initial out-edge now leaves the merged location
        assert!(out
            .outgoing(merged)
            .iter()
            .any(|&t| out.transition(t).symbol().label() == "store"));
        assert_eq!(out.size(), a.size() + b.size() - 1);
        assert!(out.has_register("x"));
    }

    #[test]
    fn concat_rejects_reinitialised_registers() {
        let mut a = line(1);
        a.add_register("x").unwrap();
        let mut b = RegisterAutomaton::new("s0", true);
        b.add_initialized_register("x", 5).unwrap();
        assert_eq!(
            concat(&a, &b).unwrap_err(),
            ComposeError::RegisterConflict("x".to_string())
        );
    }

    #[test]
    fn zero_share_replacement_is_the_identity() {
        let a = line(4);
        let mut rng = StdRng::seed_from_u64(3);
        let out = partial_replacement(&a, 0.0, &[store_gadget()], &mut rng).unwrap();
        assert_eq!(out.to_string(), a.to_string());
    }

    #[test]
    fn full_share_replaces_every_independent_transition() {
        let a = line(6);
        let gadget = store_gadget();
        let mut rng = StdRng::seed_from_u64(7);
        let out = partial_replacement(&a, 1.0, &[gadget.clone()], &mut rng).unwrap();

        // a line of six transitions has an independent set of at least two
        let spliced = out
            .locations()
            .filter(|(_, location)| location.name().starts_with('g'))
            .count();
        assert!(spliced >= 2, "expected at least two splices, saw {spliced}");
        assert!(out.has_register("x"));
        assert_eq!(out.initial_location().name(), "q0");
    }

    #[test]
    fn replacement_share_is_validated() {
        let a = line(2);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            partial_replacement(&a, 1.5, &[store_gadget()], &mut rng),
            Err(ComposeError::InvalidShare(_))
        ));
    }

    #[test]
    fn initialised_replacements_are_rejected() {
        let a = line(2);
        let mut bad = store_gadget();
        bad.add_initialized_register("y", 1).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            partial_replacement(&a, 0.5, &[bad], &mut rng).unwrap_err(),
            ComposeError::InitializedReplacement
        );
    }

    /// A diamond with a middle location that has two non-loop incoming and
    /// two non-loop outgoing transitions.
    fn diamond() -> RegisterAutomaton {
        let mut ra = RegisterAutomaton::new("q0", false);
        ra.add_location("top", false).unwrap();
        ra.add_location("mid", false).unwrap();
        ra.add_location("end", true).unwrap();
        for (from, sym, to) in [
            ("q0", "a", "mid"),
            ("top", "a", "mid"),
            ("q0", "b", "top"),
            ("mid", "a", "end"),
            ("mid", "b", "q0"),
            ("mid", "c", "mid"),
        ] {
            ra.add_transition(from, letter(sym), Guard::True, Map::default(), to).unwrap();
        }
        ra
    }

    #[test_log::test]
    fn split_single_grows_by_four_plus_discriminator_interior() {
        let a = diamond();
        let discriminator = store_gadget();
        let mut rng = StdRng::seed_from_u64(11);
        let out = split_single(&a, &discriminator, &mut rng).unwrap();

        assert_eq!(out.size(), a.size() + 4 + 2 * (discriminator.size() - 2));
        for suffix in ["_il", "_ir", "_ol", "_or"] {
            let name = format!("mid{suffix}");
            let id = out.location_id(&name).expect("split location exists");
            assert!(!out.location(id).is_accepting());
        }
        // the self-loop on `mid` is gone
        let mid = out.location_id("mid").unwrap();
        assert!(out.outgoing(mid).is_empty());
        assert!(out.incoming(mid).is_empty());
    }

    #[test]
    fn split_single_requires_a_candidate() {
        let a = line(2);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            split_single(&a, &store_gadget(), &mut rng).unwrap_err(),
            ComposeError::NoSplittableLocation
        );
    }
}
