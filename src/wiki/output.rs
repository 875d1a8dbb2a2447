use tracing::debug;
use wikira::{
    Assignment, Expression, WikiAlphabet, WikiGuard, WikiLocation, WikiParam, WikiRa,
    WikiRegister, WikiSymbol, WikiTransition,
};

use crate::automaton::{LocationId, RegisterAutomaton};
use crate::guard::Guard;
use crate::math::Map;
use crate::symbol::LabeledSymbol;

use super::{to_wiki_relation, WikiConversionError};

const OUTPUT_ACCEPT: &str = "OAccept";
const OUTPUT_REJECT: &str = "OReject";
const OUTPUT_ERROR: &str = "OError";
const TRAP: &str = "trap";
const IO_TRAP: &str = "io_trap";

/// Converts the generator model into the totalised, signal-encoded Wiki form.
///
/// Acceptance moves onto the wire: every transition `q0 --sym[g/a]--> q1` is
/// split through a fresh intermediate location which answers `OAccept` or
/// `OReject` depending on `q1`. Input symbols are renamed `I<label>`;
/// `bonus_symbols` join the input alphabet without carrying any transitions,
/// which routes them into the sink. Missing input coverage is completed by a
/// trap pair: every uncovered (location, symbol) combination leads into
/// `io_trap` under the negated disjunction of the guards already present, and
/// `io_trap` answers `OError`. Registers are emitted as globals; the emitted
/// form has no constants.
pub fn ra_to_wiki(
    ra: &RegisterAutomaton,
    bonus_symbols: &[LabeledSymbol],
) -> Result<WikiRa, WikiConversionError> {
    let mut used: Map<String, LabeledSymbol> = Map::default();
    for (_, transition) in ra.transitions() {
        used.entry(transition.symbol().label().to_string())
            .or_insert_with(|| transition.symbol().clone());
    }
    for bonus in bonus_symbols {
        used.entry(bonus.label().to_string()).or_insert_with(|| bonus.clone());
    }

    let alphabet = WikiAlphabet {
        inputs: used
            .values()
            .map(|symbol| WikiSymbol {
                name: input_name(symbol.label()),
                params: symbol
                    .params()
                    .iter()
                    .map(|param| WikiParam { name: param.name().to_string(), typ: "int".to_string() })
                    .collect(),
            })
            .collect(),
        outputs: [OUTPUT_ACCEPT, OUTPUT_REJECT, OUTPUT_ERROR]
            .iter()
            .map(|name| WikiSymbol { name: name.to_string(), params: Vec::new() })
            .collect(),
    };

    let globals: Vec<WikiRegister> = ra
        .registers()
        .map(|(name, _)| WikiRegister {
            name: name.to_string(),
            typ: "int".to_string(),
            value: "0".to_string(),
        })
        .collect();

    let mut io_locations = Vec::new();
    let mut transitions = Vec::new();
    for (id, transition) in ra.transitions() {
        let from = ra.location(transition.from());
        let to = ra.location(transition.to());
        let io = format!(
            "io_{id}_{}_{}_{}",
            from.name(),
            transition.symbol().label(),
            to.name()
        );
        io_locations.push(io.clone());

        transitions.push(WikiTransition {
            from: from.name().to_string(),
            params: transition.symbol().params().iter().map(|p| p.name().to_string()).collect(),
            symbol: input_name(transition.symbol().label()),
            to: io.clone(),
            guard: wiki_guard(transition.guard()),
            assignments: transition
                .assignment()
                .iter()
                .map(|(target, source)| Assignment {
                    to: target.clone(),
                    from: Expression::Variable(source.name().to_string()),
                })
                .collect(),
        });
        transitions.push(WikiTransition {
            from: io,
            params: Vec::new(),
            symbol: if to.is_accepting() { OUTPUT_ACCEPT } else { OUTPUT_REJECT }.to_string(),
            to: to.name().to_string(),
            guard: None,
            assignments: Vec::new(),
        });
    }

    // complete the input coverage of every location, the trap included
    let mut sinks = 0usize;
    let coverage: Vec<(Option<LocationId>, &str)> = ra
        .locations()
        .map(|(id, location)| (Some(id), location.name()))
        .chain(std::iter::once((None, TRAP)))
        .collect();
    for (id, location_name) in coverage {
        for symbol in used.values() {
            let guards: Vec<&Guard> = match id {
                Some(id) => ra
                    .outgoing(id)
                    .iter()
                    .map(|&t| ra.transition(t))
                    .filter(|t| t.symbol().label() == symbol.label())
                    .map(|t| t.guard())
                    .collect(),
                None => Vec::new(),
            };

            let guard = if guards.is_empty() {
                None
            } else if guards.iter().any(|guard| guard.is_trivially_true()) {
                continue;
            } else {
                let covered = Guard::And(vec![Guard::Or(
                    guards.into_iter().cloned().collect(),
                )]);
                wiki_guard(&covered.invert()?)
            };

            sinks += 1;
            transitions.push(WikiTransition {
                from: location_name.to_string(),
                params: symbol.params().iter().map(|p| p.name().to_string()).collect(),
                symbol: input_name(symbol.label()),
                to: IO_TRAP.to_string(),
                guard,
                assignments: Vec::new(),
            });
        }
    }
    transitions.push(WikiTransition {
        from: IO_TRAP.to_string(),
        params: Vec::new(),
        symbol: OUTPUT_ERROR.to_string(),
        to: TRAP.to_string(),
        guard: None,
        assignments: Vec::new(),
    });

    let locations: Vec<WikiLocation> = ra
        .locations()
        .map(|(_, location)| WikiLocation {
            initial: location.is_initial(),
            name: location.name().to_string(),
        })
        .chain(io_locations.into_iter().map(|name| WikiLocation { initial: false, name }))
        .chain([TRAP, IO_TRAP].map(|name| WikiLocation { initial: false, name: name.to_string() }))
        .collect();

    debug!(
        "exported {} wiki transitions ({} of them sink edges)",
        transitions.len(),
        sinks
    );
    Ok(WikiRa { alphabet, constants: Vec::new(), globals, locations, transitions })
}

fn input_name(label: &str) -> String {
    format!("I{label}")
}

fn wiki_guard(guard: &Guard) -> Option<WikiGuard> {
    if guard.is_trivially_true() {
        return None;
    }
    Some(convert(guard))
}

fn convert(guard: &Guard) -> WikiGuard {
    match guard {
        Guard::True => WikiGuard::True,
        Guard::And(children) => WikiGuard::And(children.iter().map(convert).collect()),
        Guard::Or(children) => WikiGuard::Or(children.iter().map(convert).collect()),
        Guard::Rel { rel, left, right } => WikiGuard::Rel {
            rel: to_wiki_relation(*rel),
            left: Expression::Variable(left.name().to_string()),
            right: Expression::Variable(right.name().to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::ra_to_wiki;
    use crate::automaton::RegisterAutomaton;
    use crate::guard::Guard;
    use crate::math::Map;
    use crate::symbol::{LabeledSymbol, Symbol};
    use wikira::{GuardDialect, WikiRa};

    fn fixture() -> RegisterAutomaton {
        let mut ra = RegisterAutomaton::new("q0", false);
        ra.add_location("q1", true).unwrap();
        ra.add_register("x").unwrap();
        let mut assignment = Map::default();
        assignment.insert("x".to_string(), Symbol::parameter("p0"));
        ra.add_transition(
            "q0",
            LabeledSymbol::with_arity("put", 1),
            Guard::True,
            assignment,
            "q1",
        )
        .unwrap();
        ra.add_transition(
            "q1",
            LabeledSymbol::with_arity("get", 1),
            Guard::eq(Symbol::parameter("p0"), Symbol::register("x")),
            Map::default(),
            "q0",
        )
        .unwrap();
        ra
    }

    #[test]
    fn splits_transitions_through_intermediate_locations() {
        let wiki = ra_to_wiki(&fixture(), &[]).unwrap();

        assert_eq!(
            wiki.alphabet.inputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["Iput", "Iget"]
        );
        assert_eq!(
            wiki.alphabet.outputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["OAccept", "OReject", "OError"]
        );

        // q1 is accepting, so its intermediate location answers OAccept
        let first_io = "io_0_q0_put_q1";
        let answer = wiki
            .transitions
            .iter()
            .find(|t| t.from == first_io)
            .expect("intermediate location answers");
        assert_eq!(answer.symbol, "OAccept");
        assert_eq!(answer.to, "q1");

        // registers come out as globals, constants stay empty
        assert!(wiki.constants.is_empty());
        assert_eq!(wiki.globals.len(), 1);
        assert_eq!(wiki.globals[0].value, "0");

        assert!(wiki.locations.iter().any(|l| l.name == "trap"));
        assert!(wiki.locations.iter().any(|l| l.name == "io_trap"));
        assert_eq!(wiki.locations.iter().filter(|l| l.initial).count(), 1);
    }

    #[test]
    fn covers_every_location_and_symbol() {
        let wiki = ra_to_wiki(&fixture(), &[]).unwrap();

        // q0 lacks `get`, q1 lacks `put`, and `get` at q1 is guarded; the
        // trap needs both symbols. The guarded case negates the disjunction.
        let sink_edges: Vec<_> =
            wiki.transitions.iter().filter(|t| t.to == "io_trap").collect();
        assert_eq!(sink_edges.len(), 5);

        let negated = sink_edges
            .iter()
            .find(|t| t.from == "q1" && t.symbol == "Iget")
            .expect("partial coverage is completed");
        let guard = negated.guard.as_ref().unwrap();
        assert_eq!(guard.to_wiki_string(), "(((p0 != x)))");

        let error_edge = wiki
            .transitions
            .iter()
            .find(|t| t.from == "io_trap")
            .expect("the trap pair answers OError");
        assert_eq!(error_edge.symbol, "OError");
        assert_eq!(error_edge.to, "trap");
    }

    #[test]
    fn bonus_symbols_route_into_the_sink() {
        let bonus = LabeledSymbol::with_arity("spare", 2);
        let wiki = ra_to_wiki(&fixture(), &[bonus]).unwrap();

        assert!(wiki.alphabet.inputs.iter().any(|s| s.name == "Ispare"));
        // every location plus the trap lacks `spare` entirely
        let spare_sinks = wiki
            .transitions
            .iter()
            .filter(|t| t.symbol == "Ispare" && t.to == "io_trap")
            .count();
        assert_eq!(spare_sinks, 3);
    }

    #[test]
    fn exported_documents_parse_back() {
        let wiki = ra_to_wiki(&fixture(), &[]).unwrap();
        let xml = wiki.to_xml_string(GuardDialect::RalibSafe).unwrap();
        let reparsed = WikiRa::from_xml(&xml).unwrap();
        assert_eq!(reparsed.transitions.len(), wiki.transitions.len());
        let imported = crate::wiki::wiki_to_ra(&reparsed).unwrap();
        assert_eq!(imported.initial_location().name(), "q0");
    }
}
