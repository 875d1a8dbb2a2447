use tracing::debug;
use wikira::{Expression, WikiGuard, WikiRa};

use crate::automaton::RegisterAutomaton;
use crate::guard::Guard;
use crate::math::Map;
use crate::symbol::{LabeledSymbol, Symbol};

use super::{to_internal_relation, WikiConversionError};

/// Converts a Wiki document into the generator model.
///
/// Inputs and outputs are merged into one label set, constants and globals
/// into the register set; a constant becomes a register whose initial
/// valuation is its parsed integer, and guard literals are rewritten into
/// references to the register representing that value. Local parameter names
/// bind the symbol's formal parameters positionally. The Wiki form carries no
/// acceptance attribute (acceptance is encoded via output symbols on the
/// wire), so every converted location is non-accepting.
pub fn wiki_to_ra(wiki: &WikiRa) -> Result<RegisterAutomaton, WikiConversionError> {
    let mut symbols: Map<String, LabeledSymbol> = Map::default();
    for symbol in wiki.alphabet.inputs.iter().chain(&wiki.alphabet.outputs) {
        symbols.insert(
            symbol.name.clone(),
            LabeledSymbol::new(
                symbol.name.clone(),
                symbol.params.iter().map(|param| param.name.clone()),
            ),
        );
    }

    let initials: Vec<&str> = wiki
        .locations
        .iter()
        .filter(|location| location.initial)
        .map(|location| location.name.as_str())
        .collect();
    if initials.len() != 1 {
        return Err(WikiConversionError::InitialLocationCount(initials.len()));
    }
    let mut ra = RegisterAutomaton::new(initials[0], false);
    for location in &wiki.locations {
        if !location.initial {
            ra.add_location(&location.name, false)?;
        }
    }

    let mut constants_by_value: Map<i64, String> = Map::default();
    for constant in &wiki.constants {
        let value: i64 = constant.value.trim().parse().map_err(|_| {
            WikiConversionError::MalformedConstant {
                name: constant.name.clone(),
                value: constant.value.clone(),
            }
        })?;
        ra.add_initialized_register(&constant.name, value)?;
        constants_by_value.entry(value).or_insert_with(|| constant.name.clone());
    }
    for global in &wiki.globals {
        ra.add_register(&global.name)?;
    }

    for transition in &wiki.transitions {
        let symbol = symbols
            .get(&transition.symbol)
            .ok_or_else(|| WikiConversionError::UnknownSymbol(transition.symbol.clone()))?;

        let locals: Map<&str, Symbol> = if transition.params.is_empty() {
            symbol.params().iter().map(|param| (param.name(), param.clone())).collect()
        } else {
            if transition.params.len() != symbol.arity() {
                return Err(WikiConversionError::ParameterCountMismatch {
                    symbol: symbol.label().to_string(),
                    given: transition.params.len(),
                    arity: symbol.arity(),
                });
            }
            transition
                .params
                .iter()
                .map(String::as_str)
                .zip(symbol.params().iter().cloned())
                .collect()
        };

        let guard = match &transition.guard {
            Some(guard) => convert_guard(guard, &locals, &ra, &constants_by_value)?,
            None => Guard::True,
        };
        let mut assignment = Map::default();
        for assign in &transition.assignments {
            assignment.insert(
                assign.to.clone(),
                convert_expression(&assign.from, &locals, &ra, &constants_by_value)?,
            );
        }

        ra.add_transition(&transition.from, symbol.clone(), guard, assignment, &transition.to)?;
    }

    debug!(
        "imported automaton with {} locations and {} transitions",
        ra.size(),
        ra.transition_count()
    );
    Ok(ra)
}

fn convert_guard(
    guard: &WikiGuard,
    locals: &Map<&str, Symbol>,
    ra: &RegisterAutomaton,
    constants: &Map<i64, String>,
) -> Result<Guard, WikiConversionError> {
    Ok(match guard {
        WikiGuard::True => Guard::True,
        WikiGuard::And(children) => Guard::And(
            children
                .iter()
                .map(|child| convert_guard(child, locals, ra, constants))
                .collect::<Result<_, _>>()?,
        ),
        WikiGuard::Or(children) => Guard::Or(
            children
                .iter()
                .map(|child| convert_guard(child, locals, ra, constants))
                .collect::<Result<_, _>>()?,
        ),
        WikiGuard::Rel { rel, left, right } => Guard::Rel {
            rel: to_internal_relation(*rel),
            left: convert_expression(left, locals, ra, constants)?,
            right: convert_expression(right, locals, ra, constants)?,
        },
    })
}

fn convert_expression(
    expression: &Expression,
    locals: &Map<&str, Symbol>,
    ra: &RegisterAutomaton,
    constants: &Map<i64, String>,
) -> Result<Symbol, WikiConversionError> {
    match expression {
        Expression::Variable(name) => {
            if let Some(symbol) = locals.get(name.as_str()) {
                Ok(symbol.clone())
            } else if ra.has_register(name) {
                Ok(Symbol::register(name.clone()))
            } else {
                Err(WikiConversionError::UnknownVariable(name.clone()))
            }
        }
        Expression::Constant(value) => constants
            .get(value)
            .map(|name| Symbol::register(name.clone()))
            .ok_or(WikiConversionError::UnknownConstant(*value)),
    }
}

#[cfg(test)]
mod tests {
    use super::wiki_to_ra;
    use crate::guard::{Guard, Relation};
    use crate::symbol::Symbol;
    use crate::wiki::WikiConversionError;
    use wikira::WikiRa;

    const DOCUMENT: &str = r#"<register-automaton>
  <alphabet>
    <inputs>
      <symbol name="IPut">
        <param name="p0" type="int"/>
        <param name="p1" type="int"/>
      </symbol>
    </inputs>
    <outputs>
      <symbol name="OAccept"/>
    </outputs>
  </alphabet>
  <constants>
    <constant name="c1" type="int">1000</constant>
  </constants>
  <globals>
    <variable name="x_0" type="int">0</variable>
  </globals>
  <locations>
    <location name="q_0" initial="true"/>
    <location name="q_1"/>
  </locations>
  <transitions>
    <transition from="q_0" to="q_1" symbol="IPut" params="a,b">
      <guard>(a==b &amp;&amp; a!=1000) || a&gt;=x_0</guard>
      <assignments>
        <assign to="x_0">a</assign>
      </assignments>
    </transition>
    <transition from="q_1" to="q_0" symbol="OAccept"/>
  </transitions>
</register-automaton>"#;

    #[test]
    fn imports_the_reference_document() {
        let wiki = WikiRa::from_xml(DOCUMENT).unwrap();
        let ra = wiki_to_ra(&wiki).unwrap();

        assert_eq!(ra.initial_location().name(), "q_0");
        // acceptance is carried by output symbols, not by locations
        assert!(ra.locations().all(|(_, location)| !location.is_accepting()));
        assert_eq!(
            ra.registers().collect::<Vec<_>>(),
            vec![("c1", Some(1000)), ("x_0", None)]
        );

        let (_, transition) = ra.transitions().next().unwrap();
        assert_eq!(transition.symbol().label(), "IPut");
        // `a`/`b` bind the formal parameters, `1000` resolves to its constant
        assert_eq!(
            transition.guard(),
            &Guard::Or(vec![
                Guard::And(vec![
                    Guard::eq(Symbol::parameter("p0"), Symbol::parameter("p1")),
                    Guard::neq(Symbol::parameter("p0"), Symbol::register("c1")),
                ]),
                Guard::rel(Relation::Geq, Symbol::parameter("p0"), Symbol::register("x_0")),
            ])
        );
        assert_eq!(
            transition.assignment().get("x_0"),
            Some(&Symbol::parameter("p0"))
        );
    }

    #[test]
    fn rejects_unresolvable_literals() {
        let wiki = WikiRa::from_xml(
            r#"<register-automaton>
  <alphabet>
    <inputs><symbol name="IPut"><param name="p0" type="int"/></symbol></inputs>
    <outputs/>
  </alphabet>
  <locations>
    <location name="q_0" initial="true"/>
  </locations>
  <transitions>
    <transition from="q_0" to="q_0" symbol="IPut">
      <guard>p0==42</guard>
    </transition>
  </transitions>
</register-automaton>"#,
        )
        .unwrap();
        assert_eq!(
            wiki_to_ra(&wiki).unwrap_err(),
            WikiConversionError::UnknownConstant(42)
        );
    }

    #[test]
    fn requires_a_unique_initial_location() {
        let wiki = WikiRa::from_xml(
            r#"<register-automaton>
  <locations>
    <location name="a"/>
    <location name="b"/>
  </locations>
</register-automaton>"#,
        )
        .unwrap();
        assert_eq!(
            wiki_to_ra(&wiki).unwrap_err(),
            WikiConversionError::InitialLocationCount(0)
        );
    }
}
