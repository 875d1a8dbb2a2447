//! Data model and serialisation for the Automata-Wiki register automaton
//! format: a typed view of the `<register-automaton>` XML dialect, the guard
//! mini-language with its two printer dialects, and the round-trip between
//! both.

use std::fmt::{self, Write};

use thiserror::Error;

pub mod guard;
pub mod xml;

pub use guard::{
    format_guard, parse_expression, parse_guard, DialectError, DnfAnd, DnfOr, Expression,
    GuardDialect, Relation, WikiGuard,
};
pub use xml::{XmlElement, XmlNode};

/// A syntax error with the byte offset it was encountered at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at offset {offset}: {message}")]
pub struct ParseError {
    /// Byte offset into the input.
    pub offset: usize,
    /// Human readable description.
    pub message: String,
}

impl ParseError {
    pub(crate) fn from_chumsky(errors: Vec<chumsky::error::Simple<char>>) -> Self {
        let first = errors.into_iter().next().expect("chumsky reports at least one error");
        ParseError { offset: first.span().start, message: first.to_string() }
    }
}

/// Errors raised while decoding a register automaton document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WikiFormatError {
    /// The document is not well-formed, or a guard failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The root element has the wrong name.
    #[error("expected root element `register-automaton`, found `{0}`")]
    UnexpectedRoot(String),
    /// A required attribute is absent.
    #[error("missing attribute `{attribute}` on `<{element}>`")]
    MissingAttribute {
        /// The element lacking the attribute.
        element: String,
        /// The attribute name.
        attribute: &'static str,
    },
}

/// A register automaton in its serialisation-oriented Wiki shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WikiRa {
    /// Input and output symbols.
    pub alphabet: WikiAlphabet,
    /// Named integer constants.
    pub constants: Vec<WikiRegister>,
    /// Global registers.
    pub globals: Vec<WikiRegister>,
    /// Control locations.
    pub locations: Vec<WikiLocation>,
    /// Guarded transitions.
    pub transitions: Vec<WikiTransition>,
}

/// The split alphabet of a [`WikiRa`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WikiAlphabet {
    /// Input symbols.
    pub inputs: Vec<WikiSymbol>,
    /// Output symbols.
    pub outputs: Vec<WikiSymbol>,
}

/// An alphabet symbol with its formal parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiSymbol {
    /// Symbol name.
    pub name: String,
    /// Formal parameters, in declaration order.
    pub params: Vec<WikiParam>,
}

/// A formal parameter of a [`WikiSymbol`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiParam {
    /// Parameter name.
    pub name: String,
    /// Parameter type, `int` in this dialect.
    pub typ: String,
}

/// A constant or global register with its textual initialiser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiRegister {
    /// Register name.
    pub name: String,
    /// Register type, `int` in this dialect.
    pub typ: String,
    /// Textual initial value.
    pub value: String,
}

/// A control location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLocation {
    /// Whether this is the initial location; at most one location is.
    pub initial: bool,
    /// Location name.
    pub name: String,
}

/// A transition between two locations. An absent guard is the trivial guard,
/// absent parameter names default to the symbol's formal parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiTransition {
    /// Source location name.
    pub from: String,
    /// Local names binding the symbol's parameters, in order.
    pub params: Vec<String>,
    /// The symbol read by the transition.
    pub symbol: String,
    /// Target location name.
    pub to: String,
    /// The guard; `None` is the trivial guard.
    pub guard: Option<WikiGuard>,
    /// Register updates applied when the transition fires.
    pub assignments: Vec<Assignment>,
}

/// A register update of a [`WikiTransition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// The register being written.
    pub to: String,
    /// The source expression.
    pub from: Expression,
}

fn require<'a>(
    element: &'a XmlElement,
    attribute: &'static str,
) -> Result<&'a str, WikiFormatError> {
    element.attribute(attribute).ok_or_else(|| WikiFormatError::MissingAttribute {
        element: element.name.clone(),
        attribute,
    })
}

impl WikiRa {
    /// Decodes a register automaton document. Both the compact form (absent
    /// elements and attributes for empty collections and defaults) and the
    /// explicit form are accepted.
    pub fn from_xml(input: &str) -> Result<WikiRa, WikiFormatError> {
        let root = xml::parse_document(input)?;
        if root.name != "register-automaton" {
            return Err(WikiFormatError::UnexpectedRoot(root.name));
        }

        let alphabet = match root.child("alphabet") {
            Some(alphabet) => WikiAlphabet {
                inputs: decode_symbols(alphabet.child("inputs"))?,
                outputs: decode_symbols(alphabet.child("outputs"))?,
            },
            None => WikiAlphabet::default(),
        };

        let constants = decode_registers(root.child("constants"), "constant")?;
        let globals = decode_registers(root.child("globals"), "variable")?;

        let mut locations = Vec::new();
        if let Some(parent) = root.child("locations") {
            for element in parent.children_named("location") {
                locations.push(WikiLocation {
                    initial: element.attribute("initial") == Some("true"),
                    name: require(element, "name")?.to_string(),
                });
            }
        }

        let mut transitions = Vec::new();
        if let Some(parent) = root.child("transitions") {
            for element in parent.children_named("transition") {
                transitions.push(decode_transition(element)?);
            }
        }

        Ok(WikiRa { alphabet, constants, globals, locations, transitions })
    }

    /// Serialises the automaton with two-space indentation, producing the
    /// compact form. Guards are rendered in the requested dialect.
    pub fn to_xml_string(&self, dialect: GuardDialect) -> Result<String, DialectError> {
        let guards: Vec<Option<String>> = self
            .transitions
            .iter()
            .map(|transition| match &transition.guard {
                Some(guard) if !guard.is_trivially_true() => {
                    format_guard(guard, dialect).map(|text| (!text.is_empty()).then_some(text))
                }
                _ => Ok(None),
            })
            .collect::<Result<_, _>>()?;

        let mut out = String::new();
        self.write_xml(&mut out, &guards).unwrap();
        Ok(out)
    }

    fn write_xml<W: Write>(&self, w: &mut W, guards: &[Option<String>]) -> fmt::Result {
        writeln!(w, r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#)?;
        writeln!(w, "<register-automaton>")?;

        writeln!(w, "  <alphabet>")?;
        write_symbols(w, "inputs", &self.alphabet.inputs)?;
        write_symbols(w, "outputs", &self.alphabet.outputs)?;
        writeln!(w, "  </alphabet>")?;

        write_registers(w, "constants", "constant", &self.constants)?;
        write_registers(w, "globals", "variable", &self.globals)?;

        writeln!(w, "  <locations>")?;
        for location in &self.locations {
            if location.initial {
                writeln!(
                    w,
                    r#"    <location name="{}" initial="true"/>"#,
                    xml::escape_attribute(&location.name)
                )?;
            } else {
                writeln!(w, r#"    <location name="{}"/>"#, xml::escape_attribute(&location.name))?;
            }
        }
        writeln!(w, "  </locations>")?;

        writeln!(w, "  <transitions>")?;
        for (transition, guard) in self.transitions.iter().zip(guards) {
            write!(
                w,
                r#"    <transition from="{}" to="{}" symbol="{}""#,
                xml::escape_attribute(&transition.from),
                xml::escape_attribute(&transition.to),
                xml::escape_attribute(&transition.symbol),
            )?;
            if !transition.params.is_empty() {
                write!(w, r#" params="{}""#, xml::escape_attribute(&transition.params.join(",")))?;
            }
            if guard.is_none() && transition.assignments.is_empty() {
                writeln!(w, "/>")?;
                continue;
            }
            writeln!(w, ">")?;
            if let Some(guard) = guard {
                writeln!(w, "      <guard>{}</guard>", xml::escape_text(guard))?;
            }
            if !transition.assignments.is_empty() {
                writeln!(w, "      <assignments>")?;
                for assignment in &transition.assignments {
                    writeln!(
                        w,
                        r#"        <assign to="{}">{}</assign>"#,
                        xml::escape_attribute(&assignment.to),
                        xml::escape_text(&assignment.from.to_string()),
                    )?;
                }
                writeln!(w, "      </assignments>")?;
            }
            writeln!(w, "    </transition>")?;
        }
        writeln!(w, "  </transitions>")?;

        writeln!(w, "</register-automaton>")
    }
}

fn decode_symbols(parent: Option<&XmlElement>) -> Result<Vec<WikiSymbol>, WikiFormatError> {
    let mut symbols = Vec::new();
    if let Some(parent) = parent {
        for element in parent.children_named("symbol") {
            let mut params = Vec::new();
            for param in element.children_named("param") {
                params.push(WikiParam {
                    name: require(param, "name")?.to_string(),
                    typ: param.attribute("type").unwrap_or("int").to_string(),
                });
            }
            symbols.push(WikiSymbol { name: require(element, "name")?.to_string(), params });
        }
    }
    Ok(symbols)
}

fn decode_registers(
    parent: Option<&XmlElement>,
    tag: &str,
) -> Result<Vec<WikiRegister>, WikiFormatError> {
    let mut registers = Vec::new();
    if let Some(parent) = parent {
        for element in parent.children_named(tag) {
            registers.push(WikiRegister {
                name: require(element, "name")?.to_string(),
                typ: element.attribute("type").unwrap_or("int").to_string(),
                value: element.text(),
            });
        }
    }
    Ok(registers)
}

fn decode_transition(element: &XmlElement) -> Result<WikiTransition, WikiFormatError> {
    let params = element
        .attribute("params")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let guard = match element.child("guard") {
        Some(guard) => {
            let parsed = parse_guard(&guard.text())?;
            (!parsed.is_trivially_true()).then_some(parsed)
        }
        None => None,
    };

    let mut assignments = Vec::new();
    if let Some(parent) = element.child("assignments") {
        for assign in parent.children_named("assign") {
            assignments.push(Assignment {
                to: require(assign, "to")?.to_string(),
                from: parse_expression(&assign.text())?,
            });
        }
    }

    Ok(WikiTransition {
        from: require(element, "from")?.to_string(),
        params,
        symbol: require(element, "symbol")?.to_string(),
        to: require(element, "to")?.to_string(),
        guard,
        assignments,
    })
}

fn write_symbols<W: Write>(w: &mut W, tag: &str, symbols: &[WikiSymbol]) -> fmt::Result {
    if symbols.is_empty() {
        return writeln!(w, "    <{tag}/>");
    }
    writeln!(w, "    <{tag}>")?;
    for symbol in symbols {
        if symbol.params.is_empty() {
            writeln!(w, r#"      <symbol name="{}"/>"#, xml::escape_attribute(&symbol.name))?;
            continue;
        }
        writeln!(w, r#"      <symbol name="{}">"#, xml::escape_attribute(&symbol.name))?;
        for param in &symbol.params {
            writeln!(
                w,
                r#"        <param name="{}" type="{}"/>"#,
                xml::escape_attribute(&param.name),
                xml::escape_attribute(&param.typ),
            )?;
        }
        writeln!(w, "      </symbol>")?;
    }
    writeln!(w, "    </{tag}>")
}

fn write_registers<W: Write>(
    w: &mut W,
    tag: &str,
    inner: &str,
    registers: &[WikiRegister],
) -> fmt::Result {
    if registers.is_empty() {
        return writeln!(w, "  <{tag}/>");
    }
    writeln!(w, "  <{tag}>")?;
    for register in registers {
        writeln!(
            w,
            r#"    <{inner} name="{}" type="{}">{}</{inner}>"#,
            xml::escape_attribute(&register.name),
            xml::escape_attribute(&register.typ),
            xml::escape_text(&register.value),
        )?;
    }
    writeln!(w, "  </{tag}>")
}

#[cfg(test)]
mod tests {
    use super::{Expression, GuardDialect, WikiGuard, WikiRa};

    const SIMPLE_REDUNDANT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<register-automaton>
  <alphabet>
    <inputs>
      <symbol name="IPut">
        <param name="p0" type="int"/>
        <param name="p1" type="int"/>
      </symbol>
    </inputs>
    <outputs>
      <symbol name="OAccept"/>
      <symbol name="OReject"/>
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
    <location name="io_0"/>
  </locations>
  <transitions>
    <transition from="q_0" to="io_0" symbol="IPut" params="a,b">
      <guard>(((a == b) &amp;&amp; (a != 1000)) || (a &gt;= x_0))</guard>
      <assignments>
        <assign to="x_0">a</assign>
      </assignments>
    </transition>
    <transition from="io_0" to="q_0" symbol="OAccept"/>
  </transitions>
</register-automaton>
"#;

    #[test]
    fn decodes_the_reference_document() {
        let ra = WikiRa::from_xml(SIMPLE_REDUNDANT).unwrap();

        assert_eq!(ra.alphabet.inputs.len(), 1);
        assert_eq!(ra.alphabet.inputs[0].name, "IPut");
        assert_eq!(ra.alphabet.inputs[0].params.len(), 2);
        assert_eq!(ra.alphabet.outputs.len(), 2);
        assert_eq!(ra.constants.len(), 1);
        assert_eq!(ra.constants[0].value, "1000");
        assert_eq!(ra.globals[0].name, "x_0");
        assert!(ra.locations[0].initial);
        assert!(!ra.locations[1].initial);

        let transition = &ra.transitions[0];
        assert_eq!(transition.params, vec!["a", "b"]);
        let guard = transition.guard.as_ref().unwrap();
        assert!(matches!(guard, WikiGuard::Or(_)));
        assert_eq!(transition.assignments.len(), 1);
        assert_eq!(transition.assignments[0].from, Expression::Variable("a".to_string()));

        assert_eq!(ra.transitions[1].guard, None);
        assert!(ra.transitions[1].assignments.is_empty());
        assert!(ra.transitions[1].params.is_empty());
    }

    #[test]
    fn reserialisation_reproduces_the_canonical_form() {
        let ra = WikiRa::from_xml(SIMPLE_REDUNDANT).unwrap();
        let emitted = ra.to_xml_string(GuardDialect::Wiki).unwrap();
        assert_eq!(emitted, SIMPLE_REDUNDANT);
        assert_eq!(WikiRa::from_xml(&emitted).unwrap(), ra);
    }

    #[test]
    fn ralib_dialect_rewrites_guards_on_the_way_out() {
        let ra = WikiRa::from_xml(SIMPLE_REDUNDANT).unwrap();
        let emitted = ra.to_xml_string(GuardDialect::RalibSafe).unwrap();
        assert!(emitted.contains("<guard>a==b&amp;&amp;a!=1000||a&gt;x_0||a==x_0</guard>"));
        // the restricted dialect still parses
        WikiRa::from_xml(&emitted).unwrap();
    }

    #[test]
    fn compact_and_explicit_forms_are_equivalent() {
        let compact = "<register-automaton/>";
        let explicit = r#"<register-automaton>
            <alphabet><inputs/><outputs></outputs></alphabet>
            <constants></constants>
            <globals/>
            <locations/>
            <transitions/>
        </register-automaton>"#;
        assert_eq!(
            WikiRa::from_xml(compact).unwrap(),
            WikiRa::from_xml(explicit).unwrap()
        );
    }
}
