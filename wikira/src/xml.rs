use chumsky::prelude::*;

use crate::ParseError;

/// An XML element with its attributes and children, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Tag name.
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Child nodes; whitespace-only text and comments are dropped.
    pub children: Vec<XmlNode>,
}

/// A node inside an [`XmlElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// A nested element.
    Element(XmlElement),
    /// Trimmed, entity-resolved character data.
    Text(String),
}

impl XmlElement {
    /// Looks an attribute up by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The child elements, skipping text nodes.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// The first child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.name == name)
    }

    /// All child elements with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |element| element.name == name)
    }

    /// The concatenated character data of the element.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }
}

/// Parses an XML document into its root element. The XML declaration and
/// comments are skipped; character data is trimmed and entity-resolved.
pub fn parse_document(input: &str) -> Result<XmlElement, ParseError> {
    document().parse(input).map_err(ParseError::from_chumsky)
}

/// Escapes character data for element content.
pub fn escape_text(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Escapes character data for a double-quoted attribute value.
pub fn escape_attribute(raw: &str) -> String {
    escape_text(raw).replace('"', "&quot;")
}

/// Resolves the five predefined entities.
fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn name() -> impl Parser<char, String, Error = Simple<char>> {
    filter(|c: &char| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .repeated()
        .at_least(1)
        .collect()
}

fn comment() -> impl Parser<char, (), Error = Simple<char>> {
    just("<!--").then(take_until(just("-->"))).ignored()
}

fn trivia() -> impl Parser<char, (), Error = Simple<char>> {
    choice((comment(), filter(|c: &char| c.is_whitespace()).ignored()))
        .repeated()
        .ignored()
}

fn document() -> impl Parser<char, XmlElement, Error = Simple<char>> {
    let declaration = just("<?").then(take_until(just("?>"))).ignored();
    let prolog = choice((
        declaration,
        comment(),
        filter(|c: &char| c.is_whitespace()).ignored(),
    ))
    .repeated()
    .ignored();

    prolog.ignore_then(element()).then_ignore(trivia()).then_ignore(end())
}

fn element() -> impl Parser<char, XmlElement, Error = Simple<char>> {
    recursive(|element| {
        let attribute = name()
            .then_ignore(just('=').padded())
            .then(
                filter(|c: &char| *c != '"')
                    .repeated()
                    .collect::<String>()
                    .delimited_by(just('"'), just('"')),
            )
            .map(|(key, value)| (key, unescape(&value)));

        let text = filter(|c: &char| *c != '<')
            .repeated()
            .at_least(1)
            .collect::<String>()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(XmlNode::Text(unescape(trimmed)))
                }
            });

        let node = choice((
            comment().to(Option::<XmlNode>::None),
            element.map(|child: XmlElement| Some(XmlNode::Element(child))),
            text,
        ));

        let closing = just("</")
            .ignore_then(name())
            .then_ignore(text::whitespace())
            .then_ignore(just('>'));

        let with_children = just('>')
            .ignore_then(node.repeated())
            .then(closing)
            .map(|(children, close)| {
                (children.into_iter().flatten().collect::<Vec<_>>(), Some(close))
            });

        let self_closing = just("/>").map(|_| (Vec::new(), None));

        just('<')
            .ignore_then(name())
            .then(attribute.padded().repeated())
            .then_ignore(text::whitespace())
            .then(self_closing.or(with_children))
            .try_map(|((name, attributes), (children, close)), span| {
                if let Some(close) = close {
                    if close != name {
                        return Err(Simple::custom(
                            span,
                            format!("closing tag `</{close}>` does not match `<{name}>`"),
                        ));
                    }
                }
                Ok(XmlElement { name, attributes, children })
            })
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_document, XmlNode};

    #[test]
    fn elements_attributes_and_text() {
        let root = parse_document(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <!-- a comment -->
            <root kind="demo">
              <empty/>
              <child name="a">payload</child>
              <!-- another comment -->
            </root>"#,
        )
        .unwrap();

        assert_eq!(root.name, "root");
        assert_eq!(root.attribute("kind"), Some("demo"));
        assert_eq!(root.elements().count(), 2);
        assert!(root.child("empty").unwrap().children.is_empty());
        let child = root.child("child").unwrap();
        assert_eq!(child.attribute("name"), Some("a"));
        assert_eq!(child.text(), "payload");
    }

    #[test]
    fn entities_are_resolved() {
        let root = parse_document(r#"<g a="&quot;x&quot;">(a &gt;= b) &amp;&amp; c</g>"#).unwrap();
        assert_eq!(root.attribute("a"), Some("\"x\""));
        assert_eq!(root.text(), "(a >= b) && c");
    }

    #[test]
    fn mismatched_closing_tags_are_rejected() {
        let error = parse_document("<a><b></a></b>").unwrap_err();
        assert!(error.message.contains("closing tag") || !error.message.is_empty());
    }

    #[test]
    fn whitespace_only_text_is_dropped() {
        let root = parse_document("<a>\n  <b/>\n</a>").unwrap();
        assert_eq!(root.children.len(), 1);
        assert!(matches!(root.children[0], XmlNode::Element(_)));
    }
}
