//! XML event front end
//!
//! The verifier core is event-driven and source-agnostic; this module
//! is the stock front end that turns an XML string into verifier
//! events, resolving namespaces and tracking line/column positions for
//! diagnostics.

use std::str;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::error::{Error, Location, Result, ValidityViolation};
use crate::grammar::Grammar;
use crate::verifier::{StartTag, Verifier};

/// Validate an XML string against a grammar
///
/// Returns the violations in document order; an empty list means the
/// document is valid.
pub fn validate_str(grammar: &Arc<Grammar>, xml: &str) -> Result<Vec<ValidityViolation>> {
    let mut verifier = Verifier::new(Arc::clone(grammar));
    push_document(&mut verifier, xml)?;
    Ok(verifier.into_violations())
}

/// Validate an XML string, reporting only the verdict
pub fn is_valid_str(grammar: &Arc<Grammar>, xml: &str) -> Result<bool> {
    let mut verifier = Verifier::new(Arc::clone(grammar));
    push_document(&mut verifier, xml)?;
    Ok(verifier.is_valid())
}

/// Parse an XML string and push its events into a verifier
///
/// Runs one whole document: `start_document` through `end_document`.
pub fn push_document(verifier: &mut Verifier, xml: &str) -> Result<()> {
    let mut reader = NsReader::from_str(xml);
    let mut lines = LineTracker::new(xml);

    verifier.start_document();
    loop {
        let position = reader.buffer_position();
        verifier.set_location(lines.location_at(position));

        match reader.read_resolved_event() {
            Err(e) => return Err(e.into()),
            Ok((resolution, Event::Start(start))) => {
                // resolve to an owned string first: the resolution
                // borrows the reader, which build_tag needs again
                let namespace = namespace_of(&resolution)?;
                let tag = build_tag(&reader, verifier, namespace, &start)?;
                verifier.start_element(tag)?;
            }
            Ok((resolution, Event::Empty(start))) => {
                let namespace = namespace_of(&resolution)?;
                let tag = build_tag(&reader, verifier, namespace, &start)?;
                let qname = tag.qname.clone();
                verifier.start_element(tag)?;
                verifier.end_element(&qname)?;
            }
            Ok((_, Event::End(end))) => {
                let qname = decode(end.name().as_ref())?.to_string();
                verifier.end_element(&qname)?;
            }
            Ok((_, Event::Text(text))) => {
                verifier.characters(&text.unescape()?)?;
            }
            Ok((_, Event::CData(cdata))) => {
                let raw = cdata.into_inner();
                verifier.characters(decode(&raw)?)?;
            }
            Ok((_, Event::Decl(_)))
            | Ok((_, Event::Comment(_)))
            | Ok((_, Event::PI(_)))
            | Ok((_, Event::DocType(_))) => {}
            Ok((_, Event::Eof)) => break,
        }
    }
    verifier.end_document()
}

fn build_tag(
    reader: &NsReader<&[u8]>,
    verifier: &mut Verifier,
    namespace: String,
    start: &BytesStart<'_>,
) -> Result<StartTag> {
    let qname = decode(start.name().as_ref())?.to_string();
    let local = decode(start.local_name().as_ref())?.to_string();

    // prefix declarations go to the verifier before the tag itself, so
    // the new scope covers this element
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| Error::Xml(e.to_string()))?;
        let key = decode(attribute.key.as_ref())?;
        if let Some(prefix) = xmlns_prefix(key) {
            let uri = attribute
                .unescape_value()
                .map_err(|e| Error::Xml(e.to_string()))?;
            verifier.declare_prefix(prefix, &uri);
        }
    }

    let mut tag = StartTag::new(namespace, local, qname);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| Error::Xml(e.to_string()))?;
        let key = decode(attribute.key.as_ref())?;
        if xmlns_prefix(key).is_some() {
            continue;
        }
        let (attr_resolution, attr_local) = reader.resolve_attribute(attribute.key);
        let attr_namespace = namespace_of(&attr_resolution)?;
        let value = attribute
            .unescape_value()
            .map_err(|e| Error::Xml(e.to_string()))?;
        tag.add_attribute(
            &attr_namespace,
            decode(attr_local.as_ref())?,
            key,
            &value,
        );
    }
    Ok(tag)
}

fn namespace_of(resolution: &ResolveResult<'_>) -> Result<String> {
    match resolution {
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Bound(ns) => Ok(decode(ns.as_ref())?.to_string()),
        ResolveResult::Unknown(prefix) => Err(Error::Namespace(format!(
            "undeclared namespace prefix '{}'",
            String::from_utf8_lossy(prefix)
        ))),
    }
}

fn xmlns_prefix(key: &str) -> Option<&str> {
    if key == "xmlns" {
        Some("")
    } else {
        key.strip_prefix("xmlns:")
    }
}

fn decode(bytes: &[u8]) -> Result<&str> {
    str::from_utf8(bytes).map_err(|e| Error::Xml(format!("invalid UTF-8 in document: {}", e)))
}

/// Incremental byte-offset to line/column translation
struct LineTracker<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u64,
    column: u64,
}

impl<'a> LineTracker<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Location of a byte offset. Offsets must be non-decreasing, which
    /// event order guarantees.
    fn location_at(&mut self, offset: usize) -> Location {
        let offset = offset.min(self.bytes.len());
        while self.pos < offset {
            if self.bytes[self.pos] == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
        Location::new(self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::datatypes::builtin;
    use crate::grammar::GrammarBuilder;

    fn grammar() -> Arc<Grammar> {
        let b = GrammarBuilder::new();
        let n = b.attribute("n", b.data(builtin::integer()));
        let entry = b.element("entry", b.sequence(&[n, b.text()]));
        let root = b.element("log", b.zero_or_more(entry));
        Arc::new(b.build(root))
    }

    #[test]
    fn test_valid_xml() {
        let g = grammar();
        let violations =
            validate_str(&g, r#"<log><entry n="1">one</entry><entry n="2"/></log>"#).unwrap();
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_invalid_attribute_reported_with_location() {
        let g = grammar();
        let xml = "<log>\n  <entry n=\"x\">bad</entry>\n</log>";
        let violations = validate_str(&g, xml).unwrap();
        assert_eq!(violations.len(), 1);
        let location = violations[0].location.unwrap();
        assert_eq!(location.line, 2);
    }

    #[test]
    fn test_namespaced_document() {
        let b = GrammarBuilder::new();
        let root = b.element_ns("http://example.com/ns", "root", b.empty());
        let g = Arc::new(b.build(root));

        assert!(is_valid_str(&g, r#"<root xmlns="http://example.com/ns"/>"#).unwrap());
        assert!(is_valid_str(&g, r#"<p:root xmlns:p="http://example.com/ns"/>"#).unwrap());
        assert!(!is_valid_str(&g, r#"<root/>"#).unwrap());
    }

    #[test]
    fn test_malformed_xml_is_fatal() {
        let g = grammar();
        assert!(validate_str(&g, "<log><entry").is_err());
    }

    #[test]
    fn test_line_tracker() {
        let mut t = LineTracker::new("ab\ncd\ne");
        assert_eq!(t.location_at(0), Location::new(1, 1));
        assert_eq!(t.location_at(1), Location::new(1, 2));
        assert_eq!(t.location_at(3), Location::new(2, 1));
        assert_eq!(t.location_at(6), Location::new(3, 1));
    }
}
