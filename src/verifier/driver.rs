//! Streaming verifier driver
//!
//! Push-driven: the event source calls one method per document event and
//! the verifier returns before the next event arrives. One instance
//! validates one document at a time and may be reused sequentially;
//! concurrent validation takes one instance per thread over the same
//! shared grammar.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{Error, Location, Result, ValidityViolation};
use crate::grammar::datatypes::ValidityContext;
use crate::grammar::expr::StringCare;
use crate::grammar::Grammar;
use crate::limits::Limits;
use crate::namespaces::NamespaceStack;

use super::acceptor::{Acceptor, ChildOutcome};
use super::combiner::ContentCombiner;
use super::diagnosis;
use super::token::StartTag;

/// Receives document errors as they are detected
pub trait ErrorSink {
    /// Called once per reported violation, in document order
    fn on_error(&mut self, violation: &ValidityViolation);
}

impl ErrorSink for Vec<ValidityViolation> {
    fn on_error(&mut self, violation: &ValidityViolation) {
        self.push(violation.clone());
    }
}

/// Tunables for a verifier session
#[derive(Debug, Clone)]
pub struct VerifierOptions {
    /// Starting value of the decaying panic counter. While the counter
    /// is nonzero further diagnostics are suppressed (the document is
    /// still marked invalid); each successful step decays it by one.
    /// An anti-spam policy knob, not a correctness requirement.
    pub panic_threshold: u32,
    /// Resource-exhaustion guards
    pub limits: Limits,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            panic_threshold: 3,
            limits: Limits::default(),
        }
    }
}

/// (namespace, local, value) key of an ID or IDREF token
type IdKey = (String, String, String);

/// The session-owned context handed to datatype checks
///
/// Interior mutability on the token sets keeps the context usable
/// through the shared references the residual calculator passes around.
#[derive(Debug, Default)]
struct SessionContext {
    namespaces: NamespaceStack,
    ids: RefCell<BTreeSet<IdKey>>,
    idrefs: RefCell<BTreeSet<IdKey>>,
}

impl ValidityContext for SessionContext {
    fn resolve_namespace_prefix(&self, prefix: &str) -> Option<String> {
        self.namespaces.resolve_prefix(prefix).map(String::from)
    }

    fn on_id(&self, namespace: &str, local: &str, value: &str) -> bool {
        self.ids.borrow_mut().insert((
            namespace.to_string(),
            local.to_string(),
            value.to_string(),
        ))
    }

    fn on_idref(&self, namespace: &str, local: &str, value: &str) {
        self.idrefs.borrow_mut().insert((
            namespace.to_string(),
            local.to_string(),
            value.to_string(),
        ));
    }
}

struct Frame {
    acceptor: Acceptor,
    care: StringCare,
}

/// Streaming validator for one grammar
pub struct Verifier {
    grammar: Arc<Grammar>,
    options: VerifierOptions,
    combiner: ContentCombiner,
    context: SessionContext,
    current: Option<Acceptor>,
    stack: Vec<Frame>,
    care: StringCare,
    text: String,
    location: Option<Location>,
    violations: Vec<ValidityViolation>,
    sink: Option<Box<dyn ErrorSink>>,
    had_error: bool,
    panic_level: u32,
    pending_scope: bool,
    started: bool,
}

impl Verifier {
    /// Create a verifier over a shared grammar
    pub fn new(grammar: Arc<Grammar>) -> Self {
        Self {
            grammar,
            options: VerifierOptions::default(),
            combiner: ContentCombiner::new(),
            context: SessionContext::default(),
            current: None,
            stack: Vec::new(),
            care: StringCare::Prohibited,
            text: String::new(),
            location: None,
            violations: Vec::new(),
            sink: None,
            had_error: false,
            panic_level: 0,
            pending_scope: false,
            started: false,
        }
    }

    /// Override the default options
    pub fn with_options(mut self, options: VerifierOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach a streaming error sink; violations are retained for
    /// post-hoc inspection either way
    pub fn with_sink(mut self, sink: Box<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Begin a document, resetting all per-document state
    pub fn start_document(&mut self) {
        self.current = Some(Acceptor::new(self.grammar.start()));
        self.stack.clear();
        self.care = self
            .current
            .as_ref()
            .expect("acceptor just created")
            .string_care(self.grammar.pool());
        self.text.clear();
        self.context.namespaces = NamespaceStack::new();
        self.context.ids.borrow_mut().clear();
        self.context.idrefs.borrow_mut().clear();
        self.violations.clear();
        self.had_error = false;
        self.panic_level = 0;
        self.pending_scope = false;
        self.location = None;
        self.started = true;
    }

    /// Record the position of the upcoming event, for diagnostics
    pub fn set_location(&mut self, location: Location) {
        self.location = Some(location);
    }

    /// Declare a namespace prefix for the next element's scope
    pub fn declare_prefix(&mut self, prefix: &str, uri: &str) {
        if !self.pending_scope {
            self.context.namespaces.push_scope();
            self.pending_scope = true;
        }
        self.context.namespaces.declare_prefix(prefix, uri);
    }

    /// An element starts
    pub fn start_element(&mut self, tag: StartTag) -> Result<()> {
        self.ensure_started()?;
        self.options.limits.check_depth(self.stack.len() + 1)?;
        self.options.limits.check_attributes(tag.attributes.len())?;

        if !self.pending_scope {
            self.context.namespaces.push_scope();
        }
        self.pending_scope = false;

        self.verify_text()?;

        let outcome = match self.current.as_mut() {
            Some(current) => current.create_child(
                self.grammar.pool(),
                &mut self.combiner,
                &tag,
                &self.context,
            ),
            None => {
                return Err(Error::EventOrder(
                    "start tag after the document ended".into(),
                ))
            }
        };

        let child = match outcome {
            ChildOutcome::Accepted(child) => {
                self.note_success();
                child
            }
            ChildOutcome::Recovered { child, message } => {
                self.report(message);
                child
            }
        };

        let parent = self.current.take().expect("checked above");
        self.stack.push(Frame {
            acceptor: parent,
            care: self.care,
        });
        self.care = child.string_care(self.grammar.pool());
        self.current = Some(child);
        Ok(())
    }

    /// Character data. Buffered until the next element boundary; not
    /// even buffered when the current content model ignores text.
    pub fn characters(&mut self, data: &str) -> Result<()> {
        self.ensure_started()?;
        if self.care != StringCare::Ignore {
            self.text.push_str(data);
            self.options.limits.check_text_length(self.text.len())?;
        }
        Ok(())
    }

    /// An element ends
    pub fn end_element(&mut self, qname: &str) -> Result<()> {
        self.ensure_started()?;
        if self.stack.is_empty() {
            return Err(Error::EventOrder(format!(
                "unbalanced end tag </{}>",
                qname
            )));
        }
        self.verify_text()?;

        let child = self
            .current
            .take()
            .ok_or_else(|| Error::EventOrder("end tag without a start tag".into()))?;

        if !child.is_accept_state(self.grammar.pool()) {
            let message = child.diagnose_incomplete(
                self.grammar.pool(),
                &mut self.combiner,
                qname,
                &self.context,
            );
            self.report(message);
            // recovery: pretend the content was completed
        }

        let frame = self.stack.pop().expect("checked above");
        self.care = frame.care;

        let mut parent = frame.acceptor;
        let continuation = child.continuation().ok_or_else(|| {
            Error::GrammarInconsistency("child acceptor carries no continuation".into())
        })?;
        parent.step_by_continuation(continuation)?;
        self.note_success();

        self.current = Some(parent);
        self.context.namespaces.pop_scope();
        Ok(())
    }

    /// The document ends: cross-check IDREF tokens against ID tokens
    /// and finish the session
    pub fn end_document(&mut self) -> Result<()> {
        self.ensure_started()?;
        self.verify_text()?;

        if !self.stack.is_empty() {
            return Err(Error::EventOrder(
                "document ended with open elements".into(),
            ));
        }

        let missing_root = self
            .current
            .as_ref()
            .is_some_and(|c| !c.is_accept_state(self.grammar.pool()));
        if missing_root {
            self.report("the document ends before the root element is complete".into());
        }

        let dangling: Vec<IdKey> = {
            let ids = self.context.ids.borrow();
            self.context
                .idrefs
                .borrow()
                .iter()
                .filter(|key| !ids.contains(*key))
                .cloned()
                .collect()
        };
        for (namespace, local, value) in dangling {
            let message = if local.is_empty() {
                format!("IDREF \"{}\" has no corresponding ID", value)
            } else {
                format!(
                    "key reference \"{}\" ({{{}}}{}) has no corresponding key",
                    value, namespace, local
                )
            };
            self.emit(message);
        }

        self.started = false;
        Ok(())
    }

    /// Was the last completed document valid? Post-hoc query; not
    /// meaningful mid-stream.
    pub fn is_valid(&self) -> bool {
        !self.had_error
    }

    /// The violations reported for the current/last document
    pub fn violations(&self) -> &[ValidityViolation] {
        &self.violations
    }

    /// Consume the verifier, yielding its violations
    pub fn into_violations(self) -> Vec<ValidityViolation> {
        self.violations
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(Error::EventOrder(
                "event outside document-start/document-end".into(),
            ))
        }
    }

    /// Flush buffered character data through the current acceptor
    fn verify_text(&mut self) -> Result<()> {
        if self.text.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.text);
        match self.care {
            StringCare::Ignore => {}
            StringCare::Prohibited => {
                if !text.trim().is_empty() {
                    self.report(diagnosis::text_not_allowed());
                }
                // recover by ignoring the token
            }
            StringCare::Strict => {
                let stepped = self
                    .current
                    .as_mut()
                    .ok_or_else(|| Error::EventOrder("text outside the document".into()))?
                    .step_text(self.grammar.pool(), &text, &self.context);
                match stepped {
                    Ok(()) => self.note_success(),
                    Err(message) => self.report(message),
                }
            }
        }
        Ok(())
    }

    /// Report a document error, subject to panic damping: while the
    /// counter is nonzero the message is suppressed but the document is
    /// still marked invalid.
    fn report(&mut self, message: String) {
        self.had_error = true;
        if self.panic_level == 0 {
            let mut violation = ValidityViolation::new(message);
            if let Some(location) = self.location {
                violation = violation.with_location(location);
            }
            if let Some(sink) = &mut self.sink {
                sink.on_error(&violation);
            }
            self.violations.push(violation);
        }
        self.panic_level = self.options.panic_threshold;
    }

    /// Report bypassing panic damping (end-of-document checks)
    fn emit(&mut self, message: String) {
        self.had_error = true;
        let mut violation = ValidityViolation::new(message);
        if let Some(location) = self.location {
            violation = violation.with_location(location);
        }
        if let Some(sink) = &mut self.sink {
            sink.on_error(&violation);
        }
        self.violations.push(violation);
    }

    fn note_success(&mut self) {
        self.panic_level = self.panic_level.saturating_sub(1);
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("started", &self.started)
            .field("depth", &self.stack.len())
            .field("had_error", &self.had_error)
            .field("violations", &self.violations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::datatypes::builtin;
    use crate::grammar::GrammarBuilder;

    /// <doc> (one or more <item id="...">text</item>) </doc>
    fn grammar() -> Arc<Grammar> {
        let b = GrammarBuilder::new();
        let id = b.attribute("id", b.data(builtin::id()));
        let item = b.element("item", b.sequence(&[id, b.text()]));
        let doc = b.element("doc", b.one_or_more(item));
        Arc::new(b.build(doc))
    }

    fn tag(name: &str) -> StartTag {
        StartTag::new("", name, name)
    }

    #[test]
    fn test_valid_document() {
        let mut v = Verifier::new(grammar());
        v.start_document();
        v.start_element(tag("doc")).unwrap();
        v.start_element(tag("item").with_attribute("id", "a1")).unwrap();
        v.characters("hello").unwrap();
        v.end_element("item").unwrap();
        v.end_element("doc").unwrap();
        v.end_document().unwrap();

        assert!(v.is_valid(), "violations: {:?}", v.violations());
    }

    #[test]
    fn test_duplicate_id_is_reported() {
        let mut v = Verifier::new(grammar());
        v.start_document();
        v.start_element(tag("doc")).unwrap();
        v.start_element(tag("item").with_attribute("id", "a1")).unwrap();
        v.end_element("item").unwrap();
        v.start_element(tag("item").with_attribute("id", "a1")).unwrap();
        v.end_element("item").unwrap();
        v.end_element("doc").unwrap();
        v.end_document().unwrap();

        assert!(!v.is_valid());
    }

    #[test]
    fn test_reuse_resets_state() {
        let mut v = Verifier::new(grammar());

        v.start_document();
        v.start_element(tag("doc")).unwrap();
        v.start_element(tag("bogus")).unwrap();
        v.end_element("bogus").unwrap();
        v.end_element("doc").unwrap();
        v.end_document().unwrap();
        assert!(!v.is_valid());

        // the same instance validates the next document from scratch,
        // including the ID table
        v.start_document();
        v.start_element(tag("doc")).unwrap();
        v.start_element(tag("item").with_attribute("id", "a1")).unwrap();
        v.end_element("item").unwrap();
        v.end_element("doc").unwrap();
        v.end_document().unwrap();
        assert!(v.is_valid(), "violations: {:?}", v.violations());
    }

    #[test]
    fn test_unbalanced_end_tag_is_fatal() {
        let mut v = Verifier::new(grammar());
        v.start_document();
        v.start_element(tag("doc")).unwrap();
        v.end_element("doc").unwrap();
        assert!(matches!(
            v.end_element("doc"),
            Err(Error::EventOrder(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let b = GrammarBuilder::new();
        let nested = b.define("nested");
        let content = b.optional(b.refer(nested));
        b.bind(nested, b.element("n", content)).unwrap();
        let start = b.pool().ref_target(nested).unwrap();
        let g = Arc::new(b.build(start));

        let mut options = VerifierOptions::default();
        options.limits.max_depth = 4;
        let mut v = Verifier::new(g).with_options(options);

        v.start_document();
        let mut result = Ok(());
        for _ in 0..6 {
            result = v.start_element(tag("n"));
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(Error::LimitExceeded(_))));
    }

    #[test]
    fn test_panic_damping_suppresses_cascade() {
        let mut v = Verifier::new(grammar());
        v.start_document();
        v.start_element(tag("doc")).unwrap();
        // three sibling errors in a row: only the first is reported
        for _ in 0..3 {
            v.start_element(tag("bogus")).unwrap();
            v.end_element("bogus").unwrap();
        }
        v.end_element("doc").unwrap();
        v.end_document().unwrap();

        assert!(!v.is_valid());
        assert_eq!(v.violations().len(), 1, "{:?}", v.violations());
    }

    #[test]
    fn test_location_is_attached() {
        let mut v = Verifier::new(grammar());
        v.start_document();
        v.start_element(tag("doc")).unwrap();
        v.set_location(Location::new(3, 7));
        v.start_element(tag("bogus")).unwrap();
        v.end_element("bogus").unwrap();
        v.end_element("doc").unwrap();
        v.end_document().unwrap();

        assert_eq!(v.violations()[0].location, Some(Location::new(3, 7)));
    }
}
