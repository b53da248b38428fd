//! Datatype collaborator interface and builtin vocabulary
//!
//! The validation engine never interprets literal strings itself; it asks
//! a [`Datatype`] whether a literal is a member of the type, passing a
//! [`ValidityContext`] so the type can resolve namespace prefixes and
//! record ID/IDREF tokens. A full facet library is out of scope; this
//! module only ships the primitives a grammar is unusable without.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

/// Context the document session provides to datatype checks
///
/// Implemented by the verifier: prefix resolution consults the live
/// namespace scope stack, and the ID hooks record tokens for the
/// end-of-document cross-check.
pub trait ValidityContext {
    /// Resolve a namespace prefix against the current document scope
    fn resolve_namespace_prefix(&self, prefix: &str) -> Option<String>;

    /// Record an ID token. Returns false if the token was already used.
    fn on_id(&self, namespace: &str, local: &str, value: &str) -> bool;

    /// Record an IDREF token for the end-of-document cross-check
    fn on_idref(&self, namespace: &str, local: &str, value: &str);
}

/// A context for checks that happen outside any document (tests, tools)
#[derive(Debug, Default)]
pub struct NullContext;

impl ValidityContext for NullContext {
    fn resolve_namespace_prefix(&self, _prefix: &str) -> Option<String> {
        None
    }
    fn on_id(&self, _namespace: &str, _local: &str, _value: &str) -> bool {
        true
    }
    fn on_idref(&self, _namespace: &str, _local: &str, _value: &str) {}
}

/// Why a literal was rejected by a datatype
#[derive(Debug, Clone)]
pub struct DatatypeError {
    /// Human-readable reason, suitable for embedding in a diagnosis
    pub message: String,
}

impl DatatypeError {
    /// Create a new datatype error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DatatypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DatatypeError {}

/// Membership test for a primitive type
pub trait Datatype: fmt::Debug + Send + Sync {
    /// Name of the type, as shown in diagnostics
    fn name(&self) -> &str;

    /// Is the literal a member of this type?
    fn check_valid(
        &self,
        literal: &str,
        context: &dyn ValidityContext,
    ) -> Result<(), DatatypeError>;

    /// The "none" sentinel marks a declared-but-prohibited attribute.
    /// Diagnosis reports a failure against it as "undeclared attribute"
    /// rather than as a value error.
    fn is_prohibited_sentinel(&self) -> bool {
        false
    }
}

/// Shared handle to a datatype
pub type DatatypeRef = Arc<dyn Datatype>;

fn err(name: &str, literal: &str) -> DatatypeError {
    DatatypeError::new(format!("\"{}\" is not a valid {}", literal.trim(), name))
}

/// Any character data
#[derive(Debug)]
pub struct StringType;

impl Datatype for StringType {
    fn name(&self) -> &str {
        "string"
    }
    fn check_valid(&self, _: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        Ok(())
    }
}

/// Whitespace-collapsed string
#[derive(Debug)]
pub struct TokenType;

impl Datatype for TokenType {
    fn name(&self) -> &str {
        "token"
    }
    fn check_valid(&self, _: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        Ok(())
    }
}

/// true / false / 1 / 0
#[derive(Debug)]
pub struct BooleanType;

impl Datatype for BooleanType {
    fn name(&self) -> &str {
        "boolean"
    }
    fn check_valid(&self, literal: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        match literal.trim() {
            "true" | "false" | "1" | "0" => Ok(()),
            _ => Err(err(self.name(), literal)),
        }
    }
}

/// Signed integer (64-bit)
#[derive(Debug)]
pub struct IntegerType;

impl Datatype for IntegerType {
    fn name(&self) -> &str {
        "integer"
    }
    fn check_valid(&self, literal: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        literal
            .trim()
            .parse::<i64>()
            .map(|_| ())
            .map_err(|_| err(self.name(), literal))
    }
}

/// Arbitrary-precision decimal
#[derive(Debug)]
pub struct DecimalType;

impl Datatype for DecimalType {
    fn name(&self) -> &str {
        "decimal"
    }
    fn check_valid(&self, literal: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        Decimal::from_str(literal.trim())
            .map(|_| ())
            .map_err(|_| err(self.name(), literal))
    }
}

/// Calendar date (YYYY-MM-DD)
#[derive(Debug)]
pub struct DateType;

impl Datatype for DateType {
    fn name(&self) -> &str {
        "date"
    }
    fn check_valid(&self, literal: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        NaiveDate::parse_from_str(literal.trim(), "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| err(self.name(), literal))
    }
}

/// URI reference. Relative references are members too, so only literals
/// that cannot be a URI at all are rejected.
#[derive(Debug)]
pub struct AnyUriType;

impl Datatype for AnyUriType {
    fn name(&self) -> &str {
        "anyURI"
    }
    fn check_valid(&self, literal: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        let literal = literal.trim();
        match url::Url::parse(literal) {
            Ok(_) => Ok(()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                if literal.contains(char::is_whitespace) {
                    Err(err(self.name(), literal))
                } else {
                    Ok(())
                }
            }
            Err(_) => Err(err(self.name(), literal)),
        }
    }
}

static NMTOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._:\-]+$").unwrap());

/// Name token: one word of name characters
#[derive(Debug)]
pub struct NmtokenType;

impl Datatype for NmtokenType {
    fn name(&self) -> &str {
        "NMTOKEN"
    }
    fn check_valid(&self, literal: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        if NMTOKEN_PATTERN.is_match(literal.trim()) {
            Ok(())
        } else {
            Err(err(self.name(), literal))
        }
    }
}

/// String restricted by a regular expression
#[derive(Debug)]
pub struct PatternType {
    name: String,
    pattern: Regex,
}

impl PatternType {
    /// Compile a pattern-restricted type. The pattern is anchored.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        let anchored = format!("^(?:{})$", pattern);
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(&anchored)?,
        })
    }
}

impl Datatype for PatternType {
    fn name(&self) -> &str {
        &self.name
    }
    fn check_valid(&self, literal: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        if self.pattern.is_match(literal.trim()) {
            Ok(())
        } else {
            Err(DatatypeError::new(format!(
                "\"{}\" does not match the pattern for {}",
                literal.trim(),
                self.name
            )))
        }
    }
}

/// Unique identifier token. Valid at most once per document.
#[derive(Debug)]
pub struct IdType;

impl Datatype for IdType {
    fn name(&self) -> &str {
        "ID"
    }
    fn check_valid(
        &self,
        literal: &str,
        context: &dyn ValidityContext,
    ) -> Result<(), DatatypeError> {
        let token = literal.trim();
        if !NMTOKEN_PATTERN.is_match(token) {
            return Err(err(self.name(), literal));
        }
        if context.on_id("", "", token) {
            Ok(())
        } else {
            Err(DatatypeError::new(format!(
                "ID \"{}\" is already used in this document",
                token
            )))
        }
    }
}

/// Reference to an ID defined elsewhere in the document
#[derive(Debug)]
pub struct IdrefType;

impl Datatype for IdrefType {
    fn name(&self) -> &str {
        "IDREF"
    }
    fn check_valid(
        &self,
        literal: &str,
        context: &dyn ValidityContext,
    ) -> Result<(), DatatypeError> {
        let token = literal.trim();
        if !NMTOKEN_PATTERN.is_match(token) {
            return Err(err(self.name(), literal));
        }
        context.on_idref("", "", token);
        Ok(())
    }
}

/// The "empty" sentinel: no literal is a member. A grammar declares an
/// attribute with this type to prohibit it outright.
#[derive(Debug)]
pub struct NoneType;

impl Datatype for NoneType {
    fn name(&self) -> &str {
        "none"
    }
    fn check_valid(&self, literal: &str, _: &dyn ValidityContext) -> Result<(), DatatypeError> {
        Err(err(self.name(), literal))
    }
    fn is_prohibited_sentinel(&self) -> bool {
        true
    }
}

/// Factory functions for the builtin vocabulary
pub mod builtin {
    use super::*;

    /// `string`
    pub fn string() -> DatatypeRef {
        Arc::new(StringType)
    }
    /// `token`
    pub fn token() -> DatatypeRef {
        Arc::new(TokenType)
    }
    /// `boolean`
    pub fn boolean() -> DatatypeRef {
        Arc::new(BooleanType)
    }
    /// `integer`
    pub fn integer() -> DatatypeRef {
        Arc::new(IntegerType)
    }
    /// `decimal`
    pub fn decimal() -> DatatypeRef {
        Arc::new(DecimalType)
    }
    /// `date`
    pub fn date() -> DatatypeRef {
        Arc::new(DateType)
    }
    /// `anyURI`
    pub fn any_uri() -> DatatypeRef {
        Arc::new(AnyUriType)
    }
    /// `NMTOKEN`
    pub fn nmtoken() -> DatatypeRef {
        Arc::new(NmtokenType)
    }
    /// `ID`
    pub fn id() -> DatatypeRef {
        Arc::new(IdType)
    }
    /// `IDREF`
    pub fn idref() -> DatatypeRef {
        Arc::new(IdrefType)
    }
    /// the prohibited sentinel
    pub fn none() -> DatatypeRef {
        Arc::new(NoneType)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer() {
        let dt = IntegerType;
        assert!(dt.check_valid(" 42 ", &NullContext).is_ok());
        assert!(dt.check_valid("-7", &NullContext).is_ok());
        assert!(dt.check_valid("foo", &NullContext).is_err());
        assert!(dt.check_valid("4.2", &NullContext).is_err());
    }

    #[test]
    fn test_boolean() {
        let dt = BooleanType;
        assert!(dt.check_valid("true", &NullContext).is_ok());
        assert!(dt.check_valid("0", &NullContext).is_ok());
        assert!(dt.check_valid("yes", &NullContext).is_err());
    }

    #[test]
    fn test_decimal() {
        let dt = DecimalType;
        assert!(dt.check_valid("3.14", &NullContext).is_ok());
        assert!(dt.check_valid("3,14", &NullContext).is_err());
    }

    #[test]
    fn test_date() {
        let dt = DateType;
        assert!(dt.check_valid("2024-02-29", &NullContext).is_ok());
        assert!(dt.check_valid("2023-02-29", &NullContext).is_err());
        assert!(dt.check_valid("yesterday", &NullContext).is_err());
    }

    #[test]
    fn test_any_uri() {
        let dt = AnyUriType;
        assert!(dt.check_valid("http://example.com/a", &NullContext).is_ok());
        assert!(dt.check_valid("relative/path#frag", &NullContext).is_ok());
        assert!(dt.check_valid("has space", &NullContext).is_err());
    }

    #[test]
    fn test_pattern() {
        let dt = PatternType::new("part-number", r"[A-Z]{2}-\d{4}").unwrap();
        assert!(dt.check_valid("AB-1234", &NullContext).is_ok());
        assert!(dt.check_valid("ab-1234", &NullContext).is_err());
        // anchoring: a match inside a longer string does not count
        assert!(dt.check_valid("xAB-1234y", &NullContext).is_err());
    }

    #[test]
    fn test_none_is_sentinel() {
        let dt = NoneType;
        assert!(dt.is_prohibited_sentinel());
        assert!(dt.check_valid("anything", &NullContext).is_err());
    }

    #[test]
    fn test_error_message_quotes_literal() {
        let e = IntegerType.check_valid("foo", &NullContext).unwrap_err();
        assert!(e.to_string().contains("\"foo\""));
        assert!(e.to_string().contains("integer"));
    }
}
