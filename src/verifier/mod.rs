//! The streaming validation engine
//!
//! Layered bottom-up: tokens model single input events; the residual
//! calculator derives expressions by tokens; the attribute feeder and
//! content combiner resolve a start tag against competing element
//! declarations; the acceptor tracks one open element; the driver owns
//! the acceptor stack and the document session.

pub mod acceptor;
pub mod attributes;
pub mod combiner;
mod diagnosis;
pub mod driver;
pub mod residual;
pub mod token;

pub use acceptor::{Acceptor, ChildOutcome};
pub use combiner::{CombineMode, Combined, Concern, ContentCombiner};
pub use driver::{ErrorSink, Verifier, VerifierOptions};
pub use residual::ResidualCalculator;
pub use token::{StartTag, Token};
