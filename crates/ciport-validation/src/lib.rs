//! # ciport-validation
//!
//! Validation adapter for candidate pipeline definitions.
//!
//! - [`ArtifactValidator`] runs an external checker on a candidate and reports
//!   `(passed, stdout, stderr)`. A non-zero exit is a normal outcome, not an error.
//! - [`diagnostics`] turns the checker's stdout into typed [`Diagnostic`]s and
//!   extracts (url, message) documentation references.
//!
//! [`Diagnostic`]: ciport_core::Diagnostic

pub mod diagnostics;
mod validator;

pub use diagnostics::{
    extract_doc_references, parse_diagnostics, parse_doc_reference,
    DIAGNOSTIC_PREFIX,
};
pub use validator::{ActionlintValidator, ArtifactValidator, MockValidator};
