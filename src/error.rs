//! Error types for the verifier.
//!
//! Verification itself never fails: every problem with the analysed model is
//! reported as a [`Diagnostic`](crate::Diagnostic). `VerifyError` covers the
//! few places where an API call cannot produce a value, such as parsing a
//! type signature or loading options from a JSON document.

use thiserror::Error;

/// Verifier errors
///
/// # Examples
///
/// ```rust
/// use ferrous_di_verify::{TypeExpr, VerifyError};
///
/// match TypeExpr::parse("Repo<User", &[]) {
///     Err(VerifyError::MalformedSignature { input, .. }) => assert_eq!(input, "Repo<User"),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// A type signature could not be parsed
    #[error("Malformed type signature '{input}': {reason}")]
    MalformedSignature { input: String, reason: String },
    /// An options source could not be read
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// A graph could not be rendered in the requested format
    #[error("Graph export failed: {0}")]
    Export(String),
    /// A fault raised while processing one declaration
    #[error("Internal error while verifying {subject}: {message}")]
    Internal { subject: String, message: String },
}

impl VerifyError {
    pub(crate) fn malformed(input: &str, reason: impl Into<String>) -> Self {
        VerifyError::MalformedSignature {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for verifier operations
pub type VerifyResult<T> = Result<T, VerifyError>;
