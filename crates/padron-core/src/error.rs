//! # Error Hierarchy
//!
//! Validation errors for the domain newtypes in this crate.

use thiserror::Error;

/// Validation errors for tax identifiers.
///
/// Each variant carries the rejected input so that operators can diagnose
/// bad data without re-running the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input does not contain exactly 11 digits once separators are removed.
    #[error("invalid CUIT/CUIL format: \"{0}\" (expected 11 digits, optionally as XX-XXXXXXXX-X)")]
    InvalidFormat(String),

    /// All eleven digits are zero.
    #[error("invalid CUIT/CUIL: \"{0}\" is all zeros")]
    AllZeros(String),

    /// The 11th digit does not match the mod-11 check digit.
    #[error("invalid CUIT/CUIL check digit: \"{input}\" (expected {expected})")]
    CheckDigit {
        /// The normalized input.
        input: String,
        /// The check digit computed from the first ten digits.
        expected: u8,
    },
}
