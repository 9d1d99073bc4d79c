// ============================================
// File: crates/wisp-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Foundational error type for identifier and key parsing, wrapped by
//! the error enums of every other wisp crate.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never include private key material in error messages
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

/// Common error types shared across wisp crates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Invalid input data provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },

    /// Data length doesn't match expected size.
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Failed to decode data.
    #[error("Decoding error: {context}: {details}")]
    Decoding {
        /// What was being decoded
        context: String,
        /// Error details
        details: String,
    },
}

impl CommonError {
    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidLength` error.
    #[must_use]
    pub const fn invalid_length(expected: usize, actual: usize) -> Self {
        Self::InvalidLength { expected, actual }
    }
}

impl From<base64::DecodeError> for CommonError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decoding {
            context: "base64 decode".into(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CommonError::invalid_input("staMac", "expected six octets");
        assert!(err.to_string().contains("staMac"));
        assert!(err.to_string().contains("six octets"));
    }

    #[test]
    fn test_base64_error_conversion() {
        use base64::Engine;
        let decode_err = base64::engine::general_purpose::STANDARD
            .decode("!!!")
            .unwrap_err();
        let err: CommonError = decode_err.into();
        assert!(matches!(err, CommonError::Decoding { .. }));
    }
}
