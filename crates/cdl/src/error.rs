//! Error types for CDL parsing and validation.

use thiserror::Error;

/// Errors that can occur while parsing or validating a CDL string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CdlError {
    /// Syntax error at a specific byte position in the input.
    #[error("syntax error at position {position}: {message}")]
    Syntax {
        /// Byte offset into the (comment-stripped) input where the error occurred.
        position: usize,
        /// Description of the error, including the expected construct.
        message: String,
    },

    /// Semantic constraint violated by an otherwise well-formed description.
    #[error("{0}")]
    Validation(String),

    /// Input was empty after stripping comments and definitions.
    #[error("empty CDL string")]
    EmptyInput,

    /// A `$name` reference had no matching `@name = ...` definition.
    #[error("undefined reference: ${0}")]
    UndefinedReference(String),

    /// Definition references did not resolve within the expansion depth cap
    /// (usually a cyclic definition).
    #[error("definition references exceed the expansion depth limit")]
    ReferenceDepth,

    /// Variant alternatives expanded past the supported limit.
    #[error("variant expansion exceeds {0} alternatives")]
    VariantLimit(usize),
}

impl CdlError {
    /// Returns true for failures raised by the lexer/parser.
    pub fn is_syntax(&self) -> bool {
        !matches!(self, CdlError::Validation(_))
    }

    /// Returns true for failures raised by the validator.
    pub fn is_validation(&self) -> bool {
        matches!(self, CdlError::Validation(_))
    }
}

/// Result type for CDL operations.
pub type CdlResult<T> = std::result::Result<T, CdlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = CdlError::Syntax {
            position: 12,
            message: "expected ':'".to_string(),
        };
        assert_eq!(err.to_string(), "syntax error at position 12: expected ':'");
        assert!(err.is_syntax());
    }

    #[test]
    fn test_validation_error_display_is_bare_reason() {
        let err = CdlError::Validation("Unknown crystal system 'invalid'".to_string());
        assert_eq!(err.to_string(), "Unknown crystal system 'invalid'");
        assert!(err.is_validation());
    }

    #[test]
    fn test_undefined_reference_display() {
        let err = CdlError::UndefinedReference("oct".to_string());
        assert_eq!(err.to_string(), "undefined reference: $oct");
    }
}
