//! Core error types for exprsql.
//!
//! This module provides the [`SqlError`] enum covering every way a statement
//! compilation can fail: untranslatable method calls, unresolvable columns,
//! type conflicts, empty collections, and configuration problems. All of
//! these are permanent; nothing at this layer is retried.

use thiserror::Error;

/// Broad classification of a [`SqlError`], useful for callers that want to
/// branch on the failure category without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The expression tree uses something the translation table cannot express.
    Translation,
    /// A member or entity could not be resolved through the model metadata.
    Resolution,
    /// Operand types cannot be reconciled.
    Type,
    /// The expression tree or builder state is malformed.
    Usage,
    /// Settings could not be loaded or are invalid.
    Configuration,
}

/// The primary error type for exprsql.
///
/// Every variant is raised at SQL-generation time, before any statement text
/// is handed to a database driver.
#[derive(Error, Debug)]
pub enum SqlError {
    // ── Translation ──────────────────────────────────────────────────

    /// A method call, member, or operator has no entry in the translation table.
    /// Carries the offending signature, e.g. `String.Normalize(0)`.
    #[error("No translation for member: {0}")]
    UnsupportedTranslation(String),

    /// `IN`/`Contains` over a statically empty collection under the
    /// `reject` empty-collection policy.
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    // ── Resolution ───────────────────────────────────────────────────

    /// A member access cannot be resolved to exactly one joined table.
    #[error("Ambiguous column: {0}")]
    AmbiguousColumn(String),

    /// The entity is not registered with the model metadata provider.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// The entity has no mapped member with this name.
    #[error("Unknown member '{member}' on entity '{entity}'")]
    UnknownMember {
        /// The entity (or derived table) that was searched.
        entity: String,
        /// The member name that was not found.
        member: String,
    },

    // ── Types ────────────────────────────────────────────────────────

    /// The operand types of a comparison or assignment cannot be reconciled.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    // ── Usage ────────────────────────────────────────────────────────

    /// The expression tree or builder chain is structurally invalid.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An I/O error occurred while loading configuration.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SqlError {
    /// Returns the broad category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedTranslation(_) | Self::EmptyCollection(_) => ErrorKind::Translation,
            Self::AmbiguousColumn(_) | Self::UnknownEntity(_) | Self::UnknownMember { .. } => {
                ErrorKind::Resolution
            }
            Self::TypeMismatch(_) => ErrorKind::Type,
            Self::InvalidExpression(_) => ErrorKind::Usage,
            Self::ConfigurationError(_) | Self::IoError(_) => ErrorKind::Configuration,
        }
    }

    /// Shorthand for an [`UnsupportedTranslation`](Self::UnsupportedTranslation)
    /// error built from a declaring type, method name, and arity.
    pub fn unsupported(declaring: &str, method: &str, arity: usize) -> Self {
        Self::UnsupportedTranslation(format!("{declaring}.{method}({arity})"))
    }
}

/// A convenience type alias for `Result<T, SqlError>`.
pub type SqlResult<T> = Result<T, SqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SqlError::UnsupportedTranslation("x".into()).kind(),
            ErrorKind::Translation
        );
        assert_eq!(SqlError::EmptyCollection("x".into()).kind(), ErrorKind::Translation);
        assert_eq!(SqlError::AmbiguousColumn("x".into()).kind(), ErrorKind::Resolution);
        assert_eq!(SqlError::UnknownEntity("x".into()).kind(), ErrorKind::Resolution);
        assert_eq!(
            SqlError::UnknownMember {
                entity: "User".into(),
                member: "Nope".into()
            }
            .kind(),
            ErrorKind::Resolution
        );
        assert_eq!(SqlError::TypeMismatch("x".into()).kind(), ErrorKind::Type);
        assert_eq!(SqlError::InvalidExpression("x".into()).kind(), ErrorKind::Usage);
        assert_eq!(
            SqlError::ConfigurationError("x".into()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_unsupported_signature() {
        let err = SqlError::unsupported("String", "Normalize", 0);
        assert_eq!(err.to_string(), "No translation for member: String.Normalize(0)");
    }

    #[test]
    fn test_unknown_member_display() {
        let err = SqlError::UnknownMember {
            entity: "User".into(),
            member: "Nickname".into(),
        };
        assert_eq!(err.to_string(), "Unknown member 'Nickname' on entity 'User'");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: SqlError = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("file missing"));
    }
}
