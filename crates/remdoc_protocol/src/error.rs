//! Validation error types.

use std::fmt;
use thiserror::Error;

/// Result type for name validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// The kind of name being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    /// A principal (user) name.
    Username,
    /// A principal passkey.
    Passkey,
    /// A collection (database) name.
    CollectionName,
    /// A store domain.
    Url,
}

impl NameKind {
    /// Returns the lowercase label used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            NameKind::Username => "username",
            NameKind::Passkey => "passkey",
            NameKind::CollectionName => "collection name",
            NameKind::Url => "URL",
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationReason {
    /// Fewer characters than the minimum.
    TooShort,
    /// More characters than the maximum.
    TooLong,
    /// Contains a forbidden character class.
    InvalidCharacters,
    /// A domain included a protocol scheme.
    ExcludeProtocol,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationReason::TooShort => "too short",
            ValidationReason::TooLong => "too long",
            ValidationReason::InvalidCharacters => "invalid characters",
            ValidationReason::ExcludeProtocol => "exclude protocol",
        };
        f.write_str(text)
    }
}

/// A malformed name, rejected before any request is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} validation error: {reason}")]
pub struct ValidationError {
    /// What was being validated.
    pub kind: NameKind,
    /// Why it was rejected.
    pub reason: ValidationReason,
}

impl ValidationError {
    /// Creates a validation error.
    pub fn new(kind: NameKind, reason: ValidationReason) -> Self {
        Self { kind, reason }
    }
}
