//! # Validation Errors
//!
//! Field-level validation failures raised by validated constructors. The API
//! layer renders these as 400 responses with a JSON pointer at the field.

use thiserror::Error;

/// A field failed validation at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Value was empty after trimming.
    #[error("{field} must not be empty")]
    Empty {
        /// Offending field.
        field: &'static str,
    },

    /// Value exceeded its maximum length.
    #[error("{field} must be at most {max} characters, got {actual}")]
    TooLong {
        /// Offending field.
        field: &'static str,
        /// Maximum accepted length.
        max: usize,
        /// Observed length.
        actual: usize,
    },

    /// Value is not a well-formed identifier.
    #[error("{field} is not a valid identifier: {value:?}")]
    Malformed {
        /// Offending field.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Enum value not recognized.
    #[error("{field} has unknown value {value:?}")]
    UnknownVariant {
        /// Offending field.
        field: &'static str,
        /// Rejected value.
        value: String,
    },
}

impl ValidationError {
    /// The field this error points at.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Empty { field }
            | Self::TooLong { field, .. }
            | Self::Malformed { field, .. }
            | Self::UnknownVariant { field, .. } => field,
        }
    }
}
