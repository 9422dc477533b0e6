use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot construct type {type_name}: {reason}")]
    Construction { type_name: String, reason: String },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error("corrupted data: {reason}")]
    Corruption { reason: String },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("format {format} is not supported by type {type_name}")]
    UnsupportedFormat {
        type_name: String,
        format: &'static str,
    },

    #[error("unknown data type family: {name}")]
    UnknownType { name: String },
}

/// A specialized `Error` for column type errors
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn construction(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Construction {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    pub fn corruption(reason: impl Into<String>) -> Self {
        Self::Corruption {
            reason: reason.into(),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn unsupported_format(type_name: impl Into<String>, format: &'static str) -> Self {
        Self::UnsupportedFormat {
            type_name: type_name.into(),
            format,
        }
    }

    /// Returns true if this error was caused by malformed or truncated input.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}
