//! Error types for bluemarble.

use thiserror::Error;

/// Result alias for bluemarble operations.
pub type BlueMarbleResult<T> = std::result::Result<T, BlueMarbleError>;

/// Errors that can occur while chunking, compositing or persisting templates.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BlueMarbleError {
    /// An image (template source or live tile) could not be decoded.
    #[error("failed to decode image: {reason}")]
    Decode { reason: String },
    /// A fragment or composited tile could not be encoded as PNG.
    #[error("failed to encode image: {reason}")]
    Encode { reason: String },
    /// Anchor or tile-address components are missing, non-numeric or out of range.
    #[error("malformed coordinates {input:?}: {reason}")]
    MalformedCoordinates { input: String, reason: &'static str },
    /// A tile key does not follow the `TTTT,TTTT,PPP,PPP` layout.
    #[error("invalid tile key {key:?}")]
    InvalidTileKey { key: String },
    /// A template key does not follow the `<sortID> <authorID>` layout.
    #[error("invalid template key {key:?}")]
    InvalidTemplateKey { key: String },
    /// No registered parser accepts the document's `whoami`/schema fields.
    #[error("unrecognized template document (whoami={whoami:?}, schemaVersion={schema_version:?})")]
    UnrecognizedSchema {
        whoami: String,
        schema_version: String,
    },
    /// Writing or reading the persisted document failed.
    #[error("storage error: {reason}")]
    Storage { reason: String },
    /// JSON (de)serialization failed.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
    /// The requested template does not exist in the registry.
    #[error("template {key:?} not found")]
    TemplateNotFound { key: String },
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

impl BlueMarbleError {
    pub(crate) fn decode(err: impl ToString) -> Self {
        Self::Decode {
            reason: err.to_string(),
        }
    }

    pub(crate) fn encode(err: impl ToString) -> Self {
        Self::Encode {
            reason: err.to_string(),
        }
    }

    pub(crate) fn storage(err: impl ToString) -> Self {
        Self::Storage {
            reason: err.to_string(),
        }
    }

    pub(crate) fn serialization(err: impl ToString) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }

    pub(crate) fn malformed(input: impl Into<String>, reason: &'static str) -> Self {
        Self::MalformedCoordinates {
            input: input.into(),
            reason,
        }
    }

    /// Returns true for image decode failures.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Returns true for persistence failures, which never invalidate in-memory state.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}
