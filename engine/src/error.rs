//! Error types for the Torque engine.

use crate::{ContentKind, ItemId};
use thiserror::Error;

/// All possible errors from the Torque engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("batch must contain at least one activity")]
    EmptyBatch,

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    // Lookup errors
    #[error("{kind} not found: {id}")]
    ItemNotFound { kind: ContentKind, id: ItemId },

    #[error("{kind} is inactive: {id}")]
    ItemInactive { kind: ContentKind, id: ItemId },

    #[error("{kind} already exists: {id}")]
    ItemAlreadyExists { kind: ContentKind, id: ItemId },
}

impl Error {
    /// Whether this error means the referenced content is unavailable.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ItemNotFound { .. } | Error::ItemInactive { .. }
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
