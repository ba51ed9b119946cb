//! Error types for the feature-store engine.

use std::io;
use thiserror::Error;

use geostore_feature::{Fid, SchemaError};

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in feature-store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested feature type does not exist.
    #[error("feature type not found: {name}")]
    TypeNotFound {
        /// The requested type name.
        name: String,
    },

    /// The backing store does not support the operation.
    #[error("unsupported operation: {message}")]
    Unsupported {
        /// Description of the missing capability.
        message: String,
    },

    /// A feature is locked under a different authorization.
    #[error("lock conflict on {type_name}/{fid}: {message}")]
    LockConflict {
        /// The feature type holding the lock.
        type_name: String,
        /// The locked feature.
        fid: Fid,
        /// Description of the conflict.
        message: String,
    },

    /// The backing store failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation not permitted in the current state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A value or projection did not fit the schema.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl CoreError {
    /// Creates a type-not-found error.
    pub fn type_not_found(name: impl Into<String>) -> Self {
        Self::TypeNotFound { name: name.into() }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a lock-conflict error.
    pub fn lock_conflict(
        type_name: impl Into<String>,
        fid: Fid,
        message: impl Into<String>,
    ) -> Self {
        Self::LockConflict {
            type_name: type_name.into(),
            fid,
            message: message.into(),
        }
    }

    /// Creates an illegal-state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }
}
