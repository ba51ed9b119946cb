//! Error types for the feature model.

use thiserror::Error;

use crate::value::ValueType;

/// Result type for feature model operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while building schemas or validating features against them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A feature carried the wrong number of attribute values.
    #[error("attribute count mismatch: schema declares {expected}, got {actual}")]
    AttributeCount {
        /// Number of attributes the schema declares.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// An attribute index is outside the schema.
    #[error("attribute index {index} out of range for {count} attributes")]
    AttributeIndex {
        /// The requested index.
        index: usize,
        /// Number of attributes the schema declares.
        count: usize,
    },

    /// A value did not match the declared attribute type.
    #[error("type mismatch for attribute '{attribute}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// The attribute being set.
        attribute: String,
        /// The declared type.
        expected: ValueType,
        /// The supplied value's type.
        actual: ValueType,
    },

    /// An attribute name is not part of the schema.
    #[error("unknown attribute: {name}")]
    UnknownAttribute {
        /// The offending name.
        name: String,
    },

    /// The same attribute name was declared twice.
    #[error("duplicate attribute: {name}")]
    DuplicateAttribute {
        /// The repeated name.
        name: String,
    },

    /// The default geometry index is out of range or not a geometry.
    #[error("invalid default geometry: attribute {index} is not a geometry")]
    InvalidDefaultGeometry {
        /// The offending attribute index.
        index: usize,
    },

    /// Feature types must carry a non-empty name.
    #[error("feature type name must not be empty")]
    EmptyTypeName,
}

impl SchemaError {
    /// Creates an unknown-attribute error.
    pub fn unknown_attribute(name: impl Into<String>) -> Self {
        Self::UnknownAttribute { name: name.into() }
    }

    /// Creates a duplicate-attribute error.
    pub fn duplicate_attribute(name: impl Into<String>) -> Self {
        Self::DuplicateAttribute { name: name.into() }
    }
}
