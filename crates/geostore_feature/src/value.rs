//! Attribute values and their type tags.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;

use crate::geometry::Geometry;

/// The closed set of attribute kinds a schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// UTF-8 text.
    Text,
    /// Geometry.
    Geometry,
}

impl ValueType {
    /// Returns the lowercase name used in messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Geometry => "geometry",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An attribute value.
///
/// `Null` is a member of every declared type. Equality and hashing are
/// total: floats compare by bit pattern, so values are usable as map keys.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Geometry.
    Geometry(Geometry),
}

impl Value {
    /// Returns the type tag of this value, or `None` for `Null`.
    #[must_use]
    pub const fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueType::Bool),
            Self::Int(_) => Some(ValueType::Int),
            Self::Float(_) => Some(ValueType::Float),
            Self::Text(_) => Some(ValueType::Text),
            Self::Geometry(_) => Some(ValueType::Geometry),
        }
    }

    /// Returns `true` if the value satisfies the declared type.
    ///
    /// `Null` satisfies everything.
    #[must_use]
    pub fn satisfies(&self, declared: ValueType) -> bool {
        match self.value_type() {
            None => true,
            Some(actual) => actual == declared,
        }
    }

    /// Returns `true` for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the contained geometry, if any.
    #[must_use]
    pub const fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            Self::Geometry(geometry) => Some(geometry),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Geometry(a), Self::Geometry(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Text(v) => v.hash(state),
            Self::Geometry(v) => v.hash(state),
        }
    }
}
