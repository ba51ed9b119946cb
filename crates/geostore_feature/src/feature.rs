//! Features: identified, schema-validated records.

use std::fmt;
use std::sync::Arc;

use crate::bounds::BoundingBox;
use crate::error::{SchemaError, SchemaResult};
use crate::geometry::Geometry;
use crate::schema::FeatureType;
use crate::value::Value;

/// A feature identifier, unique within its feature type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fid(String);

impl Fid {
    /// Creates an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fid {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Fid {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single record: an identity plus one value per schema attribute.
///
/// Values are validated against the schema on construction and on every
/// mutation, so a feature can never hold a value of the wrong type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    fid: Fid,
    feature_type: Arc<FeatureType>,
    attributes: Vec<Value>,
}

impl Feature {
    /// Creates a feature, validating the values against the schema.
    ///
    /// # Errors
    ///
    /// Fails on an arity or type mismatch.
    pub fn new(
        feature_type: Arc<FeatureType>,
        fid: Fid,
        attributes: Vec<Value>,
    ) -> SchemaResult<Self> {
        if attributes.len() != feature_type.attribute_count() {
            return Err(SchemaError::AttributeCount {
                expected: feature_type.attribute_count(),
                actual: attributes.len(),
            });
        }
        for (descriptor, value) in feature_type.attributes().iter().zip(&attributes) {
            if let Some(actual) = value.value_type() {
                if actual != descriptor.value_type() {
                    return Err(SchemaError::TypeMismatch {
                        attribute: descriptor.name().to_owned(),
                        expected: descriptor.value_type(),
                        actual,
                    });
                }
            }
        }
        Ok(Self {
            fid,
            feature_type,
            attributes,
        })
    }

    /// Creates a feature with every attribute set to `Null`.
    #[must_use]
    pub fn blank(feature_type: Arc<FeatureType>, fid: Fid) -> Self {
        let attributes = vec![Value::Null; feature_type.attribute_count()];
        Self {
            fid,
            feature_type,
            attributes,
        }
    }

    /// Returns the feature identifier.
    #[must_use]
    pub fn fid(&self) -> &Fid {
        &self.fid
    }

    /// Returns the feature type.
    #[must_use]
    pub fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    /// Returns the ordered attribute values.
    #[must_use]
    pub fn attributes(&self) -> &[Value] {
        &self.attributes
    }

    /// Returns the named attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        let index = self.feature_type.index_of(name)?;
        self.attributes.get(index)
    }

    /// Returns the attribute value at `index`.
    #[must_use]
    pub fn attribute_at(&self, index: usize) -> Option<&Value> {
        self.attributes.get(index)
    }

    /// Sets the named attribute after type checking.
    ///
    /// # Errors
    ///
    /// Fails on an unknown attribute or a type mismatch.
    pub fn set_attribute(&mut self, name: &str, value: Value) -> SchemaResult<()> {
        let index = self
            .feature_type
            .index_of(name)
            .ok_or_else(|| SchemaError::unknown_attribute(name))?;
        self.set_attribute_at(index, value)
    }

    /// Sets the attribute at `index` after type checking.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range index or a type mismatch.
    pub fn set_attribute_at(&mut self, index: usize, value: Value) -> SchemaResult<()> {
        let descriptor = self.feature_type.attributes().get(index).ok_or(
            SchemaError::AttributeIndex {
                index,
                count: self.feature_type.attribute_count(),
            },
        )?;
        if let Some(actual) = value.value_type() {
            if actual != descriptor.value_type() {
                return Err(SchemaError::TypeMismatch {
                    attribute: descriptor.name().to_owned(),
                    expected: descriptor.value_type(),
                    actual,
                });
            }
        }
        self.attributes[index] = value;
        Ok(())
    }

    /// Replaces every attribute value, validating against the schema.
    ///
    /// # Errors
    ///
    /// Fails on an arity or type mismatch; the feature is unchanged on
    /// failure.
    pub fn set_attributes(&mut self, values: Vec<Value>) -> SchemaResult<()> {
        let replacement = Self::new(Arc::clone(&self.feature_type), self.fid.clone(), values)?;
        self.attributes = replacement.attributes;
        Ok(())
    }

    /// Returns the default geometry value, if declared and non-null.
    #[must_use]
    pub fn geometry(&self) -> Option<&Geometry> {
        let index = self.feature_type.default_geometry_index()?;
        self.attributes.get(index)?.as_geometry()
    }

    /// Returns the union of the bounds of every geometry attribute.
    ///
    /// Empty when no geometry attribute holds a value.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox::EMPTY;
        for value in &self.attributes {
            if let Some(geometry) = value.as_geometry() {
                bounds = bounds.union(&geometry.bounds());
            }
        }
        bounds
    }
}
