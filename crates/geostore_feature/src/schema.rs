//! Feature types and attribute schemas.

use std::collections::HashSet;
use std::fmt;

use crate::error::{SchemaError, SchemaResult};
use crate::value::ValueType;

/// A coordinate reference system identifier, e.g. `EPSG:4326`.
///
/// Opaque to the engine: compared for equality, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrsId(String);

impl CrsId {
    /// Creates an identifier from an authority code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Creates an `EPSG:<code>` identifier.
    #[must_use]
    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{code}"))
    }

    /// Returns the authority code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, typed attribute slot in a feature type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeDescriptor {
    name: String,
    value_type: ValueType,
}

impl AttributeDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }

    /// Returns the attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.value_type
    }
}

/// The schema of a feature type: an ordered attribute list plus metadata.
///
/// Attribute names are unique. The default geometry, when declared, always
/// points at a geometry attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureType {
    name: String,
    namespace: Option<String>,
    attributes: Vec<AttributeDescriptor>,
    default_geometry: Option<usize>,
    crs: Option<CrsId>,
}

impl FeatureType {
    /// Starts building a feature type with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> FeatureTypeBuilder {
        FeatureTypeBuilder::new(name)
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the namespace URI, if set.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the ordered attribute descriptors.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Returns the index of the named attribute.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name() == name)
    }

    /// Returns the descriptor for the named attribute.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Returns the default geometry descriptor, if declared.
    #[must_use]
    pub fn default_geometry(&self) -> Option<&AttributeDescriptor> {
        self.default_geometry.map(|i| &self.attributes[i])
    }

    /// Returns the index of the default geometry attribute, if declared.
    #[must_use]
    pub const fn default_geometry_index(&self) -> Option<usize> {
        self.default_geometry
    }

    /// Returns the coordinate system tag, if set.
    #[must_use]
    pub fn crs(&self) -> Option<&CrsId> {
        self.crs.as_ref()
    }

    /// Computes the projected schema keeping `properties` in the requested
    /// order. The default geometry carries over when the projection retains
    /// it; name, namespace and coordinate system are preserved.
    ///
    /// # Errors
    ///
    /// Fails if a requested property is unknown or requested twice.
    pub fn subset(&self, properties: &[String]) -> SchemaResult<Self> {
        let mut attributes = Vec::with_capacity(properties.len());
        let mut default_geometry = None;
        let mut seen = HashSet::with_capacity(properties.len());
        for name in properties {
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::duplicate_attribute(name));
            }
            let index = self
                .index_of(name)
                .ok_or_else(|| SchemaError::unknown_attribute(name))?;
            if Some(index) == self.default_geometry {
                default_geometry = Some(attributes.len());
            }
            attributes.push(self.attributes[index].clone());
        }
        Ok(Self {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            attributes,
            default_geometry,
            crs: self.crs.clone(),
        })
    }

    /// Returns a copy tagged with a different coordinate system.
    ///
    /// Coordinates are not transformed; only the declared system changes.
    #[must_use]
    pub fn with_crs(&self, crs: CrsId) -> Self {
        let mut retagged = self.clone();
        retagged.crs = Some(crs);
        retagged
    }
}

/// Consuming builder for [`FeatureType`].
#[derive(Debug, Clone)]
pub struct FeatureTypeBuilder {
    name: String,
    namespace: Option<String>,
    attributes: Vec<AttributeDescriptor>,
    default_geometry: Option<usize>,
    crs: Option<CrsId>,
}

impl FeatureTypeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            attributes: Vec::new(),
            default_geometry: None,
            crs: None,
        }
    }

    /// Sets the namespace URI.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Declares an attribute of the given type.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.attributes.push(AttributeDescriptor::new(name, value_type));
        self
    }

    /// Declares a geometry attribute. The first one declared becomes the
    /// default geometry.
    #[must_use]
    pub fn geometry(mut self, name: impl Into<String>) -> Self {
        if self.default_geometry.is_none() {
            self.default_geometry = Some(self.attributes.len());
        }
        self.attributes
            .push(AttributeDescriptor::new(name, ValueType::Geometry));
        self
    }

    /// Tags the coordinate system.
    #[must_use]
    pub fn crs(mut self, crs: CrsId) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Validates and builds the feature type.
    ///
    /// # Errors
    ///
    /// Fails on an empty name, duplicate attribute names, or a default
    /// geometry that is not a geometry attribute.
    pub fn build(self) -> SchemaResult<FeatureType> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptyTypeName);
        }
        let mut seen = HashSet::with_capacity(self.attributes.len());
        for attribute in &self.attributes {
            if !seen.insert(attribute.name()) {
                return Err(SchemaError::duplicate_attribute(attribute.name()));
            }
        }
        if let Some(index) = self.default_geometry {
            let is_geometry = self
                .attributes
                .get(index)
                .is_some_and(|a| a.value_type() == ValueType::Geometry);
            if !is_geometry {
                return Err(SchemaError::InvalidDefaultGeometry { index });
            }
        }
        Ok(FeatureType {
            name: self.name,
            namespace: self.namespace,
            attributes: self.attributes,
            default_geometry: self.default_geometry,
            crs: self.crs,
        })
    }
}
