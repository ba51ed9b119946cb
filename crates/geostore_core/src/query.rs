//! Immutable query descriptors.

use std::hash::{Hash, Hasher};

use geostore_feature::{CrsId, Filter};

/// A request against a feature type: filter, projection and limits.
///
/// Queries are immutable value objects assembled through consuming builder
/// methods. Two canonical constants cover the common cases:
/// [`Query::ALL`] retrieves every feature with every property, and
/// [`Query::FIDS`] retrieves every feature with no properties at all
/// (identifiers only).
///
/// Equality and hashing cover every field except the diagnostic `handle`.
#[derive(Debug, Clone)]
pub struct Query {
    type_name: Option<String>,
    filter: Filter,
    properties: Option<Vec<String>>,
    max_features: Option<usize>,
    crs: Option<CrsId>,
    handle: Option<String>,
}

impl Query {
    /// Retrieves every feature with every property.
    pub const ALL: Self = Self {
        type_name: None,
        filter: Filter::Include,
        properties: None,
        max_features: None,
        crs: None,
        handle: None,
    };

    /// Retrieves every feature with no properties: identifiers only.
    pub const FIDS: Self = Self {
        type_name: None,
        filter: Filter::Include,
        properties: Some(Vec::new()),
        max_features: None,
        crs: None,
        handle: None,
    };

    /// Creates an unrestricted query against the named feature type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::ALL
        }
    }

    /// Sets the feature type name.
    #[must_use]
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Restricts the result to the named properties, in the given order.
    ///
    /// An empty list retrieves identifiers only.
    #[must_use]
    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Caps the number of features retrieved.
    #[must_use]
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Overrides the declared coordinate system of the results.
    ///
    /// This retags the schema; coordinates are not transformed.
    #[must_use]
    pub fn with_coordinate_system(mut self, crs: CrsId) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Attaches a diagnostic handle, ignored by equality.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Returns the feature type name, if set.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Returns the filter.
    #[must_use]
    pub const fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Returns the requested properties; `None` means all of them.
    #[must_use]
    pub fn property_names(&self) -> Option<&[String]> {
        self.properties.as_deref()
    }

    /// Returns `true` when the query retrieves every property.
    #[must_use]
    pub const fn retrieves_all_properties(&self) -> bool {
        self.properties.is_none()
    }

    /// Returns the feature cap; `None` means unbounded.
    #[must_use]
    pub const fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    /// Returns the coordinate system override, if set.
    #[must_use]
    pub const fn coordinate_system(&self) -> Option<&CrsId> {
        self.crs.as_ref()
    }

    /// Returns the diagnostic handle, if set.
    #[must_use]
    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::ALL
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.filter == other.filter
            && self.properties == other.properties
            && self.max_features == other.max_features
            && self.crs == other.crs
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        self.filter.hash(state);
        self.properties.hash(state);
        self.max_features.hash(state);
        self.crs.hash(state);
    }
}
