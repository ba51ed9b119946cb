//! Predicates over features.

use std::collections::BTreeSet;

use crate::bounds::BoundingBox;
use crate::feature::{Feature, Fid};
use crate::value::Value;

/// A predicate evaluated against a single feature.
///
/// `Include` matches every feature, `Exclude` matches none. Evaluation is
/// pure and total: an unknown property never matches, it does not fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Matches every feature.
    Include,
    /// Matches no feature.
    Exclude,
    /// Matches features whose identifier is in the set.
    Fids(BTreeSet<Fid>),
    /// Matches features whose named attribute equals the value.
    Eq {
        /// Attribute name.
        property: String,
        /// Value compared against.
        value: Value,
    },
    /// Matches features whose bounds intersect the box.
    Bbox(BoundingBox),
    /// Negation.
    Not(Box<Filter>),
    /// Conjunction; the empty conjunction matches everything.
    And(Vec<Filter>),
    /// Disjunction; the empty disjunction matches nothing.
    Or(Vec<Filter>),
}

impl Filter {
    /// Builds an identifier filter.
    #[must_use]
    pub fn fids<I, T>(fids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Fid>,
    {
        Self::Fids(fids.into_iter().map(Into::into).collect())
    }

    /// Builds an equality filter on the named attribute.
    #[must_use]
    pub fn eq(property: impl Into<String>, value: Value) -> Self {
        Self::Eq {
            property: property.into(),
            value,
        }
    }

    /// Returns `true` for the filter that matches everything.
    #[must_use]
    pub const fn is_include(&self) -> bool {
        matches!(self, Self::Include)
    }

    /// Returns `true` for the filter that matches nothing.
    #[must_use]
    pub const fn is_exclude(&self) -> bool {
        matches!(self, Self::Exclude)
    }

    /// Evaluates the filter against a feature.
    #[must_use]
    pub fn matches(&self, feature: &Feature) -> bool {
        match self {
            Self::Include => true,
            Self::Exclude => false,
            Self::Fids(fids) => fids.contains(feature.fid()),
            Self::Eq { property, value } => feature.attribute(property) == Some(value),
            Self::Bbox(bbox) => feature.bounds().intersects(bbox),
            Self::Not(inner) => !inner.matches(feature),
            Self::And(parts) => parts.iter().all(|p| p.matches(feature)),
            Self::Or(parts) => parts.iter().any(|p| p.matches(feature)),
        }
    }
}
