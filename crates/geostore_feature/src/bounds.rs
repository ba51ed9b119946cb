//! Axis-aligned bounding boxes.

use std::fmt;
use std::hash::{Hash, Hasher};

/// An axis-aligned rectangle in 2D coordinate space.
///
/// The empty box carries inverted bounds so `union` and `expand` need no
/// special casing: any finite point grows it to a degenerate box around
/// that point. Equality and hashing use the raw coordinate bit patterns.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl BoundingBox {
    /// The empty box: contains nothing, acts as the identity under `union`.
    pub const EMPTY: Self = Self {
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };

    /// Creates a box from min/max corners.
    #[must_use]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Creates a degenerate box covering a single point.
    #[must_use]
    pub const fn from_point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Returns the minimum x coordinate.
    #[must_use]
    pub const fn min_x(&self) -> f64 {
        self.min_x
    }

    /// Returns the minimum y coordinate.
    #[must_use]
    pub const fn min_y(&self) -> f64 {
        self.min_y
    }

    /// Returns the maximum x coordinate.
    #[must_use]
    pub const fn max_x(&self) -> f64 {
        self.max_x
    }

    /// Returns the maximum y coordinate.
    #[must_use]
    pub const fn max_y(&self) -> f64 {
        self.max_y
    }

    /// Returns `true` if the box contains no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.min_x <= self.max_x && self.min_y <= self.max_y)
    }

    /// Grows the box to cover the given point.
    pub fn expand(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Returns the smallest box covering both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Returns `true` if the boxes share at least one point.
    ///
    /// An empty box intersects nothing, itself included.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.min_x.to_bits() == other.min_x.to_bits()
            && self.min_y.to_bits() == other.min_y.to_bits()
            && self.max_x.to_bits() == other.max_x.to_bits()
            && self.max_y.to_bits() == other.max_y.to_bits()
    }
}

impl Eq for BoundingBox {}

impl Hash for BoundingBox {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.min_x.to_bits().hash(state);
        self.min_y.to_bits().hash(state);
        self.max_x.to_bits().hash(state);
        self.max_y.to_bits().hash(state);
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "[empty]")
        } else {
            write!(
                f,
                "[{} {} : {} {}]",
                self.min_x, self.min_y, self.max_x, self.max_y
            )
        }
    }
}
