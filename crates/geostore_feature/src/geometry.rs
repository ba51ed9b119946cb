//! Geometry primitives.

use std::hash::{Hash, Hasher};

use crate::bounds::BoundingBox;

/// A 2D coordinate.
///
/// Equality and hashing use the raw bit patterns, so `NaN == NaN` holds and
/// `0.0 != -0.0`.
#[derive(Debug, Clone, Copy)]
pub struct Coord {
    /// Easting or longitude.
    pub x: f64,
    /// Northing or latitude.
    pub y: f64,
}

impl Coord {
    /// Creates a coordinate.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl PartialEq for Coord {
    fn eq(&self, other: &Self) -> bool {
        self.x.to_bits() == other.x.to_bits() && self.y.to_bits() == other.y.to_bits()
    }
}

impl Eq for Coord {}

impl Hash for Coord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
    }
}

/// A geometry attached to a feature attribute.
///
/// Coordinates are interpreted in the coordinate system of the owning
/// feature type; no reprojection happens here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Geometry {
    /// A single position.
    Point(Coord),
    /// An open polyline.
    LineString(Vec<Coord>),
    /// A closed ring given as its exterior boundary.
    Polygon(Vec<Coord>),
}

impl Geometry {
    /// Creates a point geometry.
    #[must_use]
    pub const fn point(x: f64, y: f64) -> Self {
        Self::Point(Coord::new(x, y))
    }

    /// Returns the bounding box covering every coordinate.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox::EMPTY;
        match self {
            Self::Point(coord) => bounds.expand(coord.x, coord.y),
            Self::LineString(coords) | Self::Polygon(coords) => {
                for coord in coords {
                    bounds.expand(coord.x, coord.y);
                }
            }
        }
        bounds
    }
}
