//! # GeoStore Feature Model
//!
//! Plain value objects for geospatial feature data: attribute values,
//! geometries, bounding boxes, schemas, features and filters.
//!
//! This crate performs no I/O and holds no locks. It is the vocabulary the
//! `geostore_core` engine validates against and evaluates over.
//!
//! ## Design Principles
//!
//! - Closed enums for values, geometries and filters; no dynamic typing
//! - Every feature is validated against its schema on construction and on
//!   every mutation
//! - Filter evaluation is pure and total
//!
//! ## Example
//!
//! ```rust
//! use geostore_feature::{Feature, FeatureType, Fid, Geometry, Value, ValueType};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(
//!     FeatureType::builder("roads")
//!         .attribute("name", ValueType::Text)
//!         .geometry("geom")
//!         .build()
//!         .unwrap(),
//! );
//!
//! let feature = Feature::new(
//!     schema,
//!     Fid::new("roads.1"),
//!     vec![
//!         Value::Text("A1".into()),
//!         Value::Geometry(Geometry::point(1.0, 2.0)),
//!     ],
//! )
//! .unwrap();
//!
//! assert_eq!(feature.fid().as_str(), "roads.1");
//! assert!(!feature.bounds().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bounds;
mod error;
mod feature;
mod filter;
mod geometry;
mod schema;
mod value;

pub use bounds::BoundingBox;
pub use error::{SchemaError, SchemaResult};
pub use feature::{Feature, Fid};
pub use filter::Filter;
pub use geometry::{Coord, Geometry};
pub use schema::{AttributeDescriptor, CrsId, FeatureType, FeatureTypeBuilder};
pub use value::{Value, ValueType};
