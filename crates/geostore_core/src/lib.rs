//! # GeoStore Core
//!
//! Feature store engine over pluggable backends.
//!
//! A [`Backend`] serves raw feature streams for one backing store; this
//! crate layers every engine service on top of it: query-driven reader
//! pipelines, copy-on-write transactions, advisory feature locking and
//! change notification. Backends stay simple, the engine carries the
//! shared semantics.
//!
//! ## Design Principles
//!
//! - Readers and writers are assembled lazily; decorators wrap the
//!   backend's raw streams only where a query or transaction needs them
//! - Transactions stage diffs in memory and replay them against the
//!   backend at commit; the backend never sees uncommitted state
//! - Locks are advisory, expire on their own and are checked on every
//!   write path
//! - Backends may claim filter portions they evaluate natively; the
//!   engine applies only the remainder
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For testing and small in-process catalogs
//! - The [`Backend`] trait - For everything persistent
//!
//! ## Example
//!
//! ```rust
//! use geostore_core::{DataStore, MemoryBackend, Query};
//! use geostore_feature::{Feature, FeatureType, Fid, Geometry, Value, ValueType};
//! use std::sync::Arc;
//!
//! let store = DataStore::new(MemoryBackend::new());
//! store
//!     .create_schema(
//!         FeatureType::builder("roads")
//!             .attribute("name", ValueType::Text)
//!             .geometry("geom")
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let handle = store.feature_store("roads").unwrap();
//! let road = Feature::new(
//!     Arc::new(handle.schema().clone()),
//!     Fid::new("seed"),
//!     vec![
//!         Value::Text("A1".into()),
//!         Value::Geometry(Geometry::point(1.0, 2.0)),
//!     ],
//! )
//! .unwrap();
//!
//! let fids = handle.add_features(&[road]).unwrap();
//! assert_eq!(fids.len(), 1);
//! assert_eq!(handle.get_features(&Query::ALL).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod diff;
mod error;
mod events;
mod locking;
mod memory;
mod query;
mod reader;
mod store;
mod transaction;
mod writer;

pub use backend::{Backend, FeatureReader, FeatureWriter};
pub use diff::{Diff, DiffEntry, DiffSnapshot};
pub use error::{CoreError, CoreResult};
pub use events::{
    FeatureEvent, FeatureEventKind, FeatureListener, FeatureListenerManager, ListenerId, SourceKey,
};
pub use locking::{CheckedWriter, FeatureLock, LockingManager, DEFAULT_LOCK_DURATION};
pub use memory::MemoryBackend;
pub use query::Query;
pub use reader::{DiffReader, EmptyReader, FilteringReader, LimitReader, RetypeReader};
pub use store::{DataStore, FeatureLocking, FeatureSource, FeatureStore};
pub use transaction::{Transaction, TransactionId};
pub use writer::{DiffWriter, EventWriter, FilteringWriter};
