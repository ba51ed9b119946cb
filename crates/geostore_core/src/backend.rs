//! Backing-store trait definitions.

use std::fmt;

use geostore_feature::{BoundingBox, Feature, FeatureType, Filter};

use crate::error::{CoreError, CoreResult};

/// A low-level backing store for the feature engine.
///
/// Backends are **dumb sequential stores**. They enumerate their feature
/// types and hand out raw readers and writers over complete, unfiltered
/// content. The engine owns everything above that: filtering, transaction
/// overlays, schema narrowing, locking and event delivery.
///
/// # Invariants
///
/// - `raw_reader` yields every stored feature of the type, in a stable
///   iteration order, except those excluded by the filter portion the
///   store claims
/// - `raw_writer` visits every stored feature and appends blanks past the
///   end; fids of appended features are assigned by the backend
/// - Backends must be `Send + Sync`; the engine serializes access per
///   reader/writer but may open several concurrently
///
/// # Implementors
///
/// - [`crate::MemoryBackend`] - in-memory reference store, used by tests
pub trait Backend: Send + Sync {
    /// Returns the names of all feature types in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn type_names(&self) -> CoreResult<Vec<String>>;

    /// Returns the schema of the named feature type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] for an unknown type.
    fn schema(&self, type_name: &str) -> CoreResult<FeatureType>;

    /// Opens a reader over the stored features of the type.
    ///
    /// `filter` is a pushdown hint: a store must apply exactly the portion
    /// it claims through [`Backend::claim_filter`] and ignore the rest.
    /// Stores without native filtering ignore the hint and yield
    /// everything.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] for an unknown type, or an I/O
    /// error from the store.
    fn raw_reader(&self, type_name: &str, filter: &Filter) -> CoreResult<Box<dyn FeatureReader>>;

    /// Opens a writer positioned before the first stored feature of the
    /// type.
    ///
    /// The default implementation reports the store as read-only.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unsupported`] when the store cannot write,
    /// [`CoreError::TypeNotFound`] for an unknown type, or an I/O error.
    fn raw_writer(&self, type_name: &str) -> CoreResult<Box<dyn FeatureWriter>> {
        let _ = type_name;
        Err(CoreError::unsupported("backing store is read-only"))
    }

    /// Creates a new feature type in the store.
    ///
    /// The default implementation reports schema creation as unsupported.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unsupported`] when the store cannot create
    /// types, or [`CoreError::IllegalState`] if the type already exists.
    fn create_schema(&self, schema: FeatureType) -> CoreResult<()> {
        let _ = schema;
        Err(CoreError::unsupported(
            "backing store cannot create feature types",
        ))
    }

    /// Splits a filter into the part the store evaluates natively and the
    /// remainder the engine must evaluate.
    ///
    /// Returns the remainder. The default claims nothing and returns the
    /// filter unchanged; a store with full native filtering returns
    /// [`Filter::Include`]. The claimed part and the remainder must
    /// together be equivalent to the input filter.
    fn claim_filter(&self, type_name: &str, filter: &Filter) -> Filter {
        let _ = type_name;
        filter.clone()
    }

    /// Returns the bounds of all stored features of the type, if cheaply
    /// known.
    ///
    /// The default reports unknown. Implementations must never scan to
    /// answer this.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] for an unknown type.
    fn bounds(&self, type_name: &str) -> CoreResult<Option<BoundingBox>> {
        let _ = type_name;
        Ok(None)
    }

    /// Returns the number of stored features matching the filter, if
    /// cheaply known.
    ///
    /// The default reports unknown. Implementations must never scan to
    /// answer this.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] for an unknown type.
    fn count(&self, type_name: &str, filter: &Filter) -> CoreResult<Option<usize>> {
        let _ = (type_name, filter);
        Ok(None)
    }
}

/// A forward-only, single-pass sequence of features.
///
/// # Protocol
///
/// - `has_next` may look ahead but never consumes
/// - `next` after exhaustion or after `close` fails with
///   [`CoreError::IllegalState`]
/// - `close` is idempotent and propagates to wrapped readers exactly once
pub trait FeatureReader: Send {
    /// Returns the schema of the features this reader yields.
    fn feature_type(&self) -> &FeatureType;

    /// Returns `true` if another feature is available.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] after `close`, or an I/O error
    /// from the store.
    fn has_next(&mut self) -> CoreResult<bool>;

    /// Returns the next feature.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] when exhausted or closed, or an
    /// I/O error from the store.
    fn next(&mut self) -> CoreResult<Feature>;

    /// Releases the reader.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the store; a second call is a no-op.
    fn close(&mut self) -> CoreResult<()>;
}

impl fmt::Debug for dyn FeatureReader + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureReader").finish_non_exhaustive()
    }
}

/// A forward-only, single-pass cursor over features that persists changes.
///
/// # Protocol
///
/// Each call to `next` returns the current feature (or a blank once the
/// underlying content is exhausted, for appends). The caller modifies the
/// returned feature and hands it back through `write`, or drops the
/// position with `remove`. Moving on without writing discards any
/// modification.
pub trait FeatureWriter: Send {
    /// Returns the schema of the features this writer visits.
    fn feature_type(&self) -> &FeatureType;

    /// Returns `true` if a stored feature is still ahead of the cursor.
    ///
    /// A writer past the end keeps serving blank features from `next` for
    /// appending.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] after `close`, or an I/O error
    /// from the store.
    fn has_next(&mut self) -> CoreResult<bool>;

    /// Advances the cursor and returns the feature at the new position,
    /// or a blank feature with a fresh fid once past the end.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] after `close`, or an I/O error
    /// from the store.
    fn next(&mut self) -> CoreResult<Feature>;

    /// Persists the feature at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] when there is no current
    /// position or the fid does not match it, or an I/O error.
    fn write(&mut self, feature: Feature) -> CoreResult<()>;

    /// Removes the feature at the current position. Removing a blank
    /// discards it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] when there is no current
    /// position, or an I/O error.
    fn remove(&mut self) -> CoreResult<()>;

    /// Releases the writer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the store; a second call is a no-op.
    fn close(&mut self) -> CoreResult<()>;
}
