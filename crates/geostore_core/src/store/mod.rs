//! The store façade: catalogs, readers, writers and typed access handles.
//!
//! [`DataStore`] wraps one [`Backend`] and layers every engine service on
//! top of it: query-driven reader assembly, transaction staging, lock
//! checking and event delivery. Typed access goes through the handles in
//! [`FeatureSource`] (read), [`FeatureStore`] (read-write) and
//! [`FeatureLocking`] (read-write-lock).

mod source;

pub use source::{FeatureLocking, FeatureSource, FeatureStore};

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use geostore_feature::{FeatureType, Filter};

use crate::backend::{Backend, FeatureReader, FeatureWriter};
use crate::error::{CoreError, CoreResult};
use crate::events::FeatureListenerManager;
use crate::locking::LockingManager;
use crate::query::Query;
use crate::reader::{DiffReader, EmptyReader, FilteringReader, LimitReader, RetypeReader};
use crate::transaction::Transaction;
use crate::writer::{DiffWriter, EventWriter, FilteringWriter};

/// Process-unique identity of one store, keying per-store transaction
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StoreId(Uuid);

pub(crate) struct StoreInner {
    pub(crate) id: StoreId,
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) listeners: FeatureListenerManager,
    pub(crate) locking: LockingManager,
}

impl StoreInner {
    pub(crate) fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            id: StoreId(Uuid::new_v4()),
            backend,
            listeners: FeatureListenerManager::new(),
            locking: LockingManager::new(),
        }
    }
}

/// Handle to one backing store with the engine layered on top.
///
/// Cheap to clone; every clone is the same store. Readers and writers are
/// assembled lazily per request: decorators wrap the backend's raw
/// streams only where the query or transaction requires them.
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<StoreInner>,
}

impl DataStore {
    /// Opens a store over the given backend.
    #[must_use]
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            inner: Arc::new(StoreInner::new(Box::new(backend))),
        }
    }

    /// Returns the names of all feature types in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot read its catalog.
    pub fn type_names(&self) -> CoreResult<Vec<String>> {
        self.inner.backend.type_names()
    }

    /// Returns the schema of the named feature type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] for an unknown type.
    pub fn schema(&self, type_name: &str) -> CoreResult<FeatureType> {
        self.inner.backend.schema(type_name)
    }

    /// Creates a new feature type in the backing store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unsupported`] when the backend cannot create
    /// types, or [`CoreError::IllegalState`] if the type already exists.
    pub fn create_schema(&self, schema: FeatureType) -> CoreResult<()> {
        let name = schema.name().to_owned();
        self.inner.backend.create_schema(schema)?;
        debug!("Created feature type {}", name);
        Ok(())
    }

    /// Returns the store's lock registry.
    #[must_use]
    pub fn locking_manager(&self) -> LockingManager {
        self.inner.locking.clone()
    }

    /// Opens read access to one feature type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] for an unknown type.
    pub fn feature_source(&self, type_name: &str) -> CoreResult<FeatureSource> {
        FeatureSource::open(self.clone(), type_name)
    }

    /// Opens read-write access to one feature type.
    ///
    /// The handle is issued without probing writability; a read-only
    /// backend rejects the first mutation instead.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] for an unknown type.
    pub fn feature_store(&self, type_name: &str) -> CoreResult<FeatureStore> {
        FeatureStore::open(self.clone(), type_name)
    }

    /// Opens read-write-lock access to one feature type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] for an unknown type.
    pub fn feature_locking(&self, type_name: &str) -> CoreResult<FeatureLocking> {
        FeatureLocking::open(self.clone(), type_name)
    }

    /// Opens a reader answering the query through the transaction's view.
    ///
    /// The pipeline is assembled inside out. The backend serves a raw
    /// stream with whatever filter portion it claims applied natively; the
    /// engine wraps the remainder in a filtering stage, overlays the
    /// transaction's diff, reshapes to the requested properties and
    /// coordinate system, and finally caps the count. Stages the query
    /// does not need are not built.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] when the query names no type or
    /// the transaction is closed, [`CoreError::TypeNotFound`] for an
    /// unknown type, or a schema error for an invalid projection.
    pub fn feature_reader(
        &self,
        query: &Query,
        transaction: &Transaction,
    ) -> CoreResult<Box<dyn FeatureReader>> {
        let type_name = query
            .type_name()
            .ok_or_else(|| CoreError::illegal_state("query names no feature type"))?;
        let schema = Arc::new(self.inner.backend.schema(type_name)?);

        let target = match query.property_names() {
            Some(properties) => Arc::new(schema.subset(properties)?),
            None => Arc::clone(&schema),
        };
        let target = match query.coordinate_system() {
            Some(crs) => Arc::new(target.with_crs(crs.clone())),
            None => target,
        };

        let filter = query.filter();
        if filter.is_exclude() {
            return Ok(Box::new(EmptyReader::new(target)));
        }

        let mut reader: Box<dyn FeatureReader> =
            self.inner.backend.raw_reader(type_name, filter)?;
        let remainder = self.inner.backend.claim_filter(type_name, filter);
        if !remainder.is_include() {
            reader = Box::new(FilteringReader::new(reader, remainder));
        }
        if !transaction.is_auto_commit() {
            let state = transaction.state(&self.inner)?;
            let diff = state.diff(type_name)?;
            reader = Box::new(DiffReader::new(reader, diff.snapshot(), filter.clone()));
        }
        if target.as_ref() != schema.as_ref() {
            reader = Box::new(RetypeReader::new(reader, Arc::clone(&target))?);
        }
        if let Some(max_features) = query.max_features() {
            reader = Box::new(LimitReader::new(reader, max_features));
        }
        Ok(reader)
    }

    /// Opens a writer over the features matching the filter, through the
    /// transaction's view.
    ///
    /// Auto-commit writers persist straight to the backend; transactional
    /// writers stage into the transaction's diff. The filter narrows
    /// iteration only. Every writer is lock-checked outermost.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] for an unknown type,
    /// [`CoreError::Unsupported`] when the backend is read-only and the
    /// write path needs it, or [`CoreError::IllegalState`] for a closed
    /// transaction.
    pub fn feature_writer(
        &self,
        type_name: &str,
        filter: &Filter,
        transaction: &Transaction,
    ) -> CoreResult<Box<dyn FeatureWriter>> {
        let schema = Arc::new(self.inner.backend.schema(type_name)?);
        let mut writer: Box<dyn FeatureWriter> = match transaction.id() {
            None => {
                let raw = self.inner.backend.raw_writer(type_name)?;
                Box::new(EventWriter::new(raw, self.inner.listeners.clone()))
            }
            Some(id) => {
                let state = transaction.state(&self.inner)?;
                let diff = state.diff(type_name)?;
                let raw = self.inner.backend.raw_reader(type_name, &Filter::Include)?;
                let overlay = DiffReader::new(raw, diff.snapshot(), Filter::Include);
                Box::new(DiffWriter::new(
                    overlay,
                    diff,
                    Arc::clone(&schema),
                    self.inner.listeners.clone(),
                    id,
                ))
            }
        };
        if !filter.is_include() {
            writer = Box::new(FilteringWriter::new(writer, filter.clone()));
        }
        Ok(Box::new(
            self.inner.locking.checked_writer(writer, transaction.clone()),
        ))
    }

    /// Opens a writer positioned past every existing feature, for appends.
    ///
    /// # Errors
    ///
    /// As [`DataStore::feature_writer`], plus any error while skipping the
    /// existing features.
    pub fn feature_writer_append(
        &self,
        type_name: &str,
        transaction: &Transaction,
    ) -> CoreResult<Box<dyn FeatureWriter>> {
        let mut writer = self.feature_writer(type_name, &Filter::Include, transaction)?;
        while writer.has_next()? {
            writer.next()?;
        }
        Ok(writer)
    }
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}
