//! Typed access handles over one feature type.

use std::sync::Arc;

use geostore_feature::{BoundingBox, Feature, FeatureType, Fid, Filter, Value};

use crate::backend::FeatureReader;
use crate::error::{CoreError, CoreResult};
use crate::events::{FeatureListener, ListenerId, SourceKey};
use crate::locking::{FeatureLock, DEFAULT_LOCK_DURATION};
use crate::query::Query;
use crate::store::DataStore;
use crate::transaction::Transaction;

/// Read access to one feature type.
///
/// A source is bound to a transaction, auto-commit by default, and every
/// read answers through that transaction's view. It is also the
/// attachment point for feature listeners: which events reach them
/// follows the bound transaction, and dropping the source detaches them.
pub struct FeatureSource {
    store: DataStore,
    schema: Arc<FeatureType>,
    type_name: String,
    key: SourceKey,
    transaction: Transaction,
}

impl FeatureSource {
    pub(crate) fn open(store: DataStore, type_name: &str) -> CoreResult<Self> {
        let schema = Arc::new(store.inner.backend.schema(type_name)?);
        let key = store.inner.listeners.register_source(type_name, None);
        Ok(Self {
            store,
            schema,
            type_name: type_name.to_owned(),
            key,
            transaction: Transaction::AUTO_COMMIT,
        })
    }

    /// Returns the schema of the feature type this source serves.
    #[must_use]
    pub fn schema(&self) -> &FeatureType {
        &self.schema
    }

    /// Returns the name of the feature type this source serves.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the store this source reads from.
    #[must_use]
    pub const fn data_store(&self) -> &DataStore {
        &self.store
    }

    /// Returns the bound transaction.
    #[must_use]
    pub const fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Binds the source to a transaction.
    ///
    /// Reads switch to the transaction's view and attached listeners
    /// switch to its event scope.
    pub fn set_transaction(&mut self, transaction: Transaction) {
        self.store
            .inner
            .listeners
            .bind_transaction(self.key, transaction.id());
        self.transaction = transaction;
    }

    /// Opens a reader answering the query.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] when the query names a
    /// different feature type, or any reader assembly error.
    pub fn features(&self, query: &Query) -> CoreResult<Box<dyn FeatureReader>> {
        let query = self.scoped(query)?;
        self.store.feature_reader(&query, &self.transaction)
    }

    /// Reads every feature answering the query into memory.
    ///
    /// # Errors
    ///
    /// As [`FeatureSource::features`], plus any error while reading.
    pub fn get_features(&self, query: &Query) -> CoreResult<Vec<Feature>> {
        let mut reader = self.features(query)?;
        let mut features = Vec::new();
        let result = (|| -> CoreResult<()> {
            while reader.has_next()? {
                features.push(reader.next()?);
            }
            Ok(())
        })();
        let close_result = reader.close();
        result.and(close_result)?;
        Ok(features)
    }

    /// Returns the bounds of all features, when cheaply known.
    ///
    /// Reports unknown while the bound transaction has uncommitted changes
    /// to this type, since the backend cannot see them.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] if the type vanished from the
    /// backend.
    pub fn bounds(&self) -> CoreResult<Option<BoundingBox>> {
        if self.has_pending_diff() {
            return Ok(None);
        }
        self.store.inner.backend.bounds(&self.type_name)
    }

    /// Returns the number of features answering the query, when cheaply
    /// known.
    ///
    /// Reports unknown while the bound transaction has uncommitted changes
    /// to this type, or when the backend cannot count the filter without
    /// scanning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] when the query names a
    /// different feature type.
    pub fn count(&self, query: &Query) -> CoreResult<Option<usize>> {
        let query = self.scoped(query)?;
        if self.has_pending_diff() {
            return Ok(None);
        }
        let count = self.store.inner.backend.count(&self.type_name, query.filter())?;
        Ok(count.map(|n| match query.max_features() {
            Some(max_features) => n.min(max_features),
            None => n,
        }))
    }

    /// Attaches a listener to this source.
    pub fn add_listener(&self, listener: Arc<dyn FeatureListener>) -> ListenerId {
        self.store.inner.listeners.add_listener(self.key, listener)
    }

    /// Detaches a listener from this source.
    pub fn remove_listener(&self, listener: ListenerId) {
        self.store.inner.listeners.remove_listener(self.key, listener);
    }

    fn scoped(&self, query: &Query) -> CoreResult<Query> {
        match query.type_name() {
            None => Ok(query.clone().with_type_name(self.type_name.clone())),
            Some(name) if name == self.type_name => Ok(query.clone()),
            Some(name) => Err(CoreError::illegal_state(format!(
                "query is for {name}, this source serves {}",
                self.type_name
            ))),
        }
    }

    fn has_pending_diff(&self) -> bool {
        self.transaction
            .existing_state(self.store.inner.id)
            .and_then(|state| state.existing_diff(&self.type_name))
            .is_some_and(|diff| !diff.is_empty())
    }
}

impl Drop for FeatureSource {
    fn drop(&mut self) {
        self.store.inner.listeners.unregister_source(self.key);
    }
}

/// Read-write access to one feature type.
///
/// Carries the full read surface of [`FeatureSource`] plus bulk
/// mutations. Under auto-commit every mutation is immediately durable;
/// bound to a transaction they stage until commit.
pub struct FeatureStore {
    source: FeatureSource,
}

impl FeatureStore {
    pub(crate) fn open(store: DataStore, type_name: &str) -> CoreResult<Self> {
        Ok(Self {
            source: FeatureSource::open(store, type_name)?,
        })
    }

    /// Returns the read half of this handle.
    #[must_use]
    pub const fn source(&self) -> &FeatureSource {
        &self.source
    }

    /// See [`FeatureSource::schema`].
    #[must_use]
    pub fn schema(&self) -> &FeatureType {
        self.source.schema()
    }

    /// See [`FeatureSource::type_name`].
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.source.type_name()
    }

    /// See [`FeatureSource::transaction`].
    #[must_use]
    pub const fn transaction(&self) -> &Transaction {
        self.source.transaction()
    }

    /// See [`FeatureSource::set_transaction`].
    pub fn set_transaction(&mut self, transaction: Transaction) {
        self.source.set_transaction(transaction);
    }

    /// See [`FeatureSource::features`].
    ///
    /// # Errors
    ///
    /// As [`FeatureSource::features`].
    pub fn features(&self, query: &Query) -> CoreResult<Box<dyn FeatureReader>> {
        self.source.features(query)
    }

    /// See [`FeatureSource::get_features`].
    ///
    /// # Errors
    ///
    /// As [`FeatureSource::get_features`].
    pub fn get_features(&self, query: &Query) -> CoreResult<Vec<Feature>> {
        self.source.get_features(query)
    }

    /// See [`FeatureSource::bounds`].
    ///
    /// # Errors
    ///
    /// As [`FeatureSource::bounds`].
    pub fn bounds(&self) -> CoreResult<Option<BoundingBox>> {
        self.source.bounds()
    }

    /// See [`FeatureSource::count`].
    ///
    /// # Errors
    ///
    /// As [`FeatureSource::count`].
    pub fn count(&self, query: &Query) -> CoreResult<Option<usize>> {
        self.source.count(query)
    }

    /// See [`FeatureSource::add_listener`].
    pub fn add_listener(&self, listener: Arc<dyn FeatureListener>) -> ListenerId {
        self.source.add_listener(listener)
    }

    /// See [`FeatureSource::remove_listener`].
    pub fn remove_listener(&self, listener: ListenerId) {
        self.source.remove_listener(listener);
    }

    /// Appends copies of the given features and returns their assigned
    /// fids, in order.
    ///
    /// The fids carried by the given features are ignored; the store
    /// assigns fresh ones. Under a transaction the returned fids are the
    /// synthetic staging ones, replaced at commit.
    ///
    /// # Errors
    ///
    /// Returns a schema error when a feature does not fit this type, or
    /// any writer error.
    pub fn add_features(&self, features: &[Feature]) -> CoreResult<Vec<Fid>> {
        let mut writer = self
            .source
            .store
            .feature_writer_append(&self.source.type_name, &self.source.transaction)?;
        let mut fids = Vec::with_capacity(features.len());
        let result = (|| -> CoreResult<()> {
            for feature in features {
                let mut blank = writer.next()?;
                blank.set_attributes(feature.attributes().to_vec())?;
                fids.push(blank.fid().clone());
                writer.write(blank)?;
            }
            Ok(())
        })();
        let close_result = writer.close();
        result.and(close_result)?;
        Ok(fids)
    }

    /// Removes every feature matching the filter.
    ///
    /// # Errors
    ///
    /// Returns any writer error; removals before the failure stand.
    pub fn remove_features(&self, filter: &Filter) -> CoreResult<()> {
        let mut writer = self.source.store.feature_writer(
            &self.source.type_name,
            filter,
            &self.source.transaction,
        )?;
        let result = (|| -> CoreResult<()> {
            while writer.has_next()? {
                writer.next()?;
                writer.remove()?;
            }
            Ok(())
        })();
        let close_result = writer.close();
        result.and(close_result)
    }

    /// Sets the named attributes on every feature matching the filter.
    ///
    /// # Errors
    ///
    /// Returns a schema error for an unknown attribute or wrong value
    /// type, or any writer error; updates before the failure stand.
    pub fn modify_features(&self, updates: &[(&str, Value)], filter: &Filter) -> CoreResult<()> {
        let mut writer = self.source.store.feature_writer(
            &self.source.type_name,
            filter,
            &self.source.transaction,
        )?;
        let result = (|| -> CoreResult<()> {
            while writer.has_next()? {
                let mut feature = writer.next()?;
                for (name, value) in updates {
                    feature.set_attribute(name, value.clone())?;
                }
                writer.write(feature)?;
            }
            Ok(())
        })();
        let close_result = writer.close();
        result.and(close_result)
    }
}

/// Read-write-lock access to one feature type.
///
/// Extends [`FeatureStore`] with advisory locking: features locked here
/// reject mutations from anyone not carrying the lock's authorization.
/// Reads and writes go through [`FeatureLocking::store`].
pub struct FeatureLocking {
    store: FeatureStore,
    lock: FeatureLock,
}

impl FeatureLocking {
    pub(crate) fn open(store: DataStore, type_name: &str) -> CoreResult<Self> {
        Ok(Self {
            store: FeatureStore::open(store, type_name)?,
            lock: FeatureLock::generate(DEFAULT_LOCK_DURATION),
        })
    }

    /// Returns the read-write half of this handle.
    #[must_use]
    pub const fn store(&self) -> &FeatureStore {
        &self.store
    }

    /// Returns the read half of this handle.
    #[must_use]
    pub const fn source(&self) -> &FeatureSource {
        self.store.source()
    }

    /// See [`FeatureSource::set_transaction`].
    pub fn set_transaction(&mut self, transaction: Transaction) {
        self.store.set_transaction(transaction);
    }

    /// Sets the lock applied by [`FeatureLocking::lock_features`].
    ///
    /// A fresh handle starts with a generated authorization and a one
    /// hour duration.
    pub fn set_lock(&mut self, lock: FeatureLock) {
        self.lock = lock;
    }

    /// Returns the lock applied by [`FeatureLocking::lock_features`].
    #[must_use]
    pub const fn current_lock(&self) -> &FeatureLock {
        &self.lock
    }

    /// Locks every feature matching the filter and returns how many.
    ///
    /// Fails fast on the first conflict; features locked before it stay
    /// locked until they expire or their authorization is released.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockConflict`] for a feature already held
    /// under another authorization, or any read error.
    pub fn lock_features(&self, filter: &Filter) -> CoreResult<usize> {
        let fids = self.visible_fids(filter)?;
        let source = &self.store.source;
        for fid in &fids {
            source
                .store
                .inner
                .locking
                .lock(&source.type_name, fid, &self.lock)?;
        }
        Ok(fids.len())
    }

    /// Unlocks every feature matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] under auto-commit, since only
    /// a transaction can carry the authorization, or
    /// [`CoreError::LockConflict`] when the bound transaction does not
    /// hold it.
    pub fn unlock_features(&self, filter: &Filter) -> CoreResult<()> {
        let source = &self.store.source;
        if source.transaction.is_auto_commit() {
            return Err(CoreError::illegal_state(
                "unlocking requires a transaction carrying the lock authorization",
            ));
        }
        let fids = self.visible_fids(filter)?;
        for fid in &fids {
            source
                .store
                .inner
                .locking
                .unlock(&source.type_name, fid, &source.transaction)?;
        }
        Ok(())
    }

    fn visible_fids(&self, filter: &Filter) -> CoreResult<Vec<Fid>> {
        let query = Query::new(self.store.source.type_name.clone())
            .with_filter(filter.clone())
            .with_properties(Vec::<String>::new());
        let features = self.store.source.get_features(&query)?;
        Ok(features.into_iter().map(|f| f.fid().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::events::FeatureEvent;
    use crate::memory::MemoryBackend;
    use geostore_feature::{Geometry, ValueType};
    use parking_lot::Mutex;

    fn schema() -> FeatureType {
        FeatureType::builder("roads")
            .attribute("name", ValueType::Text)
            .attribute("lanes", ValueType::Int)
            .geometry("geom")
            .build()
            .unwrap()
    }

    fn road(fid: &str, name: &str, lanes: i64, x: f64, y: f64) -> Feature {
        Feature::new(
            Arc::new(schema()),
            Fid::new(fid),
            vec![
                Value::Text(name.to_owned()),
                Value::Int(lanes),
                Value::Geometry(Geometry::point(x, y)),
            ],
        )
        .unwrap()
    }

    fn seeded_store() -> DataStore {
        let backend = MemoryBackend::new();
        backend.create_schema(schema()).unwrap();
        backend.insert(road("roads.1", "Main St", 2, 1.0, 1.0)).unwrap();
        backend.insert(road("roads.2", "Ring Rd", 4, 3.0, 5.0)).unwrap();
        DataStore::new(backend)
    }

    #[test]
    fn source_reads_its_type() {
        let store = seeded_store();
        let source = store.feature_source("roads").unwrap();

        assert_eq!(source.type_name(), "roads");
        assert_eq!(source.schema().name(), "roads");

        let features = source.get_features(&Query::ALL).unwrap();
        assert_eq!(features.len(), 2);
    }

    #[test]
    fn query_for_another_type_is_rejected() {
        let store = seeded_store();
        let source = store.feature_source("roads").unwrap();
        assert!(source.get_features(&Query::new("rivers")).is_err());
    }

    #[test]
    fn count_respects_max_features() {
        let store = seeded_store();
        let source = store.feature_source("roads").unwrap();

        assert_eq!(source.count(&Query::ALL).unwrap(), Some(2));
        let capped = Query::default().with_max_features(1);
        assert_eq!(source.count(&capped).unwrap(), Some(1));
    }

    #[test]
    fn pending_changes_make_count_and_bounds_unknown() {
        let store = seeded_store();
        let transaction = Transaction::new();
        let handle = store.feature_store("roads").unwrap();

        let mut source = store.feature_source("roads").unwrap();
        source.set_transaction(transaction.clone());
        assert_eq!(source.count(&Query::ALL).unwrap(), Some(2));
        assert!(source.bounds().unwrap().is_some());

        let mut writing = store.feature_store("roads").unwrap();
        writing.set_transaction(transaction.clone());
        writing.remove_features(&Filter::fids(["roads.1"])).unwrap();

        assert_eq!(source.count(&Query::ALL).unwrap(), None);
        assert_eq!(source.bounds().unwrap(), None);

        // Auto-commit sources still answer from the backend.
        assert_eq!(handle.count(&Query::ALL).unwrap(), Some(2));
        transaction.close().unwrap();
    }

    #[test]
    fn add_features_assigns_store_fids() {
        let store = seeded_store();
        let handle = store.feature_store("roads").unwrap();

        let fids = handle
            .add_features(&[road("ignored", "New Rd", 1, 9.0, 9.0)])
            .unwrap();
        assert_eq!(fids.len(), 1);
        assert_ne!(fids[0], Fid::new("ignored"));

        let features = handle
            .get_features(&Query::default().with_filter(Filter::fids([fids[0].clone()])))
            .unwrap();
        assert_eq!(
            features[0].attribute("name"),
            Some(&Value::Text("New Rd".to_owned()))
        );
    }

    #[test]
    fn remove_features_deletes_matching() {
        let store = seeded_store();
        let handle = store.feature_store("roads").unwrap();

        handle
            .remove_features(&Filter::eq("lanes", Value::Int(4)))
            .unwrap();

        let left = handle.get_features(&Query::ALL).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].fid(), &Fid::new("roads.1"));
    }

    #[test]
    fn modify_features_updates_matching() {
        let store = seeded_store();
        let handle = store.feature_store("roads").unwrap();

        handle
            .modify_features(&[("lanes", Value::Int(6))], &Filter::fids(["roads.1"]))
            .unwrap();

        let features = handle
            .get_features(&Query::default().with_filter(Filter::fids(["roads.1"])))
            .unwrap();
        assert_eq!(features[0].attribute("lanes"), Some(&Value::Int(6)));
    }

    #[test]
    fn auto_commit_writes_notify_listeners() {
        let store = seeded_store();
        let handle = store.feature_store("roads").unwrap();

        let seen: Arc<Mutex<Vec<FeatureEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handle.add_listener(Arc::new(move |event: &FeatureEvent| {
            sink.lock().push(event.clone());
        }));

        handle
            .modify_features(&[("lanes", Value::Int(3))], &Filter::fids(["roads.1"]))
            .unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn removed_listeners_stay_silent() {
        let store = seeded_store();
        let handle = store.feature_store("roads").unwrap();

        let seen: Arc<Mutex<Vec<FeatureEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = handle.add_listener(Arc::new(move |event: &FeatureEvent| {
            sink.lock().push(event.clone());
        }));
        handle.remove_listener(id);

        handle.remove_features(&Filter::fids(["roads.1"])).unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn locked_features_reject_strangers() {
        let store = seeded_store();
        let locking = store.feature_locking("roads").unwrap();

        let locked = locking.lock_features(&Filter::fids(["roads.1"])).unwrap();
        assert_eq!(locked, 1);

        let handle = store.feature_store("roads").unwrap();
        assert!(handle
            .modify_features(&[("lanes", Value::Int(9))], &Filter::fids(["roads.1"]))
            .is_err());
        assert!(handle
            .modify_features(&[("lanes", Value::Int(9))], &Filter::fids(["roads.2"]))
            .is_ok());
    }

    #[test]
    fn authorized_transaction_passes_locks() {
        let store = seeded_store();
        let mut locking = store.feature_locking("roads").unwrap();
        locking.set_lock(FeatureLock::new("survey", DEFAULT_LOCK_DURATION));
        locking.lock_features(&Filter::fids(["roads.1"])).unwrap();

        let transaction = Transaction::new();
        transaction.add_authorization("survey").unwrap();
        let mut handle = store.feature_store("roads").unwrap();
        handle.set_transaction(transaction.clone());

        handle
            .modify_features(&[("lanes", Value::Int(9))], &Filter::fids(["roads.1"]))
            .unwrap();
        transaction.commit().unwrap();
        transaction.close().unwrap();

        // Closing released the lock along with the authorization.
        assert!(!store
            .locking_manager()
            .is_locked("roads", &Fid::new("roads.1")));
    }

    #[test]
    fn unlock_needs_a_transaction() {
        let store = seeded_store();
        let locking = store.feature_locking("roads").unwrap();
        locking.lock_features(&Filter::Include).unwrap();
        assert!(locking.unlock_features(&Filter::Include).is_err());
    }

    #[test]
    fn unlock_with_authorization_releases() {
        let store = seeded_store();
        let mut locking = store.feature_locking("roads").unwrap();
        locking.set_lock(FeatureLock::new("survey", DEFAULT_LOCK_DURATION));
        locking.lock_features(&Filter::fids(["roads.1"])).unwrap();

        let transaction = Transaction::new();
        transaction.add_authorization("survey").unwrap();
        locking.set_transaction(transaction.clone());
        locking.unlock_features(&Filter::fids(["roads.1"])).unwrap();

        assert!(!store
            .locking_manager()
            .is_locked("roads", &Fid::new("roads.1")));
        transaction.close().unwrap();
    }
}
