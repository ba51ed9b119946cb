//! Advisory per-feature locking.
//!
//! Locks are process-wide and advisory: they constrain mutations that go
//! through the engine, not the backing store itself. A lock is held under
//! an authorization token until it expires or is released; a transaction
//! proves it may touch a locked feature by carrying that token. Expiry is
//! lazy, checked whenever a lock is consulted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use geostore_feature::{Feature, FeatureType, Fid};

use crate::backend::FeatureWriter;
use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;

/// How long a lock lasts when no duration is chosen.
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(3600);

/// A lock request: an authorization token plus how long it should hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLock {
    authorization: String,
    duration: Duration,
}

impl FeatureLock {
    /// Creates a lock under an explicit authorization token.
    pub fn new(authorization: impl Into<String>, duration: Duration) -> Self {
        Self {
            authorization: authorization.into(),
            duration,
        }
    }

    /// Creates a lock under a generated, unique authorization token.
    #[must_use]
    pub fn generate(duration: Duration) -> Self {
        Self {
            authorization: Uuid::new_v4().to_string(),
            duration,
        }
    }

    /// Returns the authorization token.
    #[must_use]
    pub fn authorization(&self) -> &str {
        &self.authorization
    }

    /// Returns the requested hold duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}

#[derive(Debug)]
struct LockEntry {
    authorization: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct LockingInner {
    tables: Mutex<HashMap<String, HashMap<Fid, LockEntry>>>,
}

/// Process-wide lock registry for one store.
///
/// A cheap-clone handle; every clone shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct LockingManager {
    inner: Arc<LockingInner>,
}

impl LockingManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks one feature under the given lock's authorization.
    ///
    /// Re-locking under the same authorization refreshes the expiry.
    ///
    /// # Errors
    ///
    /// Returns a lock conflict when the feature is already held under a
    /// different, unexpired authorization.
    pub fn lock(&self, type_name: &str, fid: &Fid, lock: &FeatureLock) -> CoreResult<()> {
        let mut tables = self.inner.tables.lock();
        let table = tables.entry(type_name.to_owned()).or_default();
        let now = Instant::now();
        if let Some(entry) = table.get(fid) {
            if entry.expires_at > now && entry.authorization != lock.authorization() {
                return Err(CoreError::lock_conflict(
                    type_name,
                    fid.clone(),
                    "held under another authorization",
                ));
            }
        }
        table.insert(
            fid.clone(),
            LockEntry {
                authorization: lock.authorization().to_owned(),
                expires_at: now + lock.duration(),
            },
        );
        debug!("Locked {}/{}", type_name, fid);
        Ok(())
    }

    /// Unlocks one feature.
    ///
    /// Unlocking an unlocked or expired feature is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a lock conflict when the lock is live and the transaction
    /// does not carry its authorization.
    pub fn unlock(&self, type_name: &str, fid: &Fid, transaction: &Transaction) -> CoreResult<()> {
        let mut tables = self.inner.tables.lock();
        let Some(table) = tables.get_mut(type_name) else {
            return Ok(());
        };
        match live_authorization(table, fid) {
            Some(authorization) if !transaction.is_authorized(&authorization) => {
                Err(CoreError::lock_conflict(
                    type_name,
                    fid.clone(),
                    "transaction does not hold the authorization",
                ))
            }
            Some(_) => {
                table.remove(fid);
                debug!("Unlocked {}/{}", type_name, fid);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Reports whether a live lock holds the feature.
    #[must_use]
    pub fn is_locked(&self, type_name: &str, fid: &Fid) -> bool {
        let mut tables = self.inner.tables.lock();
        tables
            .get_mut(type_name)
            .is_some_and(|table| live_authorization(table, fid).is_some())
    }

    /// Releases every lock held under any of the given authorizations.
    pub fn release_authorizations(&self, authorizations: &[String]) {
        if authorizations.is_empty() {
            return;
        }
        let mut tables = self.inner.tables.lock();
        for table in tables.values_mut() {
            table.retain(|_, entry| !authorizations.contains(&entry.authorization));
        }
        debug!("Released locks for {} authorizations", authorizations.len());
    }

    /// Checks that a transaction may mutate one feature.
    ///
    /// Unlocked and expired features are always accessible.
    ///
    /// # Errors
    ///
    /// Returns a lock conflict when the feature is held under an
    /// authorization the transaction does not carry.
    pub fn assert_access(
        &self,
        type_name: &str,
        fid: &Fid,
        transaction: &Transaction,
    ) -> CoreResult<()> {
        let mut tables = self.inner.tables.lock();
        let Some(table) = tables.get_mut(type_name) else {
            return Ok(());
        };
        match live_authorization(table, fid) {
            Some(authorization) if !transaction.is_authorized(&authorization) => {
                Err(CoreError::lock_conflict(
                    type_name,
                    fid.clone(),
                    "held under another authorization",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Wraps a writer so every mutation is lock-checked first.
    #[must_use]
    pub fn checked_writer(
        &self,
        inner: Box<dyn FeatureWriter>,
        transaction: Transaction,
    ) -> CheckedWriter {
        let type_name = inner.feature_type().name().to_owned();
        CheckedWriter {
            inner,
            locking: self.clone(),
            type_name,
            transaction,
            current: None,
            closed: false,
        }
    }
}

/// Returns the authorization holding `fid`, pruning an expired entry.
fn live_authorization(table: &mut HashMap<Fid, LockEntry>, fid: &Fid) -> Option<String> {
    match table.get(fid) {
        Some(entry) if entry.expires_at > Instant::now() => Some(entry.authorization.clone()),
        Some(_) => {
            table.remove(fid);
            None
        }
        None => None,
    }
}

/// Lock-checking write stage, the outermost decorator of every writer.
///
/// `write` and `remove` verify against the store's lock registry that the
/// writer's transaction may touch the feature before the mutation goes
/// through.
pub struct CheckedWriter {
    inner: Box<dyn FeatureWriter>,
    locking: LockingManager,
    type_name: String,
    transaction: Transaction,
    current: Option<Fid>,
    closed: bool,
}

impl CheckedWriter {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::illegal_state("writer is closed"));
        }
        Ok(())
    }
}

impl FeatureWriter for CheckedWriter {
    fn feature_type(&self) -> &FeatureType {
        self.inner.feature_type()
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        self.ensure_open()?;
        self.inner.has_next()
    }

    fn next(&mut self) -> CoreResult<Feature> {
        self.ensure_open()?;
        let feature = self.inner.next()?;
        self.current = Some(feature.fid().clone());
        Ok(feature)
    }

    fn write(&mut self, feature: Feature) -> CoreResult<()> {
        self.ensure_open()?;
        self.locking
            .assert_access(&self.type_name, feature.fid(), &self.transaction)?;
        self.inner.write(feature)?;
        self.current = None;
        Ok(())
    }

    fn remove(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        let fid = self
            .current
            .clone()
            .ok_or_else(|| CoreError::illegal_state("remove without a current feature"))?;
        self.locking
            .assert_access(&self.type_name, &fid, &self.transaction)?;
        self.inner.remove()?;
        self.current = None;
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.current = None;
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::testutil::VecWriter;
    use geostore_feature::{Value, ValueType};

    fn schema() -> Arc<FeatureType> {
        Arc::new(
            FeatureType::builder("roads")
                .attribute("lanes", ValueType::Int)
                .build()
                .unwrap(),
        )
    }

    fn road(fid: &str, lanes: i64) -> Feature {
        Feature::new(schema(), Fid::new(fid), vec![Value::Int(lanes)]).unwrap()
    }

    fn hour_lock(authorization: &str) -> FeatureLock {
        FeatureLock::new(authorization, DEFAULT_LOCK_DURATION)
    }

    #[test]
    fn conflicting_authorization_is_rejected() {
        let manager = LockingManager::new();
        let fid = Fid::new("roads.1");
        manager.lock("roads", &fid, &hour_lock("a")).unwrap();

        let err = manager.lock("roads", &fid, &hour_lock("b")).unwrap_err();
        assert!(matches!(err, CoreError::LockConflict { .. }));
        assert!(manager.is_locked("roads", &fid));
    }

    #[test]
    fn same_authorization_relocks() {
        let manager = LockingManager::new();
        let fid = Fid::new("roads.1");
        manager.lock("roads", &fid, &hour_lock("a")).unwrap();
        manager.lock("roads", &fid, &hour_lock("a")).unwrap();
        assert!(manager.is_locked("roads", &fid));
    }

    #[test]
    fn expired_locks_vanish() {
        let manager = LockingManager::new();
        let fid = Fid::new("roads.1");
        manager
            .lock("roads", &fid, &FeatureLock::new("a", Duration::ZERO))
            .unwrap();

        assert!(!manager.is_locked("roads", &fid));
        manager.lock("roads", &fid, &hour_lock("b")).unwrap();
    }

    #[test]
    fn unlock_requires_the_authorization() {
        let manager = LockingManager::new();
        let fid = Fid::new("roads.1");
        manager.lock("roads", &fid, &hour_lock("a")).unwrap();

        let transaction = Transaction::new();
        assert!(manager.unlock("roads", &fid, &transaction).is_err());

        transaction.add_authorization("a").unwrap();
        manager.unlock("roads", &fid, &transaction).unwrap();
        assert!(!manager.is_locked("roads", &fid));
    }

    #[test]
    fn unlocking_an_unlocked_feature_is_a_noop() {
        let manager = LockingManager::new();
        let transaction = Transaction::new();
        manager
            .unlock("roads", &Fid::new("roads.1"), &transaction)
            .unwrap();
    }

    #[test]
    fn release_sweeps_every_table() {
        let manager = LockingManager::new();
        manager
            .lock("roads", &Fid::new("roads.1"), &hour_lock("a"))
            .unwrap();
        manager
            .lock("rivers", &Fid::new("rivers.1"), &hour_lock("a"))
            .unwrap();
        manager
            .lock("roads", &Fid::new("roads.2"), &hour_lock("b"))
            .unwrap();

        manager.release_authorizations(&["a".to_owned()]);

        assert!(!manager.is_locked("roads", &Fid::new("roads.1")));
        assert!(!manager.is_locked("rivers", &Fid::new("rivers.1")));
        assert!(manager.is_locked("roads", &Fid::new("roads.2")));
    }

    #[test]
    fn generated_authorizations_are_unique() {
        let a = FeatureLock::generate(DEFAULT_LOCK_DURATION);
        let b = FeatureLock::generate(DEFAULT_LOCK_DURATION);
        assert_ne!(a.authorization(), b.authorization());
    }

    #[test]
    fn checked_writer_blocks_unauthorized_mutation() {
        let manager = LockingManager::new();
        let fid = Fid::new("roads.0");
        manager.lock("roads", &fid, &hour_lock("a")).unwrap();

        let raw = VecWriter::new(schema(), vec![road("roads.0", 2)]);
        let sink = raw.sink();
        let mut writer = manager.checked_writer(Box::new(raw), Transaction::new());

        let mut feature = writer.next().unwrap();
        feature.set_attribute("lanes", Value::Int(6)).unwrap();
        assert!(matches!(
            writer.write(feature).unwrap_err(),
            CoreError::LockConflict { .. }
        ));
        writer.close().unwrap();

        assert_eq!(sink.lock()[0].attribute("lanes"), Some(&Value::Int(2)));
    }

    #[test]
    fn checked_writer_allows_authorized_mutation() {
        let manager = LockingManager::new();
        let fid = Fid::new("roads.0");
        manager.lock("roads", &fid, &hour_lock("a")).unwrap();

        let transaction = Transaction::new();
        transaction.add_authorization("a").unwrap();

        let raw = VecWriter::new(schema(), vec![road("roads.0", 2)]);
        let sink = raw.sink();
        let mut writer = manager.checked_writer(Box::new(raw), transaction);

        let mut feature = writer.next().unwrap();
        feature.set_attribute("lanes", Value::Int(6)).unwrap();
        writer.write(feature).unwrap();
        writer.close().unwrap();

        assert_eq!(sink.lock()[0].attribute("lanes"), Some(&Value::Int(6)));
    }

    #[test]
    fn checked_writer_remove_is_checked() {
        let manager = LockingManager::new();
        let fid = Fid::new("roads.0");
        manager.lock("roads", &fid, &hour_lock("a")).unwrap();

        let raw = VecWriter::new(schema(), vec![road("roads.0", 2)]);
        let sink = raw.sink();
        let mut writer = manager.checked_writer(Box::new(raw), Transaction::new());

        writer.next().unwrap();
        assert!(writer.remove().is_err());
        writer.close().unwrap();
        assert_eq!(sink.lock().len(), 1);
    }
}
