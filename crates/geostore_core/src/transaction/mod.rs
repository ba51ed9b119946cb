//! Transactions: isolation scopes for reads and writes.
//!
//! A [`Transaction`] is a cheap-clone handle shared by every source bound
//! to it. [`Transaction::AUTO_COMMIT`] stands for "no transaction": writes
//! through it are immediately durable. A real transaction accumulates
//! per-store, per-type diffs that stay invisible outside it until
//! [`Transaction::commit`] replays them into the backing stores.
//!
//! Transactions also carry lock authorization tokens, proving to the
//! locking manager that they may touch locked features.

mod state;

pub(crate) use state::TransactionState;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::store::{StoreId, StoreInner};

/// Unique identity of an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

struct TransactionInner {
    id: TransactionId,
    handle: Option<String>,
    states: Mutex<HashMap<StoreId, Arc<TransactionState>>>,
    authorizations: RwLock<HashSet<String>>,
    closed: AtomicBool,
}

/// An isolation scope for reads and writes across one or more stores.
///
/// Cloning is cheap and every clone is the same transaction. Closing
/// releases held locks and discards pending changes; commit and rollback
/// leave the transaction open for further use.
#[derive(Clone)]
pub struct Transaction {
    inner: Option<Arc<TransactionInner>>,
}

impl Transaction {
    /// The auto-commit mode: no staging, every write immediately durable.
    ///
    /// Auto-commit carries no state, so [`Transaction::commit`],
    /// [`Transaction::rollback`] and
    /// [`Transaction::add_authorization`] all fail on it.
    pub const AUTO_COMMIT: Self = Self { inner: None };

    /// Opens a new transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::create(None)
    }

    /// Opens a new transaction with a diagnostic handle.
    #[must_use]
    pub fn with_handle(handle: impl Into<String>) -> Self {
        Self::create(Some(handle.into()))
    }

    fn create(handle: Option<String>) -> Self {
        let id = TransactionId(Uuid::new_v4());
        debug!("Opened {}", id);
        Self {
            inner: Some(Arc::new(TransactionInner {
                id,
                handle,
                states: Mutex::new(HashMap::new()),
                authorizations: RwLock::new(HashSet::new()),
                closed: AtomicBool::new(false),
            })),
        }
    }

    /// Returns `true` for the auto-commit mode.
    #[must_use]
    pub const fn is_auto_commit(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns the transaction id, or `None` for auto-commit.
    #[must_use]
    pub fn id(&self) -> Option<TransactionId> {
        self.inner.as_ref().map(|inner| inner.id)
    }

    /// Returns the diagnostic handle, when one was given.
    #[must_use]
    pub fn handle(&self) -> Option<&str> {
        self.inner.as_ref().and_then(|inner| inner.handle.as_deref())
    }

    fn live_inner(&self, operation: &str) -> CoreResult<&Arc<TransactionInner>> {
        let inner = self.inner.as_ref().ok_or_else(|| {
            CoreError::illegal_state(format!("auto-commit does not support {operation}"))
        })?;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(CoreError::illegal_state("transaction is closed"));
        }
        Ok(inner)
    }

    /// Adds a lock authorization token to the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] on auto-commit or after close.
    pub fn add_authorization(&self, authorization: impl Into<String>) -> CoreResult<()> {
        let inner = self.live_inner("authorizations")?;
        inner.authorizations.write().insert(authorization.into());
        Ok(())
    }

    /// Returns `true` when the transaction carries the given token.
    ///
    /// Auto-commit carries no tokens.
    #[must_use]
    pub fn is_authorized(&self, authorization: &str) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.authorizations.read().contains(authorization))
    }

    /// Returns a snapshot of the carried authorization tokens.
    #[must_use]
    pub fn authorizations(&self) -> Vec<String> {
        self.inner.as_ref().map_or_else(Vec::new, |inner| {
            inner.authorizations.read().iter().cloned().collect()
        })
    }

    /// Returns the per-store state, creating it on first use.
    pub(crate) fn state(&self, store: &Arc<StoreInner>) -> CoreResult<Arc<TransactionState>> {
        let inner = self.live_inner("staged state")?;
        let mut states = inner.states.lock();
        let state = states
            .entry(store.id)
            .or_insert_with(|| Arc::new(TransactionState::new(Arc::clone(store), inner.id)));
        Ok(Arc::clone(state))
    }

    /// Returns the per-store state only if the transaction already touched
    /// the store.
    pub(crate) fn existing_state(&self, store: StoreId) -> Option<Arc<TransactionState>> {
        let inner = self.inner.as_ref()?;
        inner.states.lock().get(&store).cloned()
    }

    /// Replays every staged change into its backing store.
    ///
    /// Fails fast: stores are committed one at a time and the first
    /// failure stops the replay. Committed diffs are cleared; the
    /// transaction stays open.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] on auto-commit or after close,
    /// or the first error a backing store reports.
    pub fn commit(&self) -> CoreResult<()> {
        let inner = self.live_inner("commit")?;
        let states: Vec<Arc<TransactionState>> = inner.states.lock().values().cloned().collect();
        for state in states {
            state.commit()?;
        }
        debug!("Committed {}", inner.id);
        Ok(())
    }

    /// Drops every staged change. The transaction stays open.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] on auto-commit or after close.
    pub fn rollback(&self) -> CoreResult<()> {
        let inner = self.live_inner("rollback")?;
        let states: Vec<Arc<TransactionState>> = inner.states.lock().values().cloned().collect();
        for state in states {
            state.rollback()?;
        }
        debug!("Rolled back {}", inner.id);
        Ok(())
    }

    /// Closes the transaction: releases its locks and discards anything
    /// still staged.
    ///
    /// Closing twice, or closing auto-commit, is a no-op.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for stores that
    /// release resources on close.
    pub fn close(&self) -> CoreResult<()> {
        let Some(inner) = self.inner.as_ref() else {
            return Ok(());
        };
        if inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let authorizations: Vec<String> =
            inner.authorizations.read().iter().cloned().collect();
        let states: Vec<Arc<TransactionState>> =
            inner.states.lock().drain().map(|(_, state)| state).collect();
        for state in &states {
            state.release_locks(&authorizations);
            state.discard();
        }
        debug!("Closed {}", inner.id);
        Ok(())
    }
}

impl Default for Transaction {
    /// The auto-commit mode.
    fn default() -> Self {
        Self::AUTO_COMMIT
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => f.write_str("Transaction::AUTO_COMMIT"),
            Some(inner) => f
                .debug_struct("Transaction")
                .field("id", &inner.id)
                .field("handle", &inner.handle)
                .field("closed", &inner.closed.load(Ordering::SeqCst))
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_commit_rejects_transaction_operations() {
        let auto = Transaction::AUTO_COMMIT;
        assert!(auto.is_auto_commit());
        assert!(auto.id().is_none());
        assert!(auto.commit().is_err());
        assert!(auto.rollback().is_err());
        assert!(auto.add_authorization("a").is_err());
        auto.close().unwrap();
    }

    #[test]
    fn clones_share_identity_and_authorizations() {
        let transaction = Transaction::new();
        let clone = transaction.clone();
        assert_eq!(transaction.id(), clone.id());

        transaction.add_authorization("survey-2024").unwrap();
        assert!(clone.is_authorized("survey-2024"));
        assert!(!clone.is_authorized("other"));
    }

    #[test]
    fn distinct_transactions_have_distinct_ids() {
        assert_ne!(Transaction::new().id(), Transaction::new().id());
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let transaction = Transaction::new();
        transaction.close().unwrap();
        transaction.close().unwrap();
        assert!(transaction.commit().is_err());
        assert!(transaction.add_authorization("a").is_err());
    }

    #[test]
    fn handle_is_kept_for_diagnostics() {
        let transaction = Transaction::with_handle("nightly import");
        assert_eq!(transaction.handle(), Some("nightly import"));
        assert_eq!(Transaction::new().handle(), None);
    }

    #[test]
    fn default_is_auto_commit() {
        assert!(Transaction::default().is_auto_commit());
    }
}
