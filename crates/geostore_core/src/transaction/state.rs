//! Per-store transaction state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::backend::FeatureWriter;
use crate::diff::{Diff, DiffEntry, DiffSnapshot};
use crate::error::CoreResult;
use crate::store::StoreInner;
use crate::transaction::TransactionId;

/// The staged changes of one transaction against one store.
///
/// Holds a lazily created [`Diff`] per feature type. Commit replays every
/// non-empty diff through the store's raw writer and announces the now
/// visible changes; rollback drops the diffs and tells the transaction's
/// own listeners their view snapped back.
pub(crate) struct TransactionState {
    store: Arc<StoreInner>,
    transaction: TransactionId,
    diffs: Mutex<HashMap<String, Diff>>,
}

impl TransactionState {
    pub(crate) fn new(store: Arc<StoreInner>, transaction: TransactionId) -> Self {
        Self {
            store,
            transaction,
            diffs: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the diff for a feature type, creating it on first use.
    pub(crate) fn diff(&self, type_name: &str) -> CoreResult<Diff> {
        self.store.backend.schema(type_name)?;
        let mut diffs = self.diffs.lock();
        Ok(diffs
            .entry(type_name.to_owned())
            .or_insert_with(Diff::new)
            .clone())
    }

    /// Returns the diff for a feature type only if the transaction already
    /// touched it.
    pub(crate) fn existing_diff(&self, type_name: &str) -> Option<Diff> {
        self.diffs.lock().get(type_name).cloned()
    }

    /// Replays every staged diff into the backing store.
    ///
    /// Each applied diff is cleared; a failure stops the replay and leaves
    /// the remaining diffs staged.
    pub(crate) fn commit(&self) -> CoreResult<()> {
        let staged: Vec<(String, Diff)> = self
            .diffs
            .lock()
            .iter()
            .map(|(name, diff)| (name.clone(), diff.clone()))
            .collect();
        for (type_name, diff) in staged {
            if diff.is_empty() {
                continue;
            }
            let staged_count = diff.len();
            self.apply(&type_name, &diff.snapshot())?;
            diff.clear();
            debug!("Committed {} staged changes to {}", staged_count, type_name);
        }
        Ok(())
    }

    fn apply(&self, type_name: &str, snapshot: &DiffSnapshot) -> CoreResult<()> {
        let mut writer = self.store.backend.raw_writer(type_name)?;
        let result = self.replay(writer.as_mut(), type_name, snapshot);
        let close_result = writer.close();
        result.and(close_result)
    }

    fn replay(
        &self,
        writer: &mut dyn FeatureWriter,
        type_name: &str,
        snapshot: &DiffSnapshot,
    ) -> CoreResult<()> {
        let listeners = &self.store.listeners;
        while writer.has_next()? {
            let current = writer.next()?;
            match snapshot.entry(current.fid()) {
                Some(DiffEntry::Tombstone) => {
                    let bounds = current.bounds();
                    writer.remove()?;
                    listeners.fire_removed(type_name, Some(self.transaction), Some(bounds), true);
                }
                Some(DiffEntry::Replacement(replacement)) => {
                    let bounds = current.bounds().union(&replacement.bounds());
                    writer.write(replacement.clone())?;
                    listeners.fire_changed(type_name, Some(self.transaction), Some(bounds), true);
                }
                Some(DiffEntry::Added(_)) | None => {}
            }
        }
        // Additions go last so the store assigns their real fids; the
        // synthetic staging fids never leave the diff.
        for added in snapshot.added() {
            let mut blank = writer.next()?;
            blank.set_attributes(added.attributes().to_vec())?;
            let bounds = added.bounds();
            writer.write(blank)?;
            listeners.fire_added(type_name, Some(self.transaction), Some(bounds), true);
        }
        Ok(())
    }

    /// Drops every staged diff and notifies the transaction's listeners.
    pub(crate) fn rollback(&self) -> CoreResult<()> {
        let staged: Vec<(String, Diff)> = self
            .diffs
            .lock()
            .iter()
            .map(|(name, diff)| (name.clone(), diff.clone()))
            .collect();
        for (type_name, diff) in staged {
            if diff.is_empty() {
                continue;
            }
            diff.clear();
            self.store
                .listeners
                .fire_changed(&type_name, Some(self.transaction), None, false);
            debug!("Rolled back staged changes to {}", type_name);
        }
        Ok(())
    }

    /// Releases every lock in this store held under the given tokens.
    pub(crate) fn release_locks(&self, authorizations: &[String]) {
        self.store.locking.release_authorizations(authorizations);
    }

    /// Drops staged diffs without notifying anyone. Used on close.
    pub(crate) fn discard(&self) {
        self.diffs.lock().clear();
    }
}
