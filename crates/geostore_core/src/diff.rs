//! Pending transactional changes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use geostore_feature::{Feature, Fid};

/// One pending change for a feature identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    /// A feature created in the transaction, keyed by its synthetic fid.
    Added(Feature),
    /// A full replacement for a stored feature.
    Replacement(Feature),
    /// A pending removal of a stored feature.
    Tombstone,
}

/// The pending change set of one feature type under one transaction.
///
/// A cheap-clone handle; every clone shares the same state behind one
/// mutex. A fid maps to at most one entry, so a feature is never
/// simultaneously added and modified. Pending additions keep their
/// insertion order for commit.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    inner: Arc<Mutex<DiffInner>>,
}

#[derive(Debug, Default)]
struct DiffInner {
    entries: HashMap<Fid, DiffEntry>,
    added_order: Vec<Fid>,
    next_fid: u64,
}

impl Diff {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next synthetic fid.
    ///
    /// Synthetic fids (`new0`, `new1`, ...) identify pending additions
    /// until commit assigns store fids. Backing stores never assign fids
    /// of this shape.
    #[must_use]
    pub fn allocate_fid(&self) -> Fid {
        let mut inner = self.inner.lock();
        let fid = Fid::new(format!("new{}", inner.next_fid));
        inner.next_fid += 1;
        fid
    }

    /// Stages a new feature under its fid.
    pub fn add(&self, feature: Feature) {
        let mut inner = self.inner.lock();
        let fid = feature.fid().clone();
        if inner
            .entries
            .insert(fid.clone(), DiffEntry::Added(feature))
            .is_none()
        {
            inner.added_order.push(fid);
        }
    }

    /// Stages a modification.
    ///
    /// Modifying a pending addition updates it in place; anything else
    /// becomes a replacement for the stored feature.
    pub fn modify(&self, fid: Fid, feature: Feature) {
        let mut inner = self.inner.lock();
        let entry = match inner.entries.get(&fid) {
            Some(DiffEntry::Added(_)) => DiffEntry::Added(feature),
            _ => DiffEntry::Replacement(feature),
        };
        inner.entries.insert(fid, entry);
    }

    /// Stages a removal.
    ///
    /// Removing a pending addition discards it outright; anything else
    /// becomes a tombstone for the stored feature.
    pub fn remove(&self, fid: &Fid) {
        let mut inner = self.inner.lock();
        match inner.entries.get(fid) {
            Some(DiffEntry::Added(_)) => {
                inner.entries.remove(fid);
                inner.added_order.retain(|f| f != fid);
            }
            _ => {
                inner.entries.insert(fid.clone(), DiffEntry::Tombstone);
            }
        }
    }

    /// Returns `true` when nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Returns the number of staged entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Drops every staged entry.
    ///
    /// The synthetic fid counter is not reset, so fids are never reused
    /// within one transaction.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.added_order.clear();
    }

    /// Returns an immutable copy of the staged state.
    #[must_use]
    pub fn snapshot(&self) -> DiffSnapshot {
        let inner = self.inner.lock();
        DiffSnapshot {
            entries: inner.entries.clone(),
            added_order: inner.added_order.clone(),
        }
    }
}

/// An immutable copy of a [`Diff`] at one instant.
///
/// Readers hold a snapshot taken at construction; later staging through
/// the live diff does not affect them.
#[derive(Debug, Clone, Default)]
pub struct DiffSnapshot {
    entries: HashMap<Fid, DiffEntry>,
    added_order: Vec<Fid>,
}

impl DiffSnapshot {
    /// Returns the entry staged for the fid, if any.
    #[must_use]
    pub fn entry(&self, fid: &Fid) -> Option<&DiffEntry> {
        self.entries.get(fid)
    }

    /// Returns the pending additions in insertion order.
    pub fn added(&self) -> impl Iterator<Item = &Feature> {
        self.added_order.iter().filter_map(|fid| {
            match self.entries.get(fid) {
                Some(DiffEntry::Added(feature)) => Some(feature),
                _ => None,
            }
        })
    }

    /// Returns the fids of pending additions in insertion order.
    #[must_use]
    pub fn added_fids(&self) -> &[Fid] {
        &self.added_order
    }

    /// Returns `true` when nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of staged entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
