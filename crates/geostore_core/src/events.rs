//! Feature change events and listener delivery.
//!
//! Sources register with the manager and receive a stable [`SourceKey`];
//! listeners attach to a source and detach by [`ListenerId`]. Delivery is
//! synchronous and scoped: uncommitted changes reach only listeners bound
//! to the same transaction, while a commit fans out to the auto-commit
//! audience.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use geostore_feature::BoundingBox;

use crate::transaction::TransactionId;

/// The kind of change a feature event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureEventKind {
    /// Features were added.
    Added,
    /// Features were changed.
    Changed,
    /// Features were removed.
    Removed,
}

/// A notification that the features of one source changed.
///
/// Events are transient: delivered synchronously to matching listeners,
/// then discarded. `bounds` covers the affected features when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureEvent {
    source: SourceKey,
    kind: FeatureEventKind,
    bounds: Option<BoundingBox>,
}

impl FeatureEvent {
    /// Returns the key of the source the event was delivered through.
    #[must_use]
    pub const fn source(&self) -> SourceKey {
        self.source
    }

    /// Returns the kind of change.
    #[must_use]
    pub const fn kind(&self) -> FeatureEventKind {
        self.kind
    }

    /// Returns the bounds of the affected features, when known.
    #[must_use]
    pub const fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }
}

/// Stable identity of a registered event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey(u64);

/// Identity of an attached listener, used to detach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Observer of feature changes.
///
/// Implemented for any `Fn(&FeatureEvent) + Send + Sync` closure.
pub trait FeatureListener: Send + Sync {
    /// Called synchronously for every matching event.
    fn changed(&self, event: &FeatureEvent);
}

impl<F> FeatureListener for F
where
    F: Fn(&FeatureEvent) + Send + Sync,
{
    fn changed(&self, event: &FeatureEvent) {
        self(event);
    }
}

struct SourceEntry {
    type_name: String,
    transaction: Option<TransactionId>,
    listeners: Vec<(ListenerId, Arc<dyn FeatureListener>)>,
}

#[derive(Default)]
struct ListenerInner {
    sources: Mutex<HashMap<u64, SourceEntry>>,
    next_source: AtomicU64,
    next_listener: AtomicU64,
}

/// Registry and delivery rules for feature events.
///
/// A cheap-clone handle; every clone shares the same registry.
#[derive(Clone, Default)]
pub struct FeatureListenerManager {
    inner: Arc<ListenerInner>,
}

impl FeatureListenerManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event source over a feature type, bound to a
    /// transaction (`None` for auto-commit).
    pub fn register_source(
        &self,
        type_name: impl Into<String>,
        transaction: Option<TransactionId>,
    ) -> SourceKey {
        let key = self.inner.next_source.fetch_add(1, Ordering::SeqCst);
        self.inner.sources.lock().insert(
            key,
            SourceEntry {
                type_name: type_name.into(),
                transaction,
                listeners: Vec::new(),
            },
        );
        SourceKey(key)
    }

    /// Removes a source and every listener attached to it.
    pub fn unregister_source(&self, key: SourceKey) {
        self.inner.sources.lock().remove(&key.0);
    }

    /// Rebinds a source to another transaction.
    pub fn bind_transaction(&self, key: SourceKey, transaction: Option<TransactionId>) {
        if let Some(entry) = self.inner.sources.lock().get_mut(&key.0) {
            entry.transaction = transaction;
        }
    }

    /// Attaches a listener to a source.
    pub fn add_listener(&self, key: SourceKey, listener: Arc<dyn FeatureListener>) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        if let Some(entry) = self.inner.sources.lock().get_mut(&key.0) {
            entry.listeners.push((id, listener));
        }
        id
    }

    /// Detaches a listener from a source.
    pub fn remove_listener(&self, key: SourceKey, listener: ListenerId) {
        if let Some(entry) = self.inner.sources.lock().get_mut(&key.0) {
            entry.listeners.retain(|(id, _)| *id != listener);
        }
    }

    /// Returns the number of listeners attached to a source.
    #[must_use]
    pub fn listener_count(&self, key: SourceKey) -> usize {
        self.inner
            .sources
            .lock()
            .get(&key.0)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Fires an added event. See [`Self::fire`].
    pub fn fire_added(
        &self,
        type_name: &str,
        transaction: Option<TransactionId>,
        bounds: Option<BoundingBox>,
        committed: bool,
    ) {
        self.fire(FeatureEventKind::Added, type_name, transaction, bounds, committed);
    }

    /// Fires a changed event. See [`Self::fire`].
    pub fn fire_changed(
        &self,
        type_name: &str,
        transaction: Option<TransactionId>,
        bounds: Option<BoundingBox>,
        committed: bool,
    ) {
        self.fire(FeatureEventKind::Changed, type_name, transaction, bounds, committed);
    }

    /// Fires a removed event. See [`Self::fire`].
    pub fn fire_removed(
        &self,
        type_name: &str,
        transaction: Option<TransactionId>,
        bounds: Option<BoundingBox>,
        committed: bool,
    ) {
        self.fire(FeatureEventKind::Removed, type_name, transaction, bounds, committed);
    }

    /// Delivers an event to the matching audience.
    ///
    /// With `committed == false` the change is visible only inside its
    /// transaction: listeners receive it when their source is bound to the
    /// same transaction. Auto-commit writes pass `transaction == None`,
    /// which reaches the auto-commit audience immediately.
    ///
    /// With `committed == true` the change became visible to everyone:
    /// every listener on an auto-commit source of the type receives it,
    /// except listeners that already saw the changes through a source
    /// bound to the committing transaction. Each listener is notified at
    /// most once.
    pub fn fire(
        &self,
        kind: FeatureEventKind,
        type_name: &str,
        transaction: Option<TransactionId>,
        bounds: Option<BoundingBox>,
        committed: bool,
    ) {
        // Deliver outside the registry lock so listeners may re-enter the
        // manager.
        let mut deliveries: Vec<(FeatureEvent, Arc<dyn FeatureListener>)> = Vec::new();
        {
            let sources = self.inner.sources.lock();
            if committed {
                // Exclusion and dedup go by listener object, not by
                // attachment: the same listener watching through several
                // sources is still notified at most once.
                let committing: HashSet<*const ()> = sources
                    .values()
                    .filter(|entry| {
                        entry.type_name == type_name && entry.transaction == transaction
                    })
                    .flat_map(|entry| entry.listeners.iter().map(|(_, l)| identity_of(l)))
                    .collect();
                let mut notified = HashSet::new();
                for (key, entry) in sources.iter() {
                    if entry.type_name != type_name || entry.transaction.is_some() {
                        continue;
                    }
                    let event = FeatureEvent {
                        source: SourceKey(*key),
                        kind,
                        bounds,
                    };
                    for (_, listener) in &entry.listeners {
                        let identity = identity_of(listener);
                        if committing.contains(&identity) || !notified.insert(identity) {
                            continue;
                        }
                        deliveries.push((event.clone(), Arc::clone(listener)));
                    }
                }
            } else {
                for (key, entry) in sources.iter() {
                    if entry.type_name != type_name || entry.transaction != transaction {
                        continue;
                    }
                    let event = FeatureEvent {
                        source: SourceKey(*key),
                        kind,
                        bounds,
                    };
                    for (_, listener) in &entry.listeners {
                        deliveries.push((event.clone(), Arc::clone(listener)));
                    }
                }
            }
        }
        for (event, listener) in deliveries {
            listener.changed(&event);
        }
    }
}

fn identity_of(listener: &Arc<dyn FeatureListener>) -> *const () {
    Arc::as_ptr(listener).cast::<()>()
}

impl fmt::Debug for FeatureListenerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureListenerManager")
            .field("sources", &self.inner.sources.lock().len())
            .finish_non_exhaustive()
    }
}
