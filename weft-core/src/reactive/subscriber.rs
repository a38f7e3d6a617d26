//! Node identities and the two edges of the reactive graph.
//!
//! A [`Source`] is anything that can be read inside a tracking context
//! (signals and computeds). A [`Subscriber`] is anything that collects
//! sources while it evaluates (computeds and watchers). A computed is both.
//!
//! Sources hold their subscribers weakly: a signal notifies a watcher, it
//! never keeps one alive. Subscribers hold their sources strongly, since
//! they read from them anyway.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

/// Unique identifier for a node in the reactive graph.
///
/// Signals, computeds and watchers all draw from the same counter so that a
/// computed can appear on either side of an edge under one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A node that can be read as a dependency.
pub trait Source: Send + Sync {
    /// The node id this source notifies under.
    fn source_id(&self) -> NodeId;

    /// Register `subscriber` to be notified on change.
    ///
    /// Re-adding an id that is already present keeps a single entry.
    fn add_subscriber(&self, id: NodeId, subscriber: Weak<dyn Subscriber>);

    /// Drop the subscriber with the given id, if present.
    fn remove_subscriber(&self, id: NodeId);

    /// Number of live subscribers.
    fn subscriber_count(&self) -> usize;
}

/// A node that collects sources while it evaluates and reacts to their
/// changes.
pub trait Subscriber: Send + Sync {
    /// The node id this subscriber is registered under.
    fn subscriber_id(&self) -> NodeId;

    /// Called synchronously by `source` after its value changed.
    fn update(&self, source: NodeId);

    /// Record `source` as a dependency of the current evaluation.
    fn track(&self, source: Arc<dyn Source>);
}

/// Connect `source` and `subscriber` in both directions.
pub(crate) fn link(source: &Arc<dyn Source>, subscriber: &Arc<dyn Subscriber>) {
    subscriber.track(Arc::clone(source));
    source.add_subscriber(subscriber.subscriber_id(), Arc::downgrade(subscriber));
}

/// Insertion-ordered set of weak subscribers shared by signals and computeds.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    entries: IndexMap<NodeId, Weak<dyn Subscriber>>,
}

impl SubscriberSet {
    /// Insert a subscriber. Returns `true` when the set was empty before.
    pub(crate) fn insert(&mut self, id: NodeId, subscriber: Weak<dyn Subscriber>) -> bool {
        self.prune();
        let was_empty = self.entries.is_empty();
        self.entries.insert(id, subscriber);
        was_empty
    }

    pub(crate) fn remove(&mut self, id: NodeId) {
        self.entries.shift_remove(&id);
    }

    pub(crate) fn len(&mut self) -> usize {
        self.prune();
        self.entries.len()
    }

    /// Live subscribers in registration order.
    pub(crate) fn snapshot(&mut self) -> Vec<Arc<dyn Subscriber>> {
        self.prune();
        self.entries.values().filter_map(Weak::upgrade).collect()
    }

    fn prune(&mut self) {
        self.entries.retain(|_, subscriber| subscriber.strong_count() > 0);
    }
}

/// Dependency set owned by a subscriber, rebuilt on every evaluation.
#[derive(Default)]
pub(crate) struct SourceSet {
    entries: IndexMap<NodeId, Arc<dyn Source>>,
}

impl SourceSet {
    pub(crate) fn insert(&mut self, source: Arc<dyn Source>) {
        self.entries.insert(source.source_id(), source);
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn take(&mut self) -> Vec<Arc<dyn Source>> {
        self.entries.drain(..).map(|(_, source)| source).collect()
    }
}

/// Remove `subscriber` from every source in `sources`.
pub(crate) fn unlink_all(subscriber: NodeId, sources: Vec<Arc<dyn Source>>) {
    for source in sources {
        source.remove_subscriber(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Probe {
        id: NodeId,
        updates: Mutex<Vec<NodeId>>,
    }

    impl Subscriber for Probe {
        fn subscriber_id(&self) -> NodeId {
            self.id
        }

        fn update(&self, source: NodeId) {
            self.updates.lock().push(source);
        }

        fn track(&self, _source: Arc<dyn Source>) {}
    }

    fn probe() -> Arc<Probe> {
        Arc::new(Probe {
            id: NodeId::new(),
            updates: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        let id3 = NodeId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert!(id1 < id2 && id2 < id3);
    }

    #[test]
    fn subscriber_set_keeps_registration_order() {
        let mut set = SubscriberSet::default();
        let a = probe();
        let b = probe();
        let c = probe();

        for p in [&b, &a, &c] {
            let weak: Weak<dyn Subscriber> = Arc::downgrade(p) as Weak<dyn Subscriber>;
            set.insert(p.id, weak);
        }

        let order: Vec<NodeId> = set.snapshot().iter().map(|s| s.subscriber_id()).collect();
        assert_eq!(order, vec![b.id, a.id, c.id]);
    }

    #[test]
    fn subscriber_set_reports_first_insert() {
        let mut set = SubscriberSet::default();
        let a = probe();
        let b = probe();

        assert!(set.insert(a.id, Arc::downgrade(&a) as Weak<dyn Subscriber>));
        assert!(!set.insert(b.id, Arc::downgrade(&b) as Weak<dyn Subscriber>));

        set.remove(a.id);
        set.remove(b.id);
        assert!(set.insert(a.id, Arc::downgrade(&a) as Weak<dyn Subscriber>));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut set = SubscriberSet::default();
        let kept = probe();
        let dropped = probe();

        set.insert(kept.id, Arc::downgrade(&kept) as Weak<dyn Subscriber>);
        set.insert(dropped.id, Arc::downgrade(&dropped) as Weak<dyn Subscriber>);
        drop(dropped);

        assert_eq!(set.len(), 1);
        let live = set.snapshot();
        live[0].update(NodeId::new());
        assert_eq!(kept.updates.lock().len(), 1);
    }
}
