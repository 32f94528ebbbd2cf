// ── Ordered reactive parameter table ──
//
// Insertion-ordered storage keyed by address, with push-based change
// notification via `watch` channels.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::model::Parameter;

/// Ordered, reactive table of parameters.
///
/// Every mutation rebuilds the snapshot that subscribers receive. Owned by the session actor; readers only ever see
/// snapshots.
pub(crate) struct ParameterTable {
    /// Primary storage: address -> parameter, in controller order.
    by_address: IndexMap<String, Arc<Parameter>>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<Parameter>>>>,
}

impl ParameterTable {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_address: IndexMap::new(),
            snapshot,
        }
    }

    /// Replace the whole table. Later duplicates of an address win but
    /// keep the position of the first occurrence.
    pub(crate) fn replace(&mut self, params: impl IntoIterator<Item = Parameter>) {
        self.by_address = params
            .into_iter()
            .map(|p| (p.address.clone(), Arc::new(p)))
            .collect();

        self.rebuild_snapshot();
    }

    /// Set a single value. Returns the previous value, or `None` if the
    /// address is unknown. Equal values do not republish.
    pub(crate) fn update_value(&mut self, address: &str, value: u8) -> Option<u8> {
        let entry = self.by_address.get_mut(address)?;
        let old = entry.value;
        if old != value {
            Arc::make_mut(entry).value = value;
            self.rebuild_snapshot();
        }
        Some(old)
    }

    pub(crate) fn get(&self, address: &str) -> Option<&Arc<Parameter>> {
        self.by_address.get(address)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Parameter>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Parameter>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_address.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all values into a snapshot vec and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let values: Vec<Arc<Parameter>> = self.by_address.values().map(Arc::clone).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
