use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::domain::{Alert, LocationKey};
use crate::state::event_bus::AlertEventBus;

/// Result of a conditional store write.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// The write happened; `previous` is whatever it replaced or removed.
    Applied { previous: Option<Alert> },
    /// The precondition was false at write time; nothing changed.
    Rejected,
}

/// At most one live alert per location key.
///
/// Writes to the same key are serialized through a per-key gate and publish
/// to the event bus while still holding it, so subscribers see a key's
/// changes in write order and never observe a stale read after a confirmed
/// write. Different keys never contend.
pub struct AlertStore {
    alerts: DashMap<LocationKey, Alert>,
    gates: DashMap<LocationKey, Arc<Mutex<()>>>,
    bus: Arc<AlertEventBus>,
}

impl AlertStore {
    pub fn new(bus: Arc<AlertEventBus>) -> Self {
        Self {
            alerts: DashMap::new(),
            gates: DashMap::new(),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<AlertEventBus> {
        &self.bus
    }

    /// Replaces any alert for `key`. Returns the replaced alert.
    pub fn upsert(&self, key: LocationKey, alert: Alert) -> Option<Alert> {
        match self.upsert_if(key, alert, || true) {
            StoreWrite::Applied { previous } => previous,
            StoreWrite::Rejected => None,
        }
    }

    /// Removes the alert for `key`, if any. Clearing an empty key is a no-op
    /// and publishes nothing.
    pub fn clear(&self, key: &LocationKey) -> Option<Alert> {
        match self.clear_if(key, || true) {
            StoreWrite::Applied { previous } => previous,
            StoreWrite::Rejected => None,
        }
    }

    /// Upsert that only lands if `precondition` holds once the key's gate is
    /// held. Used by monitoring ticks to drop results from stopped sessions.
    pub fn upsert_if<F>(&self, key: LocationKey, alert: Alert, precondition: F) -> StoreWrite
    where
        F: FnOnce() -> bool,
    {
        let gate = self.gate(&key);
        let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
        if !precondition() {
            return StoreWrite::Rejected;
        }

        let previous = self.alerts.insert(key.clone(), alert.clone());
        debug!(location = %key, alert_id = %alert.id, replaced = previous.is_some(), "Alert stored");
        self.bus.publish(&key, Some(&alert));
        StoreWrite::Applied { previous }
    }

    /// Conditional clear. The key's gate is dropped afterwards unless another
    /// writer still holds it, so cleared keys do not accumulate.
    pub fn clear_if<F>(&self, key: &LocationKey, precondition: F) -> StoreWrite
    where
        F: FnOnce() -> bool,
    {
        let gate = self.gate(key);
        let write = {
            let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
            if precondition() {
                let previous = self.alerts.remove(key).map(|(_, alert)| alert);
                if previous.is_some() {
                    debug!(location = %key, "Alert cleared");
                    self.bus.publish(key, None);
                }
                StoreWrite::Applied { previous }
            } else {
                StoreWrite::Rejected
            }
        };
        drop(gate);
        self.gates.remove_if(key, |_, gate| Arc::strong_count(gate) == 1);
        write
    }

    pub fn get(&self, key: &LocationKey) -> Option<Alert> {
        self.alerts.get(key).map(|entry| entry.value().clone())
    }

    /// Most severe first, ties broken by key.
    pub fn list_all(&self) -> Vec<Alert> {
        let mut entries: Vec<(LocationKey, Alert)> = self
            .alerts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|(ka, a), (kb, b)| b.severity.cmp(&a.severity).then_with(|| ka.cmp(kb)));
        entries.into_iter().map(|(_, alert)| alert).collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    // The DashMap ref is dropped before the caller locks, so holding a gate
    // never pins a shard of `gates` or `alerts`.
    fn gate(&self, key: &LocationKey) -> Arc<Mutex<()>> {
        self.gates.entry(key.clone()).or_default().clone()
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.gates.len()
    }
}
