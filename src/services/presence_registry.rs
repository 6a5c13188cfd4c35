use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

use crate::services::connection_handle::ConnectionHandle;

/// The live connection currently serving a device.
#[derive(Clone, Debug)]
pub struct PresenceEntry {
    pub device_id: String,
    pub subject_id: String,
    pub handle: ConnectionHandle,
    pub registered_at: DateTime<Utc>,
}

/// In-memory map of device id to its active connection. At most one entry per
/// device; the latest registration wins.
///
/// Every operation works on a single key under the map's shard lock, and no
/// caller awaits while holding a reference into the map.
pub struct PresenceRegistry {
    entries: DashMap<String, PresenceEntry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert or replace the entry for `device_id`. Returns the handle that was
    /// displaced, if it belonged to a different connection.
    pub fn register(
        &self,
        device_id: &str,
        subject_id: &str,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let entry = PresenceEntry {
            device_id: device_id.to_string(),
            subject_id: subject_id.to_string(),
            handle: handle.clone(),
            registered_at: Utc::now(),
        };

        let previous = self
            .entries
            .insert(device_id.to_string(), entry)
            .map(|prev| prev.handle)
            .filter(|prev| !prev.is_same(&handle));

        info!(
            device_id = %device_id,
            subject_id = %subject_id,
            connection_id = %handle.connection_id,
            replaced = previous.is_some(),
            "Device registered in presence registry"
        );
        debug!(online_devices = self.entries.len(), "Presence registry statistics");

        previous
    }

    /// Remove the entry only if it still belongs to `expected_connection`.
    /// Returns `false` when a newer connection owns the device (or none does).
    pub fn unregister(&self, device_id: &str, expected_connection: Uuid) -> bool {
        let removed = self
            .entries
            .remove_if(device_id, |_, entry| {
                entry.handle.connection_id == expected_connection
            })
            .is_some();

        if removed {
            info!(
                device_id = %device_id,
                connection_id = %expected_connection,
                "Device removed from presence registry"
            );
        } else {
            debug!(
                device_id = %device_id,
                connection_id = %expected_connection,
                "Skipped unregister: entry belongs to another connection"
            );
        }

        removed
    }

    /// Remove whichever device entry is served by `connection_id`, if any.
    /// Used when a connection closes before its device id was recorded.
    pub fn unregister_connection(&self, connection_id: Uuid) -> Option<String> {
        let device_id = self
            .entries
            .iter()
            .find(|entry| entry.handle.connection_id == connection_id)
            .map(|entry| entry.key().clone())?;

        if self.unregister(&device_id, connection_id) {
            Some(device_id)
        } else {
            None
        }
    }

    pub fn lookup(&self, device_id: &str) -> Option<ConnectionHandle> {
        self.entries.get(device_id).map(|entry| entry.handle.clone())
    }

    pub fn get_entry(&self, device_id: &str) -> Option<PresenceEntry> {
        self.entries.get(device_id).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, device_id: &str) -> bool {
        self.entries.contains_key(device_id)
    }

    pub fn list_online_ids(&self) -> BTreeSet<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Copy of every (device id, handle) pair for fan-out outside the map locks.
    pub fn snapshot(&self) -> Vec<(String, ConnectionHandle)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.handle.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
