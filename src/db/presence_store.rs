use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::MemoryDevice;
use crate::error::AppError;
use crate::models::DevicePresenceRecord;

/// Durable record of which devices are online and when they were last seen.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Device id owned by a device account, if it has one.
    async fn resolve_device_for_subject(&self, subject_id: &str) -> Result<Option<String>, AppError>;

    async fn mark_online(&self, device_id: &str, now: DateTime<Utc>) -> Result<(), AppError>;

    async fn mark_offline(&self, device_id: &str, now: DateTime<Utc>) -> Result<(), AppError>;

    /// Heartbeat refresh: online with a new `last_seen`.
    async fn touch(&self, device_id: &str, now: DateTime<Utc>) -> Result<(), AppError>;

    /// Flip every online record last seen before `cutoff` (or never) to
    /// offline. Returns how many records changed.
    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    async fn get(&self, device_id: &str) -> Result<Option<DevicePresenceRecord>, AppError>;
}

struct StoredDevice {
    owner_subject: String,
    record: DevicePresenceRecord,
}

/// Process-local store for tests and `PRESENCE_STORE=memory` development runs.
pub struct InMemoryPresenceStore {
    devices: DashMap<String, StoredDevice>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Store preloaded with the configured device accounts.
    pub fn with_devices(devices: &[MemoryDevice]) -> Self {
        let store = Self::new();
        for device in devices {
            store.add_device(&device.device_id, &device.subject_id);
        }
        store
    }

    /// Provision a device record owned by `subject_id`, initially offline.
    pub fn add_device(&self, device_id: &str, subject_id: &str) {
        self.devices.insert(
            device_id.to_string(),
            StoredDevice {
                owner_subject: subject_id.to_string(),
                record: DevicePresenceRecord {
                    device_id: device_id.to_string(),
                    is_online: false,
                    last_seen: None,
                },
            },
        );
    }

    /// Overwrite a record directly, bypassing the write counter.
    pub fn set_record(&self, record: DevicePresenceRecord) {
        if let Some(mut stored) = self.devices.get_mut(&record.device_id) {
            stored.record = record;
        }
    }

    /// Number of writes that changed or refreshed a record.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("presence store unavailable".to_string()));
        }
        Ok(())
    }

    fn write(&self, device_id: &str, is_online: bool, now: DateTime<Utc>) -> Result<(), AppError> {
        self.check_writable()?;
        let mut stored = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", device_id)))?;
        stored.record.is_online = is_online;
        stored.record.last_seen = Some(now);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for InMemoryPresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn resolve_device_for_subject(&self, subject_id: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .devices
            .iter()
            .find(|entry| entry.owner_subject == subject_id)
            .map(|entry| entry.key().clone()))
    }

    async fn mark_online(&self, device_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        self.write(device_id, true, now)
    }

    async fn mark_offline(&self, device_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        self.write(device_id, false, now)
    }

    async fn touch(&self, device_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        self.write(device_id, true, now)
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        self.check_writable()?;
        let mut changed = 0u64;
        for mut entry in self.devices.iter_mut() {
            if entry.record.is_stale(cutoff) {
                entry.record.is_online = false;
                changed += 1;
            }
        }
        if changed > 0 {
            self.writes.fetch_add(changed as usize, Ordering::SeqCst);
        }
        Ok(changed)
    }

    async fn get(&self, device_id: &str) -> Result<Option<DevicePresenceRecord>, AppError> {
        Ok(self.devices.get(device_id).map(|entry| entry.record.clone()))
    }
}
