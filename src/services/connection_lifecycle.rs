use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::PresenceStore;
use crate::error::{AppError, AppResult};
use crate::models::AuthenticatedSubject;
use crate::services::auth::JwtKeys;
use crate::services::channel_hub::{Channel, ChannelHub};
use crate::services::connection_handle::ConnectionHandle;
use crate::services::presence_registry::PresenceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Registered,
    Closed,
}

/// What an authenticated connection turned out to be, decided once at activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRole {
    Device { device_id: String },
    Observer,
}

/// Per-socket state owned by the socket's actor for its whole lifetime.
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: Uuid,
    pub established_at: DateTime<Utc>,
    state: ConnectionState,
    subject: Option<AuthenticatedSubject>,
    role: Option<ConnectionRole>,
}

impl Connection {
    pub fn connecting() -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            established_at: Utc::now(),
            state: ConnectionState::Connecting,
            subject: None,
            role: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subject(&self) -> Option<&AuthenticatedSubject> {
        self.subject.as_ref()
    }

    pub fn role(&self) -> Option<&ConnectionRole> {
        self.role.as_ref()
    }

    /// Device id bound to this connection, once registered as a device.
    pub fn device_id(&self) -> Option<&str> {
        match &self.role {
            Some(ConnectionRole::Device { device_id }) => Some(device_id),
            _ => None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state == ConnectionState::Registered
    }

    /// Record a completed activation. Ignored once the connection is closed.
    pub fn mark_registered(&mut self, role: ConnectionRole) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.role = Some(role);
        self.state = ConnectionState::Registered;
    }

    /// Move to `Closed`, returning the role that teardown has to undo. Only
    /// the first call returns a role.
    pub fn begin_close(&mut self) -> Option<ConnectionRole> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        let was_registered = self.state == ConnectionState::Registered;
        self.state = ConnectionState::Closed;
        if was_registered { self.role.clone() } else { None }
    }
}

/// Result of tearing a connection down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    Observer,
    /// The device entry was removed and the record set offline.
    DeviceOffline { device_id: String },
    /// A newer connection already owns the device; nothing was changed.
    Superseded { device_id: String },
    NotRegistered,
}

/// Drives a connection through authenticate, activate and teardown, keeping
/// the registry, the channel subscriptions and the durable record in step.
pub struct ConnectionLifecycleManager {
    keys: JwtKeys,
    registry: Arc<PresenceRegistry>,
    channels: Arc<ChannelHub>,
    store: Arc<dyn PresenceStore>,
}

impl ConnectionLifecycleManager {
    pub fn new(
        keys: JwtKeys,
        registry: Arc<PresenceRegistry>,
        channels: Arc<ChannelHub>,
        store: Arc<dyn PresenceStore>,
    ) -> Self {
        Self {
            keys,
            registry,
            channels,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    pub fn channels(&self) -> &Arc<ChannelHub> {
        &self.channels
    }

    pub fn store(&self) -> &Arc<dyn PresenceStore> {
        &self.store
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Validate the handshake credential. Any failure closes the connection.
    pub fn authenticate(
        &self,
        connection: &mut Connection,
        credential: Option<&str>,
    ) -> Result<AuthenticatedSubject, AppError> {
        connection.state = ConnectionState::Authenticating;

        let result = match credential {
            Some(token) => self.keys.validate(token),
            None => Err(AppError::Auth("Missing credential".to_string())),
        };

        match result {
            Ok(subject) => {
                debug!(
                    connection_id = %connection.connection_id,
                    subject_id = %subject.subject_id,
                    log_stage = "ws:authenticated",
                    "Connection authenticated"
                );
                connection.subject = Some(subject.clone());
                Ok(subject)
            }
            Err(e) => {
                warn!(
                    connection_id = %connection.connection_id,
                    error = %e,
                    log_stage = "ws:auth_failed",
                    "Rejecting connection"
                );
                connection.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    /// Role-specific activation. Devices are resolved, registered, subscribed
    /// and marked online; observers only subscribe. A device registration
    /// that displaces an older connection closes the older one.
    pub async fn activate(
        &self,
        subject: &AuthenticatedSubject,
        handle: ConnectionHandle,
    ) -> Result<ConnectionRole, AppError> {
        if !subject.role.is_device() {
            self.channels
                .subscribe(Channel::Subject(subject.subject_id.clone()), handle.clone());
            self.channels.subscribe(Channel::Observers, handle.clone());
            info!(
                connection_id = %handle.connection_id,
                subject_id = %subject.subject_id,
                "Observer connection activated"
            );
            return Ok(ConnectionRole::Observer);
        }

        let device_id = self
            .store
            .resolve_device_for_subject(&subject.subject_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No device registered for subject {}",
                    subject.subject_id
                ))
            })?;

        if let Some(previous) =
            self.registry
                .register(&device_id, &subject.subject_id, handle.clone())
        {
            info!(
                device_id = %device_id,
                previous_connection_id = %previous.connection_id,
                connection_id = %handle.connection_id,
                "Closing superseded device connection"
            );
            self.channels.unsubscribe_all(previous.connection_id);
            previous.close("superseded by a newer connection");
        }

        self.channels
            .subscribe(Channel::Device(device_id.clone()), handle.clone());
        self.channels
            .subscribe(Channel::Subject(subject.subject_id.clone()), handle.clone());

        if let Err(e) = self.store.mark_online(&device_id, Utc::now()).await {
            warn!(
                device_id = %device_id,
                error = %e,
                "Failed to persist online status; sweep will reconcile"
            );
        }

        info!(
            connection_id = %handle.connection_id,
            device_id = %device_id,
            subject_id = %subject.subject_id,
            "Device connection activated"
        );

        Ok(ConnectionRole::Device { device_id })
    }

    /// Undo whatever activation did for `connection_id`. With no known role
    /// (closed mid-activation) any registry entry still held by the connection
    /// is released.
    pub async fn teardown(
        &self,
        connection_id: Uuid,
        role: Option<ConnectionRole>,
    ) -> TeardownOutcome {
        self.channels.unsubscribe_all(connection_id);

        let device_id = match role {
            Some(ConnectionRole::Observer) => return TeardownOutcome::Observer,
            Some(ConnectionRole::Device { device_id }) => {
                if !self.registry.unregister(&device_id, connection_id) {
                    debug!(
                        connection_id = %connection_id,
                        device_id = %device_id,
                        "Stale connection closed; newer connection keeps the device"
                    );
                    return TeardownOutcome::Superseded { device_id };
                }
                device_id
            }
            None => match self.registry.unregister_connection(connection_id) {
                Some(device_id) => device_id,
                None => return TeardownOutcome::NotRegistered,
            },
        };

        if let Err(e) = self.store.mark_offline(&device_id, Utc::now()).await {
            error!(
                device_id = %device_id,
                error = %e,
                "Failed to persist offline status; sweep will reconcile"
            );
        }

        info!(
            connection_id = %connection_id,
            device_id = %device_id,
            "Device went offline"
        );
        TeardownOutcome::DeviceOffline { device_id }
    }

    /// Refresh `last_seen` for a connected device.
    pub async fn record_heartbeat(&self, device_id: &str) -> AppResult<()> {
        self.store.touch(device_id, Utc::now()).await
    }

    /// HTTP heartbeat: resolve the caller's device and refresh its record.
    pub async fn heartbeat_for_subject(&self, subject_id: &str) -> AppResult<String> {
        let device_id = self
            .store
            .resolve_device_for_subject(subject_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No device registered for subject {}", subject_id))
            })?;

        self.record_heartbeat(&device_id).await?;
        Ok(device_id)
    }
}
