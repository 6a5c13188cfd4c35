use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::connection_handle::ConnectionHandle;

/// Delivery scopes a connection can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Frames for one display device (`client:<id>`).
    Device(String),
    /// Frames for every connection of one account (`user:<sub>`).
    Subject(String),
    /// Dashboard feed of device events.
    Observers,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Device(id) => write!(f, "client:{}", id),
            Channel::Subject(id) => write!(f, "user:{}", id),
            Channel::Observers => write!(f, "observers"),
        }
    }
}

/// Per-recipient outcome of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn record(&mut self, ok: bool) {
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Subscription table from channel to the connections listening on it.
pub struct ChannelHub {
    subscribers: DashMap<Channel, Vec<ConnectionHandle>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    pub fn subscribe(&self, channel: Channel, handle: ConnectionHandle) {
        let mut subscribers = self.subscribers.entry(channel.clone()).or_default();
        if !subscribers.iter().any(|h| h.is_same(&handle)) {
            debug!(channel = %channel, connection_id = %handle.connection_id, "Subscribed to channel");
            subscribers.push(handle);
        }
    }

    /// Drop every subscription held by `connection_id`.
    pub fn unsubscribe_all(&self, connection_id: Uuid) {
        self.subscribers.retain(|_, subscribers| {
            subscribers.retain(|h| h.connection_id != connection_id);
            !subscribers.is_empty()
        });
    }

    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.subscribers.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    /// Write `message` to every subscriber of `channel`. A failing recipient
    /// does not affect the others.
    pub fn publish(&self, channel: &Channel, message: &str) -> DeliveryReport {
        let recipients: Vec<ConnectionHandle> = self
            .subscribers
            .get(channel)
            .map(|s| s.value().clone())
            .unwrap_or_default();

        let mut report = DeliveryReport::default();
        for handle in recipients {
            match handle.send_text(message.to_string()) {
                Ok(()) => report.record(true),
                Err(e) => {
                    warn!(
                        channel = %channel,
                        connection_id = %handle.connection_id,
                        error = %e,
                        "Failed to deliver channel frame"
                    );
                    report.record(false);
                }
            }
        }
        report
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}
