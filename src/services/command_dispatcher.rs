use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::protocol::{Command, CommandKind, CommandTarget};
use crate::services::channel_hub::{Channel, ChannelHub, DeliveryReport};
use crate::services::connection_handle::DeliveryError;
use crate::services::presence_registry::PresenceRegistry;

/// Result of a single-device push. None of these is an error for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The device has no live connection; the push was dropped.
    NotConnected,
    /// The device is registered but its socket refused the frame.
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Best-effort, at-most-once pushes to connected devices.
pub struct CommandDispatcher {
    registry: Arc<PresenceRegistry>,
    channels: Arc<ChannelHub>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<PresenceRegistry>, channels: Arc<ChannelHub>) -> Self {
        Self { registry, channels }
    }

    pub fn send_to_device(
        &self,
        device_id: &str,
        kind: CommandKind,
        payload: JsonValue,
    ) -> DeliveryOutcome {
        let command = Command::new(kind, CommandTarget::Device(device_id.to_string()), payload);
        self.dispatch_to_device(device_id, &command)
    }

    pub fn send_config_update(&self, device_id: &str, config: JsonValue) -> DeliveryOutcome {
        self.send_to_device(device_id, CommandKind::ConfigUpdate, config)
    }

    pub fn send_sequence_update(&self, device_id: &str, sequence: JsonValue) -> DeliveryOutcome {
        self.send_to_device(device_id, CommandKind::SequenceUpdate, sequence)
    }

    pub fn send_force_refresh(&self, device_id: &str) -> DeliveryOutcome {
        self.send_to_device(device_id, CommandKind::ForceRefresh, JsonValue::Null)
    }

    /// `client:command` with `{command, data?}`.
    pub fn send_command(
        &self,
        device_id: &str,
        command: &str,
        data: Option<JsonValue>,
    ) -> DeliveryOutcome {
        let command = Command::generic(CommandTarget::Device(device_id.to_string()), command, data);
        self.dispatch_to_device(device_id, &command)
    }

    /// Presence is decided by the registry; the frame goes out on the
    /// device channel, which only the registered connection holds.
    fn dispatch_to_device(&self, device_id: &str, command: &Command) -> DeliveryOutcome {
        let Some(handle) = self.registry.lookup(device_id) else {
            debug!(
                device_id = %device_id,
                event = %command.kind.event_name(),
                "Device not connected, dropping push"
            );
            return DeliveryOutcome::NotConnected;
        };

        let text = match encode(command) {
            Ok(text) => text,
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Failed to encode push");
                return DeliveryOutcome::Failed(e.to_string());
            }
        };

        let report = self
            .channels
            .publish(&Channel::Device(device_id.to_string()), &text);
        if report.delivered > 0 {
            debug!(
                device_id = %device_id,
                connection_id = %handle.connection_id,
                event = %command.kind.event_name(),
                "Push delivered"
            );
            DeliveryOutcome::Delivered
        } else if report.failed > 0 {
            warn!(
                device_id = %device_id,
                connection_id = %handle.connection_id,
                "Failed to deliver push"
            );
            DeliveryOutcome::Failed("device connection refused the frame".to_string())
        } else {
            debug!(
                device_id = %device_id,
                connection_id = %handle.connection_id,
                "Device channel has no subscriber yet, dropping push"
            );
            DeliveryOutcome::NotConnected
        }
    }

    /// Push to every registered device. Each recipient is attempted
    /// independently of the others.
    pub fn broadcast(&self, kind: CommandKind, payload: JsonValue) -> DeliveryReport {
        let command = Command::new(kind, CommandTarget::All, payload);
        let mut report = DeliveryReport::default();

        let text = match encode(&command) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode broadcast");
                report.failed = self.registry.len();
                return report;
            }
        };

        for (device_id, handle) in self.registry.snapshot() {
            match handle.send_text(text.clone()) {
                Ok(()) => report.record(true),
                Err(e) => {
                    warn!(
                        device_id = %device_id,
                        connection_id = %handle.connection_id,
                        error = %e,
                        "Broadcast delivery failed for device"
                    );
                    report.record(false);
                }
            }
        }

        info!(
            event = %command.kind.event_name(),
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast dispatched"
        );
        report
    }

    /// Named event fanned out to every device.
    pub fn broadcast_event(&self, event: &str, data: JsonValue) -> DeliveryReport {
        self.broadcast(CommandKind::BroadcastEvent(event.to_string()), data)
    }

    /// Push to every connection of one account (devices and dashboards alike).
    pub fn send_to_subject(
        &self,
        subject_id: &str,
        kind: CommandKind,
        payload: JsonValue,
    ) -> DeliveryReport {
        let command = Command::new(kind, CommandTarget::Subject(subject_id.to_string()), payload);
        match encode(&command) {
            Ok(text) => self
                .channels
                .publish(&Channel::Subject(subject_id.to_string()), &text),
            Err(e) => {
                warn!(subject_id = %subject_id, error = %e, "Failed to encode subject push");
                DeliveryReport::default()
            }
        }
    }

    pub fn list_online(&self) -> BTreeSet<String> {
        self.registry.list_online_ids()
    }

    pub fn is_online(&self, device_id: &str) -> bool {
        self.registry.is_online(device_id)
    }
}

fn encode(command: &Command) -> Result<String, DeliveryError> {
    command
        .to_frame()
        .to_text()
        .map_err(|e| DeliveryError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::connection_handle::ConnectionHandle;
    use crate::services::test_support::{dead_socket, settle, spawn_recorder};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn connect(
        registry: &PresenceRegistry,
        channels: &ChannelHub,
        device_id: &str,
        handle: ConnectionHandle,
    ) {
        registry.register(device_id, &format!("owner-{}", device_id), handle.clone());
        channels.subscribe(Channel::Device(device_id.to_string()), handle);
    }

    fn dispatcher() -> (CommandDispatcher, Arc<PresenceRegistry>, Arc<ChannelHub>) {
        let registry = Arc::new(PresenceRegistry::new());
        let channels = Arc::new(ChannelHub::new());
        (
            CommandDispatcher::new(registry.clone(), channels.clone()),
            registry,
            channels,
        )
    }

    #[actix_rt::test]
    async fn test_send_to_connected_device() {
        let (dispatcher, registry, channels) = dispatcher();
        let socket = spawn_recorder();
        connect(&registry, &channels, "screen-a", socket.handle.clone());

        let outcome = dispatcher.send_config_update("screen-a", json!({"volume": 40}));
        settle().await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(
            socket.frames(),
            vec![json!({"type": "client:config-update", "payload": {"volume": 40}})]
        );
    }

    #[actix_rt::test]
    async fn test_send_to_absent_device_is_a_noop() {
        let (dispatcher, _, _) = dispatcher();

        assert_eq!(dispatcher.send_force_refresh("ghost"), DeliveryOutcome::NotConnected);
        assert!(!dispatcher.is_online("ghost"));
    }

    #[actix_rt::test]
    async fn test_force_refresh_and_command_frames() {
        let (dispatcher, registry, channels) = dispatcher();
        let socket = spawn_recorder();
        connect(&registry, &channels, "screen-a", socket.handle.clone());

        dispatcher.send_force_refresh("screen-a");
        dispatcher.send_command("screen-a", "reboot", None);
        dispatcher.send_sequence_update("screen-a", json!({"sequenceId": "s-1"}));
        settle().await;

        assert_eq!(
            socket.frames(),
            vec![
                json!({"type": "client:force-refresh"}),
                json!({"type": "client:command", "payload": {"command": "reboot"}}),
                json!({"type": "client:sequence-update", "payload": {"sequenceId": "s-1"}}),
            ]
        );
    }

    #[actix_rt::test]
    async fn test_broadcast_survives_one_failed_recipient() {
        let (dispatcher, registry, _) = dispatcher();
        let a = spawn_recorder();
        let c = spawn_recorder();
        registry.register("screen-a", "user-a", a.handle.clone());
        registry.register("screen-b", "user-b", dead_socket().await);
        registry.register("screen-c", "user-c", c.handle.clone());

        let report = dispatcher.broadcast_event("layout:changed", json!({"layoutId": "l-1"}));
        settle().await;

        assert_eq!(report, DeliveryReport { delivered: 2, failed: 1 });
        assert_eq!(a.frames().len(), 1);
        assert_eq!(c.frames()[0]["type"], "layout:changed");
    }

    #[actix_rt::test]
    async fn test_dead_registered_socket_reports_failure() {
        let (dispatcher, registry, channels) = dispatcher();
        connect(&registry, &channels, "screen-a", dead_socket().await);

        assert!(matches!(
            dispatcher.send_force_refresh("screen-a"),
            DeliveryOutcome::Failed(_)
        ));
    }

    #[actix_rt::test]
    async fn test_push_reaches_only_the_device_channel() {
        let (dispatcher, registry, channels) = dispatcher();
        let screen = spawn_recorder();
        let neighbour = spawn_recorder();
        connect(&registry, &channels, "screen-a", screen.handle.clone());
        connect(&registry, &channels, "screen-b", neighbour.handle.clone());

        let outcome = dispatcher.send_command("screen-a", "reboot", None);
        settle().await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(screen.frames().len(), 1);
        assert!(neighbour.frames().is_empty());
    }

    #[actix_rt::test]
    async fn test_send_to_subject_uses_subject_channel() {
        let (dispatcher, _, channels) = dispatcher();
        let dashboard = spawn_recorder();
        let stranger = spawn_recorder();
        channels.subscribe(Channel::Subject("user-a".into()), dashboard.handle.clone());
        channels.subscribe(Channel::Subject("user-b".into()), stranger.handle.clone());

        let report = dispatcher.send_to_subject("user-a", CommandKind::ConfigUpdate, json!({}));
        settle().await;

        assert_eq!(report.delivered, 1);
        assert_eq!(dashboard.frames().len(), 1);
        assert!(stranger.frames().is_empty());
    }

    #[actix_rt::test]
    async fn test_list_online_reads_registry() {
        let (dispatcher, registry, _) = dispatcher();
        let socket = spawn_recorder();
        registry.register("screen-b", "user-b", socket.handle.clone());
        registry.register("screen-a", "user-a", socket.handle.clone());

        assert_eq!(
            dispatcher.list_online().into_iter().collect::<Vec<_>>(),
            vec!["screen-a".to_string(), "screen-b".to_string()]
        );
    }
}
