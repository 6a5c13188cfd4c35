//! JSON frames exchanged with display devices and dashboard observers.
//!
//! Every text frame is `{"type": <event>, "payload": <json>}`; `payload` is
//! omitted when it carries nothing (e.g. `client:force-refresh`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub const EVENT_CONFIG_UPDATE: &str = "client:config-update";
pub const EVENT_SEQUENCE_UPDATE: &str = "client:sequence-update";
pub const EVENT_FORCE_REFRESH: &str = "client:force-refresh";
pub const EVENT_COMMAND: &str = "client:command";

pub const EVENT_STATUS: &str = "client:status";
pub const EVENT_PLAYBACK_STATUS: &str = "client:playback-status";
pub const EVENT_ERROR: &str = "client:error";

pub const EVENT_ADMIN_STATUS: &str = "admin:client-status";
pub const EVENT_ADMIN_PLAYBACK_STATUS: &str = "admin:playback-status";
pub const EVENT_ADMIN_ERROR: &str = "admin:client-error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub event: String,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub payload: JsonValue,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Error reply written back to the sender of a rejected frame.
pub fn error_frame(code: &str, message: &str) -> String {
    serde_json::json!({
        "type": "error",
        "code": code,
        "message": message,
        "timestamp": chrono::Utc::now(),
    })
    .to_string()
}

/// Kinds of pushes the dispatcher can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    ConfigUpdate,
    SequenceUpdate,
    ForceRefresh,
    GenericCommand,
    /// Arbitrary named event fanned out to every device.
    BroadcastEvent(String),
}

impl CommandKind {
    pub fn event_name(&self) -> &str {
        match self {
            CommandKind::ConfigUpdate => EVENT_CONFIG_UPDATE,
            CommandKind::SequenceUpdate => EVENT_SEQUENCE_UPDATE,
            CommandKind::ForceRefresh => EVENT_FORCE_REFRESH,
            CommandKind::GenericCommand => EVENT_COMMAND,
            CommandKind::BroadcastEvent(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    Device(String),
    Subject(String),
    All,
}

/// A push that only lives for the duration of one dispatch call.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub target: CommandTarget,
    pub payload: JsonValue,
}

impl Command {
    pub fn new(kind: CommandKind, target: CommandTarget, payload: JsonValue) -> Self {
        Self {
            kind,
            target,
            payload,
        }
    }

    /// `client:command` carrying `{command, data?}`.
    pub fn generic(target: CommandTarget, command: &str, data: Option<JsonValue>) -> Self {
        let mut body = Map::new();
        body.insert("command".to_string(), JsonValue::String(command.to_string()));
        if let Some(data) = data {
            body.insert("data".to_string(), data);
        }
        Self::new(CommandKind::GenericCommand, target, JsonValue::Object(body))
    }

    pub fn to_frame(&self) -> Frame {
        let payload = match self.kind {
            CommandKind::ForceRefresh => JsonValue::Null,
            _ => self.payload.clone(),
        };
        Frame::new(self.kind.event_name(), payload)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_video_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatusPayload {
    pub video_id: String,
    pub position: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

/// Message a registered device sends about itself.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Status(StatusPayload),
    PlaybackStatus(PlaybackStatusPayload),
    Error(ErrorPayload),
}

impl InboundEvent {
    /// Returns `Ok(None)` for event names that are not device events.
    pub fn parse(event: &str, payload: JsonValue) -> Result<Option<Self>, serde_json::Error> {
        let parsed = match event {
            EVENT_STATUS => InboundEvent::Status(serde_json::from_value(payload)?),
            EVENT_PLAYBACK_STATUS => InboundEvent::PlaybackStatus(serde_json::from_value(payload)?),
            EVENT_ERROR => InboundEvent::Error(serde_json::from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    pub fn observer_event_name(&self) -> &'static str {
        match self {
            InboundEvent::Status(_) => EVENT_ADMIN_STATUS,
            InboundEvent::PlaybackStatus(_) => EVENT_ADMIN_PLAYBACK_STATUS,
            InboundEvent::Error(_) => EVENT_ADMIN_ERROR,
        }
    }

    /// Mirror for observers: the inbound fields plus `clientId`.
    pub fn to_observer_frame(&self, device_id: &str) -> Result<Frame, serde_json::Error> {
        let fields = match self {
            InboundEvent::Status(p) => serde_json::to_value(p)?,
            InboundEvent::PlaybackStatus(p) => serde_json::to_value(p)?,
            InboundEvent::Error(p) => serde_json::to_value(p)?,
        };

        let mut body = Map::new();
        body.insert("clientId".to_string(), JsonValue::String(device_id.to_string()));
        if let JsonValue::Object(fields) = fields {
            body.extend(fields);
        }

        Ok(Frame::new(self.observer_event_name(), JsonValue::Object(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_force_refresh_has_no_payload() {
        let command = Command::new(
            CommandKind::ForceRefresh,
            CommandTarget::Device("screen-1".into()),
            json!({"ignored": true}),
        );
        let text = command.to_frame().to_text().unwrap();
        assert_eq!(text, r#"{"type":"client:force-refresh"}"#);
    }

    #[test]
    fn test_generic_command_shape() {
        let with_data = Command::generic(CommandTarget::All, "reboot", Some(json!({"delay": 5})));
        assert_eq!(
            serde_json::to_value(with_data.to_frame()).unwrap(),
            json!({"type": "client:command", "payload": {"command": "reboot", "data": {"delay": 5}}})
        );

        let without_data = Command::generic(CommandTarget::All, "screenshot", None);
        assert_eq!(without_data.payload, json!({"command": "screenshot"}));
    }

    #[test]
    fn test_broadcast_event_uses_custom_name() {
        let command = Command::new(
            CommandKind::BroadcastEvent("layout:changed".into()),
            CommandTarget::All,
            json!({"layoutId": "l-1"}),
        );
        assert_eq!(command.to_frame().event, "layout:changed");
    }

    #[test]
    fn test_status_mirror_carries_client_id() {
        let event = InboundEvent::parse(EVENT_STATUS, json!({"status": "playing", "currentVideoId": "v-9"}))
            .unwrap()
            .unwrap();
        let frame = event.to_observer_frame("screen-1").unwrap();

        assert_eq!(frame.event, EVENT_ADMIN_STATUS);
        assert_eq!(
            frame.payload,
            json!({"clientId": "screen-1", "status": "playing", "currentVideoId": "v-9"})
        );
    }

    #[test]
    fn test_playback_and_error_mirrors() {
        let playback = InboundEvent::parse(
            EVENT_PLAYBACK_STATUS,
            json!({"videoId": "v-1", "position": 12.5, "duration": 60.0}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(playback.observer_event_name(), EVENT_ADMIN_PLAYBACK_STATUS);

        let error = InboundEvent::parse(EVENT_ERROR, json!({"error": "decode failed"}))
            .unwrap()
            .unwrap();
        let frame = error.to_observer_frame("screen-2").unwrap();
        assert_eq!(frame.event, EVENT_ADMIN_ERROR);
        assert_eq!(frame.payload, json!({"clientId": "screen-2", "error": "decode failed"}));
    }

    #[test]
    fn test_error_frame_is_flat() {
        let value: JsonValue = serde_json::from_str(&error_frame("not_registered", "nope")).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "not_registered");
        assert_eq!(value["message"], "nope");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn test_unknown_and_malformed_events() {
        assert!(InboundEvent::parse("client:unknown", json!({})).unwrap().is_none());
        assert!(InboundEvent::parse(EVENT_PLAYBACK_STATUS, json!({"videoId": "v"})).is_err());
    }
}
