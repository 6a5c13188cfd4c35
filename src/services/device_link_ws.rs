use actix::prelude::*;
use actix_web::web;
use actix_web_actors::ws::{self, CloseCode, CloseReason, Message};
use serde_json::{Value as JsonValue, json};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PresenceConfig;
use crate::error::AppError;
use crate::models::AuthenticatedSubject;
use crate::models::protocol::{Frame, InboundEvent, error_frame};
use crate::services::connection_handle::{CloseConnection, ConnectionHandle, RelayMessage};
use crate::services::connection_lifecycle::{
    Connection, ConnectionLifecycleManager, ConnectionRole,
};
use crate::services::event_router::EventRouter;

/// WebSocket actor serving one display device or dashboard. The handshake
/// credential has already been validated when the actor starts.
pub struct DeviceLinkWs {
    connection: Connection,
    subject: AuthenticatedSubject,
    lifecycle: web::Data<ConnectionLifecycleManager>,
    router: web::Data<EventRouter>,
    /// Last time anything arrived from the peer
    last_heartbeat: Instant,
    /// Last time `last_seen` was written for this device
    last_touch: Option<Instant>,
    ping_interval: Duration,
    client_timeout: Duration,
}

impl DeviceLinkWs {
    pub fn new(
        connection: Connection,
        subject: AuthenticatedSubject,
        lifecycle: web::Data<ConnectionLifecycleManager>,
        router: web::Data<EventRouter>,
        presence: &PresenceConfig,
    ) -> Self {
        Self {
            connection,
            subject,
            lifecycle,
            router,
            last_heartbeat: Instant::now(),
            last_touch: None,
            ping_interval: Duration::from_secs(presence.ws_ping_interval_secs),
            client_timeout: Duration::from_secs(presence.ws_client_timeout_secs),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.ping_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(
                    connection_id = %act.connection.connection_id,
                    device_id = ?act.connection.device_id(),
                    "WebSocket client heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }

            ctx.ping(b"heartbeat");
        });
    }

    fn activate(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let handle = ConnectionHandle::new(self.connection.connection_id, &ctx.address());
        let lifecycle = self.lifecycle.clone();
        let subject = self.subject.clone();

        // Inbound frames wait until the connection is registered.
        ctx.wait(
            async move { lifecycle.activate(&subject, handle).await }
                .into_actor(self)
                .map(|result, act, ctx| match result {
                    Ok(role) => {
                        act.connection.mark_registered(role);
                        act.send_connected(ctx);
                    }
                    Err(e) => {
                        warn!(
                            connection_id = %act.connection.connection_id,
                            subject_id = %act.subject.subject_id,
                            error = %e,
                            "Connection activation failed"
                        );
                        ctx.text(error_frame("activation_failed", "Connection could not be registered"));
                        ctx.close(Some(CloseReason {
                            code: CloseCode::Policy,
                            description: Some("activation failed".into()),
                        }));
                        ctx.stop();
                    }
                }),
        );
    }

    fn send_connected(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let role = match self.connection.role() {
            Some(ConnectionRole::Device { .. }) => "device",
            _ => "observer",
        };
        let frame = Frame::new(
            "connected",
            json!({
                "connectionId": self.connection.connection_id,
                "clientId": self.connection.device_id(),
                "role": role,
            }),
        );
        self.write_frame(&frame, ctx);
    }

    fn write_frame(&self, frame: &Frame, ctx: &mut ws::WebsocketContext<Self>) {
        match frame.to_text() {
            Ok(text) => ctx.text(text),
            Err(e) => warn!(
                connection_id = %self.connection.connection_id,
                error = %e,
                "Failed to encode outbound frame"
            ),
        }
    }

    /// Persist liveness for a device connection. Unforced refreshes are
    /// limited to one per half ping interval.
    fn refresh_last_seen(&mut self, force: bool) {
        let Some(device_id) = self.connection.device_id().map(str::to_string) else {
            return;
        };

        let now = Instant::now();
        if !touch_due(self.last_touch, now, self.ping_interval / 2, force) {
            return;
        }
        self.last_touch = Some(now);

        let lifecycle = self.lifecycle.clone();
        actix::spawn(async move {
            if let Err(e) = lifecycle.record_heartbeat(&device_id).await {
                warn!(device_id = %device_id, error = %e, "Failed to refresh last_seen");
            }
        });
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(_) => {
                warn!(
                    connection_id = %self.connection.connection_id,
                    "Failed to parse WebSocket message"
                );
                ctx.text(error_frame("invalid_json", "Invalid JSON format"));
                return;
            }
        };

        debug!(
            connection_id = %self.connection.connection_id,
            message_type = %frame.event,
            device_id = ?self.connection.device_id(),
            "Received WebSocket message"
        );

        match frame.event.as_str() {
            "ping" => {
                debug!(
                    connection_id = %self.connection.connection_id,
                    log_stage = "ws:client_ping",
                    "Received ping message from client"
                );
                self.write_frame(&Frame::new("pong", JsonValue::Null), ctx);
            }
            "pong" => {}
            "heartbeat" => self.refresh_last_seen(true),
            event => match InboundEvent::parse(event, frame.payload) {
                Ok(Some(inbound)) => {
                    if matches!(inbound, InboundEvent::Status(_)) {
                        self.refresh_last_seen(false);
                    }
                    match self.router.on_device_event(&self.connection, inbound) {
                        Ok(_) => {}
                        Err(AppError::Forbidden(message)) => {
                            ctx.text(error_frame("not_registered_device", &message));
                        }
                        Err(e) => {
                            warn!(
                                connection_id = %self.connection.connection_id,
                                error = %e,
                                "Failed to forward device event"
                            );
                            ctx.text(error_frame("internal_error", "Failed to forward event"));
                        }
                    }
                }
                Ok(None) => {
                    warn!(
                        connection_id = %self.connection.connection_id,
                        message_type = %event,
                        "Unknown message type received"
                    );
                    ctx.text(error_frame(
                        "unknown_message_type",
                        &format!("Unknown message type: {}", event),
                    ));
                }
                Err(e) => {
                    ctx.text(error_frame("invalid_payload", &e.to_string()));
                }
            },
        }
    }
}

/// Whether a `last_seen` write is due. Forced refreshes always are.
fn touch_due(last_touch: Option<Instant>, now: Instant, min_gap: Duration, force: bool) -> bool {
    force || last_touch.is_none_or(|at| now.saturating_duration_since(at) >= min_gap)
}

impl Actor for DeviceLinkWs {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            connection_id = %self.connection.connection_id,
            subject_id = %self.subject.subject_id,
            "WebSocket connection started"
        );
        self.start_heartbeat(ctx);
        self.activate(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let connection_id = self.connection.connection_id;
        info!(
            connection_id = %connection_id,
            subject_id = %self.subject.subject_id,
            device_id = ?self.connection.device_id(),
            "WebSocket connection stopped"
        );

        let role = self.connection.begin_close();
        let lifecycle = self.lifecycle.clone();
        actix::spawn(async move {
            lifecycle.teardown(connection_id, role).await;
        });
    }
}

impl Handler<RelayMessage> for DeviceLinkWs {
    type Result = ();

    fn handle(&mut self, msg: RelayMessage, ctx: &mut Self::Context) {
        ctx.text(msg.message);
    }
}

impl Handler<CloseConnection> for DeviceLinkWs {
    type Result = ();

    fn handle(&mut self, msg: CloseConnection, ctx: &mut Self::Context) {
        info!(
            connection_id = %self.connection.connection_id,
            reason = %msg.reason,
            "Closing connection on request"
        );
        ctx.close(Some(CloseReason {
            code: CloseCode::Policy,
            description: Some(msg.reason),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<Message, ws::ProtocolError>> for DeviceLinkWs {
    fn handle(&mut self, msg: Result<Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
                self.refresh_last_seen(false);
            }
            Ok(Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
                ctx.text(error_frame("unsupported_binary", "Binary frames are not supported"));
            }
            Ok(Message::Close(reason)) => {
                debug!(
                    connection_id = %self.connection.connection_id,
                    reason = ?reason,
                    "Client closed WebSocket"
                );
                ctx.close(reason);
                ctx.stop();
            }
            Ok(Message::Continuation(_)) | Ok(Message::Nop) => {}
            Err(e) => {
                warn!(
                    connection_id = %self.connection.connection_id,
                    error = %e,
                    "WebSocket protocol error"
                );
                ctx.stop();
            }
        }
    }
}
