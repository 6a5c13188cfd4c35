use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::AppError;
use crate::models::protocol::InboundEvent;
use crate::services::channel_hub::{Channel, ChannelHub, DeliveryReport};
use crate::services::connection_lifecycle::Connection;

/// Republishes device telemetry to dashboard observers.
pub struct EventRouter {
    channels: Arc<ChannelHub>,
}

impl EventRouter {
    pub fn new(channels: Arc<ChannelHub>) -> Self {
        Self { channels }
    }

    /// Forward an event from a registered device connection. Anything else
    /// (an observer, or a socket still activating) is rejected.
    pub fn on_device_event(
        &self,
        connection: &Connection,
        event: InboundEvent,
    ) -> Result<DeliveryReport, AppError> {
        let device_id = match (connection.is_registered(), connection.device_id()) {
            (true, Some(device_id)) => device_id,
            _ => {
                warn!(
                    connection_id = %connection.connection_id,
                    state = ?connection.state(),
                    "Device event from a connection without a registered device"
                );
                return Err(AppError::Forbidden(
                    "Only registered device connections may send device events".to_string(),
                ));
            }
        };

        if let InboundEvent::Error(payload) = &event {
            error!(
                device_id = %device_id,
                client_error = %payload.error,
                "Device reported an error"
            );
        }

        let frame = event.to_observer_frame(device_id)?;
        let report = self.channels.publish(&Channel::Observers, &frame.to_text()?);

        debug!(
            device_id = %device_id,
            event = %frame.event,
            delivered = report.delivered,
            failed = report.failed,
            "Device event forwarded to observers"
        );

        Ok(report)
    }
}
