pub mod auth;
pub mod channel_hub;
pub mod command_dispatcher;
pub mod connection_handle;
pub mod connection_lifecycle;
pub mod device_link_ws;
pub mod event_router;
pub mod liveness_sweep;
pub mod presence_registry;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use channel_hub::{Channel, ChannelHub, DeliveryReport};
pub use command_dispatcher::{CommandDispatcher, DeliveryOutcome};
pub use connection_handle::{CloseConnection, ConnectionHandle, DeliveryError, RelayMessage};
pub use connection_lifecycle::{
    Connection, ConnectionLifecycleManager, ConnectionRole, ConnectionState, TeardownOutcome,
};
pub use event_router::EventRouter;
pub use liveness_sweep::{LivenessSweep, SweepOutcome};
pub use presence_registry::{PresenceEntry, PresenceRegistry};
