use actix::dev::ToEnvelope;
use actix::prelude::*;
use std::fmt;
use uuid::Uuid;

/// Serialized frame to write to a socket.
#[derive(Message)]
#[rtype(result = "()")]
pub struct RelayMessage {
    pub message: String,
}

/// Ask a socket to close; sent to a connection superseded by a newer one.
#[derive(Message)]
#[rtype(result = "()")]
pub struct CloseConnection {
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection mailbox is full")]
    MailboxFull,
    #[error("connection is closed")]
    Closed,
    #[error("failed to serialize frame: {0}")]
    Serialization(String),
}

impl From<SendError<RelayMessage>> for DeliveryError {
    fn from(error: SendError<RelayMessage>) -> Self {
        match error {
            SendError::Full(_) => DeliveryError::MailboxFull,
            SendError::Closed(_) => DeliveryError::Closed,
        }
    }
}

/// Opaque reference to one live socket. Two handles are the same connection
/// exactly when their `connection_id`s match.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub connection_id: Uuid,
    relay: Recipient<RelayMessage>,
    close: Recipient<CloseConnection>,
}

impl ConnectionHandle {
    pub fn new<A>(connection_id: Uuid, addr: &Addr<A>) -> Self
    where
        A: Actor + Handler<RelayMessage> + Handler<CloseConnection>,
        A::Context: ToEnvelope<A, RelayMessage> + ToEnvelope<A, CloseConnection>,
    {
        Self {
            connection_id,
            relay: addr.clone().recipient(),
            close: addr.clone().recipient(),
        }
    }

    /// Non-blocking enqueue onto the socket's mailbox.
    pub fn send_text(&self, message: String) -> Result<(), DeliveryError> {
        self.relay.try_send(RelayMessage { message })?;
        Ok(())
    }

    pub fn close(&self, reason: &str) {
        self.close.do_send(CloseConnection {
            reason: reason.to_string(),
        });
    }

    pub fn is_same(&self, other: &ConnectionHandle) -> bool {
        self.connection_id == other.connection_id
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}
