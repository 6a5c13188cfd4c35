use actix::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::services::connection_handle::{CloseConnection, ConnectionHandle, RelayMessage};

/// Stand-in for a socket that records every frame it is asked to write.
pub struct Recorder {
    frames: Arc<Mutex<Vec<String>>>,
    close_reasons: Arc<Mutex<Vec<String>>>,
}

impl Actor for Recorder {
    type Context = Context<Self>;
}

impl Handler<RelayMessage> for Recorder {
    type Result = ();

    fn handle(&mut self, msg: RelayMessage, _ctx: &mut Self::Context) {
        self.frames.lock().unwrap().push(msg.message);
    }
}

impl Handler<CloseConnection> for Recorder {
    type Result = ();

    fn handle(&mut self, msg: CloseConnection, ctx: &mut Self::Context) {
        self.close_reasons.lock().unwrap().push(msg.reason);
        ctx.stop();
    }
}

pub struct RecordedSocket {
    pub handle: ConnectionHandle,
    frames: Arc<Mutex<Vec<String>>>,
    close_reasons: Arc<Mutex<Vec<String>>>,
}

impl RecordedSocket {
    pub fn frames(&self) -> Vec<serde_json::Value> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    pub fn close_reasons(&self) -> Vec<String> {
        self.close_reasons.lock().unwrap().clone()
    }
}

pub fn spawn_recorder() -> RecordedSocket {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let close_reasons = Arc::new(Mutex::new(Vec::new()));
    let addr = Recorder {
        frames: frames.clone(),
        close_reasons: close_reasons.clone(),
    }
    .start();

    RecordedSocket {
        handle: ConnectionHandle::new(Uuid::new_v4(), &addr),
        frames,
        close_reasons,
    }
}

/// Socket whose actor has already stopped, so every send fails.
struct Dropped;

impl Actor for Dropped {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

impl Handler<RelayMessage> for Dropped {
    type Result = ();

    fn handle(&mut self, _msg: RelayMessage, _ctx: &mut Self::Context) {}
}

impl Handler<CloseConnection> for Dropped {
    type Result = ();

    fn handle(&mut self, _msg: CloseConnection, _ctx: &mut Self::Context) {}
}

pub async fn dead_socket() -> ConnectionHandle {
    let addr = Dropped.start();
    for _ in 0..100 {
        if !addr.connected() {
            break;
        }
        settle().await;
    }
    ConnectionHandle::new(Uuid::new_v4(), &addr)
}

/// Give actor mailboxes a chance to drain.
pub async fn settle() {
    actix_rt::time::sleep(Duration::from_millis(10)).await;
}
