//! Broadcast hub: relays controller state to every live client session.
//!
//! The hub holds only the sender half of each session's outbound queue; the
//! session task owns the receiver, so a session that has terminated is
//! observed as a closed sender and pruned on the next pass. The hub never
//! controls a session's lifetime.

use crate::message::{Message, MessageKind};
use crate::serial::SerialHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// How often the hub runs an update pass.
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(50);

/// Shared registration surface handed to the gateway.
#[derive(Clone)]
pub struct HubHandle {
    sessions: Arc<Mutex<Vec<mpsc::Sender<String>>>>,
    serial: SerialHandle,
}

impl HubHandle {
    /// Register a session's outbound queue and request a fresh state
    /// snapshot so the new viewer doesn't wait for the next poll.
    pub async fn add_session(&self, outbound: mpsc::Sender<String>) {
        self.sessions.lock().await.push(outbound);
        self.serial.send(Message::query_state());
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Owns the update schedule and the incoming side of the serial link.
pub struct Hub {
    handle: HubHandle,
}

impl Hub {
    pub fn new(serial: SerialHandle) -> Self {
        Self {
            handle: HubHandle {
                sessions: Arc::new(Mutex::new(Vec::new())),
                serial,
            },
        }
    }

    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Repeating cooperative schedule: one update pass per tick.
    pub async fn run(self, mut incoming: mpsc::Receiver<Message>) {
        let mut ticks = tokio::time::interval(UPDATE_INTERVAL);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            self.update(&mut incoming).await;
        }
    }

    /// One pass: prune dead sessions, then relay at most one pending
    /// controller message. `query_state_result` is copied to every live
    /// session; any other kind is drained and discarded so a chatty device
    /// cannot grow the queue without bound.
    async fn update(&self, incoming: &mut mpsc::Receiver<Message>) {
        let mut sessions = self.handle.sessions.lock().await;
        sessions.retain(|outbound| !outbound.is_closed());

        let message = match incoming.try_recv() {
            Ok(message) => message,
            Err(_) => return,
        };
        if message.kind != MessageKind::QueryStateResult {
            log::debug!(
                "discarding unhandled {} message from controller",
                message.kind.as_str()
            );
            return;
        }

        let text = message.encode();
        for outbound in sessions.iter() {
            if outbound.try_send(text.clone()).is_err() {
                log::debug!("session outbound queue unavailable, skipping broadcast copy");
            }
        }
    }
}
