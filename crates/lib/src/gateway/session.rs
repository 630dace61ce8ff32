//! Authenticated client session loop.

use crate::auth::PermissionLevel;
use crate::hub::HubHandle;
use crate::message::{Message, MessageKind};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use serde_json::Value;
use tokio::sync::mpsc;

/// Bound on a session's outbound queue.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Decide the reply to one inbound client frame. Undecodable frames and
/// unhandled kinds get no reply.
fn handle_frame(text: &str) -> Option<Message> {
    let message = Message::decode(text).ok()?;
    match message.kind {
        MessageKind::QueryState => Some(Message::new(MessageKind::QueryStateResult, Value::Null)),
        // extension point for device-command translation
        MessageKind::ChangeState => Some(Message::text("changing of state not implemented!")),
        _ => None,
    }
}

/// Run one authenticated session until the peer closes or errors out.
///
/// All outbound traffic — hub broadcasts and direct replies alike — funnels
/// through a single bounded queue drained one write at a time, so delivery
/// toward this client is strictly FIFO with at most one write in flight.
/// When the task ends, the queue's sender closes and the hub prunes the
/// registration on its next pass.
pub async fn run_session(mut socket: WebSocket, hub: HubHandle, permissions: PermissionLevel) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);
    hub.add_session(outbound_tx.clone()).await;
    log::info!("session opened with {} permission", permissions.as_str());

    loop {
        tokio::select! {
            queued = outbound_rx.recv() => {
                // we hold a sender ourselves, so recv only yields real frames
                let Some(text) = queued else { break };
                if socket.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                let Some(Ok(frame)) = inbound else { break };
                let WsMessage::Text(text) = frame else { continue };
                if let Some(reply) = handle_frame(&text) {
                    if outbound_tx.try_send(reply.encode()).is_err() {
                        log::warn!("session outbound queue full, dropping reply");
                    }
                }
            }
        }
    }
    log::debug!("session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_state_gets_a_placeholder_result() {
        let reply = handle_frame(&Message::query_state().encode()).unwrap();
        assert_eq!(reply.kind, MessageKind::QueryStateResult);
        assert_eq!(reply.payload, Value::Null);
    }

    #[test]
    fn change_state_is_answered_as_unimplemented() {
        let frame = Message::new(MessageKind::ChangeState, json!({ "gate": 1 })).encode();
        let reply = handle_frame(&frame).unwrap();
        assert_eq!(reply, Message::text("changing of state not implemented!"));
    }

    #[test]
    fn other_kinds_and_garbage_get_no_reply() {
        assert!(handle_frame(&Message::text("hi").encode()).is_none());
        assert!(handle_frame(
            &Message::new(MessageKind::Availability, json!(true)).encode()
        )
        .is_none());
        assert!(handle_frame(
            &Message::new(MessageKind::QueryStateResult, json!([1])).encode()
        )
        .is_none());
        assert!(handle_frame("not json").is_none());
    }

    #[tokio::test]
    async fn outbound_queue_drains_in_enqueue_order() {
        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);
        for i in 0..5 {
            tx.try_send(format!("frame-{}", i)).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), format!("frame-{}", i));
        }
    }
}
