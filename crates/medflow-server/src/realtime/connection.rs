//! One task per WebSocket: reads intents in order, writes queued frames,
//! pings on an interval.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{MissedTickBehavior, interval};

use super::protocol::ServerMessage;
use super::rooms::{ConnectionHandle, Outbound};
use super::router::{ConnectionContext, EventRouter};
use crate::session::Session;

/// Serves one upgraded socket until either side closes it.
///
/// The connection is registered before the chat history is sent, so no
/// broadcast emitted after the upgrade can be missed, and it is removed
/// from every group when the loop ends.
pub async fn handle_socket(
    socket: WebSocket,
    session: Option<Session>,
    router: Arc<EventRouter>,
    queue_capacity: usize,
    heartbeat: Duration,
) {
    let (handle, mut rx) = ConnectionHandle::channel(queue_capacity);
    let mut ctx = ConnectionContext::new(handle.id(), session);
    let rooms = router.rooms().clone();
    rooms.register(handle);

    tracing::info!(
        connection_id = %ctx.id,
        authenticated = ctx.session.is_some(),
        tenant = ctx.session.as_ref().map(|s| s.tenant_id.as_str()).unwrap_or("-"),
        connections = rooms.connection_count(),
        "websocket connected"
    );

    let (mut sender, mut receiver) = socket.split();

    let history = ServerMessage::ChatHistory(router.chat().history().await);
    match serde_json::to_string(&history) {
        Ok(text) => {
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                tracing::debug!(error = %e, "failed to send chat history");
                rooms.unregister(ctx.id);
                return;
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode chat history"),
    }

    let mut heartbeat_interval = interval(heartbeat);
    heartbeat_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    heartbeat_interval.tick().await;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        router.handle_frame(&mut ctx, text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            tracing::debug!(error = %e, "failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %ctx.id, "client closed websocket");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %ctx.id, error = %e, "websocket error");
                        break;
                    }
                }
            }

            out = rx.recv() => {
                match out {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = sender.send(Message::Text(frame)).await {
                            tracing::debug!(error = %e, "failed to send frame");
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if let Err(e) = sender.send(Message::Ping(Default::default())).await {
                    tracing::debug!(error = %e, "failed to send ping");
                    break;
                }
            }
        }
    }

    rooms.unregister(ctx.id);
    tracing::info!(
        connection_id = %ctx.id,
        connections = rooms.connection_count(),
        "websocket disconnected"
    );
}
