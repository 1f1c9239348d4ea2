//! Staff chat. One task owns the history buffer; everything else talks to
//! it over a channel.

use std::collections::VecDeque;
use std::sync::Arc;

use medflow_core::ChatMessage;
use tokio::sync::{mpsc, oneshot};

use super::protocol::ServerMessage;
use super::rooms::RoomRegistry;

const COMMAND_BUFFER: usize = 256;

enum ChatCommand {
    Post(ChatMessage),
    History(oneshot::Sender<Vec<ChatMessage>>),
}

/// Handle to the chat actor.
#[derive(Clone)]
pub struct ChatRoom {
    commands: mpsc::Sender<ChatCommand>,
}

impl ChatRoom {
    /// Spawns the actor. Posted messages are appended, trimmed to `capacity`
    /// and broadcast to every connection in append order.
    pub fn spawn(capacity: usize, rooms: Arc<RoomRegistry>) -> Self {
        let (commands, mut inbox) = mpsc::channel(COMMAND_BUFFER);
        let capacity = capacity.max(1);

        tokio::spawn(async move {
            let mut history: VecDeque<ChatMessage> = VecDeque::with_capacity(capacity);
            while let Some(command) = inbox.recv().await {
                match command {
                    ChatCommand::Post(message) => {
                        if history.len() == capacity {
                            history.pop_front();
                        }
                        history.push_back(message.clone());
                        rooms.emit_all(&ServerMessage::ChatMessage(message));
                    }
                    ChatCommand::History(reply) => {
                        let _ = reply.send(history.iter().cloned().collect());
                    }
                }
            }
            tracing::debug!("chat actor stopped");
        });

        Self { commands }
    }

    pub async fn post(&self, message: ChatMessage) {
        if self.commands.send(ChatCommand::Post(message)).await.is_err() {
            tracing::warn!("chat actor unavailable, message dropped");
        }
    }

    /// Snapshot of the buffered messages, oldest first.
    pub async fn history(&self) -> Vec<ChatMessage> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(ChatCommand::History(reply)).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}
