//! Real-time queue synchronization over WebSocket.

pub mod access;
pub mod chat;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod rooms;
pub mod router;
pub mod side_effects;

pub use access::{Requirement, authorize};
pub use chat::ChatRoom;
pub use connection::handle_socket;
pub use error::IntentError;
pub use protocol::{ClientMessage, FrameError, ServerMessage};
pub use rooms::{ConnectionHandle, ConnectionId, Fanout, Group, Outbound, RoomRegistry};
pub use router::{ConnectionContext, EventRouter, RouterSettings};
pub use side_effects::SideEffects;
