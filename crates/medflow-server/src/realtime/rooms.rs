//! Group membership and fan-out for live connections.

use std::collections::{HashMap, HashSet};

use axum::extract::ws::Utf8Bytes;
use medflow_core::{RoleGroup, TenantId};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::protocol::ServerMessage;

pub type ConnectionId = Uuid;

/// A broadcast scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Group {
    /// Staff of one role within one hospital.
    Role { tenant: TenantId, role: RoleGroup },
    /// Everyone joined to one hospital, staff or patient app.
    Tenant(TenantId),
}

impl Group {
    pub fn role(tenant: &TenantId, role: RoleGroup) -> Self {
        Self::Role {
            tenant: tenant.clone(),
            role,
        }
    }

    pub fn tenant(tenant: &TenantId) -> Self {
        Self::Tenant(tenant.clone())
    }
}

/// Frame queued for a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(Utf8Bytes),
    Close,
}

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    /// Creates a handle with a bounded queue of `capacity` frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Non-blocking enqueue; a full or closed queue drops the frame.
    fn deliver(&self, frame: &Utf8Bytes, event: &'static str) -> bool {
        match self.sender.try_send(Outbound::Frame(frame.clone())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(connection_id = %self.id, event, "outbound queue full, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(connection_id = %self.id, event, "connection closed, frame dropped");
                false
            }
        }
    }
}

/// Targets for one emit call.
#[derive(Debug, Clone, Default)]
pub struct Fanout {
    groups: Vec<Group>,
    connections: Vec<ConnectionId>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    pub fn roles(mut self, tenant: &TenantId, roles: &[RoleGroup]) -> Self {
        self.groups
            .extend(roles.iter().map(|role| Group::role(tenant, *role)));
        self
    }

    pub fn tenant(self, tenant: &TenantId) -> Self {
        self.group(Group::tenant(tenant))
    }

    pub fn connection(mut self, id: ConnectionId) -> Self {
        self.connections.push(id);
        self
    }
}

#[derive(Default)]
struct Rooms {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    members: HashMap<Group, HashSet<ConnectionId>>,
    joined: HashMap<ConnectionId, HashSet<Group>>,
}

/// Registry of live connections and their group memberships.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<Rooms>,
}

fn encode(message: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Utf8Bytes::from(text)),
        Err(e) => {
            tracing::warn!(event = message.name(), error = %e, "failed to encode event");
            None
        }
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: ConnectionHandle) {
        let id = handle.id;
        let mut rooms = self.rooms.write();
        rooms.connections.insert(id, handle);
        rooms.joined.entry(id).or_default();
        tracing::debug!(connection_id = %id, "connection registered");
    }

    /// Adds the connection to `groups`. Membership only grows until unregister.
    pub fn join(&self, id: ConnectionId, groups: impl IntoIterator<Item = Group>) -> bool {
        let mut rooms = self.rooms.write();
        if !rooms.connections.contains_key(&id) {
            return false;
        }
        for group in groups {
            rooms.members.entry(group.clone()).or_default().insert(id);
            rooms.joined.entry(id).or_default().insert(group);
        }
        true
    }

    /// Removes the connection from every group in one step.
    pub fn unregister(&self, id: ConnectionId) {
        let mut rooms = self.rooms.write();
        rooms.connections.remove(&id);
        if let Some(groups) = rooms.joined.remove(&id) {
            for group in groups {
                if let Some(members) = rooms.members.get_mut(&group) {
                    members.remove(&id);
                    if members.is_empty() {
                        rooms.members.remove(&group);
                    }
                }
            }
        }
        tracing::debug!(connection_id = %id, "connection unregistered");
    }

    pub fn groups_of(&self, id: ConnectionId) -> HashSet<Group> {
        self.rooms
            .read()
            .joined
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn group_size(&self, group: &Group) -> usize {
        self.rooms
            .read()
            .members
            .get(group)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.rooms.read().connections.len()
    }

    /// Delivers `message` once to every connection in the union of the
    /// fan-out's groups and explicit connections. Returns the number of
    /// connections the frame was queued for.
    pub fn emit(&self, fanout: &Fanout, message: &ServerMessage) -> usize {
        let targets: Vec<ConnectionHandle> = {
            let rooms = self.rooms.read();
            let mut ids: HashSet<ConnectionId> = HashSet::new();
            for group in &fanout.groups {
                if let Some(members) = rooms.members.get(group) {
                    ids.extend(members.iter().copied());
                }
            }
            ids.extend(fanout.connections.iter().copied());
            ids.iter()
                .filter_map(|id| rooms.connections.get(id).cloned())
                .collect()
        };
        self.deliver_all(&targets, message)
    }

    /// Delivers `message` to every live connection.
    pub fn emit_all(&self, message: &ServerMessage) -> usize {
        let targets: Vec<ConnectionHandle> =
            self.rooms.read().connections.values().cloned().collect();
        self.deliver_all(&targets, message)
    }

    pub fn send_to(&self, id: ConnectionId, message: &ServerMessage) -> bool {
        self.emit(&Fanout::new().connection(id), message) == 1
    }

    /// Asks every connection's writer to close.
    pub fn close_all(&self) {
        for handle in self.rooms.read().connections.values() {
            let _ = handle.sender.try_send(Outbound::Close);
        }
    }

    fn deliver_all(&self, targets: &[ConnectionHandle], message: &ServerMessage) -> usize {
        if targets.is_empty() {
            return 0;
        }
        let Some(frame) = encode(message) else {
            return 0;
        };
        let event = message.name();
        let delivered = targets
            .iter()
            .filter(|handle| handle.deliver(&frame, event))
            .count();
        tracing::trace!(event, targets = targets.len(), delivered, "event emitted");
        delivered
    }
}
