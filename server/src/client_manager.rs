//! Connection tracking for the lobby
//!
//! This module keeps one entry per live WebSocket session:
//! - Connection lifecycle (connect, disconnect)
//! - The player name a connection claimed by joining, if any
//! - The outbound channel used to reach that connection
//! - Capacity enforcement
//!
//! The registry never checks names for uniqueness; the game state rejects
//! duplicate joins before an identity is recorded here.
//!
//! Outbound queues are bounded. A connection whose queue fills up has it
//! closed: its writer drains what was queued, shuts the socket, and the
//! connection then leaves through the normal disconnect path.

use crate::game::RoomId;
use log::{debug, info, warn};
use shared::ServerMessage;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub type ConnectionId = u32;

/// Messages a connection may have waiting before it is cut off
pub const OUTBOUND_QUEUE: usize = 64;

/// A live connection and the player it speaks for
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    pub room: RoomId,
    /// Player name, set once on a successful join
    pub identity: Option<String>,
    pub connected_at: Instant,
    /// None once the queue was closed for falling behind
    sender: Option<mpsc::Sender<ServerMessage>>,
}

impl Client {
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            id,
            addr,
            room: RoomId::lobby(),
            identity: None,
            connected_at: Instant::now(),
            sender: Some(sender),
        }
    }

    /// Queues a message for the connection's writer task.
    ///
    /// Returns false if the message was not queued. A full queue is closed so
    /// the writer stops once it has drained.
    pub fn send(&mut self, message: ServerMessage) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };

        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(
                    "Client {} fell behind at '{}', closing its queue",
                    self.id,
                    message.name()
                );
                self.sender = None;
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_lagging(&self) -> bool {
        self.sender.is_none()
    }
}

/// Manages all live connections
pub struct ClientManager {
    /// Ordered by id so broadcasts go out in connection order
    clients: BTreeMap<ConnectionId, Client>,
    next_client_id: ConnectionId,
    max_clients: usize,
}

impl ClientManager {
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection.
    ///
    /// Returns None if the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            warn!("Refusing connection from {}: server full", addr);
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));

        Some(client_id)
    }

    /// Removes a connection and hands back its entry so the caller can use the
    /// identity one last time.
    pub fn remove_client(&mut self, client_id: ConnectionId) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!(
            "Client {} disconnected after {:.1}s",
            client.id,
            client.connected_at.elapsed().as_secs_f32()
        );
        Some(client)
    }

    pub fn get(&self, client_id: ConnectionId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn identity(&self, client_id: ConnectionId) -> Option<&str> {
        self.clients
            .get(&client_id)
            .and_then(|client| client.identity.as_deref())
    }

    /// Records the player name a connection joined as.
    ///
    /// Returns false if the connection is unknown or already has a name.
    pub fn set_identity(&mut self, client_id: ConnectionId, name: &str) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) if client.identity.is_none() => {
                client.identity = Some(name.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn send_to(&mut self, client_id: ConnectionId, message: ServerMessage) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            if !client.send(message) {
                debug!("Client {} not accepting messages, dropped one", client_id);
            }
        }
    }

    pub fn broadcast(&mut self, message: &ServerMessage) {
        for client in self.clients.values_mut() {
            if !client.send(message.clone()) {
                debug!("Client {} not accepting messages, dropped broadcast", client.id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
