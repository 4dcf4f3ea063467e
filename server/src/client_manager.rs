//! Connection tracking for the datagram server
//!
//! This module owns the transport-level view of who is connected:
//! - Assigning connection ids and mapping them to socket addresses
//! - Enforcing the connection cap
//! - Tracking activity so silent peers can be timed out
//!
//! Whether a connection has joined the lobby is a separate question answered by
//! the session directory; a connected client only becomes a participant once it
//! announces itself.

use log::info;
use shared::ClientId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected peer
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub addr: SocketAddr,
    /// Last time any packet arrived from this peer
    pub last_seen: Instant,
    /// Number of requests forwarded to the session
    pub requests_received: u64,
}

impl Client {
    pub fn new(id: ClientId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            requests_received: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// True once nothing has been heard for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All live connections, keyed by connection id
pub struct ClientManager {
    clients: HashMap<ClientId, Client>,
    next_client_id: ClientId,
    max_clients: usize,
}

impl ClientManager {
    /// Connection ids start from 1 and are never reused
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new peer; `None` when the server is full
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));
        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: ClientId) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Records activity from a peer; returns false for unknown ids
    pub fn touch(&mut self, client_id: ClientId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Records a forwarded request, which also counts as activity
    pub fn record_request(&mut self, client_id: ClientId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                client.requests_received += 1;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Removes and returns every peer silent for longer than `timeout`
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ClientId> {
        let timed_out: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(*client_id);
        }

        timed_out
    }

    /// Every (id, address) pair, for broadcasting
    pub fn get_client_addrs(&self) -> Vec<(ClientId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
