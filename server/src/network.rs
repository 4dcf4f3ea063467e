//! Server network layer handling UDP communications and session loop coordination

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::session::Session;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{pack_updates, ClientId, Packet, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Largest step handed to the simulation after a stall
const MAX_TICK_DT: f32 = 0.1;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ClientId },
    Shutdown,
}

/// Messages sent from the session loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ClientId>,
    },
}

/// Main server coordinating networking and the authoritative session
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    session: Session,
    tick_duration: Duration,
    client_timeout: Duration,
    snapshot_interval: u32,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        config: ServerConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_connections))),
            tick_duration,
            client_timeout: config.client_timeout(),
            snapshot_interval: config.snapshot_interval_ticks.max(1),
            session: Session::new(config),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sender that can stop `run` from another task
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) = server_tx.send(ServerMessage::PacketReceived { packet, addr }) {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }
                            if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<ClientId>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    fn find_client(
        &self,
        addr: SocketAddr,
    ) -> impl std::future::Future<Output = Option<ClientId>> + Send + '_ {
        let clients = &self.clients;
        async move {
            let clients = clients.read().await;
            clients.find_client_by_addr(addr)
        }
    }

    async fn drop_client(&mut self, client_id: ClientId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(client_id);
        }
        self.session.disconnect(client_id);
    }

    /// Routes one incoming packet; requests go to the session inbox
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!("Client connecting from {} (version: {})", addr, client_version);

                if client_version != PROTOCOL_VERSION {
                    let reason = format!(
                        "Protocol version mismatch: server {}, client {}",
                        PROTOCOL_VERSION, client_version
                    );
                    self.send_packet(Packet::Disconnected { reason }, addr);
                    return;
                }

                if let Some(existing_id) = self.find_client(addr).await {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_client(existing_id).await;
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                match client_id {
                    Some(client_id) => {
                        let catalog = self.session.config().cosmetics;
                        self.send_packet(Packet::Connected { client_id, catalog }, addr);
                        self.send_packet(Packet::Snapshot(self.session.snapshot()), addr);
                    }
                    None => {
                        let reason = "Server full".to_string();
                        self.send_packet(Packet::Disconnected { reason }, addr);
                    }
                }
            }

            Packet::Request(request) => match self.find_client(addr).await {
                Some(client_id) => {
                    self.clients.write().await.record_request(client_id);
                    self.session.submit(client_id, request);
                }
                None => debug!("Request from unknown address {} ignored", addr),
            },

            Packet::Heartbeat => {
                if let Some(client_id) = self.find_client(addr).await {
                    self.clients.write().await.touch(client_id);
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.find_client(addr).await {
                    self.drop_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Returns false once the loop should stop
    async fn handle_message(&mut self, message: Option<ServerMessage>) -> bool {
        match message {
            Some(ServerMessage::PacketReceived { packet, addr }) => {
                self.handle_packet(packet, addr).await;
                true
            }
            Some(ServerMessage::ClientTimeout { client_id }) => {
                info!("Client {} timed out", client_id);
                self.session.disconnect(client_id);
                true
            }
            Some(ServerMessage::Shutdown) | None => false,
        }
    }

    /// Advances the session and queues whatever changed for broadcast
    fn run_tick(&mut self, dt: f32) {
        let updates = self.session.tick(dt.min(MAX_TICK_DT));
        let tick = self.session.tick_count();

        match pack_updates(tick, updates, MAX_DATAGRAM_SIZE) {
            Ok(packets) => {
                for packet in packets {
                    self.broadcast_packet(packet, None);
                }
            }
            Err(e) => error!("Failed to pack updates for tick {}: {}", tick, e),
        }
        if tick % self.snapshot_interval == 0 {
            self.broadcast_packet(Packet::Snapshot(self.session.snapshot()), None);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    if !self.handle_message(message).await {
                        info!("Server shutting down");
                        break;
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.run_tick(dt);

                    let tick = self.session.tick_count();
                    if tick % 300 == 0 {
                        let client_count = self.clients.read().await.len();
                        debug!(
                            "Tick {}: {} connections, {} entities, {:?}",
                            tick,
                            client_count,
                            self.session.entities().len(),
                            self.session.phase()
                        );
                    }
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Saves every player record and tells connected clients goodbye
    async fn shutdown(&mut self) {
        let updates = self.session.end();
        let tick = self.session.tick_count();
        let addrs = self.clients.read().await.get_client_addrs();

        let farewell = Packet::Disconnected {
            reason: "Server shutting down".to_string(),
        };
        let mut packets = pack_updates(tick, updates, MAX_DATAGRAM_SIZE).unwrap_or_else(|e| {
            error!("Failed to pack final updates: {}", e);
            Vec::new()
        });
        packets.push(farewell);
        for (client_id, addr) in addrs {
            for packet in &packets {
                if let Err(e) = send_packet_impl(&self.socket, packet, addr).await {
                    warn!("Failed to send shutdown notice to client {}: {}", client_id, e);
                }
            }
        }
        info!("Saved {} player records", self.session.records().len());
    }
}

async fn send_packet_impl(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}
