use crate::commands::{describe, Command, HELP};
use crate::mirror::MirrorWorld;
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use shared::{CosmeticCatalog, Packet, Request, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connected: bool,
    /// Set once the server refuses or ends the connection
    closed: bool,
    /// Announced automatically once the server assigns an id
    name: Option<String>,
    world: MirrorWorld,
    catalog: CosmeticCatalog,
    fake_ping_ms: u64,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        name: Option<String>,
        fake_ping_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        let mut world = MirrorWorld::new();
        world.roster_field_mut().subscribe(|old, new| {
            if old != new {
                let ready = new.iter().filter(|p| p.ready).count();
                info!("Lobby: {} players, {} ready", new.len(), ready);
            }
        });

        Ok(Client {
            socket,
            server_addr,
            connected: false,
            closed: false,
            name,
            world,
            catalog: CosmeticCatalog::default(),
            fake_ping_ms,
        })
    }

    pub fn world(&self) -> &MirrorWorld {
        &self.world
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Applies a server packet and returns the packets to send in response
    fn handle_packet(&mut self, packet: Packet) -> Vec<Packet> {
        match packet {
            Packet::Connected { client_id, catalog } => {
                info!("Connected! Client ID: {}", client_id);
                self.world.set_client_id(client_id);
                self.catalog = catalog;
                self.connected = true;
                match &self.name {
                    Some(name) => vec![Packet::Request(Request::Announce { name: name.clone() })],
                    None => Vec::new(),
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.closed = true;
                Vec::new()
            }

            packet @ (Packet::Snapshot(_) | Packet::Updates { .. }) => {
                self.world.apply_packet(packet);
                Vec::new()
            }

            _ => {
                warn!("Unexpected packet type");
                Vec::new()
            }
        }
    }

    /// Runs one typed line; returns false when the player asked to leave
    async fn handle_line(&mut self, line: &str) -> bool {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return true,
            Err(e) => {
                println!("{}", e);
                return true;
            }
        };

        match command {
            Command::Help => println!("{}", HELP),
            Command::Status => println!("{}", describe(&self.world)),
            _ => {}
        }

        match command.to_request(&self.world, &self.catalog) {
            Ok(Some(request)) => {
                let leaving = request == Request::Leave;
                if let Request::Announce { name } = &request {
                    self.name = Some(name.clone());
                }
                if let Err(e) = self.send_packet(&Packet::Request(request)).await {
                    error!("Error sending request: {}", e);
                }
                !leaving
            }
            Ok(None) => true,
            Err(e) => {
                println!("{}", e);
                true
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");
        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .await?;

        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[..len]) {
                                Ok(packet) => {
                                    for reply in self.handle_packet(packet) {
                                        self.send_packet(&reply).await?;
                                    }
                                    if self.closed {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat.tick() => {
                    if self.connected {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                    }
                },

                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_line(&line).await {
                                break;
                            }
                        }
                        None => break,
                    }
                },
            }
        }

        if self.connected {
            if let Err(e) = self.send_packet(&Packet::Disconnect).await {
                warn!("Error sending disconnect: {}", e);
            }
        }

        Ok(())
    }
}
