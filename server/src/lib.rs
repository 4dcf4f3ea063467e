//! # Party Game Server Library
//!
//! The authoritative side of the party game. One process hosts one session:
//! players gather in a lobby, mark themselves ready, and the coordinator starts
//! the round. From then on the server simulates enemies, projectiles and
//! pickups, and every client mirrors what the server decides.
//!
//! ## Authority Model
//!
//! Every piece of shared state lives in a `shared::Replicated` field owned by
//! the server. Clients cannot write to those fields; they send `Request`s which
//! land in the session inbox and are validated when the next tick runs.
//! Rejected requests are dropped and logged, never answered.
//!
//! Accepted changes bump the field's revision. At the end of each tick the
//! session drains every dirty field into an ordered list of `Update`s, and the
//! network layer broadcasts them. Full snapshots go out periodically so a
//! client that lost a datagram heals without retransmission.
//!
//! ## Module Organization
//!
//! - `directory`: the lobby roster, readiness and coordinator
//! - `transition`: the Lobby to Gameplay phase change
//! - `entity`: spawned entities and their two-phase despawn
//! - `combat`: damage, contacts and pickup buffs
//! - `records`: last known state of players who left
//! - `session`: the context tying the above together and running ticks
//! - `client_manager`: transport-level connection tracking
//! - `network`: the UDP server loop
//! - `config`: TOML configuration
//! - `error`: request rejection reasons
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(33),
//!         ServerConfig::default(),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The session itself has no I/O and can be driven directly:
//!
//! ```rust
//! use server::config::ServerConfig;
//! use server::session::Session;
//! use shared::Request;
//!
//! let mut session = Session::new(ServerConfig::default());
//! session.submit(1, Request::Announce { name: "Ana".to_string() });
//! session.submit(1, Request::ToggleReady);
//! session.submit(1, Request::StartGame);
//! let updates = session.tick(1.0 / 30.0);
//! assert!(!updates.is_empty());
//! ```

pub mod client_manager;
pub mod combat;
pub mod config;
pub mod directory;
pub mod entity;
pub mod error;
pub mod network;
pub mod records;
pub mod session;
pub mod transition;
