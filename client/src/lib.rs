//! # Party Game Client Library
//!
//! A thin, text-driven client for the party game server. It holds no
//! authority over anything: it sends requests and mirrors whatever the server
//! broadcasts back.
//!
//! ## Module Organization
//!
//! ### Mirror Module (`mirror`)
//! The client's copy of the session. Every field is a mirror-role
//! `shared::Replicated`, so values only ever move forward by revision and
//! observers fire only for accepted changes.
//!
//! ### Commands Module (`commands`)
//! Parses typed lines into requests. Commands that depend on mirrored state,
//! such as cycling a cosmetic slot, are resolved against the mirror before
//! sending.
//!
//! ### Network Module (`network`)
//! UDP connection handling, heartbeats and the main select loop.
//!
//! ## Usage Example
//!
//! ```rust
//! use client::mirror::MirrorWorld;
//! use shared::{Participant, Stamped, Update};
//!
//! let mut world = MirrorWorld::new();
//! world.set_client_id(1);
//! world.apply_update(Update::Roster(Stamped {
//!     revision: 1,
//!     value: vec![Participant { id: 1, name: "Ana".to_string(), ready: true }],
//! }));
//! assert!(world.can_start());
//! ```

pub mod commands;
pub mod mirror;
pub mod network;
