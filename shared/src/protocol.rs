//! Datagram protocol spoken between the authoritative server and mirrors

use crate::cosmetics::{CosmeticCatalog, CosmeticSlot};
use crate::replicated::Stamped;
use crate::{ClientId, EntityId, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Request(Request),
    Heartbeat,
    Disconnect,

    Connected {
        client_id: ClientId,
        /// Option counts the server validates cosmetic requests against
        catalog: CosmeticCatalog,
    },
    Snapshot(SessionSnapshot),
    Updates {
        tick: u32,
        updates: Vec<Update>,
    },
    Disconnected {
        reason: String,
    },
}

/// A state mutation asked of the authority
///
/// The requester is never part of the payload; the server derives it from
/// the connection the request arrived on.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Request {
    Announce { name: String },
    ToggleReady,
    StartGame,
    ChangeCosmetic { slot: CosmeticSlot, index: i32 },
    Move { position: Vec3 },
    Fire { direction: Vec3 },
    Damage { target: EntityId, amount: i32 },
    ClaimBuff { pickup: EntityId },
    Leave,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Gameplay,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ClientId,
    pub name: String,
    pub ready: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Avatar,
    Enemy,
    Projectile,
    Pickup,
}

/// Avatar-only replicated state
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AvatarSnapshot {
    pub attack: Stamped<i32>,
    pub cosmetics: [Stamped<i32>; 7],
    pub control_enabled: Stamped<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub owner: Option<ClientId>,
    pub position: Stamped<Vec3>,
    pub health: Stamped<i32>,
    pub max_health: i32,
    pub avatar: Option<AvatarSnapshot>,
}

/// Full state sent on connect and periodically to heal lost datagrams
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Stamped<Phase>,
    pub roster: Stamped<Vec<Participant>>,
    pub entities: Vec<EntitySnapshot>,
}

/// New value of a single replicated entity field
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Position(Vec3),
    Health(i32),
    Attack(i32),
    Cosmetic { slot: CosmeticSlot, index: i32 },
    ControlEnabled(bool),
}

/// One broadcast change, applied by mirrors in the order received
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Update {
    Phase(Stamped<Phase>),
    Roster(Stamped<Vec<Participant>>),
    Spawned(EntitySnapshot),
    Despawned {
        entity: EntityId,
    },
    Field {
        entity: EntityId,
        revision: u32,
        value: FieldValue,
    },
}

/// Splits one tick's updates into `Updates` packets that each encode to at
/// most `max_bytes`, keeping their order
///
/// An update larger than `max_bytes` on its own still gets a packet to itself.
pub fn pack_updates(tick: u32, updates: Vec<Update>, max_bytes: usize) -> bincode::Result<Vec<Packet>> {
    let overhead = bincode::serialized_size(&Packet::Updates {
        tick,
        updates: Vec::new(),
    })?;
    let limit = max_bytes as u64;

    let mut packets = Vec::new();
    let mut batch = Vec::new();
    let mut batch_bytes = overhead;
    for update in updates {
        let size = bincode::serialized_size(&update)?;
        if !batch.is_empty() && batch_bytes + size > limit {
            packets.push(Packet::Updates {
                tick,
                updates: std::mem::take(&mut batch),
            });
            batch_bytes = overhead;
        }
        batch_bytes += size;
        batch.push(update);
    }
    if !batch.is_empty() {
        packets.push(Packet::Updates { tick, updates: batch });
    }
    Ok(packets)
}

/// True iff the roster is non-empty and everyone in it is ready
pub fn roster_all_ready(roster: &[Participant]) -> bool {
    !roster.is_empty() && roster.iter().all(|p| p.ready)
}

/// The participant allowed to start the game: the earliest one still present
pub fn roster_coordinator(roster: &[Participant]) -> Option<ClientId> {
    roster.first().map(|p| p.id)
}
