//! Reasons the authority drops a request
//!
//! None of these are fatal. A rejected request leaves session state exactly as
//! it was; the network layer only logs the reason.

use shared::{ClientId, CosmeticSlot, EntityId, ReplicationError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("client {0} already announced")]
    DuplicateAnnounce(ClientId),

    #[error("directory is full ({capacity} players)")]
    DirectoryFull { capacity: usize },

    #[error("display name must be 1..={max} bytes")]
    InvalidName { max: usize },

    #[error("index {index} is out of range for slot {slot}")]
    CosmeticOutOfRange { slot: CosmeticSlot, index: i32 },

    #[error("client {0} is not the coordinator")]
    NotCoordinator(ClientId),

    #[error("not every participant is ready")]
    NotAllReady,

    #[error("request is not valid in the current phase")]
    WrongPhase,

    #[error("client {client} does not own entity {entity}")]
    NotOwner { client: ClientId, entity: EntityId },

    #[error("movement control is disabled for client {0}")]
    ControlDisabled(ClientId),

    #[error("malformed request payload: {0}")]
    InvalidPayload(&'static str),

    #[error("client {client} already has {limit} projectiles in flight")]
    ProjectileLimit { client: ClientId, limit: usize },

    #[error("entity {0} is out of reach")]
    OutOfReach(EntityId),

    #[error("pickup {0} was already applied")]
    AlreadyApplied(EntityId),

    #[error("client {0} is not in the directory")]
    UnknownParticipant(ClientId),

    #[error("entity {0} does not exist")]
    MissingEntity(EntityId),

    #[error("client {0} has no avatar")]
    NoAvatar(ClientId),

    #[error(transparent)]
    AuthorityViolation(#[from] ReplicationError),
}
