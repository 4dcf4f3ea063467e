pub mod cosmetics;
pub mod protocol;
pub mod replicated;

pub use cosmetics::{CosmeticCatalog, CosmeticSelection, CosmeticSlot, NONE_INDEX};
pub use protocol::{
    pack_updates, roster_all_ready, roster_coordinator, AvatarSnapshot, EntityKind, EntitySnapshot,
    FieldValue, Packet, Participant, Phase, Request, SessionSnapshot, Update,
};
pub use replicated::{ObserverId, ReplicationError, Replicated, Role, Stamped};

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

pub type ClientId = u32;
pub type EntityId = u32;

pub const PROTOCOL_VERSION: u32 = 1;
/// Largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

pub const PLAYER_MAX_HEALTH: i32 = 100;
pub const PLAYER_BASE_ATTACK: i32 = 1;
pub const ENEMY_MAX_HEALTH: i32 = 100;
pub const ENEMY_SPEED: f32 = 3.0;
pub const PROJECTILE_BASE_DAMAGE: i32 = 1;
pub const PROJECTILE_SPEED: f32 = 12.0;
pub const PROJECTILE_LIFETIME_SECS: f32 = 5.0;
pub const BUFF_MIN: i32 = 1;
pub const BUFF_MAX_EXCLUSIVE: i32 = 4;
/// Byte capacity of a display name
pub const MAX_NAME_BYTES: usize = 29;

pub const AVATAR_RADIUS: f32 = 0.5;
pub const ENEMY_RADIUS: f32 = 0.5;
pub const PROJECTILE_RADIUS: f32 = 0.15;
pub const PICKUP_RADIUS: f32 = 0.6;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: Vec3) -> f32 {
        (other - *self).length()
    }

    /// Unit vector in the same direction, or zero for a zero-length vector
    pub fn normalized(&self) -> Vec3 {
        let magnitude = self.length();
        if magnitude > 0.0 {
            *self * (1.0 / magnitude)
        } else {
            Vec3::ZERO
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Contact radius used for overlap checks
pub fn radius_of(kind: EntityKind) -> f32 {
    match kind {
        EntityKind::Avatar => AVATAR_RADIUS,
        EntityKind::Enemy => ENEMY_RADIUS,
        EntityKind::Projectile => PROJECTILE_RADIUS,
        EntityKind::Pickup => PICKUP_RADIUS,
    }
}

/// Sphere overlap; touching spheres do not count
pub fn check_overlap(a: Vec3, radius_a: f32, b: Vec3, radius_b: f32) -> bool {
    let reach = radius_a + radius_b;
    let d = b - a;
    d.x * d.x + d.y * d.y + d.z * d.z < reach * reach
}
