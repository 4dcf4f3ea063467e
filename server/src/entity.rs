//! Networked entities and their spawn/despawn lifecycle
//!
//! Despawning is two-phase. Combat and pickups only *mark* an entity; the
//! session flushes marked entities once per tick. Marked entities are skipped
//! by every further interaction, which is what keeps an entity hit several
//! times in one tick from being removed more than once.

use log::{debug, info};
use shared::{
    AvatarSnapshot, ClientId, CosmeticSelection, EntityId, EntityKind, EntitySnapshot, FieldValue,
    Replicated, Update, Vec3, ENEMY_MAX_HEALTH, PLAYER_BASE_ATTACK, PLAYER_MAX_HEALTH,
    PROJECTILE_LIFETIME_SECS,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
pub struct Avatar {
    pub account_id: String,
    pub attack: Replicated<i32>,
    pub cosmetics: CosmeticSelection,
    pub control_enabled: Replicated<bool>,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub shooter: ClientId,
    pub damage: i32,
    pub velocity: Vec3,
    pub remaining_secs: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Pickup {
    pub applied: bool,
}

/// Kind-specific state carried by an entity
#[derive(Debug)]
pub enum Body {
    Avatar(Avatar),
    Enemy { speed: f32 },
    Projectile(Projectile),
    Pickup(Pickup),
}

#[derive(Debug)]
pub struct Entity {
    pub id: EntityId,
    pub owner: Option<ClientId>,
    pub position: Replicated<Vec3>,
    pub health: Replicated<i32>,
    pub max_health: i32,
    pub body: Body,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self.body {
            Body::Avatar(_) => EntityKind::Avatar,
            Body::Enemy { .. } => EntityKind::Enemy,
            Body::Projectile(_) => EntityKind::Projectile,
            Body::Pickup(_) => EntityKind::Pickup,
        }
    }

    pub fn avatar(&self) -> Option<&Avatar> {
        match &self.body {
            Body::Avatar(avatar) => Some(avatar),
            _ => None,
        }
    }

    pub fn avatar_mut(&mut self) -> Option<&mut Avatar> {
        match &mut self.body {
            Body::Avatar(avatar) => Some(avatar),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            kind: self.kind(),
            owner: self.owner,
            position: self.position.stamped(),
            health: self.health.stamped(),
            max_health: self.max_health,
            avatar: self.avatar().map(|avatar| AvatarSnapshot {
                attack: avatar.attack.stamped(),
                cosmetics: avatar.cosmetics.stamped(),
                control_enabled: avatar.control_enabled.stamped(),
            }),
        }
    }

    /// Appends one `Update::Field` per field changed since the last drain
    pub fn drain_field_updates(&mut self, out: &mut Vec<Update>) {
        let entity = self.id;
        if let Some(stamped) = self.position.take_dirty() {
            out.push(Update::Field {
                entity,
                revision: stamped.revision,
                value: FieldValue::Position(stamped.value),
            });
        }
        if let Some(stamped) = self.health.take_dirty() {
            out.push(Update::Field {
                entity,
                revision: stamped.revision,
                value: FieldValue::Health(stamped.value),
            });
        }
        if let Body::Avatar(avatar) = &mut self.body {
            if let Some(stamped) = avatar.attack.take_dirty() {
                out.push(Update::Field {
                    entity,
                    revision: stamped.revision,
                    value: FieldValue::Attack(stamped.value),
                });
            }
            for (slot, stamped) in avatar.cosmetics.take_dirty() {
                out.push(Update::Field {
                    entity,
                    revision: stamped.revision,
                    value: FieldValue::Cosmetic {
                        slot,
                        index: stamped.value,
                    },
                });
            }
            if let Some(stamped) = avatar.control_enabled.take_dirty() {
                out.push(Update::Field {
                    entity,
                    revision: stamped.revision,
                    value: FieldValue::ControlEnabled(stamped.value),
                });
            }
        }
    }

    /// Marks every field clean; used right after a spawn snapshot went out
    fn clear_dirty(&mut self) {
        let mut discard = Vec::new();
        self.drain_field_updates(&mut discard);
    }
}

/// Owner of every live entity on the authority
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, Entity>,
    avatars: HashMap<ClientId, EntityId>,
    pending_despawn: Vec<EntityId>,
    next_id: EntityId,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            avatars: HashMap::new(),
            pending_despawn: Vec::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, owner: Option<ClientId>, position: Vec3, max_health: i32, body: Body) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;

        let mut entity = Entity {
            id,
            owner,
            position: Replicated::authority(position),
            health: Replicated::authority(max_health),
            max_health,
            body,
        };
        entity.clear_dirty();
        debug!("Spawned {:?} {} at {:?}", entity.kind(), id, position);
        self.entities.insert(id, entity);
        id
    }

    /// Spawns a player avatar with movement control disabled
    pub fn spawn_avatar(&mut self, owner: ClientId, account_id: &str, position: Vec3) -> EntityId {
        let avatar = Avatar {
            account_id: account_id.to_string(),
            attack: Replicated::authority(PLAYER_BASE_ATTACK),
            cosmetics: CosmeticSelection::authority(),
            control_enabled: Replicated::authority(false),
        };
        let id = self.insert(Some(owner), position, PLAYER_MAX_HEALTH, Body::Avatar(avatar));
        self.avatars.insert(owner, id);
        info!("Spawned avatar {} for client {}", id, owner);
        id
    }

    pub fn spawn_enemy(&mut self, position: Vec3, speed: f32) -> EntityId {
        self.insert(None, position, ENEMY_MAX_HEALTH, Body::Enemy { speed })
    }

    pub fn spawn_projectile(&mut self, shooter: ClientId, position: Vec3, velocity: Vec3, damage: i32) -> EntityId {
        let projectile = Projectile {
            shooter,
            damage,
            velocity,
            remaining_secs: PROJECTILE_LIFETIME_SECS,
        };
        self.insert(Some(shooter), position, 1, Body::Projectile(projectile))
    }

    pub fn spawn_pickup(&mut self, position: Vec3) -> EntityId {
        self.insert(None, position, 1, Body::Pickup(Pickup::default()))
    }

    /// Queues an entity for removal at the end of the tick
    ///
    /// Returns true only for the first mark; later marks and unknown ids are
    /// no-ops.
    pub fn mark_for_despawn(&mut self, id: EntityId) -> bool {
        if !self.entities.contains_key(&id) || self.pending_despawn.contains(&id) {
            return false;
        }
        self.pending_despawn.push(id);
        true
    }

    pub fn is_pending_despawn(&self, id: EntityId) -> bool {
        self.pending_despawn.contains(&id)
    }

    /// Present and not queued for removal
    pub fn is_live(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id) && !self.is_pending_despawn(id)
    }

    /// Removes every marked entity, in marking order
    pub fn flush_despawns(&mut self) -> Vec<Entity> {
        let pending = std::mem::take(&mut self.pending_despawn);
        pending
            .into_iter()
            .filter_map(|id| self.remove_now(id))
            .collect()
    }

    /// Removes an entity immediately
    pub fn remove_now(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.pending_despawn.retain(|pending| *pending != id);
        if let Some(owner) = entity.owner {
            if self.avatars.get(&owner) == Some(&id) {
                self.avatars.remove(&owner);
            }
        }
        debug!("Despawned {:?} {}", entity.kind(), id);
        Some(entity)
    }

    pub fn avatar_of(&self, client: ClientId) -> Option<EntityId> {
        self.avatars.get(&client).copied()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// Avatar entity ids in owner order
    pub fn avatar_ids(&self) -> Vec<EntityId> {
        let mut owners: Vec<_> = self.avatars.iter().collect();
        owners.sort_by_key(|(owner, _)| **owner);
        owners.into_iter().map(|(_, id)| *id).collect()
    }

    /// Projectiles fired by `shooter` that are not queued for removal
    pub fn live_projectiles_of(&self, shooter: ClientId) -> usize {
        self.entities
            .values()
            .filter(|e| matches!(&e.body, Body::Projectile(p) if p.shooter == shooter))
            .filter(|e| !self.is_pending_despawn(e.id))
            .count()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities.values().filter(|e| e.kind() == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn snapshots(&self) -> Vec<EntitySnapshot> {
        self.entities.values().map(Entity::snapshot).collect()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
