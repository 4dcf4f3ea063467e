//! Client-side mirror of the authoritative session
//!
//! Every field here is a `Replicated` in the mirror role: it can only change by
//! accepting a newer revision from the server, and stale revisions are
//! dropped. Observers can subscribe to any field to react to changes, which is
//! how a front end would redraw a roster or follow its avatar.

use log::{debug, info};
use shared::{
    roster_all_ready, roster_coordinator, ClientId, CosmeticSelection, EntityId, EntityKind,
    EntitySnapshot, FieldValue, Packet, Participant, Phase, Replicated, SessionSnapshot, Stamped,
    Update, Vec3,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// How long, in server ticks, a despawned id is remembered
const TOMBSTONE_TICKS: u32 = 300;

#[derive(Debug)]
pub struct MirrorAvatar {
    pub attack: Replicated<i32>,
    pub cosmetics: CosmeticSelection,
    pub control_enabled: Replicated<bool>,
}

#[derive(Debug)]
pub struct MirrorEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub owner: Option<ClientId>,
    pub position: Replicated<Vec3>,
    pub health: Replicated<i32>,
    pub max_health: i32,
    pub avatar: Option<MirrorAvatar>,
}

impl MirrorEntity {
    fn from_snapshot(snapshot: EntitySnapshot) -> Self {
        Self {
            id: snapshot.id,
            kind: snapshot.kind,
            owner: snapshot.owner,
            position: Replicated::mirror(snapshot.position),
            health: Replicated::mirror(snapshot.health),
            max_health: snapshot.max_health,
            avatar: snapshot.avatar.map(|avatar| MirrorAvatar {
                attack: Replicated::mirror(avatar.attack),
                cosmetics: CosmeticSelection::mirror(avatar.cosmetics),
                control_enabled: Replicated::mirror(avatar.control_enabled),
            }),
        }
    }

    fn merge_snapshot(&mut self, snapshot: EntitySnapshot) {
        accept(&mut self.position, snapshot.position);
        accept(&mut self.health, snapshot.health);
        if let (Some(avatar), Some(incoming)) = (self.avatar.as_mut(), snapshot.avatar) {
            accept(&mut avatar.attack, incoming.attack);
            accept(&mut avatar.control_enabled, incoming.control_enabled);
            for (slot, stamped) in shared::CosmeticSlot::ALL.into_iter().zip(incoming.cosmetics) {
                accept(avatar.cosmetics.field_mut(slot), stamped);
            }
        }
    }

    /// Applies one field change; returns true if the value was accepted
    fn apply_field(&mut self, revision: u32, value: FieldValue) -> bool {
        match value {
            FieldValue::Position(value) => accept(&mut self.position, Stamped { revision, value }),
            FieldValue::Health(value) => accept(&mut self.health, Stamped { revision, value }),
            FieldValue::Attack(value) => match self.avatar.as_mut() {
                Some(avatar) => accept(&mut avatar.attack, Stamped { revision, value }),
                None => false,
            },
            FieldValue::Cosmetic { slot, index } => match self.avatar.as_mut() {
                Some(avatar) => accept(
                    avatar.cosmetics.field_mut(slot),
                    Stamped {
                        revision,
                        value: index,
                    },
                ),
                None => false,
            },
            FieldValue::ControlEnabled(value) => match self.avatar.as_mut() {
                Some(avatar) => accept(&mut avatar.control_enabled, Stamped { revision, value }),
                None => false,
            },
        }
    }
}

fn accept<T: Clone + PartialEq>(field: &mut Replicated<T>, incoming: Stamped<T>) -> bool {
    field.apply_remote(incoming).unwrap_or(false)
}

/// Everything one client knows about the session
pub struct MirrorWorld {
    client_id: Option<ClientId>,
    phase: Replicated<Phase>,
    roster: Replicated<Vec<Participant>>,
    entities: BTreeMap<EntityId, MirrorEntity>,
    /// Entity ids are never reused, so a late `Spawned` for one of these is
    /// stale. Keyed by the tick the despawn was seen on.
    despawned: HashMap<EntityId, u32>,
    last_tick: u32,
}

impl MirrorWorld {
    pub fn new() -> Self {
        Self {
            client_id: None,
            phase: Replicated::mirror(Stamped {
                revision: 0,
                value: Phase::Lobby,
            }),
            roster: Replicated::mirror(Stamped {
                revision: 0,
                value: Vec::new(),
            }),
            entities: BTreeMap::new(),
            despawned: HashMap::new(),
            last_tick: 0,
        }
    }

    pub fn set_client_id(&mut self, client_id: ClientId) {
        self.client_id = Some(client_id);
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// Feeds a server packet into the mirror; returns true if it carried state
    pub fn apply_packet(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::Snapshot(snapshot) => {
                self.apply_snapshot(snapshot);
                true
            }
            Packet::Updates { tick, updates } => {
                self.last_tick = self.last_tick.max(tick);
                for update in updates {
                    self.apply_update(update);
                }
                true
            }
            _ => false,
        }
    }

    /// Reconciles with a full snapshot
    ///
    /// Entities missing from the snapshot are dropped; the rest merge field by
    /// field, so nothing newer than the snapshot is rolled back.
    pub fn apply_snapshot(&mut self, snapshot: SessionSnapshot) {
        accept(&mut self.phase, snapshot.phase);
        accept(&mut self.roster, snapshot.roster);

        let now = self.last_tick;
        self.despawned
            .retain(|_, seen| now.saturating_sub(*seen) <= TOMBSTONE_TICKS);

        let present: HashSet<EntityId> = snapshot.entities.iter().map(|e| e.id).collect();
        self.entities.retain(|id, _| present.contains(id));

        for entity in snapshot.entities {
            if self.despawned.contains_key(&entity.id) {
                continue;
            }
            match self.entities.get_mut(&entity.id) {
                Some(existing) => existing.merge_snapshot(entity),
                None => self.insert_entity(entity),
            }
        }
    }

    /// Applies one broadcast change; returns true if anything changed
    pub fn apply_update(&mut self, update: Update) -> bool {
        match update {
            Update::Phase(stamped) => {
                let changed = accept(&mut self.phase, stamped);
                if changed {
                    info!("Phase is now {:?}", self.phase.get());
                }
                changed
            }
            Update::Roster(stamped) => accept(&mut self.roster, stamped),
            Update::Spawned(snapshot) => {
                if self.despawned.contains_key(&snapshot.id) || self.entities.contains_key(&snapshot.id) {
                    return false;
                }
                debug!("Mirrored spawn of {:?} {}", snapshot.kind, snapshot.id);
                self.insert_entity(snapshot);
                true
            }
            Update::Despawned { entity } => {
                self.despawned.insert(entity, self.last_tick);
                self.entities.remove(&entity).is_some()
            }
            Update::Field {
                entity,
                revision,
                value,
            } => match self.entities.get_mut(&entity) {
                Some(mirror) => mirror.apply_field(revision, value),
                None => false,
            },
        }
    }

    fn insert_entity(&mut self, snapshot: EntitySnapshot) {
        let mut entity = MirrorEntity::from_snapshot(snapshot);
        if entity.owner.is_some() && entity.owner == self.client_id {
            let id = entity.id;
            entity.health.subscribe(move |old, new| {
                if old != new {
                    info!("Avatar {} health {} -> {}", id, old, new);
                }
            });
            if let Some(avatar) = entity.avatar.as_mut() {
                avatar.attack.subscribe(move |old, new| {
                    if old != new {
                        info!("Avatar {} attack {} -> {}", id, old, new);
                    }
                });
            }
        }
        self.entities.insert(entity.id, entity);
    }

    pub fn phase(&self) -> Phase {
        *self.phase.get()
    }

    /// For subscribing to phase changes
    pub fn phase_field_mut(&mut self) -> &mut Replicated<Phase> {
        &mut self.phase
    }

    pub fn roster(&self) -> &[Participant] {
        self.roster.get()
    }

    /// For subscribing to roster changes
    pub fn roster_field_mut(&mut self) -> &mut Replicated<Vec<Participant>> {
        &mut self.roster
    }

    pub fn entity(&self, id: EntityId) -> Option<&MirrorEntity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut MirrorEntity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &MirrorEntity> {
        self.entities.values()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities.values().filter(|e| e.kind == kind).count()
    }

    /// The avatar owned by this client, once spawned
    pub fn local_avatar(&self) -> Option<&MirrorEntity> {
        let client_id = self.client_id?;
        self.entities
            .values()
            .find(|e| e.kind == EntityKind::Avatar && e.owner == Some(client_id))
    }

    pub fn is_local_ready(&self) -> bool {
        match self.client_id {
            Some(id) => self.roster().iter().any(|p| p.id == id && p.ready),
            None => false,
        }
    }

    /// Whether this client should be offered the start action
    pub fn can_start(&self) -> bool {
        self.phase() == Phase::Lobby
            && self.client_id.is_some()
            && roster_coordinator(self.roster()) == self.client_id
            && roster_all_ready(self.roster())
    }

    pub fn last_tick(&self) -> u32 {
        self.last_tick
    }
}

impl Default for MirrorWorld {
    fn default() -> Self {
        Self::new()
    }
}
