//! The authoritative session context
//!
//! A `Session` is built once by the server entry point and owned by its main
//! loop; nothing here is global. Clients never touch state directly: every
//! mutation arrives as an `Envelope` in the inbox, and `tick` applies them in
//! arrival order before advancing the simulation. Whatever changed during the
//! tick comes back as an ordered list of `Update`s for the network layer to
//! broadcast.

use crate::combat::{self, ContactOutcome};
use crate::config::ServerConfig;
use crate::directory::SessionDirectory;
use crate::entity::{Body, EntityRegistry};
use crate::error::Rejection;
use crate::records::{PlayerRecord, PlayerRecordStore};
use crate::transition::SceneController;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    check_overlap, radius_of, ClientId, CosmeticSlot, EntityId, EntityKind, Phase, Request,
    SessionSnapshot, Update, Vec3, ENEMY_SPEED, PROJECTILE_BASE_DAMAGE, PROJECTILE_SPEED,
};
use std::collections::VecDeque;

/// A request tagged with the connection it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub requester: ClientId,
    pub request: Request,
}

pub struct Session {
    config: ServerConfig,
    directory: SessionDirectory,
    entities: EntityRegistry,
    scene: SceneController,
    records: PlayerRecordStore,
    rng: StdRng,
    inbox: VecDeque<Envelope>,
    outbox: Vec<Update>,
    tick: u32,
}

impl Session {
    pub fn new(config: ServerConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            directory: SessionDirectory::new(config.max_players, config.lobby_spawn_points.clone()),
            scene: SceneController::new(config.game_spawn_points.clone()),
            entities: EntityRegistry::new(),
            records: PlayerRecordStore::new(),
            rng,
            inbox: VecDeque::new(),
            outbox: Vec::new(),
            tick: 0,
            config,
        }
    }

    /// Queues a request for the next tick
    pub fn submit(&mut self, requester: ClientId, request: Request) {
        self.inbox.push_back(Envelope { requester, request });
    }

    pub fn pending_requests(&self) -> usize {
        self.inbox.len()
    }

    /// Validates and applies a single request immediately
    pub fn handle_request(&mut self, requester: ClientId, request: Request) -> Result<(), Rejection> {
        match request {
            Request::Announce { name } => self.announce(requester, &name).map(|_| ()),
            Request::ToggleReady => self.directory.toggle_ready(requester).map(|_| ()),
            Request::StartGame => self.start_game(requester),
            Request::ChangeCosmetic { slot, index } => self.change_cosmetic(requester, slot, index),
            Request::Move { position } => self.move_avatar(requester, position),
            Request::Fire { direction } => self.fire(requester, direction).map(|_| ()),
            Request::Damage { target, amount } => self.request_damage(requester, target, amount),
            Request::ClaimBuff { pickup } => self.claim_buff(requester, pickup).map(|_| ()),
            Request::Leave => {
                self.disconnect(requester);
                Ok(())
            }
        }
    }

    /// Adds a participant and spawns their avatar at the next lobby point
    pub fn announce(&mut self, client: ClientId, name: &str) -> Result<EntityId, Rejection> {
        if self.scene.phase() != Phase::Lobby {
            return Err(Rejection::WrongPhase);
        }
        let point = self.directory.announce(client, name)?;
        let account = self
            .directory
            .get(client)
            .map(|p| p.name.clone())
            .unwrap_or_default();

        let id = self.entities.spawn_avatar(client, &account, point);
        self.push_spawned(id);
        self.restore_record(id, &account)?;
        Ok(id)
    }

    fn restore_record(&mut self, id: EntityId, account: &str) -> Result<(), Rejection> {
        let record = match self.records.get(account) {
            Some(record) => record.clone(),
            None => return Ok(()),
        };
        if let Some(entity) = self.entities.get_mut(id) {
            let health = record.health.clamp(1, entity.max_health);
            entity.health.set(health)?;
            if let Some(avatar) = entity.avatar_mut() {
                avatar.attack.set(record.attack)?;
            }
            info!(
                "Restored '{}' with health {} and attack {}",
                account, health, record.attack
            );
        }
        Ok(())
    }

    /// Starts gameplay if the coordinator asks and everyone is ready
    pub fn start_game(&mut self, requester: ClientId) -> Result<(), Rejection> {
        self.scene.check_start(requester, &self.directory)?;
        self.scene.enter_gameplay(&mut self.entities)?;

        for point in self.config.enemy_spawns.clone() {
            let id = self.entities.spawn_enemy(point, ENEMY_SPEED);
            self.push_spawned(id);
        }
        for point in self.config.pickup_spawns.clone() {
            let id = self.entities.spawn_pickup(point);
            self.push_spawned(id);
        }
        self.directory.clear();
        Ok(())
    }

    pub fn change_cosmetic(&mut self, client: ClientId, slot: CosmeticSlot, index: i32) -> Result<(), Rejection> {
        let id = self.entities.avatar_of(client).ok_or(Rejection::NoAvatar(client))?;
        let catalog = self.config.cosmetics;
        let avatar = self
            .entities
            .get_mut(id)
            .and_then(|e| e.avatar_mut())
            .ok_or(Rejection::MissingEntity(id))?;

        match avatar.cosmetics.select(&catalog, slot, index)? {
            Some(_) => Ok(()),
            None => Err(Rejection::CosmeticOutOfRange { slot, index }),
        }
    }

    /// Applies a client-driven movement to the client's own avatar
    pub fn move_avatar(&mut self, client: ClientId, position: Vec3) -> Result<(), Rejection> {
        if !position.is_finite() {
            return Err(Rejection::InvalidPayload("position must be finite"));
        }
        let id = self.entities.avatar_of(client).ok_or(Rejection::NoAvatar(client))?;
        let entity = self.entities.get_mut(id).ok_or(Rejection::MissingEntity(id))?;
        let enabled = entity
            .avatar()
            .map(|avatar| *avatar.control_enabled.get())
            .unwrap_or(false);
        if !enabled {
            return Err(Rejection::ControlDisabled(client));
        }
        entity.position.set(position)?;
        Ok(())
    }

    /// Spawns a projectile from the client's avatar
    ///
    /// Damage is fixed at creation: base damage plus the shooter's attack.
    pub fn fire(&mut self, client: ClientId, direction: Vec3) -> Result<EntityId, Rejection> {
        if self.scene.phase() != Phase::Gameplay {
            return Err(Rejection::WrongPhase);
        }
        let magnitude = direction.length();
        if !magnitude.is_finite() || magnitude == 0.0 {
            return Err(Rejection::InvalidPayload("direction must be finite and non-zero"));
        }
        let id = self.entities.avatar_of(client).ok_or(Rejection::NoAvatar(client))?;
        let entity = self.entities.get(id).ok_or(Rejection::MissingEntity(id))?;
        let avatar = entity.avatar().ok_or(Rejection::MissingEntity(id))?;
        if !*avatar.control_enabled.get() {
            return Err(Rejection::ControlDisabled(client));
        }
        let limit = self.config.max_projectiles_per_client;
        if self.entities.live_projectiles_of(client) >= limit {
            return Err(Rejection::ProjectileLimit { client, limit });
        }

        let damage = PROJECTILE_BASE_DAMAGE + *avatar.attack.get();
        let origin = *entity.position.get();
        let velocity = direction.normalized() * PROJECTILE_SPEED;

        let projectile = self.entities.spawn_projectile(client, origin, velocity, damage);
        self.push_spawned(projectile);
        debug!("Client {} fired projectile {} for {} damage", client, projectile, damage);
        Ok(projectile)
    }

    /// Damage requested by a client; only allowed against its own avatar
    pub fn request_damage(&mut self, client: ClientId, target: EntityId, amount: i32) -> Result<(), Rejection> {
        if self.entities.avatar_of(client) != Some(target) {
            return Err(Rejection::NotOwner { client, entity: target });
        }
        combat::apply_damage(&mut self.entities, target, amount).map(|_| ())
    }

    /// Buff claim reported by a client touching a pickup
    pub fn claim_buff(&mut self, client: ClientId, pickup: EntityId) -> Result<i32, Rejection> {
        let avatar_id = self.entities.avatar_of(client).ok_or(Rejection::NoAvatar(client))?;
        let avatar_pos = self
            .entities
            .get(avatar_id)
            .map(|e| *e.position.get())
            .ok_or(Rejection::MissingEntity(avatar_id))?;
        let pickup_entity = self.entities.get(pickup).ok_or(Rejection::MissingEntity(pickup))?;
        if pickup_entity.kind() != EntityKind::Pickup {
            return Err(Rejection::InvalidPayload("target is not a pickup"));
        }
        if !check_overlap(
            avatar_pos,
            radius_of(EntityKind::Avatar),
            *pickup_entity.position.get(),
            radius_of(EntityKind::Pickup),
        ) {
            return Err(Rejection::OutOfReach(pickup));
        }
        combat::apply_buff(&mut self.entities, &mut self.rng, pickup, avatar_id)
    }

    /// Removes a client from the roster and queues their avatar for despawn
    ///
    /// Returns false if the client had neither a roster entry nor an avatar.
    pub fn disconnect(&mut self, client: ClientId) -> bool {
        let left_roster = self.directory.remove(client);
        let despawned = self
            .entities
            .avatar_of(client)
            .map(|id| self.entities.mark_for_despawn(id))
            .unwrap_or(false);
        if left_roster || despawned {
            info!("Client {} left the session", client);
        }
        left_roster || despawned
    }

    /// Resolves an overlap reported between two entities
    pub fn handle_contact(&mut self, a: EntityId, b: EntityId) -> ContactOutcome {
        combat::resolve_contact(&mut self.entities, &mut self.rng, a, b)
    }

    /// A projectile hit level geometry
    pub fn handle_environment_contact(&mut self, projectile: EntityId) -> ContactOutcome {
        combat::environment_contact(&mut self.entities, projectile)
    }

    /// Runs one authoritative step and returns the changes to broadcast
    pub fn tick(&mut self, dt: f32) -> Vec<Update> {
        self.tick = self.tick.wrapping_add(1);

        while let Some(envelope) = self.inbox.pop_front() {
            let Envelope { requester, request } = envelope;
            let kind = format!("{:?}", request);
            if let Err(reason) = self.handle_request(requester, request) {
                debug!("Dropped request {} from client {}: {}", kind, requester, reason);
            }
        }

        self.advance_projectiles(dt);
        if self.scene.phase() == Phase::Gameplay {
            self.advance_enemies(dt);
        }
        self.detect_contacts();

        self.flush()
    }

    /// Despawns every avatar, saving player records, and returns the final updates
    pub fn end(&mut self) -> Vec<Update> {
        for id in self.entities.avatar_ids() {
            self.entities.mark_for_despawn(id);
        }
        self.flush()
    }

    fn flush(&mut self) -> Vec<Update> {
        if let Some(stamped) = self.scene.take_dirty() {
            self.outbox.push(Update::Phase(stamped));
        }
        if let Some(stamped) = self.directory.take_dirty() {
            self.outbox.push(Update::Roster(stamped));
        }
        for entity in self.entities.iter_mut() {
            entity.drain_field_updates(&mut self.outbox);
        }

        for entity in self.entities.flush_despawns() {
            if let Some(avatar) = entity.avatar() {
                self.records.save(PlayerRecord {
                    account_id: avatar.account_id.clone(),
                    position: *entity.position.get(),
                    health: *entity.health.get(),
                    attack: *avatar.attack.get(),
                });
            }
            self.outbox.push(Update::Despawned { entity: entity.id });
        }

        std::mem::take(&mut self.outbox)
    }

    fn push_spawned(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get(id) {
            self.outbox.push(Update::Spawned(entity.snapshot()));
        }
    }

    fn advance_projectiles(&mut self, dt: f32) {
        let mut expired = Vec::new();
        for entity in self.entities.iter_mut() {
            if let Body::Projectile(projectile) = &mut entity.body {
                projectile.remaining_secs -= dt;
                if projectile.remaining_secs <= 0.0 {
                    expired.push(entity.id);
                    continue;
                }
                let next = *entity.position.get() + projectile.velocity * dt;
                if let Err(e) = entity.position.set(next) {
                    warn!("Projectile {} did not move: {}", entity.id, e);
                }
            }
        }
        for id in expired {
            self.entities.mark_for_despawn(id);
        }
    }

    /// Moves each enemy straight toward the closest avatar
    fn advance_enemies(&mut self, dt: f32) {
        let targets: Vec<Vec3> = self
            .entities
            .iter()
            .filter(|e| e.kind() == EntityKind::Avatar)
            .map(|e| *e.position.get())
            .collect();
        if targets.is_empty() {
            return;
        }

        for entity in self.entities.iter_mut() {
            let speed = match entity.body {
                Body::Enemy { speed } => speed,
                _ => continue,
            };
            let current = *entity.position.get();
            let closest = targets.iter().copied().min_by(|a, b| {
                current
                    .distance(*a)
                    .partial_cmp(&current.distance(*b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            if let Some(target) = closest {
                let offset = target - current;
                let step = (speed * dt).min(offset.length());
                if let Err(e) = entity.position.set(current + offset.normalized() * step) {
                    warn!("Enemy {} did not move: {}", entity.id, e);
                }
            }
        }
    }

    fn detect_contacts(&mut self) {
        let bodies: Vec<(EntityId, EntityKind, Vec3)> = self
            .entities
            .iter()
            .filter(|e| self.entities.is_live(e.id))
            .map(|e| (e.id, e.kind(), *e.position.get()))
            .collect();

        let mut pairs = Vec::new();
        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                let (id_a, kind_a, pos_a) = bodies[i];
                let (id_b, kind_b, pos_b) = bodies[j];
                if !interacts(kind_a, kind_b) {
                    continue;
                }
                if check_overlap(pos_a, radius_of(kind_a), pos_b, radius_of(kind_b)) {
                    pairs.push((id_a, id_b));
                }
            }
        }

        for (a, b) in pairs {
            let outcome = self.handle_contact(a, b);
            if outcome != ContactOutcome::Ignored && outcome != ContactOutcome::PassThrough {
                debug!("Contact {} <-> {}: {:?}", a, b, outcome);
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.scene.snapshot(),
            roster: self.directory.snapshot(),
            entities: self.entities.snapshots(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.scene.phase()
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn records(&self) -> &PlayerRecordStore {
        &self.records
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }
}

/// Whether a pair of kinds has any contact rule at all
fn interacts(a: EntityKind, b: EntityKind) -> bool {
    use EntityKind::*;
    match (a, b) {
        (Projectile, Projectile) => false,
        (Projectile, _) | (_, Projectile) => true,
        (Avatar, Enemy) | (Enemy, Avatar) => true,
        (Avatar, Pickup) | (Pickup, Avatar) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{FieldValue, PLAYER_BASE_ATTACK, PLAYER_MAX_HEALTH, PROJECTILE_LIFETIME_SECS};

    fn config() -> ServerConfig {
        ServerConfig {
            rng_seed: Some(3),
            enemy_spawns: vec![],
            pickup_spawns: vec![],
            ..ServerConfig::default()
        }
    }

    fn lobby(players: &[(ClientId, &str)]) -> Session {
        let mut session = Session::new(config());
        for (id, name) in players {
            session.announce(*id, name).unwrap();
        }
        session.tick(0.0);
        session
    }

    fn started(players: &[(ClientId, &str)]) -> Session {
        let mut session = lobby(players);
        for (id, _) in players {
            session.handle_request(*id, Request::ToggleReady).unwrap();
        }
        session.start_game(players[0].0).unwrap();
        session.tick(0.0);
        session
    }

    fn avatar_pos(session: &Session, client: ClientId) -> Vec3 {
        let id = session.entities().avatar_of(client).unwrap();
        *session.entities().get(id).unwrap().position.get()
    }

    #[test]
    fn test_announce_spawns_avatar_with_control_disabled() {
        let mut session = Session::new(config());
        let id = session.announce(1, "Ana").unwrap();

        let entity = session.entities().get(id).unwrap();
        assert_eq!(entity.owner, Some(1));
        assert!(!*entity.avatar().unwrap().control_enabled.get());
        assert_eq!(*entity.position.get(), session.config().lobby_spawn_points[0]);

        let updates = session.tick(0.0);
        assert!(matches!(updates[0], Update::Spawned(ref s) if s.id == id));
        assert!(updates.iter().any(|u| matches!(u, Update::Roster(r) if r.value.len() == 1)));
    }

    #[test]
    fn test_duplicate_announce_spawns_nothing() {
        let mut session = lobby(&[(1, "Ana")]);
        assert_eq!(session.announce(1, "Ana"), Err(Rejection::DuplicateAnnounce(1)));
        assert_eq!(session.entities().count(EntityKind::Avatar), 1);
    }

    #[test]
    fn test_inbox_is_processed_in_arrival_order() {
        let mut session = lobby(&[(1, "Ana")]);
        session.submit(1, Request::ToggleReady);
        session.submit(1, Request::ToggleReady);
        session.submit(1, Request::ToggleReady);
        assert_eq!(session.pending_requests(), 3);

        session.tick(0.0);
        assert_eq!(session.pending_requests(), 0);
        assert!(session.directory().is_ready(1));
    }

    #[test]
    fn test_start_scenario_with_three_players() {
        let mut session = lobby(&[(1, "Ana"), (2, "Luis"), (3, "Mar")]);
        session.submit(1, Request::ToggleReady);
        session.submit(2, Request::ToggleReady);
        session.submit(1, Request::StartGame);
        session.tick(0.0);
        assert_eq!(session.phase(), Phase::Lobby);

        session.submit(3, Request::ToggleReady);
        session.submit(1, Request::StartGame);
        let updates = session.tick(0.0);
        assert_eq!(session.phase(), Phase::Gameplay);
        assert!(updates.iter().any(|u| matches!(u, Update::Phase(p) if p.value == Phase::Gameplay)));

        for client in [1, 2, 3] {
            let id = session.entities().avatar_of(client).unwrap();
            let avatar = session.entities().get(id).unwrap().avatar().unwrap();
            assert!(*avatar.control_enabled.get());
        }
        assert_eq!(avatar_pos(&session, 1), session.config().game_spawn_points[0]);
        assert_eq!(avatar_pos(&session, 2), session.config().game_spawn_points[1]);
        assert!(session.directory().is_empty());
    }

    #[test]
    fn test_only_coordinator_can_start() {
        let mut session = lobby(&[(1, "Ana"), (2, "Luis")]);
        session.handle_request(1, Request::ToggleReady).unwrap();
        session.handle_request(2, Request::ToggleReady).unwrap();

        assert_eq!(
            session.handle_request(2, Request::StartGame),
            Err(Rejection::NotCoordinator(2))
        );
        assert_eq!(session.phase(), Phase::Lobby);
    }

    #[test]
    fn test_announce_after_start_is_rejected() {
        let mut session = started(&[(1, "Ana")]);
        assert_eq!(session.announce(2, "Late"), Err(Rejection::WrongPhase));
        assert!(session.entities().avatar_of(2).is_none());
    }

    #[test]
    fn test_start_spawns_enemies_and_pickups() {
        let mut session = Session::new(ServerConfig {
            rng_seed: Some(3),
            ..ServerConfig::default()
        });
        session.announce(1, "Ana").unwrap();
        session.handle_request(1, Request::ToggleReady).unwrap();
        session.tick(0.0);
        session.start_game(1).unwrap();

        let expected_enemies = session.config().enemy_spawns.len();
        let expected_pickups = session.config().pickup_spawns.len();
        assert_eq!(session.entities().count(EntityKind::Enemy), expected_enemies);
        assert_eq!(session.entities().count(EntityKind::Pickup), expected_pickups);

        let spawned = session
            .tick(0.0)
            .into_iter()
            .filter(|u| matches!(u, Update::Spawned(_)))
            .count();
        assert_eq!(spawned, expected_enemies + expected_pickups);
    }

    #[test]
    fn test_cosmetic_requests() {
        let mut session = lobby(&[(1, "Ana")]);
        let id = session.entities().avatar_of(1).unwrap();

        assert_eq!(
            session.change_cosmetic(1, CosmeticSlot::MainBody, 6),
            Err(Rejection::CosmeticOutOfRange {
                slot: CosmeticSlot::MainBody,
                index: 6
            })
        );
        session.change_cosmetic(1, CosmeticSlot::MainBody, 4).unwrap();
        session.change_cosmetic(1, CosmeticSlot::MainBody, 4).unwrap();
        session.change_cosmetic(1, CosmeticSlot::Glove, -1).unwrap();
        assert_eq!(session.change_cosmetic(9, CosmeticSlot::Glove, 1), Err(Rejection::NoAvatar(9)));

        let updates = session.tick(0.0);
        let cosmetic_updates: Vec<_> = updates
            .iter()
            .filter(|u| matches!(u, Update::Field { entity, value: FieldValue::Cosmetic { .. }, .. } if *entity == id))
            .collect();
        assert_eq!(cosmetic_updates.len(), 1);

        let avatar = session.entities().get(id).unwrap().avatar().unwrap();
        assert_eq!(avatar.cosmetics.get(CosmeticSlot::MainBody), 4);
    }

    #[test]
    fn test_movement_requires_control() {
        let mut session = lobby(&[(1, "Ana")]);
        assert_eq!(
            session.move_avatar(1, Vec3::new(1.0, 0.0, 1.0)),
            Err(Rejection::ControlDisabled(1))
        );

        let mut session = started(&[(1, "Ana")]);
        session.move_avatar(1, Vec3::new(1.0, 0.0, 1.0)).unwrap();
        assert_eq!(avatar_pos(&session, 1), Vec3::new(1.0, 0.0, 1.0));
        assert!(session.move_avatar(1, Vec3::new(f32::NAN, 0.0, 0.0)).is_err());
    }

    #[test]
    fn test_fire_uses_current_attack() {
        let mut session = started(&[(1, "Ana"), (2, "Luis")]);
        assert!(session.fire(1, Vec3::ZERO).is_err());

        let projectile = session.fire(1, Vec3::new(0.0, 0.0, 2.0)).unwrap();
        let entity = session.entities().get(projectile).unwrap();
        match &entity.body {
            Body::Projectile(state) => {
                assert_eq!(state.damage, PROJECTILE_BASE_DAMAGE + PLAYER_BASE_ATTACK);
                assert_eq!(state.shooter, 1);
                assert_approx_eq!(state.velocity.z, PROJECTILE_SPEED, 0.0001);
            }
            _ => panic!("expected a projectile"),
        }
    }

    #[test]
    fn test_fire_is_capped_per_client() {
        let mut session = started(&[(1, "Ana"), (2, "Luis")]);
        let limit = session.config().max_projectiles_per_client;
        for _ in 0..limit * 3 {
            session.submit(1, Request::Fire { direction: Vec3::new(1.0, 0.0, 0.0) });
        }
        session.tick(0.0);
        assert_eq!(session.entities().live_projectiles_of(1), limit);
        assert_eq!(
            session.fire(1, Vec3::new(1.0, 0.0, 0.0)),
            Err(Rejection::ProjectileLimit { client: 1, limit })
        );
        assert!(session.fire(2, Vec3::new(1.0, 0.0, 0.0)).is_ok());

        session.tick(PROJECTILE_LIFETIME_SECS);
        assert_eq!(session.entities().live_projectiles_of(1), 0);
        assert!(session.fire(1, Vec3::new(1.0, 0.0, 0.0)).is_ok());
    }

    #[test]
    fn test_fire_rejects_direction_too_long_to_normalize() {
        let mut session = started(&[(1, "Ana")]);
        let huge = Vec3::new(1e30, 1e30, 1e30);
        assert!(huge.is_finite());
        assert!(matches!(session.fire(1, huge), Err(Rejection::InvalidPayload(_))));
        assert_eq!(session.entities().count(EntityKind::Projectile), 0);
    }

    #[test]
    fn test_fire_in_lobby_is_rejected() {
        let mut session = lobby(&[(1, "Ana")]);
        assert_eq!(
            session.fire(1, Vec3::new(1.0, 0.0, 0.0)),
            Err(Rejection::WrongPhase)
        );
    }

    #[test]
    fn test_projectile_expires_after_lifetime() {
        let mut session = started(&[(1, "Ana")]);
        let projectile = session.fire(1, Vec3::new(1.0, 0.0, 0.0)).unwrap();

        session.tick(1.0);
        assert!(session.entities().get(projectile).is_some());

        let updates = session.tick(PROJECTILE_LIFETIME_SECS);
        assert!(session.entities().get(projectile).is_none());
        assert!(updates.contains(&Update::Despawned { entity: projectile }));
    }

    #[test]
    fn test_projectile_hits_other_player_in_flight() {
        let mut session = started(&[(1, "Ana"), (2, "Luis")]);
        let target = session.entities().avatar_of(2).unwrap();
        session.move_avatar(1, Vec3::new(0.0, 0.0, 0.0)).unwrap();
        session.move_avatar(2, Vec3::new(0.0, 0.0, 1.5)).unwrap();

        let projectile = session.fire(1, Vec3::new(0.0, 0.0, 1.0)).unwrap();
        session.tick(0.1);

        assert!(session.entities().get(projectile).is_none());
        let health = *session.entities().get(target).unwrap().health.get();
        assert_eq!(health, PLAYER_MAX_HEALTH - PROJECTILE_BASE_DAMAGE - PLAYER_BASE_ATTACK);
    }

    #[test]
    fn test_damage_request_only_for_own_avatar() {
        let mut session = lobby(&[(1, "Ana"), (2, "Luis")]);
        let own = session.entities().avatar_of(1).unwrap();
        let other = session.entities().avatar_of(2).unwrap();

        assert_eq!(
            session.request_damage(1, other, 10),
            Err(Rejection::NotOwner { client: 1, entity: other })
        );
        session.request_damage(1, own, 100).unwrap();

        let health = *session.entities().get(own).unwrap().health.get();
        assert_eq!(health, PLAYER_MAX_HEALTH);
    }

    #[test]
    fn test_claim_buff_checks_reach() {
        let mut session = Session::new(ServerConfig {
            rng_seed: Some(3),
            enemy_spawns: vec![],
            pickup_spawns: vec![Vec3::new(30.0, 0.0, 30.0)],
            ..ServerConfig::default()
        });
        session.announce(1, "Ana").unwrap();
        session.handle_request(1, Request::ToggleReady).unwrap();
        session.start_game(1).unwrap();
        session.tick(0.0);

        let pickup = session
            .entities()
            .iter()
            .find(|e| e.kind() == EntityKind::Pickup)
            .map(|e| e.id)
            .unwrap();
        assert_eq!(session.claim_buff(1, pickup), Err(Rejection::OutOfReach(pickup)));

        session.move_avatar(1, Vec3::new(30.0, 0.0, 30.2)).unwrap();
        let amount = session.claim_buff(1, pickup).unwrap();
        assert_eq!(session.claim_buff(1, pickup), Err(Rejection::AlreadyApplied(pickup)));

        session.tick(0.0);
        let id = session.entities().avatar_of(1).unwrap();
        let attack = *session.entities().get(id).unwrap().avatar().unwrap().attack.get();
        assert_eq!(attack, PLAYER_BASE_ATTACK + amount);
        assert_eq!(session.entities().count(EntityKind::Pickup), 0);
    }

    #[test]
    fn test_enemies_chase_closest_avatar() {
        let mut session = Session::new(ServerConfig {
            rng_seed: Some(3),
            game_spawn_points: vec![Vec3::ZERO],
            enemy_spawns: vec![Vec3::new(10.0, 0.0, 0.0)],
            pickup_spawns: vec![],
            ..ServerConfig::default()
        });
        session.announce(1, "Ana").unwrap();
        session.handle_request(1, Request::ToggleReady).unwrap();
        session.start_game(1).unwrap();
        session.tick(0.0);

        session.tick(1.0);
        let enemy = session
            .entities()
            .iter()
            .find(|e| e.kind() == EntityKind::Enemy)
            .unwrap();
        assert_approx_eq!(enemy.position.get().x, 10.0 - ENEMY_SPEED, 0.0001);
    }

    #[test]
    fn test_enemy_reaching_avatar_is_removed() {
        let mut session = Session::new(ServerConfig {
            rng_seed: Some(3),
            game_spawn_points: vec![Vec3::ZERO],
            enemy_spawns: vec![Vec3::new(2.0, 0.0, 0.0)],
            pickup_spawns: vec![],
            ..ServerConfig::default()
        });
        session.announce(1, "Ana").unwrap();
        session.handle_request(1, Request::ToggleReady).unwrap();
        session.start_game(1).unwrap();
        session.tick(0.0);

        session.tick(1.0);
        assert_eq!(session.entities().count(EntityKind::Enemy), 0);
        let id = session.entities().avatar_of(1).unwrap();
        assert_eq!(*session.entities().get(id).unwrap().health.get(), PLAYER_MAX_HEALTH);
    }

    #[test]
    fn test_disconnect_saves_record_and_reannounce_restores_it() {
        let mut session = lobby(&[(1, "Ana"), (2, "Luis")]);
        let id = session.entities().avatar_of(1).unwrap();
        session.request_damage(1, id, 30).unwrap();
        session.tick(0.0);

        assert!(session.disconnect(1));
        assert!(!session.disconnect(1));
        let updates = session.tick(0.0);
        assert!(updates.contains(&Update::Despawned { entity: id }));
        assert!(!session.directory().contains(1));

        let record = session.records().get("Ana").unwrap();
        assert_eq!(record.health, PLAYER_MAX_HEALTH - 30);
        assert_eq!(record.attack, PLAYER_BASE_ATTACK);

        let new_id = session.announce(7, "Ana").unwrap();
        let health = *session.entities().get(new_id).unwrap().health.get();
        assert_eq!(health, PLAYER_MAX_HEALTH - 30);
    }

    #[test]
    fn test_leave_request_matches_disconnect() {
        let mut session = lobby(&[(1, "Ana")]);
        session.submit(1, Request::Leave);
        session.tick(0.0);
        assert!(session.directory().is_empty());
        assert_eq!(session.entities().count(EntityKind::Avatar), 0);
    }

    #[test]
    fn test_end_saves_every_avatar() {
        let mut session = started(&[(1, "Ana"), (2, "Luis")]);
        let updates = session.end();
        assert_eq!(
            updates.iter().filter(|u| matches!(u, Update::Despawned { .. })).count(),
            2
        );
        assert_eq!(session.records().len(), 2);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let session = lobby(&[(1, "Ana"), (2, "Luis")]);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase.value, Phase::Lobby);
        assert_eq!(snapshot.roster.value.len(), 2);
        assert_eq!(snapshot.entities.len(), 2);
    }
}
