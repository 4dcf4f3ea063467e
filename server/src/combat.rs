//! Authoritative damage, contact and buff resolution
//!
//! Everything here runs on the authority only, against the entity registry
//! owned by the session. Removal always goes through
//! `EntityRegistry::mark_for_despawn`, so an entity hit several times in one
//! tick disappears exactly once.

use crate::entity::{Body, EntityRegistry};
use crate::error::Rejection;
use log::{debug, info};
use rand::Rng;
use shared::{EntityId, EntityKind, BUFF_MAX_EXCLUSIVE, BUFF_MIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Health dropped but stayed above zero
    Damaged { remaining: i32 },
    /// An avatar reached zero and was restored to full health in place
    Respawned,
    /// A non-avatar reached zero and is queued for removal
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOutcome {
    Ignored,
    /// A projectile touched its own shooter and keeps flying
    PassThrough,
    Hit {
        target: EntityId,
        outcome: DamageOutcome,
    },
    ProjectileConsumed,
    EnemyTouched {
        enemy: EntityId,
    },
    Buffed {
        avatar: EntityId,
        amount: i32,
    },
}

/// Subtracts `amount` from the target's health
///
/// The death check runs on the unclamped result; avatars are reset to their
/// maximum, anything else is queued for despawn.
pub fn apply_damage(
    entities: &mut EntityRegistry,
    target: EntityId,
    amount: i32,
) -> Result<DamageOutcome, Rejection> {
    if amount <= 0 {
        return Err(Rejection::InvalidPayload("damage must be positive"));
    }
    if !entities.is_live(target) {
        return Err(Rejection::MissingEntity(target));
    }
    let entity = entities
        .get_mut(target)
        .ok_or(Rejection::MissingEntity(target))?;

    let remaining = *entity.health.get() - amount;
    if remaining > 0 {
        entity.health.set(remaining)?;
        return Ok(DamageOutcome::Damaged { remaining });
    }

    if entity.kind() == EntityKind::Avatar {
        let max = entity.max_health;
        entity.health.set(max)?;
        info!("Avatar {} was knocked out and respawned in place", target);
        Ok(DamageOutcome::Respawned)
    } else {
        entities.mark_for_despawn(target);
        info!("Entity {} destroyed", target);
        Ok(DamageOutcome::Killed)
    }
}

/// Applies a random attack buff from a pickup to an avatar
///
/// The draw happens here, on the authority, at most once per pickup.
pub fn apply_buff<R: Rng>(
    entities: &mut EntityRegistry,
    rng: &mut R,
    pickup: EntityId,
    avatar: EntityId,
) -> Result<i32, Rejection> {
    match entities.get(pickup).map(|e| &e.body) {
        Some(Body::Pickup(state)) if state.applied => return Err(Rejection::AlreadyApplied(pickup)),
        Some(Body::Pickup(_)) if entities.is_live(pickup) => {}
        Some(Body::Pickup(_)) => return Err(Rejection::AlreadyApplied(pickup)),
        _ => return Err(Rejection::MissingEntity(pickup)),
    }
    if !entities.is_live(avatar) {
        return Err(Rejection::MissingEntity(avatar));
    }

    let amount = rng.gen_range(BUFF_MIN..BUFF_MAX_EXCLUSIVE);
    let state = entities
        .get_mut(avatar)
        .and_then(|e| e.avatar_mut())
        .ok_or(Rejection::MissingEntity(avatar))?;
    state.attack.update(|attack| *attack += amount)?;
    let attack = *state.attack.get();

    if let Some(Body::Pickup(state)) = entities.get_mut(pickup).map(|e| &mut e.body) {
        state.applied = true;
    }
    entities.mark_for_despawn(pickup);
    info!(
        "Pickup {} buffed avatar {} by {} (attack now {})",
        pickup, avatar, amount, attack
    );
    Ok(amount)
}

/// Resolves one overlap between two entities, in either order
pub fn resolve_contact<R: Rng>(
    entities: &mut EntityRegistry,
    rng: &mut R,
    a: EntityId,
    b: EntityId,
) -> ContactOutcome {
    if a == b || !entities.is_live(a) || !entities.is_live(b) {
        return ContactOutcome::Ignored;
    }
    let (kind_a, kind_b) = match (entities.get(a), entities.get(b)) {
        (Some(ea), Some(eb)) => (ea.kind(), eb.kind()),
        _ => return ContactOutcome::Ignored,
    };

    use EntityKind::*;
    match (kind_a, kind_b) {
        (Projectile, Projectile) => ContactOutcome::Ignored,
        (Projectile, _) => projectile_contact(entities, a, b),
        (_, Projectile) => projectile_contact(entities, b, a),
        (Avatar, Enemy) => enemy_contact(entities, b),
        (Enemy, Avatar) => enemy_contact(entities, a),
        (Avatar, Pickup) => buff_contact(entities, rng, b, a),
        (Pickup, Avatar) => buff_contact(entities, rng, a, b),
        _ => ContactOutcome::Ignored,
    }
}

/// A projectile hit level geometry and is consumed
pub fn environment_contact(entities: &mut EntityRegistry, projectile: EntityId) -> ContactOutcome {
    match entities.get(projectile).map(|e| e.kind()) {
        Some(EntityKind::Projectile) if entities.mark_for_despawn(projectile) => {
            ContactOutcome::ProjectileConsumed
        }
        _ => ContactOutcome::Ignored,
    }
}

fn projectile_contact(entities: &mut EntityRegistry, projectile: EntityId, other: EntityId) -> ContactOutcome {
    let (shooter, damage) = match entities.get(projectile).map(|e| &e.body) {
        Some(Body::Projectile(state)) => (state.shooter, state.damage),
        _ => return ContactOutcome::Ignored,
    };
    let (other_kind, other_owner) = match entities.get(other) {
        Some(entity) => (entity.kind(), entity.owner),
        None => return ContactOutcome::Ignored,
    };

    match other_kind {
        EntityKind::Avatar if other_owner == Some(shooter) => ContactOutcome::PassThrough,
        EntityKind::Avatar | EntityKind::Enemy => {
            entities.mark_for_despawn(projectile);
            match apply_damage(entities, other, damage) {
                Ok(outcome) => ContactOutcome::Hit {
                    target: other,
                    outcome,
                },
                Err(reason) => {
                    debug!("Projectile {} hit {} without effect: {}", projectile, other, reason);
                    ContactOutcome::ProjectileConsumed
                }
            }
        }
        _ => {
            entities.mark_for_despawn(projectile);
            ContactOutcome::ProjectileConsumed
        }
    }
}

fn enemy_contact(entities: &mut EntityRegistry, enemy: EntityId) -> ContactOutcome {
    if entities.mark_for_despawn(enemy) {
        info!("Enemy {} was touched and removed", enemy);
        ContactOutcome::EnemyTouched { enemy }
    } else {
        ContactOutcome::Ignored
    }
}

fn buff_contact<R: Rng>(
    entities: &mut EntityRegistry,
    rng: &mut R,
    pickup: EntityId,
    avatar: EntityId,
) -> ContactOutcome {
    match apply_buff(entities, rng, pickup, avatar) {
        Ok(amount) => ContactOutcome::Buffed { avatar, amount },
        Err(reason) => {
            debug!("Pickup {} ignored contact: {}", pickup, reason);
            ContactOutcome::Ignored
        }
    }
}
