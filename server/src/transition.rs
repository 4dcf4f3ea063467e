//! Lobby to gameplay phase transition

use crate::directory::{SessionDirectory, SpawnPool};
use crate::entity::EntityRegistry;
use crate::error::Rejection;
use log::{info, warn};
use shared::{ClientId, Phase, Replicated, Stamped, Vec3};

pub struct SceneController {
    phase: Replicated<Phase>,
    game_spawn_points: SpawnPool,
}

impl SceneController {
    pub fn new(game_spawn_points: Vec<Vec3>) -> Self {
        Self {
            phase: Replicated::authority(Phase::Lobby),
            game_spawn_points: SpawnPool::new(game_spawn_points),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.get()
    }

    /// Checks whether `requester` may start the game right now
    pub fn check_start(&self, requester: ClientId, directory: &SessionDirectory) -> Result<(), Rejection> {
        if self.phase() != Phase::Lobby {
            return Err(Rejection::WrongPhase);
        }
        if directory.coordinator() != Some(requester) {
            return Err(Rejection::NotCoordinator(requester));
        }
        if !directory.all_ready() {
            return Err(Rejection::NotAllReady);
        }
        Ok(())
    }

    /// Moves every avatar to a gameplay spawn point and hands control over
    ///
    /// Returns the number of avatars relocated.
    pub fn enter_gameplay(&mut self, entities: &mut EntityRegistry) -> Result<usize, Rejection> {
        self.game_spawn_points.reset();
        if self.game_spawn_points.is_empty() {
            warn!("No gameplay spawn points configured, avatars stay where they are");
        }

        let avatars = entities.avatar_ids();
        for id in &avatars {
            let point = self.game_spawn_points.next_point();
            if let Some(entity) = entities.get_mut(*id) {
                if let Some(point) = point {
                    entity.position.set(point)?;
                }
                if let Some(avatar) = entity.avatar_mut() {
                    avatar.control_enabled.set(true)?;
                }
            }
        }

        self.phase.set(Phase::Gameplay)?;
        info!("Entered gameplay with {} avatars", avatars.len());
        Ok(avatars.len())
    }

    pub fn snapshot(&self) -> Stamped<Phase> {
        self.phase.stamped()
    }

    pub fn take_dirty(&mut self) -> Option<Stamped<Phase>> {
        self.phase.take_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby_with(ids: &[ClientId]) -> (SessionDirectory, EntityRegistry) {
        let mut directory = SessionDirectory::new(5, vec![Vec3::ZERO]);
        let mut entities = EntityRegistry::new();
        for id in ids {
            let point = directory.announce(*id, "Player").unwrap();
            entities.spawn_avatar(*id, "Player", point);
        }
        (directory, entities)
    }

    #[test]
    fn test_start_requires_coordinator_and_readiness() {
        let controller = SceneController::new(vec![]);
        let (mut directory, _) = lobby_with(&[1, 2]);

        assert_eq!(controller.check_start(1, &directory), Err(Rejection::NotAllReady));
        directory.toggle_ready(1).unwrap();
        directory.toggle_ready(2).unwrap();
        assert_eq!(controller.check_start(2, &directory), Err(Rejection::NotCoordinator(2)));
        assert_eq!(controller.check_start(1, &directory), Ok(()));
    }

    #[test]
    fn test_empty_lobby_cannot_start() {
        let controller = SceneController::new(vec![]);
        let directory = SessionDirectory::new(5, vec![]);
        assert_eq!(controller.check_start(1, &directory), Err(Rejection::NotCoordinator(1)));
    }

    #[test]
    fn test_enter_gameplay_relocates_round_robin_and_enables_control() {
        let spawn_a = Vec3::new(10.0, 0.0, 0.0);
        let spawn_b = Vec3::new(-10.0, 0.0, 0.0);
        let mut controller = SceneController::new(vec![spawn_a, spawn_b]);
        let (_, mut entities) = lobby_with(&[1, 2, 3]);

        assert_eq!(controller.enter_gameplay(&mut entities), Ok(3));
        assert_eq!(controller.phase(), Phase::Gameplay);

        let positions: Vec<Vec3> = [1, 2, 3]
            .iter()
            .map(|client| {
                let id = entities.avatar_of(*client).unwrap();
                *entities.get(id).unwrap().position.get()
            })
            .collect();
        assert_eq!(positions, vec![spawn_a, spawn_b, spawn_a]);

        for entity in entities.iter() {
            assert!(*entity.avatar().unwrap().control_enabled.get());
        }
        assert_eq!(controller.check_start(1, &SessionDirectory::new(5, vec![])), Err(Rejection::WrongPhase));
    }

    #[test]
    fn test_phase_change_is_reported() {
        let mut controller = SceneController::new(vec![]);
        let mut entities = EntityRegistry::new();
        assert!(controller.take_dirty().is_none());

        controller.enter_gameplay(&mut entities).unwrap();
        let stamped = controller.take_dirty().unwrap();
        assert_eq!(stamped.value, Phase::Gameplay);
        assert_eq!(stamped.revision, 1);
    }
}
