//! Lobby roster of announced participants
//!
//! The roster is itself a replicated field, so every accepted change is picked
//! up by the broadcaster and fanned out to mirrors as a whole list. Entity
//! spawning stays with the session; the directory only hands out the lobby
//! spawn point a new participant should appear at.

use crate::error::Rejection;
use log::{info, warn};
use shared::{
    roster_all_ready, roster_coordinator, ClientId, Participant, Replicated, Stamped, Vec3,
    MAX_NAME_BYTES,
};

/// Ordered spawn coordinates handed out round-robin
#[derive(Debug, Clone)]
pub struct SpawnPool {
    points: Vec<Vec3>,
    next: usize,
}

impl SpawnPool {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self { points, next: 0 }
    }

    /// Returns the next point, wrapping; `None` when the pool is empty
    pub fn next_point(&mut self) -> Option<Vec3> {
        if self.points.is_empty() {
            return None;
        }
        let point = self.points[self.next % self.points.len()];
        self.next = (self.next + 1) % self.points.len();
        Some(point)
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub struct SessionDirectory {
    roster: Replicated<Vec<Participant>>,
    capacity: usize,
    spawn_points: SpawnPool,
}

impl SessionDirectory {
    pub fn new(capacity: usize, spawn_points: Vec<Vec3>) -> Self {
        Self {
            roster: Replicated::authority(Vec::new()),
            capacity,
            spawn_points: SpawnPool::new(spawn_points),
        }
    }

    /// Adds a participant and returns where their avatar should spawn
    pub fn announce(&mut self, id: ClientId, name: &str) -> Result<Vec3, Rejection> {
        if self.contains(id) {
            return Err(Rejection::DuplicateAnnounce(id));
        }
        if self.len() >= self.capacity {
            return Err(Rejection::DirectoryFull {
                capacity: self.capacity,
            });
        }
        let name = validate_name(name)?;

        self.roster.update(|list| {
            list.push(Participant {
                id,
                name: name.clone(),
                ready: false,
            })
        })?;
        info!("Participant {} announced as '{}'", id, name);

        Ok(self.spawn_points.next_point().unwrap_or(Vec3::ZERO))
    }

    /// Flips the ready flag of a participant
    ///
    /// Each call flips again; two calls restore the original value.
    pub fn toggle_ready(&mut self, id: ClientId) -> Result<bool, Rejection> {
        if !self.contains(id) {
            return Err(Rejection::UnknownParticipant(id));
        }
        self.roster.update(|list| {
            if let Some(participant) = list.iter_mut().find(|p| p.id == id) {
                participant.ready = !participant.ready;
            }
        })?;
        Ok(self.is_ready(id))
    }

    /// Removes a participant; returns false if they were not present
    pub fn remove(&mut self, id: ClientId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if let Err(e) = self.roster.update(|list| list.retain(|p| p.id != id)) {
            warn!("Could not remove participant {}: {}", id, e);
            return false;
        }
        info!("Participant {} left the directory", id);
        true
    }

    /// Empties the roster, keeping spawned entities untouched
    pub fn clear(&mut self) {
        if let Err(e) = self.roster.set(Vec::new()) {
            warn!("Could not clear the roster: {}", e);
        }
        self.spawn_points.reset();
    }

    pub fn all_ready(&self) -> bool {
        roster_all_ready(self.roster.get())
    }

    pub fn coordinator(&self) -> Option<ClientId> {
        roster_coordinator(self.roster.get())
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.roster.get().iter().any(|p| p.id == id)
    }

    pub fn is_ready(&self, id: ClientId) -> bool {
        self.roster
            .get()
            .iter()
            .any(|p| p.id == id && p.ready)
    }

    pub fn get(&self, id: ClientId) -> Option<&Participant> {
        self.roster.get().iter().find(|p| p.id == id)
    }

    /// Read-only view of the roster in announce order
    pub fn participants(&self) -> &[Participant] {
        self.roster.get()
    }

    pub fn len(&self) -> usize {
        self.roster.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.get().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> Stamped<Vec<Participant>> {
        self.roster.stamped()
    }

    pub fn take_dirty(&mut self) -> Option<Stamped<Vec<Participant>>> {
        self.roster.take_dirty()
    }
}

fn validate_name(name: &str) -> Result<String, Rejection> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_NAME_BYTES {
        return Err(Rejection::InvalidName {
            max: MAX_NAME_BYTES,
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(capacity: usize) -> SessionDirectory {
        SessionDirectory::new(
            capacity,
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)],
        )
    }

    #[test]
    fn test_spawn_pool_wraps() {
        let mut pool = SpawnPool::new(vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)]);
        assert_eq!(pool.next_point(), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(pool.next_point(), Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(pool.next_point(), Some(Vec3::new(1.0, 0.0, 0.0)));

        pool.reset();
        assert_eq!(pool.next_point(), Some(Vec3::new(1.0, 0.0, 0.0)));

        let mut empty = SpawnPool::new(vec![]);
        assert!(empty.is_empty());
        assert_eq!(empty.next_point(), None);
    }

    #[test]
    fn test_announce_assigns_round_robin_points() {
        let mut directory = directory(5);
        assert_eq!(directory.announce(1, "Ana"), Ok(Vec3::new(0.0, 0.0, 0.0)));
        assert_eq!(directory.announce(2, "Luis"), Ok(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(directory.announce(3, "Mar"), Ok(Vec3::new(0.0, 0.0, 0.0)));
        assert_eq!(directory.len(), 3);
        assert_eq!(directory.coordinator(), Some(1));
    }

    #[test]
    fn test_duplicate_announce_is_rejected() {
        let mut directory = directory(5);
        directory.announce(1, "Ana").unwrap();

        assert_eq!(
            directory.announce(1, "Other"),
            Err(Rejection::DuplicateAnnounce(1))
        );
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get(1).unwrap().name, "Ana");
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let mut directory = directory(2);
        for id in 1..=6 {
            let _ = directory.announce(id, "Player");
            let _ = directory.announce(id, "Player");
            assert!(directory.len() <= 2);
        }
        assert_eq!(
            directory.announce(9, "Late"),
            Err(Rejection::DirectoryFull { capacity: 2 })
        );

        let mut ids: Vec<_> = directory.participants().iter().map(|p| p.id).collect();
        ids.dedup();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_names_are_validated() {
        let mut directory = directory(5);
        assert!(matches!(
            directory.announce(1, "   "),
            Err(Rejection::InvalidName { .. })
        ));
        assert!(matches!(
            directory.announce(1, &"x".repeat(MAX_NAME_BYTES + 1)),
            Err(Rejection::InvalidName { .. })
        ));
        directory.announce(1, "  Ana  ").unwrap();
        assert_eq!(directory.get(1).unwrap().name, "Ana");
    }

    #[test]
    fn test_double_toggle_restores_flag() {
        let mut directory = directory(5);
        directory.announce(1, "Ana").unwrap();

        assert_eq!(directory.toggle_ready(1), Ok(true));
        assert_eq!(directory.toggle_ready(1), Ok(false));
        assert!(!directory.is_ready(1));
        assert_eq!(directory.toggle_ready(5), Err(Rejection::UnknownParticipant(5)));
    }

    #[test]
    fn test_all_ready_semantics() {
        let mut directory = directory(5);
        assert!(!directory.all_ready());

        directory.announce(1, "Ana").unwrap();
        directory.toggle_ready(1).unwrap();
        assert!(directory.all_ready());

        directory.announce(2, "Luis").unwrap();
        assert!(!directory.all_ready());

        directory.toggle_ready(2).unwrap();
        assert!(directory.all_ready());
    }

    #[test]
    fn test_remove_and_coordinator_handoff() {
        let mut directory = directory(5);
        directory.announce(1, "Ana").unwrap();
        directory.announce(2, "Luis").unwrap();

        assert!(directory.remove(1));
        assert!(!directory.remove(1));
        assert_eq!(directory.coordinator(), Some(2));
        assert!(!directory.contains(1));
    }

    #[test]
    fn test_remove_and_clear_publish_roster() {
        let mut directory = directory(5);
        directory.announce(1, "Ana").unwrap();
        directory.announce(2, "Luis").unwrap();
        directory.take_dirty();

        assert!(directory.remove(1));
        let stamped = directory.take_dirty().unwrap();
        assert_eq!(stamped.revision, 3);
        assert_eq!(stamped.value.len(), 1);

        directory.clear();
        let stamped = directory.take_dirty().unwrap();
        assert_eq!(stamped.revision, 4);
        assert!(stamped.value.is_empty());
        assert_eq!(directory.announce(3, "Mar"), Ok(Vec3::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_changes_are_reported_once() {
        let mut directory = directory(5);
        directory.announce(1, "Ana").unwrap();
        directory.toggle_ready(1).unwrap();

        let stamped = directory.take_dirty().unwrap();
        assert_eq!(stamped.revision, 2);
        assert!(stamped.value[0].ready);
        assert!(directory.take_dirty().is_none());
    }
}
