//! Last known state of players who left, keyed by account

use shared::Vec3;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub account_id: String,
    pub position: Vec3,
    pub health: i32,
    pub attack: i32,
}

/// Process-lifetime store; nothing is written to disk
#[derive(Debug, Default)]
pub struct PlayerRecordStore {
    records: HashMap<String, PlayerRecord>,
}

impl PlayerRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the record for `record.account_id`
    pub fn save(&mut self, record: PlayerRecord) {
        self.records.insert(record.account_id.clone(), record);
    }

    pub fn get(&self, account_id: &str) -> Option<&PlayerRecord> {
        self.records.get(account_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_overwrites_by_account() {
        let mut store = PlayerRecordStore::new();
        store.save(PlayerRecord {
            account_id: "Ana".to_string(),
            position: Vec3::ZERO,
            health: 40,
            attack: 2,
        });
        store.save(PlayerRecord {
            account_id: "Ana".to_string(),
            position: Vec3::new(1.0, 0.0, 0.0),
            health: 90,
            attack: 5,
        });

        assert_eq!(store.len(), 1);
        let record = store.get("Ana").unwrap();
        assert_eq!(record.health, 90);
        assert_eq!(record.attack, 5);
        assert!(store.get("Luis").is_none());
    }
}
