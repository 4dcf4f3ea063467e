//! Avatar cosmetic slots and their index rules

use crate::replicated::{ReplicationError, Replicated, Stamped};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Index meaning "nothing equipped" for slots that allow it
pub const NONE_INDEX: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CosmeticSlot {
    MainBody,
    BodyPart,
    Eyes,
    Glove,
    HeadPart,
    MouthAndNose,
    Tail,
}

impl CosmeticSlot {
    pub const ALL: [CosmeticSlot; 7] = [
        CosmeticSlot::MainBody,
        CosmeticSlot::BodyPart,
        CosmeticSlot::Eyes,
        CosmeticSlot::Glove,
        CosmeticSlot::HeadPart,
        CosmeticSlot::MouthAndNose,
        CosmeticSlot::Tail,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the slot may be left empty
    pub fn allows_none(self) -> bool {
        matches!(
            self,
            CosmeticSlot::BodyPart | CosmeticSlot::Glove | CosmeticSlot::HeadPart | CosmeticSlot::Tail
        )
    }

    /// Index a freshly spawned avatar starts with
    pub fn default_index(self) -> i32 {
        if self.allows_none() {
            NONE_INDEX
        } else {
            0
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CosmeticSlot::MainBody => "body",
            CosmeticSlot::BodyPart => "bodypart",
            CosmeticSlot::Eyes => "eyes",
            CosmeticSlot::Glove => "glove",
            CosmeticSlot::HeadPart => "headpart",
            CosmeticSlot::MouthAndNose => "mouth",
            CosmeticSlot::Tail => "tail",
        }
    }
}

impl fmt::Display for CosmeticSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CosmeticSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CosmeticSlot::ALL
            .iter()
            .copied()
            .find(|slot| slot.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown cosmetic slot '{}'", s))
    }
}

/// Number of options available per slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmeticCatalog {
    pub counts: [i32; 7],
}

impl Default for CosmeticCatalog {
    fn default() -> Self {
        Self {
            counts: [6, 10, 11, 10, 4, 14, 8],
        }
    }
}

impl CosmeticCatalog {
    pub fn count(&self, slot: CosmeticSlot) -> i32 {
        self.counts[slot.index()]
    }

    /// Checks an index against the slot's range, including the none sentinel
    pub fn is_valid(&self, slot: CosmeticSlot, index: i32) -> bool {
        let lower = if slot.allows_none() { NONE_INDEX } else { 0 };
        index >= lower && index < self.count(slot)
    }

    /// Next index when cycling forward, wrapping to none (or 0) past the end
    pub fn next_index(&self, slot: CosmeticSlot, current: i32) -> i32 {
        let next = current + 1;
        if next >= self.count(slot) {
            slot.default_index()
        } else {
            next
        }
    }

    /// Previous index when cycling backward, wrapping to the last option
    pub fn prev_index(&self, slot: CosmeticSlot, current: i32) -> i32 {
        let lower = if slot.allows_none() { NONE_INDEX } else { 0 };
        let prev = current - 1;
        if prev < lower {
            self.count(slot) - 1
        } else {
            prev
        }
    }
}

/// The seven replicated slot indices of one avatar
#[derive(Debug)]
pub struct CosmeticSelection {
    slots: [Replicated<i32>; 7],
}

impl CosmeticSelection {
    pub fn authority() -> Self {
        Self {
            slots: std::array::from_fn(|i| Replicated::authority(CosmeticSlot::ALL[i].default_index())),
        }
    }

    pub fn mirror(initial: [Stamped<i32>; 7]) -> Self {
        let mut initial = initial.into_iter();
        Self {
            slots: std::array::from_fn(|_| {
                Replicated::mirror(initial.next().unwrap_or(Stamped {
                    revision: 0,
                    value: NONE_INDEX,
                }))
            }),
        }
    }

    pub fn get(&self, slot: CosmeticSlot) -> i32 {
        *self.slots[slot.index()].get()
    }

    pub fn field(&self, slot: CosmeticSlot) -> &Replicated<i32> {
        &self.slots[slot.index()]
    }

    pub fn field_mut(&mut self, slot: CosmeticSlot) -> &mut Replicated<i32> {
        &mut self.slots[slot.index()]
    }

    /// Validates and assigns a slot index on the authoritative side
    ///
    /// `Ok(None)` means the index is out of range and nothing changed.
    pub fn select(
        &mut self,
        catalog: &CosmeticCatalog,
        slot: CosmeticSlot,
        index: i32,
    ) -> Result<Option<bool>, ReplicationError> {
        if !catalog.is_valid(slot, index) {
            return Ok(None);
        }
        self.slots[slot.index()].set(index).map(Some)
    }

    pub fn stamped(&self) -> [Stamped<i32>; 7] {
        std::array::from_fn(|i| self.slots[i].stamped())
    }

    /// Drains dirty slots as `(slot, stamped index)` pairs
    pub fn take_dirty(&mut self) -> Vec<(CosmeticSlot, Stamped<i32>)> {
        CosmeticSlot::ALL
            .iter()
            .filter_map(|slot| {
                self.slots[slot.index()]
                    .take_dirty()
                    .map(|stamped| (*slot, stamped))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_none_rules() {
        let selection = CosmeticSelection::authority();
        assert_eq!(selection.get(CosmeticSlot::MainBody), 0);
        assert_eq!(selection.get(CosmeticSlot::BodyPart), NONE_INDEX);
        assert_eq!(selection.get(CosmeticSlot::Eyes), 0);
        assert_eq!(selection.get(CosmeticSlot::Tail), NONE_INDEX);
    }

    #[test]
    fn test_range_checks() {
        let catalog = CosmeticCatalog::default();
        assert!(catalog.is_valid(CosmeticSlot::MainBody, 0));
        assert!(catalog.is_valid(CosmeticSlot::MainBody, 5));
        assert!(!catalog.is_valid(CosmeticSlot::MainBody, 6));
        assert!(!catalog.is_valid(CosmeticSlot::MainBody, NONE_INDEX));
        assert!(catalog.is_valid(CosmeticSlot::HeadPart, NONE_INDEX));
        assert!(!catalog.is_valid(CosmeticSlot::HeadPart, -2));
        assert!(!catalog.is_valid(CosmeticSlot::HeadPart, 4));
    }

    #[test]
    fn test_out_of_range_selection_keeps_prior_value() {
        let catalog = CosmeticCatalog::default();
        let mut selection = CosmeticSelection::authority();
        selection.select(&catalog, CosmeticSlot::Eyes, 7).unwrap();

        assert_eq!(selection.select(&catalog, CosmeticSlot::Eyes, 11), Ok(None));
        assert_eq!(selection.select(&catalog, CosmeticSlot::Eyes, -1), Ok(None));
        assert_eq!(selection.get(CosmeticSlot::Eyes), 7);
    }

    #[test]
    fn test_repeated_selection_is_harmless() {
        let catalog = CosmeticCatalog::default();
        let mut selection = CosmeticSelection::authority();

        assert_eq!(selection.select(&catalog, CosmeticSlot::Tail, 2), Ok(Some(true)));
        assert_eq!(selection.select(&catalog, CosmeticSlot::Tail, 2), Ok(Some(false)));
        assert_eq!(selection.get(CosmeticSlot::Tail), 2);
        assert_eq!(selection.field(CosmeticSlot::Tail).revision(), 1);
    }

    #[test]
    fn test_cycling_wraps_through_none() {
        let catalog = CosmeticCatalog::default();
        assert_eq!(catalog.next_index(CosmeticSlot::HeadPart, 3), NONE_INDEX);
        assert_eq!(catalog.next_index(CosmeticSlot::HeadPart, NONE_INDEX), 0);
        assert_eq!(catalog.prev_index(CosmeticSlot::HeadPart, NONE_INDEX), 3);
        assert_eq!(catalog.next_index(CosmeticSlot::MainBody, 5), 0);
        assert_eq!(catalog.prev_index(CosmeticSlot::MainBody, 0), 5);
    }

    #[test]
    fn test_slot_names_parse() {
        assert_eq!("Tail".parse::<CosmeticSlot>(), Ok(CosmeticSlot::Tail));
        assert_eq!("mouth".parse::<CosmeticSlot>(), Ok(CosmeticSlot::MouthAndNose));
        assert!("hat".parse::<CosmeticSlot>().is_err());
    }

    #[test]
    fn test_take_dirty_lists_changed_slots_only() {
        let catalog = CosmeticCatalog::default();
        let mut selection = CosmeticSelection::authority();
        selection.select(&catalog, CosmeticSlot::Glove, 4).unwrap();

        let dirty = selection.take_dirty();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].0, CosmeticSlot::Glove);
        assert_eq!(dirty[0].1.value, 4);
        assert!(selection.take_dirty().is_empty());
    }
}
