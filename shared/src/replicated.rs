//! Authority-written, broadcast-read field primitive
//!
//! A `Replicated<T>` lives on both sides of the connection. The authoritative
//! copy is the only one allowed to assign new values; every change bumps a
//! revision number and notifies local observers. Mirror copies receive those
//! stamped values from the network and drop anything older than what they
//! already hold, so observers never see a field move backwards even when the
//! datagrams carrying it arrive out of order.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which side of the session a field copy belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Authority,
    Mirror,
}

/// Errors returned when a field is driven from the wrong side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReplicationError {
    /// A mirror copy tried to assign a value directly
    #[error("only the authoritative copy may assign a replicated value")]
    NotAuthority,

    /// The authoritative copy was handed a value received from the network
    #[error("the authoritative copy never accepts remote values")]
    NotMirror,
}

/// A value tagged with the authority revision that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub revision: u32,
    pub value: T,
}

/// Handle returned by `subscribe`, used to remove the observer later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer<T> = Box<dyn FnMut(&T, &T) + Send>;

pub struct Replicated<T> {
    value: T,
    revision: u32,
    role: Role,
    dirty: bool,
    observers: Vec<(ObserverId, Observer<T>)>,
    next_observer: u64,
}

impl<T: Clone + PartialEq> Replicated<T> {
    /// Creates the authoritative copy of a field at revision 0
    pub fn authority(value: T) -> Self {
        Self {
            value,
            revision: 0,
            role: Role::Authority,
            dirty: false,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// Creates a mirror copy seeded from a value received from the authority
    pub fn mirror(initial: Stamped<T>) -> Self {
        Self {
            value: initial.value,
            revision: initial.revision,
            role: Role::Mirror,
            dirty: false,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// Returns the last value known locally
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_authority(&self) -> bool {
        self.role == Role::Authority
    }

    /// Assigns a new value on the authoritative side
    ///
    /// Returns `Ok(true)` when the value changed and observers were notified,
    /// `Ok(false)` when the new value equals the current one. Mirrors get
    /// `Err(NotAuthority)` and keep their value.
    pub fn set(&mut self, value: T) -> Result<bool, ReplicationError> {
        if self.role != Role::Authority {
            return Err(ReplicationError::NotAuthority);
        }
        if value == self.value {
            return Ok(false);
        }

        let previous = std::mem::replace(&mut self.value, value);
        self.revision = self.revision.wrapping_add(1);
        self.dirty = true;
        self.notify(&previous);
        Ok(true)
    }

    /// Edits the value in place on the authoritative side
    ///
    /// Same change semantics as `set`; useful for collection-valued fields.
    pub fn update<F>(&mut self, edit: F) -> Result<bool, ReplicationError>
    where
        F: FnOnce(&mut T),
    {
        if self.role != Role::Authority {
            return Err(ReplicationError::NotAuthority);
        }
        let mut next = self.value.clone();
        edit(&mut next);
        self.set(next)
    }

    /// Applies a value broadcast by the authority to a mirror copy
    ///
    /// Revisions at or below the one already held are ignored and reported as
    /// `Ok(false)`.
    pub fn apply_remote(&mut self, incoming: Stamped<T>) -> Result<bool, ReplicationError> {
        if self.role != Role::Mirror {
            return Err(ReplicationError::NotMirror);
        }
        if incoming.revision <= self.revision {
            return Ok(false);
        }

        self.revision = incoming.revision;
        if incoming.value == self.value {
            return Ok(false);
        }
        let previous = std::mem::replace(&mut self.value, incoming.value);
        self.notify(&previous);
        Ok(true)
    }

    /// Registers a change observer
    ///
    /// The callback is invoked right away with `(current, current)` so that
    /// late subscribers start from the present value.
    pub fn subscribe<F>(&mut self, mut callback: F) -> ObserverId
    where
        F: FnMut(&T, &T) + Send + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        callback(&self.value, &self.value);
        self.observers.push((id, Box::new(callback)));
        id
    }

    /// Removes an observer; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Re-fires every observer with `(current, current)`
    pub fn notify_current(&mut self) {
        let current = self.value.clone();
        self.notify(&current);
    }

    /// Current value together with its revision, for snapshots
    pub fn stamped(&self) -> Stamped<T> {
        Stamped {
            revision: self.revision,
            value: self.value.clone(),
        }
    }

    /// Returns the stamped value if it changed since the last call
    pub fn take_dirty(&mut self) -> Option<Stamped<T>> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.stamped())
    }

    fn notify(&mut self, previous: &T) {
        let current = &self.value;
        for (_, observer) in self.observers.iter_mut() {
            observer(previous, current);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Replicated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replicated")
            .field("value", &self.value)
            .field("revision", &self.revision)
            .field("role", &self.role)
            .field("observers", &self.observers.len())
            .finish()
    }
}
