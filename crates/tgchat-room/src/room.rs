//! Room handle.
//!
//! - `Room::create`: called by the first participant; allocates the store and
//!   the lock under names derived from its own id
//! - `Room::attach`: called by joining participants once they know the room id

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::error::RoomError;
use crate::layout::RoomLayout;
use crate::lock::NamedLock;
use crate::mapping::RoomMapping;
use crate::names::RoomNames;
use crate::participant::ParticipantId;

/// How long `create` waits for the lock of a room found under its name.
/// Holders only keep it for a few array scans, so a lock still taken after
/// this long belongs to a process that died holding it.
const ABANDONED_LOCK_WAIT: Duration = Duration::from_secs(1);

/// A participant's handle on the shared room state.
///
/// Dropping the handle unmaps the store and closes the lock but leaves both
/// names in place; see [`Room::unlink`].
pub struct Room {
    id: ParticipantId,
    names: RoomNames,
    mapping: RoomMapping,
    lock: NamedLock,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl Room {
    /// Create a new room identified by `id`.
    ///
    /// A room already under this name is replaced only if none of its
    /// registered participants is still running, for example leftovers from
    /// a crashed process that had the same id. Otherwise this fails with
    /// [`RoomError::InUse`]. On failure nothing new stays behind.
    pub fn create(namespace: &str, id: ParticipantId) -> Result<Self, RoomError> {
        let names = RoomNames::new(namespace, id);

        let running = Self::running_occupants(namespace, id)?;
        if running > 0 {
            return Err(RoomError::InUse {
                name: names.store().to_string(),
                running,
            });
        }

        if RoomMapping::unlink(names.store())? {
            tracing::warn!(name = names.store(), "removed stale room store");
        }
        if NamedLock::unlink(names.lock())? {
            tracing::warn!(name = names.lock(), "removed stale room lock");
        }

        let mapping = RoomMapping::create(names.store())?;
        let lock = match NamedLock::create(names.lock()) {
            Ok(lock) => lock,
            Err(e) => {
                drop(mapping);
                let _ = RoomMapping::unlink(names.store());
                return Err(e);
            }
        };

        tracing::info!(room = %id, store = names.store(), "room created");
        Ok(Self {
            id,
            names,
            mapping,
            lock,
        })
    }

    /// Attach to the room created by `id`.
    pub fn attach(namespace: &str, id: ParticipantId) -> Result<Self, RoomError> {
        let names = RoomNames::new(namespace, id);
        let mapping = RoomMapping::attach(names.store())?;
        let lock = NamedLock::open(names.lock())?;

        tracing::debug!(room = %id, store = names.store(), "attached to room");
        Ok(Self {
            id,
            names,
            mapping,
            lock,
        })
    }

    /// Number of running participants in a room already under `id`'s names.
    ///
    /// A missing, unreadable or malformed room counts as empty.
    fn running_occupants(namespace: &str, id: ParticipantId) -> Result<usize, RoomError> {
        let existing = match Self::attach(namespace, id) {
            Ok(existing) => existing,
            Err(e) => {
                tracing::debug!(room = %id, error = %e, "no previous room to keep");
                return Ok(0);
            }
        };
        if !existing.lock.acquire_timeout(ABANDONED_LOCK_WAIT)? {
            tracing::warn!(room = %id, "previous room lock is stuck, treating room as abandoned");
            return Ok(0);
        }
        let guard = RoomGuard { room: &existing };
        let running = guard
            .registry
            .participants()
            // The caller now owns `id`, so an entry under it is stale.
            .filter(|&participant| participant != id && participant.is_running())
            .count();
        Ok(running)
    }

    /// The room id: process id of the creator.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Acquire the room lock.
    ///
    /// The returned guard gives access to the layout and releases the lock
    /// when dropped.
    pub fn lock(&self) -> Result<RoomGuard<'_>, RoomError> {
        self.lock.acquire()?;
        Ok(RoomGuard { room: self })
    }

    /// Remove the names of the store and the lock.
    ///
    /// Handles already open (this one included) keep working; later
    /// attachments fail.
    pub fn unlink(&self) -> Result<(), RoomError> {
        let store = RoomMapping::unlink(self.names.store());
        let lock = NamedLock::unlink(self.names.lock());
        tracing::info!(room = %self.id, "room resources unlinked");
        store?;
        lock?;
        Ok(())
    }
}

/// Exclusive access to the room layout, held while the room lock is taken.
pub struct RoomGuard<'a> {
    room: &'a Room,
}

impl Deref for RoomGuard<'_> {
    type Target = RoomLayout;

    fn deref(&self) -> &RoomLayout {
        // SAFETY: the lock serializes every access to the layout.
        unsafe { &*self.room.mapping.as_ptr() }
    }
}

impl DerefMut for RoomGuard<'_> {
    fn deref_mut(&mut self) -> &mut RoomLayout {
        // SAFETY: as above; one guard exists per acquisition.
        unsafe { &mut *self.room.mapping.as_ptr() }
    }
}

impl Drop for RoomGuard<'_> {
    fn drop(&mut self) {
        self.room.lock.release();
    }
}
