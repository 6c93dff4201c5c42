//! Names of the shared resources backing a room.
//!
//! Both names are derived from a namespace and the room id (the creator's
//! process id), so any participant that learns the room id can find them.

use std::ffi::CString;
use std::io;

use crate::error::RoomError;
use crate::participant::ParticipantId;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "tgchat";

/// Resource names for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomNames {
    store: String,
    lock: String,
}

impl RoomNames {
    pub fn new(namespace: &str, room: ParticipantId) -> Self {
        Self {
            store: format!("/{namespace}_room_{room}"),
            lock: format!("/{namespace}_lock_{room}"),
        }
    }

    /// Name of the shared memory object holding registry and mailbox.
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Name of the semaphore guarding the store.
    pub fn lock(&self) -> &str {
        &self.lock
    }
}

/// Check that `namespace` can be embedded in a POSIX object name.
pub fn validate_namespace(namespace: &str) -> Result<(), &'static str> {
    if namespace.is_empty() {
        return Err("namespace must not be empty");
    }
    if namespace.len() > 200 {
        return Err("namespace must be at most 200 bytes");
    }
    if namespace.contains(['/', '\0']) {
        return Err("namespace must not contain '/' or NUL");
    }
    Ok(())
}

pub(crate) fn c_name(name: &str) -> Result<CString, RoomError> {
    CString::new(name).map_err(|e| RoomError::Os {
        op: "name",
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, e),
    })
}
