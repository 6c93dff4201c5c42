use std::io;

use crate::layout::{MAILBOX_SLOTS, MAX_MESSAGE_LEN, MAX_PARTICIPANTS};

/// Errors from room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// A system call on one of the named shared resources failed.
    #[error("{op} {name}: {source}")]
    Os {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },
    /// The shared store exists but does not hold a room.
    #[error("{name}: {reason}")]
    Layout { name: String, reason: &'static str },
    /// A room under this name still has running participants.
    #[error("{name} is still in use by {running} running participant(s)")]
    InUse { name: String, running: usize },
    /// Every registry slot is taken.
    #[error("room is full ({} participants)", MAX_PARTICIPANTS)]
    RoomFull,
    /// Every mailbox slot is occupied.
    #[error("mailbox is full ({} pending messages)", MAILBOX_SLOTS)]
    MailboxFull,
    /// Message text exceeds the slot capacity.
    #[error("message is {len} bytes, the limit is {}", MAX_MESSAGE_LEN)]
    Overflow { len: usize },
    /// Empty messages are indistinguishable from free slots.
    #[error("message is empty")]
    EmptyMessage,
}

impl RoomError {
    /// Capture `errno` for a failed call on `name`.
    pub(crate) fn last_os(op: &'static str, name: &str) -> Self {
        Self::Os {
            op,
            name: name.to_string(),
            source: io::Error::last_os_error(),
        }
    }
}
