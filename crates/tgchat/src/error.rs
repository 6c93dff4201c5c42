use std::io;

use tgchat_room::{ParticipantId, RoomError};

/// Errors surfaced by chat operations.
///
/// Fatal kinds end the process with [`ChatError::exit_code`]; the rest are
/// reported and the command loop carries on.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Allocating or attaching the shared room state failed.
    #[error("shared resource error: {0}")]
    SharedResource(#[source] RoomError),
    /// Notification handling could not be set up or stopped working.
    #[error("signal error: {0}")]
    Signal(String),
    /// The console reached end of input.
    #[error("end of input")]
    Input,
    /// Writing to the console failed.
    #[error("writing output failed: {0}")]
    Output(#[source] io::Error),
    /// Malformed command or invocation.
    #[error("usage: {0}")]
    Usage(String),
    /// No free registry slot while joining.
    #[error("room is full")]
    RoomFull,
    /// No free mailbox slot; the message was dropped.
    #[error("mailbox is full, message dropped")]
    MailboxFull,
    /// Message text too long; nothing was sent.
    #[error("message is {len} bytes, the limit is {max}")]
    Overflow { len: usize, max: usize },
    /// Direct message to an id that is not in the room.
    #[error("{0} is not in this room")]
    UnknownParticipant(ParticipantId),
    /// The recipient's process could not be notified.
    #[error("cannot reach {participant}: {source}")]
    Unreachable {
        participant: ParticipantId,
        #[source]
        source: io::Error,
    },
}

impl ChatError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SharedResource(_) => 2,
            Self::Usage(_) => 3,
            Self::Input => 4,
            Self::Signal(_) => 5,
            Self::RoomFull => 6,
            Self::MailboxFull => 7,
            Self::Overflow { .. } => 8,
            Self::UnknownParticipant(_) | Self::Unreachable { .. } => 9,
            Self::Output(_) => 10,
        }
    }

    /// Whether the command loop can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Usage(_)
                | Self::MailboxFull
                | Self::Overflow { .. }
                | Self::UnknownParticipant(_)
                | Self::Unreachable { .. }
        )
    }
}

impl From<RoomError> for ChatError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::RoomFull => Self::RoomFull,
            RoomError::MailboxFull => Self::MailboxFull,
            RoomError::Overflow { len } => Self::Overflow {
                len,
                max: tgchat_room::MAX_MESSAGE_LEN,
            },
            RoomError::EmptyMessage => Self::Usage("message must not be empty".into()),
            e @ (RoomError::Os { .. } | RoomError::Layout { .. } | RoomError::InUse { .. }) => {
                Self::SharedResource(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_errors_map_to_chat_kinds() {
        assert!(matches!(ChatError::from(RoomError::RoomFull), ChatError::RoomFull));
        assert!(matches!(
            ChatError::from(RoomError::Overflow { len: 300 }),
            ChatError::Overflow { len: 300, max: 256 }
        ));
        let os = RoomError::Os {
            op: "shm_open",
            name: "/x".into(),
            source: io::Error::from_raw_os_error(libc::ENOENT),
        };
        assert_eq!(ChatError::from(os).exit_code(), 2);
    }

    #[test]
    fn exit_codes_are_distinct_per_fatal_kind() {
        let codes = [
            ChatError::SharedResource(RoomError::MailboxFull).exit_code(),
            ChatError::Usage(String::new()).exit_code(),
            ChatError::Input.exit_code(),
            ChatError::Signal(String::new()).exit_code(),
            ChatError::RoomFull.exit_code(),
            ChatError::Output(io::Error::from(io::ErrorKind::BrokenPipe)).exit_code(),
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
        assert!(!ChatError::Input.is_recoverable());
        assert!(ChatError::MailboxFull.is_recoverable());
    }
}
