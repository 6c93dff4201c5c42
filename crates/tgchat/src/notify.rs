//! Out-of-band notifications between participants.
//!
//! A notification is addressed to one participant, carries one small integer
//! and comes in three kinds. The receiving side never polls shared state for
//! them: they arrive on an [`Inbox`] fed asynchronously by the transport.
//!
//! - [`signal`]: POSIX realtime signals queued with `sigqueue`, used between
//!   processes
//! - [`local`]: in-process channels, used to run several participants inside
//!   one process

use std::io;

use tgchat_room::ParticipantId;
use tokio::sync::mpsc;

pub mod local;
pub mod signal;

/// Notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    JoinRequest,
    JoinApprove,
    MessageReady,
}

impl NotificationKind {
    pub const ALL: [Self; 3] = [Self::JoinRequest, Self::JoinApprove, Self::MessageReady];

    /// Position of this kind, used to pick its signal number.
    pub const fn offset(self) -> i32 {
        match self {
            Self::JoinRequest => 0,
            Self::JoinApprove => 1,
            Self::MessageReady => 2,
        }
    }

    pub fn from_offset(offset: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.offset() == offset)
    }
}

/// A decoded notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// "Let me in." The sender is the requester.
    JoinRequest,
    /// Reply to a join request, carrying the room id.
    JoinApprove { room: ParticipantId },
    /// A message for the receiver waits in mailbox slot `slot`.
    MessageReady { slot: usize },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::JoinRequest => NotificationKind::JoinRequest,
            Self::JoinApprove { .. } => NotificationKind::JoinApprove,
            Self::MessageReady { .. } => NotificationKind::MessageReady,
        }
    }

    /// The integer payload carried on the wire.
    pub fn value(&self) -> i32 {
        match *self {
            Self::JoinRequest => 0,
            Self::JoinApprove { room } => room.get(),
            Self::MessageReady { slot } => slot as i32,
        }
    }

    /// Rebuild a notification from its wire form. Returns `None` for payloads
    /// that make no sense for the kind.
    pub fn decode(kind: NotificationKind, value: i32) -> Option<Self> {
        match kind {
            NotificationKind::JoinRequest => Some(Self::JoinRequest),
            NotificationKind::JoinApprove => {
                ParticipantId::new(value).map(|room| Self::JoinApprove { room })
            }
            NotificationKind::MessageReady => usize::try_from(value)
                .ok()
                .map(|slot| Self::MessageReady { slot }),
        }
    }
}

/// A received notification together with its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub from: ParticipantId,
    pub notification: Notification,
}

/// Receiving end of a participant's notifications.
pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

/// Sends notifications to other participants.
pub trait Notifier: Send + Sync {
    /// Queue `notification` for `to`. Fails if `to` cannot be reached.
    fn notify(&self, to: ParticipantId, notification: Notification) -> io::Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, to: ParticipantId, notification: Notification) -> io::Result<()> {
        (**self).notify(to, notification)
    }
}
