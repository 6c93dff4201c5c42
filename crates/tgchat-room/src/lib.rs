#![doc = include_str!("../README.md")]
#![forbid(unsafe_op_in_unsafe_fn)]

mod error;
pub mod layout;
mod lock;
mod mapping;
mod names;
mod participant;
mod room;

pub use error::RoomError;
pub use layout::{
    MAILBOX_SLOTS, MAX_MESSAGE_LEN, MAX_PARTICIPANTS, Mailbox, Message, MessageSlot, Registry,
    RoomLayout,
};
pub use names::{DEFAULT_NAMESPACE, validate_namespace};
pub use participant::{InvalidParticipantId, ParticipantId};
pub use room::{Room, RoomGuard};
