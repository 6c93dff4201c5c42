#![doc = include_str!("../README.md")]
#![forbid(unsafe_op_in_unsafe_fn)]

pub mod command;
pub mod config;
pub mod console;
mod error;
pub mod notify;
pub mod session;

pub use config::ChatConfig;
pub use error::ChatError;
pub use notify::{Envelope, Inbox, Notification, NotificationKind, Notifier};
pub use session::{Broadcast, Departure, Role, Session};
pub use tgchat_room::{Message, ParticipantId};
