//! Configuration and command-line arguments.

use clap::Parser;
use tgchat_room::{DEFAULT_NAMESPACE, ParticipantId, validate_namespace};

use crate::error::ChatError;

/// Settings shared by every participant of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Prefix of the shared resource names. Participants only find each
    /// other's rooms within the same namespace.
    pub namespace: String,
}

impl ChatConfig {
    pub fn new(namespace: impl Into<String>) -> Result<Self, ChatError> {
        let namespace = namespace.into();
        validate_namespace(&namespace)
            .map_err(|reason| ChatError::Usage(format!("--namespace: {reason}")))?;
        Ok(Self { namespace })
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tgchat")]
#[command(about = "Chat with other processes on this host")]
#[command(
    long_about = "Chat with other processes on this host.\n\n\
    Without arguments a new room is created. Pass the process id of any \
    participant to join its room."
)]
pub struct Args {
    /// Process id of a participant whose room to join
    #[arg(value_name = "JOIN_PID")]
    pub join_pid: Option<ParticipantId>,

    /// Prefix for the shared memory and semaphore names
    #[arg(long, env = "TGCHAT_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

impl Args {
    pub fn config(&self) -> Result<ChatConfig, ChatError> {
        ChatConfig::new(self.namespace.clone())
    }
}
