use std::fmt;
use std::str::FromStr;

/// Identifier of a chat participant: the id of the process that owns it.
///
/// Always strictly positive. Zero is reserved for empty registry slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(i32);

impl ParticipantId {
    /// Wrap a raw process id. Returns `None` for zero and negative values.
    pub const fn new(raw: i32) -> Option<Self> {
        if raw > 0 { Some(Self(raw)) } else { None }
    }

    /// The id of the calling process.
    pub fn current() -> Self {
        Self(std::process::id() as i32)
    }

    /// The raw process id.
    #[inline]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Whether a process with this id exists.
    ///
    /// A process we may not signal still counts as running.
    pub fn is_running(self) -> bool {
        if unsafe { libc::kill(self.0, 0) } == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error when parsing a [`ParticipantId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid participant id: {0:?}")]
pub struct InvalidParticipantId(pub String);

impl FromStr for ParticipantId {
    type Err = InvalidParticipantId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i32>()
            .ok()
            .and_then(ParticipantId::new)
            .ok_or_else(|| InvalidParticipantId(s.to_string()))
    }
}
