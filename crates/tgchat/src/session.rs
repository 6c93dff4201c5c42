//! Chat session: one participant's membership in a room.
//!
//! - `Session::create`: allocate a new room named after our own id and
//!   register in it
//! - `Session::join`: ask a known participant for its room id, attach to that
//!   room and register in it
//!
//! Once registered, a session sends messages (`tell`, `say`), reacts to
//! notifications drained from its inbox (`handle`) and finally `leave`s.

use tgchat_room::{MAX_MESSAGE_LEN, Message, ParticipantId, Room, RoomLayout};

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::notify::{Envelope, Inbox, Notification, Notifier};

/// How this session entered the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Creator,
    Joiner,
}

/// Result of a broadcast.
#[derive(Debug, Default)]
pub struct Broadcast {
    /// Recipients whose mailbox slot was filled and notified, in registry
    /// order.
    pub delivered: Vec<ParticipantId>,
    /// Recipients the message could not be delivered to.
    pub failed: Vec<(ParticipantId, ChatError)>,
}

/// What `leave` cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    /// Undelivered messages addressed to us that were discarded.
    pub dropped_messages: usize,
    /// Whether we were the last participant and removed the room's names.
    pub unlinked: bool,
}

pub struct Session<N: Notifier> {
    me: ParticipantId,
    role: Role,
    room: Room,
    notifier: N,
}

impl<N: Notifier> std::fmt::Debug for Session<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("me", &self.me)
            .field("role", &self.role)
            .field("room", &self.room)
            .finish_non_exhaustive()
    }
}

impl<N: Notifier> Session<N> {
    /// Create a room identified by `me` and register in it.
    pub fn create(config: &ChatConfig, me: ParticipantId, notifier: N) -> Result<Self, ChatError> {
        let room = Room::create(&config.namespace, me)?;
        let session = Self {
            me,
            role: Role::Creator,
            room,
            notifier,
        };

        if let Err(e) = session.register() {
            let _ = session.room.unlink();
            return Err(e);
        }
        Ok(session)
    }

    /// Join the room `known` participates in.
    ///
    /// Sends a join request to `known` and waits, without timeout, for the
    /// approval carrying the room id. Other notifications arriving meanwhile
    /// are discarded and do not end the wait.
    pub async fn join(
        config: &ChatConfig,
        me: ParticipantId,
        known: ParticipantId,
        notifier: N,
        inbox: &mut Inbox,
    ) -> Result<Self, ChatError> {
        notifier
            .notify(known, Notification::JoinRequest)
            .map_err(|source| ChatError::Unreachable {
                participant: known,
                source,
            })?;
        tracing::debug!(%known, "join request sent");

        let room_id = wait_for_approval(inbox).await?;
        let room = Room::attach(&config.namespace, room_id)?;
        let session = Self {
            me,
            role: Role::Joiner,
            room,
            notifier,
        };

        // On failure the session drops here, detaching from the room.
        session.register()?;
        Ok(session)
    }

    fn register(&self) -> Result<usize, ChatError> {
        let slot = self.room.lock()?.registry.claim(self.me)?;
        tracing::info!(
            room = %self.room.id(),
            me = %self.me,
            slot,
            role = ?self.role,
            "registered"
        );
        Ok(slot)
    }

    pub fn id(&self) -> ParticipantId {
        self.me
    }

    pub fn room_id(&self) -> ParticipantId {
        self.room.id()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Current participants in registry order.
    pub fn participants(&self) -> Result<Vec<ParticipantId>, ChatError> {
        Ok(self.room.lock()?.registry.participants().collect())
    }

    /// Number of messages waiting in the mailbox, for any recipient.
    pub fn pending_messages(&self) -> Result<usize, ChatError> {
        Ok(self.room.lock()?.mailbox.occupied())
    }

    /// Send `text` to `target`. Returns the mailbox slot used.
    pub fn tell(&self, target: ParticipantId, text: &str) -> Result<usize, ChatError> {
        let text = validate(text)?;
        let mut room = self.room.lock()?;
        if !room.registry.contains(target) {
            return Err(ChatError::UnknownParticipant(target));
        }
        self.deliver(&mut room, target, text)
    }

    /// Send `text` to every other participant under a single lock
    /// acquisition.
    ///
    /// Only validation and locking failures abort the broadcast; a recipient
    /// that cannot be served is recorded in [`Broadcast::failed`].
    pub fn say(&self, text: &str) -> Result<Broadcast, ChatError> {
        let text = validate(text)?;
        let mut room = self.room.lock()?;
        let recipients: Vec<ParticipantId> = room
            .registry
            .participants()
            .filter(|&participant| participant != self.me)
            .collect();

        let mut broadcast = Broadcast::default();
        for recipient in recipients {
            match self.deliver(&mut room, recipient, text) {
                Ok(_) => broadcast.delivered.push(recipient),
                Err(e) => {
                    tracing::warn!(%recipient, error = %e, "broadcast delivery failed");
                    broadcast.failed.push((recipient, e));
                }
            }
        }
        Ok(broadcast)
    }

    /// Store `text` for `target` and notify it. Caller holds the room lock.
    ///
    /// No notification goes out when the mailbox is full. If the notification
    /// cannot be sent the slot is freed again.
    fn deliver(
        &self,
        room: &mut RoomLayout,
        target: ParticipantId,
        text: &[u8],
    ) -> Result<usize, ChatError> {
        let slot = room.mailbox.store(self.me, target, text)?;
        if let Err(source) = self
            .notifier
            .notify(target, Notification::MessageReady { slot })
        {
            room.mailbox.release(slot);
            return Err(ChatError::Unreachable {
                participant: target,
                source,
            });
        }
        tracing::debug!(to = %target, slot, len = text.len(), "message stored");
        Ok(slot)
    }

    /// React to one notification from the inbox.
    ///
    /// Join requests are answered right away with the room id, without
    /// touching the lock. A message-ready notification takes the message out
    /// of its slot under the lock and returns it.
    pub fn handle(&self, envelope: Envelope) -> Result<Option<Message>, ChatError> {
        match envelope.notification {
            Notification::JoinRequest => {
                let approval = Notification::JoinApprove {
                    room: self.room.id(),
                };
                match self.notifier.notify(envelope.from, approval) {
                    Ok(()) => tracing::info!(requester = %envelope.from, "join request approved"),
                    Err(e) => tracing::warn!(
                        requester = %envelope.from,
                        error = %e,
                        "cannot answer join request"
                    ),
                }
                Ok(None)
            }
            Notification::JoinApprove { room } => {
                tracing::debug!(from = %envelope.from, %room, "ignoring stray join approval");
                Ok(None)
            }
            Notification::MessageReady { slot } => {
                let message = self.room.lock()?.mailbox.take(slot, self.me);
                if message.is_none() {
                    tracing::warn!(from = %envelope.from, slot, "no message for us in slot");
                }
                Ok(message)
            }
        }
    }

    /// Leave the room.
    ///
    /// Frees our registry slot and any messages still addressed to us. The
    /// participant that leaves the registry empty also unlinks the room's
    /// names; everyone else leaves them for the remaining participants.
    pub fn leave(self) -> Result<Departure, ChatError> {
        let mut room = self.room.lock()?;
        room.registry.release(self.me);
        let dropped_messages = room.mailbox.purge_for(self.me);
        let unlinked = room.registry.is_empty();
        if unlinked {
            self.room.unlink()?;
        }
        drop(room);

        tracing::info!(
            room = %self.room.id(),
            me = %self.me,
            dropped_messages,
            unlinked,
            "left room"
        );
        Ok(Departure {
            dropped_messages,
            unlinked,
        })
    }
}

async fn wait_for_approval(inbox: &mut Inbox) -> Result<ParticipantId, ChatError> {
    loop {
        let envelope = inbox.recv().await.ok_or_else(|| {
            ChatError::Signal("notification channel closed while waiting to join".into())
        })?;
        match envelope.notification {
            Notification::JoinApprove { room } => {
                tracing::debug!(from = %envelope.from, %room, "join approved");
                return Ok(room);
            }
            other => tracing::debug!(
                from = %envelope.from,
                notification = ?other,
                "ignored while joining"
            ),
        }
    }
}

fn validate(text: &str) -> Result<&[u8], ChatError> {
    if text.is_empty() {
        return Err(ChatError::Usage("message must not be empty".into()));
    }
    if text.len() > MAX_MESSAGE_LEN {
        return Err(ChatError::Overflow {
            len: text.len(),
            max: MAX_MESSAGE_LEN,
        });
    }
    Ok(text.as_bytes())
}
