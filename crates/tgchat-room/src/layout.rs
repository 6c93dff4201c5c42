//! Room memory layout definitions.
//!
//! This module defines the `repr(C)` structures stored in the room's shared
//! memory object. Every participant maps the same object, so all fields are
//! plain integers and bytes: an all-zero object is a valid, empty room apart
//! from the header.
//!
//! # Memory Layout
//!
//! ```text
//! +-------------------------------------------------------------------+
//! | ROOM HEADER (16 bytes)                                            |
//! |   magic: "TGROOM\0\0", version                                    |
//! +-------------------------------------------------------------------+
//! | REGISTRY (MAX_PARTICIPANTS entries, 4 bytes each)                 |
//! |   0 = empty, otherwise the owning participant's process id        |
//! +-------------------------------------------------------------------+
//! | MAILBOX (MAILBOX_SLOTS entries, 272 bytes each)                   |
//! |   Per slot: len, sender, recipient, data[MAX_MESSAGE_LEN]         |
//! |   len == 0 marks a free slot                                      |
//! +-------------------------------------------------------------------+
//! ```
//!
//! Nothing here synchronizes. Callers mutate a [`RoomLayout`] only while
//! holding the room lock (see [`crate::RoomGuard`]).

use core::mem::size_of;

use crate::error::RoomError;
use crate::participant::ParticipantId;

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes identifying a tgchat room store.
pub const ROOM_MAGIC: [u8; 8] = *b"TGROOM\0\0";

/// Current layout version.
pub const ROOM_LAYOUT_VERSION: u32 = 1;

/// Number of registry slots.
pub const MAX_PARTICIPANTS: usize = 10;

/// Number of mailbox slots.
pub const MAILBOX_SLOTS: usize = 256;

/// Maximum message text length in bytes.
pub const MAX_MESSAGE_LEN: usize = 256;

/// Size of the shared memory object backing a room.
pub const ROOM_LAYOUT_SIZE: usize = size_of::<RoomLayout>();

// =============================================================================
// Room Header
// =============================================================================

/// Header at the start of the room store (16 bytes).
#[repr(C)]
pub struct RoomHeader {
    /// Magic bytes: "TGROOM\0\0".
    pub magic: [u8; 8],
    /// Layout version.
    pub version: u32,
    /// Reserved.
    pub _pad: u32,
}

const _: () = assert!(size_of::<RoomHeader>() == 16);

impl RoomHeader {
    pub fn init(&mut self) {
        self.magic = ROOM_MAGIC;
        self.version = ROOM_LAYOUT_VERSION;
        self._pad = 0;
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.magic != ROOM_MAGIC {
            return Err("not a room store (bad magic)");
        }
        if self.version != ROOM_LAYOUT_VERSION {
            return Err("incompatible room layout version");
        }
        Ok(())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Fixed-capacity table of current participants.
///
/// A non-zero slot belongs to the participant whose id it stores. No id is
/// stored twice. Slot position carries no meaning beyond "first empty slot
/// wins" on allocation.
#[repr(C)]
pub struct Registry {
    slots: [i32; MAX_PARTICIPANTS],
}

const _: () = assert!(size_of::<Registry>() == 4 * MAX_PARTICIPANTS);

impl Registry {
    pub const fn new() -> Self {
        Self {
            slots: [0; MAX_PARTICIPANTS],
        }
    }

    pub fn clear(&mut self) {
        self.slots = [0; MAX_PARTICIPANTS];
    }

    /// Register `id` in the first empty slot and return the slot index.
    ///
    /// Registering an id that is already present returns its existing slot.
    /// A full registry is left untouched.
    pub fn claim(&mut self, id: ParticipantId) -> Result<usize, RoomError> {
        if let Some(index) = self.position(id) {
            return Ok(index);
        }
        let index = self
            .slots
            .iter()
            .position(|&slot| slot == 0)
            .ok_or(RoomError::RoomFull)?;
        self.slots[index] = id.get();
        Ok(index)
    }

    /// Zero the slot owned by `id`. Returns the slot it held, if any.
    pub fn release(&mut self, id: ParticipantId) -> Option<usize> {
        let index = self.position(id)?;
        self.slots[index] = 0;
        Some(index)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: ParticipantId) -> Option<usize> {
        self.slots.iter().position(|&slot| slot == id.get())
    }

    /// Registered participants in slot order.
    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.slots.iter().copied().filter_map(ParticipantId::new)
    }

    pub fn len(&self) -> usize {
        self.participants().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw slot contents, zero for empty slots.
    pub fn raw_slots(&self) -> &[i32; MAX_PARTICIPANTS] {
        &self.slots
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Mailbox
// =============================================================================

/// A single mailbox slot (272 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MessageSlot {
    /// Payload length; zero means the slot is free.
    pub len: u32,
    /// Process id of the sender.
    pub sender: i32,
    /// Process id of the participant expected to drain this slot.
    pub recipient: i32,
    /// Reserved.
    pub _pad: u32,
    /// Message text, `len` bytes of which are meaningful.
    pub data: [u8; MAX_MESSAGE_LEN],
}

const _: () = assert!(size_of::<MessageSlot>() == 16 + MAX_MESSAGE_LEN);

impl MessageSlot {
    pub const EMPTY: Self = Self {
        len: 0,
        sender: 0,
        recipient: 0,
        _pad: 0,
        data: [0; MAX_MESSAGE_LEN],
    };

    #[inline]
    pub fn is_free(&self) -> bool {
        self.len == 0
    }

    pub fn payload(&self) -> &[u8] {
        let len = (self.len as usize).min(MAX_MESSAGE_LEN);
        &self.data[..len]
    }

    fn clear(&mut self) {
        *self = Self::EMPTY;
    }
}

/// A message copied out of the mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: ParticipantId,
    pub recipient: ParticipantId,
    pub text: Vec<u8>,
}

impl Message {
    /// The line shown to the recipient: `"<sender>: <text>"`.
    pub fn render(&self) -> String {
        format!("{}: {}", self.sender, String::from_utf8_lossy(&self.text))
    }
}

/// Fixed pool of pending messages.
///
/// A slot is occupied from the moment a sender stores a message in it until
/// the recipient takes it out. At most one message occupies a slot.
#[repr(C)]
pub struct Mailbox {
    slots: [MessageSlot; MAILBOX_SLOTS],
}

const _: () = assert!(size_of::<Mailbox>() == MAILBOX_SLOTS * size_of::<MessageSlot>());

impl Mailbox {
    pub const fn new() -> Self {
        Self {
            slots: [MessageSlot::EMPTY; MAILBOX_SLOTS],
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
    }

    /// Copy `text` into the first free slot and return its index.
    ///
    /// Fails without touching any slot when the text is empty, longer than
    /// [`MAX_MESSAGE_LEN`], or when no slot is free.
    pub fn store(
        &mut self,
        sender: ParticipantId,
        recipient: ParticipantId,
        text: &[u8],
    ) -> Result<usize, RoomError> {
        if text.is_empty() {
            return Err(RoomError::EmptyMessage);
        }
        if text.len() > MAX_MESSAGE_LEN {
            return Err(RoomError::Overflow { len: text.len() });
        }
        let index = self
            .slots
            .iter()
            .position(MessageSlot::is_free)
            .ok_or(RoomError::MailboxFull)?;

        let slot = &mut self.slots[index];
        slot.data[..text.len()].copy_from_slice(text);
        slot.data[text.len()..].fill(0);
        slot.sender = sender.get();
        slot.recipient = recipient.get();
        slot.len = text.len() as u32;
        Ok(index)
    }

    pub fn slot(&self, index: usize) -> Option<&MessageSlot> {
        self.slots.get(index)
    }

    /// Copy the message at `index` out and free the slot.
    ///
    /// Returns `None`, leaving the slot alone, if the index is out of range,
    /// the slot is free, or the message is addressed to someone else.
    pub fn take(&mut self, index: usize, recipient: ParticipantId) -> Option<Message> {
        let slot = self.slots.get_mut(index)?;
        if slot.is_free() || slot.recipient != recipient.get() {
            return None;
        }
        let message = Message {
            sender: ParticipantId::new(slot.sender)?,
            recipient,
            text: slot.payload().to_vec(),
        };
        slot.clear();
        Some(message)
    }

    /// Free the slot at `index` unconditionally.
    pub fn release(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.clear();
        }
    }

    /// Free every slot still addressed to `recipient`. Returns how many.
    pub fn purge_for(&mut self, recipient: ParticipantId) -> usize {
        let mut purged = 0;
        for slot in &mut self.slots {
            if !slot.is_free() && slot.recipient == recipient.get() {
                slot.clear();
                purged += 1;
            }
        }
        purged
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Room Layout
// =============================================================================

/// Everything stored in the room's shared memory object.
#[repr(C)]
pub struct RoomLayout {
    pub header: RoomHeader,
    pub registry: Registry,
    pub mailbox: Mailbox,
}

impl RoomLayout {
    /// Write the header and empty both structures.
    pub fn init(&mut self) {
        self.header.init();
        self.registry.clear();
        self.mailbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: i32) -> ParticipantId {
        ParticipantId::new(raw).unwrap()
    }

    #[test]
    fn registry_claims_first_empty_slot() {
        let mut registry = Registry::new();
        assert_eq!(registry.claim(id(1000)).unwrap(), 0);
        assert_eq!(registry.claim(id(1001)).unwrap(), 1);
        assert_eq!(registry.release(id(1000)), Some(0));
        assert_eq!(registry.claim(id(1002)).unwrap(), 0);
        assert_eq!(
            registry.participants().collect::<Vec<_>>(),
            vec![id(1002), id(1001)]
        );
    }

    #[test]
    fn registry_never_stores_an_id_twice() {
        let mut registry = Registry::new();
        registry.claim(id(7)).unwrap();
        assert_eq!(registry.claim(id(7)).unwrap(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn full_registry_is_not_mutated() {
        let mut registry = Registry::new();
        for raw in 1..=MAX_PARTICIPANTS as i32 {
            registry.claim(id(raw)).unwrap();
        }
        let before = *registry.raw_slots();
        assert!(matches!(registry.claim(id(99)), Err(RoomError::RoomFull)));
        assert_eq!(*registry.raw_slots(), before);
        assert_eq!(registry.len(), MAX_PARTICIPANTS);
    }

    #[test]
    fn release_of_unknown_id_is_a_no_op() {
        let mut registry = Registry::new();
        registry.claim(id(5)).unwrap();
        assert_eq!(registry.release(id(6)), None);
        assert!(registry.contains(id(5)));
    }

    #[test]
    fn mailbox_slot_goes_free_occupied_free() {
        let mut mailbox = Box::new(Mailbox::new());
        let index = mailbox.store(id(1), id(2), b"hello").unwrap();
        assert!(!mailbox.slot(index).unwrap().is_free());
        assert_eq!(mailbox.occupied(), 1);

        let message = mailbox.take(index, id(2)).unwrap();
        assert_eq!(message.sender, id(1));
        assert_eq!(message.text, b"hello");
        assert_eq!(message.render(), "1: hello");
        assert!(mailbox.slot(index).unwrap().is_free());

        // A second take of the same slot finds nothing.
        assert!(mailbox.take(index, id(2)).is_none());
    }

    #[test]
    fn take_ignores_slots_for_other_recipients() {
        let mut mailbox = Box::new(Mailbox::new());
        let index = mailbox.store(id(1), id(2), b"for two").unwrap();
        assert!(mailbox.take(index, id(3)).is_none());
        assert!(mailbox.take(MAILBOX_SLOTS + 4, id(2)).is_none());
        assert_eq!(mailbox.occupied(), 1);
    }

    #[test]
    fn oversized_and_empty_messages_leave_mailbox_untouched() {
        let mut mailbox = Box::new(Mailbox::new());
        let long = vec![b'x'; MAX_MESSAGE_LEN + 1];
        assert!(matches!(
            mailbox.store(id(1), id(2), &long),
            Err(RoomError::Overflow { len }) if len == MAX_MESSAGE_LEN + 1
        ));
        assert!(matches!(
            mailbox.store(id(1), id(2), b""),
            Err(RoomError::EmptyMessage)
        ));
        assert_eq!(mailbox.occupied(), 0);

        let exact = vec![b'y'; MAX_MESSAGE_LEN];
        let index = mailbox.store(id(1), id(2), &exact).unwrap();
        assert_eq!(mailbox.slot(index).unwrap().payload(), exact.as_slice());
    }

    #[test]
    fn full_mailbox_reports_mailbox_full() {
        let mut mailbox = Box::new(Mailbox::new());
        for _ in 0..MAILBOX_SLOTS {
            mailbox.store(id(1), id(2), b"m").unwrap();
        }
        assert!(matches!(
            mailbox.store(id(1), id(2), b"one more"),
            Err(RoomError::MailboxFull)
        ));
        mailbox.release(17);
        assert_eq!(mailbox.store(id(1), id(2), b"fits").unwrap(), 17);
    }

    #[test]
    fn shorter_message_does_not_leak_previous_bytes() {
        let mut mailbox = Box::new(Mailbox::new());
        let index = mailbox.store(id(1), id(2), b"a long first message").unwrap();
        mailbox.take(index, id(2)).unwrap();
        let index = mailbox.store(id(1), id(2), b"hi").unwrap();
        let slot = mailbox.slot(index).unwrap();
        assert_eq!(slot.payload(), b"hi");
        assert!(slot.data[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn purge_frees_only_the_recipients_slots() {
        let mut mailbox = Box::new(Mailbox::new());
        mailbox.store(id(1), id(2), b"a").unwrap();
        mailbox.store(id(1), id(3), b"b").unwrap();
        mailbox.store(id(3), id(2), b"c").unwrap();
        assert_eq!(mailbox.purge_for(id(2)), 2);
        assert_eq!(mailbox.occupied(), 1);
    }

    #[test]
    fn header_validation() {
        let mut header = RoomHeader {
            magic: [0; 8],
            version: 0,
            _pad: 0,
        };
        assert!(header.validate().is_err());
        header.init();
        assert!(header.validate().is_ok());
        header.version = ROOM_LAYOUT_VERSION + 1;
        assert!(header.validate().is_err());
    }
}
