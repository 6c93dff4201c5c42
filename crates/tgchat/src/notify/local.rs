//! In-process notification exchange.
//!
//! Every connected participant gets an unbounded channel; notifying an id
//! that is not connected fails with `ESRCH`, the same way `sigqueue` does for
//! a process that is gone.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tgchat_room::ParticipantId;
use tokio::sync::mpsc;

use super::{Envelope, Inbox, Notification, Notifier};

#[derive(Default)]
pub struct LocalExchange {
    inboxes: Mutex<HashMap<ParticipantId, mpsc::UnboundedSender<Envelope>>>,
}

impl LocalExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connect `id`, replacing any previous connection under the same id.
    pub fn connect(self: &Arc<Self>, id: ParticipantId) -> (LocalNotifier, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().insert(id, tx);
        let notifier = LocalNotifier {
            exchange: self.clone(),
            id,
        };
        (notifier, rx)
    }

    pub fn disconnect(&self, id: ParticipantId) {
        self.inboxes.lock().remove(&id);
    }
}

/// Sending handle bound to one participant of a [`LocalExchange`].
#[derive(Clone)]
pub struct LocalNotifier {
    exchange: Arc<LocalExchange>,
    id: ParticipantId,
}

impl Notifier for LocalNotifier {
    fn notify(&self, to: ParticipantId, notification: Notification) -> io::Result<()> {
        let envelope = Envelope {
            from: self.id,
            notification,
        };
        let inboxes = self.exchange.inboxes.lock();
        let sent = inboxes
            .get(&to)
            .is_some_and(|inbox| inbox.send(envelope).is_ok());
        if sent {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(libc::ESRCH))
        }
    }
}
