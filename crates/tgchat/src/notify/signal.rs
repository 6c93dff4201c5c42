//! Realtime-signal notifications.
//!
//! Kind `k` travels as signal `SIGRTMIN + k.offset()` with the payload in
//! `si_value`. The installed handler does nothing but append a fixed-size
//! record `(signo, si_pid, si_value)` to a non-blocking pipe. A task on the
//! runtime drains the pipe and forwards decoded [`Envelope`]s to the inbox,
//! so all real work happens on the main line, never inside the handler.

use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicI32, Ordering};

use tgchat_room::ParticipantId;
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

use super::{Envelope, Inbox, Notification, NotificationKind, Notifier};
use crate::error::ChatError;

/// Write end of the notification pipe, -1 until installed.
static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// Bytes per pipe record: signo, sender pid, payload.
const RECORD_LEN: usize = 12;

/// Signal number used for `kind`.
pub fn signal_number(kind: NotificationKind) -> libc::c_int {
    libc::SIGRTMIN() + kind.offset()
}

fn kind_for_signal(signo: libc::c_int) -> Option<NotificationKind> {
    NotificationKind::from_offset(signo - libc::SIGRTMIN())
}

/// Notifier queuing realtime signals to other processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalNotifier;

impl Notifier for SignalNotifier {
    fn notify(&self, to: ParticipantId, notification: Notification) -> io::Result<()> {
        let value = libc::sigval {
            sival_ptr: notification.value() as isize as *mut libc::c_void,
        };
        let signo = signal_number(notification.kind());
        if unsafe { libc::sigqueue(to.get(), signo, value) } != 0 {
            return Err(io::Error::last_os_error());
        }
        tracing::trace!(%to, ?notification, "signal queued");
        Ok(())
    }
}

extern "C" fn on_notification(
    signo: libc::c_int,
    info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd < 0 || info.is_null() {
        return;
    }

    // SAFETY: errno is thread-local; restoring it keeps the interrupted code
    // unaware of the write below.
    let errno = unsafe { libc::__errno_location() };
    let saved_errno = unsafe { *errno };

    // SAFETY: the kernel passes a valid siginfo_t for SA_SIGINFO handlers.
    let (pid, value) = unsafe {
        let info = &*info;
        (info.si_pid(), info.si_value().sival_ptr as usize as i32)
    };

    let mut record = [0u8; RECORD_LEN];
    record[0..4].copy_from_slice(&signo.to_ne_bytes());
    record[4..8].copy_from_slice(&pid.to_ne_bytes());
    record[8..12].copy_from_slice(&value.to_ne_bytes());

    // A full pipe drops the notification; records are smaller than PIPE_BUF
    // so they are never split.
    unsafe {
        libc::write(fd, record.as_ptr() as *const libc::c_void, RECORD_LEN);
        *errno = saved_errno;
    }
}

fn decode_record(record: &[u8]) -> Option<Envelope> {
    let field = |at: usize| -> Option<i32> {
        Some(i32::from_ne_bytes(record.get(at..at + 4)?.try_into().ok()?))
    };
    let kind = kind_for_signal(field(0)?)?;
    let from = ParticipantId::new(field(4)?)?;
    let notification = Notification::decode(kind, field(8)?)?;
    Some(Envelope { from, notification })
}

/// Install handlers for all notification kinds and return the inbox they
/// feed.
///
/// Must be called from inside a tokio runtime, at most once per process.
pub fn install() -> Result<Inbox, ChatError> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) } != 0 {
        return Err(ChatError::Signal(format!(
            "pipe2: {}",
            io::Error::last_os_error()
        )));
    }
    // SAFETY: pipe2 just returned these descriptors.
    let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    if PIPE_WRITE_FD
        .compare_exchange(-1, write_end.as_raw_fd(), Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(ChatError::Signal(
            "notification handlers already installed".into(),
        ));
    }
    // The handler may write at any time from now on; the write end lives as
    // long as the process.
    std::mem::forget(write_end);

    for kind in NotificationKind::ALL {
        let signo = signal_number(kind);
        // SAFETY: zeroed sigaction is a valid starting point; every field we
        // rely on is set below.
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = on_notification
            as extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void)
            as libc::sighandler_t;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
        }
        if unsafe { libc::sigaction(signo, &action, std::ptr::null_mut()) } != 0 {
            return Err(ChatError::Signal(format!(
                "sigaction({signo}) for {kind:?}: {}",
                io::Error::last_os_error()
            )));
        }
    }

    // SAFETY: the OwnedFd moves into the AsyncFd and stays open until it is
    // dropped, always reporting the same descriptor.
    let read_end = unsafe { AsyncFd::register(read_end) }
        .map_err(|e| ChatError::Signal(format!("registering notification pipe: {e}")))?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(forward(read_end, tx));
    tracing::debug!(sigrtmin = libc::SIGRTMIN(), "notification handlers installed");
    Ok(rx)
}

/// Drain the pipe into the inbox until either side goes away.
///
/// Returning drops the sender, which the inbox owner sees as a closed
/// channel.
async fn forward(pipe: AsyncFd<OwnedFd>, inbox: mpsc::UnboundedSender<Envelope>) {
    let mut chunk = [0u8; RECORD_LEN * 64];
    let mut pending: Vec<u8> = Vec::with_capacity(chunk.len());

    loop {
        let mut ready = match pipe.readable().await {
            Ok(ready) => ready,
            Err(e) => {
                tracing::error!(error = %e, "notification pipe failed");
                return;
            }
        };

        let read = ready.try_io(|fd| {
            let n = unsafe {
                libc::read(
                    fd.as_raw_fd(),
                    chunk.as_mut_ptr() as *mut libc::c_void,
                    chunk.len(),
                )
            };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        });

        let n = match read {
            Ok(Ok(0)) => {
                tracing::error!("notification pipe closed");
                return;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "reading notifications failed");
                return;
            }
            // Spurious readiness.
            Err(_would_block) => continue,
        };

        pending.extend_from_slice(&chunk[..n]);
        let complete = pending.len() - pending.len() % RECORD_LEN;
        for record in pending[..complete].chunks_exact(RECORD_LEN) {
            match decode_record(record) {
                Some(envelope) => {
                    tracing::debug!(
                        from = %envelope.from,
                        notification = ?envelope.notification,
                        "notification received"
                    );
                    if inbox.send(envelope).is_err() {
                        return;
                    }
                }
                None => tracing::warn!("ignoring malformed notification"),
            }
        }
        pending.drain(..complete);
    }
}
