//! Named POSIX semaphore used as the room's cross-process lock.
//!
//! The semaphore is binary (initial value 1). It is not reentrant: a
//! participant that acquires it twice without releasing deadlocks itself.

use std::io;
use std::time::Duration;
use std::ptr::NonNull;

use crate::error::RoomError;
use crate::names::c_name;

pub(crate) struct NamedLock {
    sem: NonNull<libc::sem_t>,
    name: String,
}

// SAFETY: POSIX semaphores may be used from any thread.
unsafe impl Send for NamedLock {}
unsafe impl Sync for NamedLock {}

impl Drop for NamedLock {
    fn drop(&mut self) {
        // SAFETY: sem came from a successful sem_open.
        unsafe {
            libc::sem_close(self.sem.as_ptr());
        }
    }
}

impl NamedLock {
    /// Create the semaphore, unlocked. Fails if it already exists.
    pub fn create(name: &str) -> Result<Self, RoomError> {
        let c_name = c_name(name)?;
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o666 as libc::c_uint,
                1 as libc::c_uint,
            )
        };
        Self::from_raw(sem, name)
    }

    /// Open an existing semaphore.
    pub fn open(name: &str) -> Result<Self, RoomError> {
        let c_name = c_name(name)?;
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        Self::from_raw(sem, name)
    }

    fn from_raw(sem: *mut libc::sem_t, name: &str) -> Result<Self, RoomError> {
        if sem == libc::SEM_FAILED {
            return Err(RoomError::last_os("sem_open", name));
        }
        let sem = NonNull::new(sem).ok_or_else(|| RoomError::last_os("sem_open", name))?;
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// Block until the lock is ours. Interrupted waits are retried.
    pub fn acquire(&self) -> Result<(), RoomError> {
        loop {
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(RoomError::Os {
                    op: "sem_wait",
                    name: self.name.clone(),
                    source: err,
                });
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `timeout`.
    /// Returns `false` if the lock stayed taken.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<bool, RoomError> {
        let mut deadline = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut deadline) } != 0 {
            return Err(RoomError::last_os("clock_gettime", &self.name));
        }
        let nanos = deadline.tv_nsec as u64 + u64::from(timeout.subsec_nanos());
        deadline.tv_sec += (timeout.as_secs() + nanos / 1_000_000_000) as libc::time_t;
        deadline.tv_nsec = (nanos % 1_000_000_000) as libc::c_long;

        loop {
            if unsafe { libc::sem_timedwait(self.sem.as_ptr(), &deadline) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Ok(false),
                _ => {
                    return Err(RoomError::Os {
                        op: "sem_timedwait",
                        name: self.name.clone(),
                        source: err,
                    });
                }
            }
        }
    }

    pub fn release(&self) {
        if unsafe { libc::sem_post(self.sem.as_ptr()) } != 0 {
            tracing::error!(
                name = %self.name,
                error = %io::Error::last_os_error(),
                "sem_post failed"
            );
        }
    }

    /// Remove the semaphore's name. Returns `false` if it did not exist.
    pub fn unlink(name: &str) -> Result<bool, RoomError> {
        let c_name = c_name(name)?;
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Ok(false);
        }
        Err(RoomError::Os {
            op: "sem_unlink",
            name: name.to_string(),
            source: err,
        })
    }
}
