//! POSIX shared memory object holding a [`RoomLayout`].

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::ptr::NonNull;

use crate::error::RoomError;
use crate::layout::{ROOM_LAYOUT_SIZE, RoomLayout};
use crate::names::c_name;

/// A mapped room store.
pub(crate) struct RoomMapping {
    /// Base address of the mapping.
    base_addr: NonNull<RoomLayout>,
    /// The shared memory object (kept open).
    _file: File,
}

// SAFETY: the mapping is plain memory; all access to the layout goes through
// the room lock.
unsafe impl Send for RoomMapping {}
unsafe impl Sync for RoomMapping {}

impl Drop for RoomMapping {
    fn drop(&mut self) {
        // SAFETY: base_addr and ROOM_LAYOUT_SIZE were valid when mapped.
        unsafe {
            libc::munmap(self.base_addr.as_ptr() as *mut libc::c_void, ROOM_LAYOUT_SIZE);
        }
    }
}

impl RoomMapping {
    /// Create the store, size it and initialize an empty room in it.
    ///
    /// Fails if an object with this name already exists.
    pub fn create(name: &str) -> Result<Self, RoomError> {
        let file = shm_open(name, libc::O_RDWR | libc::O_CREAT | libc::O_EXCL)?;

        let mapping = file
            .set_len(ROOM_LAYOUT_SIZE as u64)
            .map_err(|source| RoomError::Os {
                op: "ftruncate",
                name: name.to_string(),
                source,
            })
            .and_then(|()| Self::map(file, name));

        let mapping = match mapping {
            Ok(mapping) => mapping,
            Err(e) => {
                let _ = Self::unlink(name);
                return Err(e);
            }
        };

        // SAFETY: freshly created object; nobody else knows the room id yet.
        unsafe { (*mapping.as_ptr()).init() };
        Ok(mapping)
    }

    /// Map an existing store and check its header.
    pub fn attach(name: &str) -> Result<Self, RoomError> {
        let file = shm_open(name, libc::O_RDWR)?;

        let size = file
            .metadata()
            .map_err(|source| RoomError::Os {
                op: "fstat",
                name: name.to_string(),
                source,
            })?
            .len();
        if size < ROOM_LAYOUT_SIZE as u64 {
            return Err(RoomError::Layout {
                name: name.to_string(),
                reason: "store is smaller than a room",
            });
        }

        let mapping = Self::map(file, name)?;
        // SAFETY: the header is written once by the creator before the room
        // id is handed out and never changes afterwards.
        let header = unsafe { &(*mapping.as_ptr()).header };
        header.validate().map_err(|reason| RoomError::Layout {
            name: name.to_string(),
            reason,
        })?;
        Ok(mapping)
    }

    fn map(file: File, name: &str) -> Result<Self, RoomError> {
        let base_addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                ROOM_LAYOUT_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };

        if base_addr == libc::MAP_FAILED {
            return Err(RoomError::last_os("mmap", name));
        }

        let base_addr = NonNull::new(base_addr as *mut RoomLayout)
            .ok_or_else(|| RoomError::last_os("mmap", name))?;

        Ok(Self {
            base_addr,
            _file: file,
        })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut RoomLayout {
        self.base_addr.as_ptr()
    }

    /// Remove the store's name. Returns `false` if it did not exist.
    pub fn unlink(name: &str) -> Result<bool, RoomError> {
        let c_name = c_name(name)?;
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Ok(false);
        }
        Err(RoomError::Os {
            op: "shm_unlink",
            name: name.to_string(),
            source: err,
        })
    }
}

fn shm_open(name: &str, flags: libc::c_int) -> Result<File, RoomError> {
    let c_name = c_name(name)?;
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags | libc::O_CLOEXEC, 0o666) };
    if fd < 0 {
        return Err(RoomError::last_os("shm_open", name));
    }
    // SAFETY: shm_open just returned this descriptor and nothing else owns it.
    Ok(unsafe { File::from_raw_fd(fd) })
}
