use std::ffi::{CStr, CString};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

use tracing::{debug, info, warn};

use crate::config::SegmentConfig;
use crate::error::{Result, SegmentError};
use crate::traits::SharedRegion;

/// POSIX shared memory segment.
///
/// Named segments are created with `shm_open` and can be attached by any
/// process that knows the name; anonymous segments are shared with children
/// forked after creation. The mapping lives until the value is dropped.
pub struct Segment {
    ptr: NonNull<u8>,
    len: usize,
    name: Option<String>,
    /// Whether the name should be unlinked on drop (creator only).
    unlink_on_drop: bool,
}

impl Segment {
    /// Maximum segment name length, including the leading slash.
    const MAX_NAME_LEN: usize = 255;

    /// Create a new named segment of `len` zeroed bytes.
    ///
    /// Fails if a segment with this name already exists.
    pub fn create(name: &str, len: usize) -> Result<Self> {
        Self::create_with_config(name, len, SegmentConfig::default())
    }

    /// Create a new named segment with explicit configuration.
    pub fn create_with_config(name: &str, len: usize, config: SegmentConfig) -> Result<Self> {
        let cname = validate_name(name)?;
        if len == 0 {
            return Err(SegmentError::TooSmall { len, min: 1 });
        }

        let raw = shm_open(&cname, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, config.mode);
        if raw < 0 {
            return Err(SegmentError::Create {
                name: name.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }
        // SAFETY: `raw` is a freshly opened descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let sized = libc::off_t::try_from(len)
            .ok()
            // SAFETY: `fd` is an open shm descriptor.
            .map(|off| unsafe { libc::ftruncate(fd.as_raw_fd(), off) })
            .unwrap_or(-1);
        if sized != 0 {
            let source = std::io::Error::last_os_error();
            let _ = shm_unlink(&cname);
            return Err(SegmentError::Create {
                name: name.to_string(),
                source,
            });
        }

        let ptr = match map(name, Some(&fd), len) {
            Ok(ptr) => ptr,
            Err(err) => {
                let _ = shm_unlink(&cname);
                return Err(err);
            }
        };

        info!(name, len, "created shared memory segment");

        Ok(Self {
            ptr,
            len,
            name: Some(name.to_string()),
            unlink_on_drop: config.unlink_on_drop,
        })
    }

    /// Attach an existing named segment; its length is taken from the object.
    pub fn open(name: &str) -> Result<Self> {
        let cname = validate_name(name)?;

        let raw = shm_open(&cname, libc::O_RDWR, 0);
        if raw < 0 {
            return Err(SegmentError::Open {
                name: name.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }
        // SAFETY: `raw` is a freshly opened descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        let file = std::fs::File::from(fd);
        let len = file
            .metadata()
            .map_err(|source| SegmentError::Open {
                name: name.to_string(),
                source,
            })?
            .len() as usize;
        if len == 0 {
            return Err(SegmentError::TooSmall { len, min: 1 });
        }

        let fd = OwnedFd::from(file);
        let ptr = map(name, Some(&fd), len)?;

        debug!(name, len, "attached shared memory segment");

        Ok(Self {
            ptr,
            len,
            name: Some(name.to_string()),
            unlink_on_drop: false,
        })
    }

    /// Map `len` zeroed bytes shared with processes forked afterwards.
    pub fn anonymous(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(SegmentError::TooSmall { len, min: 1 });
        }
        let ptr = map("<anonymous>", None, len)?;
        debug!(len, "mapped anonymous shared segment");
        Ok(Self {
            ptr,
            len,
            name: None,
            unlink_on_drop: false,
        })
    }

    /// Remove a named segment. Existing mappings stay valid until dropped.
    pub fn unlink(name: &str) -> Result<()> {
        let cname = validate_name(name)?;
        shm_unlink(&cname).map_err(|source| SegmentError::Unlink {
            name: name.to_string(),
            source,
        })?;
        debug!(name, "unlinked shared memory segment");
        Ok(())
    }

    /// Override whether the segment name is removed when this value drops.
    pub fn set_unlink_on_drop(&mut self, unlink: bool) {
        self.unlink_on_drop = unlink;
    }
}

// SAFETY: `ptr` comes from a successful `mmap` of `len` bytes; mappings are
// page aligned (a multiple of REGION_ALIGN) and stay put until `munmap`.
unsafe impl SharedRegion for Segment {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

// SAFETY: the mapping is plain shared memory; synchronization is the job of
// the structures laid out in it.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` describe a mapping created by `map` and not yet
        // unmapped.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
        if rc != 0 {
            warn!(
                name = ?self.name,
                error = %std::io::Error::last_os_error(),
                "munmap failed"
            );
        }

        if self.unlink_on_drop {
            if let Some(name) = &self.name {
                if let Ok(cname) = CString::new(name.as_str()) {
                    debug!(name, "unlinking shared memory segment");
                    let _ = shm_unlink(&cname);
                }
            }
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("len", &self.len)
            .finish()
    }
}

fn validate_name(name: &str) -> Result<CString> {
    let invalid = |reason| SegmentError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if !name.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if name.len() < 2 {
        return Err(invalid("empty name"));
    }
    if name.len() > Segment::MAX_NAME_LEN {
        return Err(invalid("name too long"));
    }
    if name[1..].contains('/') {
        return Err(invalid("must not contain '/' after the first character"));
    }
    CString::new(name).map_err(|_| invalid("contains NUL byte"))
}

fn map(name: &str, fd: Option<&OwnedFd>, len: usize) -> Result<NonNull<u8>> {
    let (flags, raw_fd) = match fd {
        Some(fd) => (libc::MAP_SHARED, fd.as_raw_fd()),
        None => (libc::MAP_SHARED | libc::MAP_ANON, -1),
    };

    // SAFETY: a null hint lets the kernel choose the address; `raw_fd` is
    // either -1 for an anonymous mapping or an open descriptor sized to at
    // least `len` bytes.
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            raw_fd,
            0,
        )
    };

    if addr == libc::MAP_FAILED {
        return Err(SegmentError::Map {
            name: name.to_string(),
            len,
            source: std::io::Error::last_os_error(),
        });
    }

    NonNull::new(addr.cast::<u8>()).ok_or_else(|| SegmentError::Map {
        name: name.to_string(),
        len,
        source: std::io::Error::other("mmap returned null"),
    })
}

#[cfg(target_os = "macos")]
fn shm_open(name: &CStr, oflag: libc::c_int, mode: u32) -> libc::c_int {
    // SAFETY: `name` is a valid NUL-terminated string.
    unsafe { libc::shm_open(name.as_ptr(), oflag, mode as libc::c_uint) }
}

#[cfg(not(target_os = "macos"))]
fn shm_open(name: &CStr, oflag: libc::c_int, mode: u32) -> libc::c_int {
    // SAFETY: `name` is a valid NUL-terminated string.
    unsafe { libc::shm_open(name.as_ptr(), oflag, mode as libc::mode_t) }
}

fn shm_unlink(name: &CStr) -> std::io::Result<()> {
    // SAFETY: `name` is a valid NUL-terminated string.
    if unsafe { libc::shm_unlink(name.as_ptr()) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
