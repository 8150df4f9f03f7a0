//! Shared-memory regions for realtime IPC.
//!
//! Provides the raw memory every other shmprims layer is laid out in:
//! - POSIX shared memory segments, named or anonymous (Linux/macOS)
//! - Zeroed, cache-line aligned heap regions (in-process use)
//!
//! This is the lowest layer of shmprims. The ring and state crates only ever
//! see a [`SharedRegion`]; all `mmap`/`shm_open` handling stays in here.

pub mod config;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod posix;

pub use config::SegmentConfig;
pub use error::{Result, SegmentError};
pub use traits::{check_span, HeapRegion, SharedRegion, REGION_ALIGN};

#[cfg(unix)]
pub use posix::Segment;
