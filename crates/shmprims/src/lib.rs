//! Lock-free shared-memory primitives for realtime IPC.
//!
//! shmprims moves data between a hard-realtime producer, which must never
//! block, allocate or make syscalls, and non-realtime consumers, using only
//! shared memory.
//!
//! # Crate Structure
//!
//! - [`segment`]: Shared memory regions (POSIX shm, anonymous, heap)
//! - [`ring`]: Record ring and multipart message framing
//! - [`state`]: Triple buffer for latest-value state snapshots
//! - [`logging`]: `tracing` subscriber setup (behind `logging` feature)

/// Re-export segment types.
pub mod segment {
    pub use shmprims_segment::*;
}

/// Re-export ring types.
pub mod ring {
    pub use shmprims_ring::*;
}

/// Re-export state snapshot types.
pub mod state {
    pub use shmprims_state::*;
}

#[cfg(feature = "logging")]
pub mod logging;
