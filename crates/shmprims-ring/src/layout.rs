//! Shared-memory layout of a record ring.
//!
//! ```text
//! ┌────────────────────────────────────────────┐ offset 0
//! │ magic "SRNG" │ capacity │ type │ version   │
//! │ writer claim │ reader claim │ scratchpad   │
//! │ (pad)                                      │
//! ├────────────────────────────────────────────┤ offset 64
//! │ write_head (u64, own cache line)           │
//! ├────────────────────────────────────────────┤ offset 128
//! │ read_head (u64, own cache line)            │
//! ├────────────────────────────────────────────┤ offset 192
//! │ payload[capacity]                          │
//! │   record: size (u32) │ bytes │ pad → 8     │
//! │   skip marker: u32::MAX, rest of lap free  │
//! ├────────────────────────────────────────────┤ next cache line
//! │ scratchpad[scratchpad_size] (optional)     │
//! └────────────────────────────────────────────┘
//! ```
//!
//! Stream rings use the payload as plain bytes, without record headers.
//!
//! Heads count bytes modulo `2 * capacity`. All integers are native endian:
//! a ring is shared between processes on one host, never across hosts.

use std::sync::atomic::{AtomicU32, AtomicU64};

/// Ring header magic: "SRNG".
pub const RING_MAGIC: u32 = 0x5352_4E47;

/// Layout version written by this crate.
pub const LAYOUT_VERSION: u32 = 1;

/// Size of the ring header; the payload starts right after it.
pub const HEADER_SIZE: usize = std::mem::size_of::<RingHeader>();

/// Size of the per-record length prefix.
pub const RECORD_HEADER_SIZE: usize = 4;

/// Records start on this boundary.
pub const RECORD_ALIGN: usize = 8;

/// Cache line size assumed for placing shared areas.
pub const CACHE_LINE: usize = 64;

/// Record size value marking "rest of this lap is unused, continue at 0".
pub const SKIP_MARKER: u32 = u32::MAX;

/// Keeps a hot field on its own cache line.
#[repr(C, align(64))]
pub struct CacheAligned<T>(pub T);

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Ring header as laid out in shared memory.
#[repr(C, align(64))]
pub struct RingHeader {
    pub magic: AtomicU32,
    pub capacity: u32,
    pub ring_type: u32,
    pub version: u32,
    pub writer: AtomicU32,
    pub reader: AtomicU32,
    pub scratchpad_size: u32,
    pub write_head: CacheAligned<AtomicU64>,
    pub read_head: CacheAligned<AtomicU64>,
}

impl RingHeader {
    /// A fresh, empty header. `magic` stays zero until published.
    pub fn new(capacity: u32, ring_type: u32, scratchpad_size: u32) -> Self {
        Self {
            magic: AtomicU32::new(0),
            capacity,
            ring_type,
            version: LAYOUT_VERSION,
            writer: AtomicU32::new(0),
            reader: AtomicU32::new(0),
            scratchpad_size,
            write_head: CacheAligned(AtomicU64::new(0)),
            read_head: CacheAligned(AtomicU64::new(0)),
        }
    }
}

/// Round `len` up to the record alignment.
pub const fn align_record(len: usize) -> usize {
    (len + RECORD_ALIGN - 1) & !(RECORD_ALIGN - 1)
}

/// Round `len` up to a whole cache line.
pub const fn align_cache(len: usize) -> usize {
    (len + CACHE_LINE - 1) & !(CACHE_LINE - 1)
}

/// Bytes a record with `payload` bytes occupies in the ring.
pub const fn record_span(payload: usize) -> usize {
    align_record(RECORD_HEADER_SIZE + payload)
}
