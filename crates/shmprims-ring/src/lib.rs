//! Lock-free record ring and multipart message framing over shared memory.
//!
//! This is the message layer of shmprims. A [`RecordRing`] stores
//! variable-length records in a fixed shared-memory block:
//! - Reservation-based, in-place writes committed with one release store
//! - Non-destructive peek, explicit consume
//! - Doubled-range heads, so `read_head == write_head` always means empty
//!
//! [`FramedWriter`] and [`FramedReader`] layer multipart messages on top:
//! a message is an ordered list of `{size, flags, payload}` frames stored as
//! exactly one record, built incrementally and consumed frame by frame.
//!
//! A ring created as [`RingType::Stream`] is instead a plain byte stream,
//! driven through [`StreamWriter`] and [`StreamReader`]. Any ring may carry
//! a small shared scratchpad next to its payload area.
//!
//! Nothing here blocks, allocates on the write path, or makes syscalls once
//! the ring exists. Absence of data or space is reported, never waited on.

pub mod config;
pub mod error;
pub mod flags;
pub mod frame;
pub mod layout;
pub mod reader;
pub mod record;
pub mod stream;
pub mod writer;

pub use config::{RingConfig, RingType, DEFAULT_CAPACITY, MIN_CAPACITY};
pub use error::{Result, RingError};
pub use flags::{FrameFlags, FrameType, PayloadType};
pub use frame::{Frame, FrameRef, Message, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use layout::{HEADER_SIZE, RECORD_HEADER_SIZE};
pub use reader::{FramedReader, Frames};
pub use record::{RecordIter, RecordRing, RingReader, RingWriter, WriteGrant};
pub use stream::{StreamReader, StreamWriter};
pub use writer::FramedWriter;
