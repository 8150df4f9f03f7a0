use shmprims_segment::SegmentError;

use crate::config::RingType;

/// Errors reported by ring and framing operations.
///
/// `OutOfSpace`, `Empty` and `EndOfMessage` are ordinary flow signals the
/// caller is expected to handle. `Corrupted` means the shared header or a
/// stored record violates the ring's invariants and is never recoverable.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// Not enough free space for the reservation right now.
    #[error("ring out of space ({requested} bytes requested, {free} free)")]
    OutOfSpace { requested: usize, free: usize },

    /// The record can never fit, not even in an empty ring.
    #[error("record too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// No committed record is pending.
    #[error("ring empty")]
    Empty,

    /// Every frame of the current message has been read.
    #[error("end of message")]
    EndOfMessage,

    /// The call is not valid in the accessor's current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Shared memory violates a ring invariant.
    #[error("ring corrupted: {0}")]
    Corrupted(&'static str),

    /// No initialized ring header at this location.
    #[error("bad ring magic (found {found:#010x})")]
    BadMagic { found: u32 },

    /// The ring was laid out by an incompatible version.
    #[error("unsupported ring layout version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// The ring configuration is unusable.
    #[error("invalid ring config: {0}")]
    InvalidConfig(String),

    /// The ring was created for a different access mode.
    #[error("wrong ring type (expected {expected:?}, found {found:?})")]
    WrongRingType { expected: RingType, found: RingType },

    /// Another accessor already holds the writer side.
    #[error("ring writer already claimed by {owner}")]
    WriterClaimed { owner: u32 },

    /// Another accessor already holds the reader side.
    #[error("ring reader already claimed by {owner}")]
    ReaderClaimed { owner: u32 },

    /// The backing region could not provide the requested span.
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),
}

impl RingError {
    /// True for the normal "nothing (more) to read" signals.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, RingError::Empty | RingError::EndOfMessage)
    }

    /// True if the same call may succeed later without any change by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RingError::OutOfSpace { .. } | RingError::Empty)
    }

    /// True if shared memory can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RingError::Corrupted(_)
                | RingError::BadMagic { .. }
                | RingError::UnsupportedVersion { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RingError>;
