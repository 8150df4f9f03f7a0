use crate::error::{Result, RingError};
use crate::layout::{align_cache, align_record, HEADER_SIZE, RECORD_ALIGN};

/// Default ring payload capacity: 16 KiB.
pub const DEFAULT_CAPACITY: u32 = 16 * 1024;

/// Smallest accepted ring payload capacity.
pub const MIN_CAPACITY: u32 = 64;

/// Largest accepted ring payload capacity (keeps record offsets in `u32`).
pub const MAX_CAPACITY: u32 = (i32::MAX as u32) & !(RECORD_ALIGN as u32 - 1);

/// How the payload area of a ring is meant to be accessed.
///
/// Stored in the ring header so attaching parties agree on the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RingType {
    /// Opaque records.
    #[default]
    Record,
    /// Each record is one multipart message.
    Multipart,
    /// A plain byte stream without record boundaries.
    Stream,
}

impl RingType {
    /// Header encoding of this type.
    pub const fn as_raw(self) -> u32 {
        match self {
            RingType::Record => 0,
            RingType::Multipart => 1,
            RingType::Stream => 2,
        }
    }

    /// Decode the header encoding; `None` for unknown values.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(RingType::Record),
            1 => Some(RingType::Multipart),
            2 => Some(RingType::Stream),
            _ => None,
        }
    }
}

/// Configuration for a new ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RingConfig {
    /// Payload capacity in bytes. Rounded up to the record alignment.
    pub capacity: u32,
    /// Access mode recorded in the header.
    pub ring_type: RingType,
    /// Size of the shared scratchpad placed after the payload; 0 for none.
    pub scratchpad: u32,
}

impl RingConfig {
    /// A plain record ring of `capacity` bytes.
    pub fn record(capacity: u32) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// A multipart message ring of `capacity` bytes.
    pub fn multipart(capacity: u32) -> Self {
        Self {
            capacity,
            ring_type: RingType::Multipart,
            ..Self::default()
        }
    }

    /// A byte-stream ring of `capacity` bytes.
    pub fn stream(capacity: u32) -> Self {
        Self {
            capacity,
            ring_type: RingType::Stream,
            ..Self::default()
        }
    }

    /// Add a scratchpad of `size` bytes after the payload area.
    pub fn with_scratchpad(mut self, size: u32) -> Self {
        self.scratchpad = size;
        self
    }

    /// Check the configuration and return it with the capacity normalized.
    pub fn validate(&self) -> Result<Self> {
        if self.capacity < MIN_CAPACITY {
            return Err(RingError::InvalidConfig(format!(
                "capacity {} below minimum {MIN_CAPACITY}",
                self.capacity
            )));
        }
        if self.capacity > MAX_CAPACITY {
            return Err(RingError::InvalidConfig(format!(
                "capacity {} above maximum {MAX_CAPACITY}",
                self.capacity
            )));
        }
        if self.scratchpad > MAX_CAPACITY {
            return Err(RingError::InvalidConfig(format!(
                "scratchpad {} above maximum {MAX_CAPACITY}",
                self.scratchpad
            )));
        }
        Ok(Self {
            capacity: align_record(self.capacity as usize) as u32,
            ..*self
        })
    }

    /// Offset of the scratchpad from the start of the ring header.
    ///
    /// The scratchpad starts on its own cache line.
    pub fn scratchpad_offset(&self) -> usize {
        HEADER_SIZE + align_cache(self.capacity as usize)
    }

    /// Bytes of shared memory a ring with this configuration occupies.
    pub fn memory_size(&self) -> usize {
        match self.scratchpad {
            0 => HEADER_SIZE + align_record(self.capacity as usize),
            size => self.scratchpad_offset() + size as usize,
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ring_type: RingType::Record,
            scratchpad: 0,
        }
    }
}
