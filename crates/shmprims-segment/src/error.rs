/// Errors that can occur while creating, mapping or addressing shared memory.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// The segment name is not a valid POSIX shared memory name.
    #[error("invalid segment name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Failed to create the named segment.
    #[error("failed to create segment {name}: {source}")]
    Create {
        name: String,
        source: std::io::Error,
    },

    /// Failed to open an existing named segment.
    #[error("failed to open segment {name}: {source}")]
    Open {
        name: String,
        source: std::io::Error,
    },

    /// Failed to map the segment into this process.
    #[error("failed to map segment {name} ({len} bytes): {source}")]
    Map {
        name: String,
        len: usize,
        source: std::io::Error,
    },

    /// Failed to unlink the named segment.
    #[error("failed to unlink segment {name}: {source}")]
    Unlink {
        name: String,
        source: std::io::Error,
    },

    /// A zero-sized (or otherwise unusable) region was requested.
    #[error("region too small ({len} bytes, need at least {min})")]
    TooSmall { len: usize, min: usize },

    /// A structure does not fit inside the region at the given offset.
    #[error("span {offset}+{len} exceeds region of {region_len} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        region_len: usize,
    },

    /// A structure was placed at an offset that violates its alignment.
    #[error("offset {offset} is not aligned to {align} bytes")]
    Misaligned { offset: usize, align: usize },
}

pub type Result<T> = std::result::Result<T, SegmentError>;
