use shmprims_segment::SegmentError;

/// Errors reported by the state-snapshot layer.
///
/// None of these come from `commit` or `snapshot` themselves: both always
/// succeed once a writer or reader handle is held.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Another writer handle is alive.
    #[error("triple buffer writer already claimed")]
    WriterClaimed,

    /// Another reader currently holds the snapshot slot.
    #[error("triple buffer reader busy")]
    ReaderBusy,

    /// The role flag is not a permutation of the three slots.
    #[error("triple buffer corrupted: {0}")]
    Corrupted(&'static str),

    /// Underlying shared memory error.
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),
}

impl StateError {
    /// True if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StateError::ReaderBusy)
    }
}

pub type Result<T> = std::result::Result<T, StateError>;
