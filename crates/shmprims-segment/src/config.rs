/// Controls how named segments are created and cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SegmentConfig {
    /// Permission bits for newly created segments.
    pub mode: u32,
    /// When true, a segment created by this process is unlinked on drop.
    pub unlink_on_drop: bool,
}

impl SegmentConfig {
    /// Default permission mode for created segments.
    pub const DEFAULT_MODE: u32 = 0o600;
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            mode: Self::DEFAULT_MODE,
            unlink_on_drop: true,
        }
    }
}
