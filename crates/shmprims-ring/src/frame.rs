use bytes::Bytes;

use crate::error::{Result, RingError};
use crate::flags::FrameFlags;

/// Frame header: size (4) + flags (4) = 8 bytes, native endian.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload a frame header can describe.
pub const MAX_FRAME_SIZE: usize = i32::MAX as usize;

/// A frame borrowed from the ring.
///
/// Valid until the message is shifted; copy it out with
/// [`to_frame`](Self::to_frame) to keep it longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef<'a> {
    pub flags: FrameFlags,
    pub data: &'a [u8],
}

impl FrameRef<'_> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy the payload into an owned frame.
    pub fn to_frame(&self) -> Frame {
        Frame::new(self.flags, Bytes::copy_from_slice(self.data))
    }
}

/// An owned frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flags: FrameFlags,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(flags: impl Into<FrameFlags>, payload: impl Into<Bytes>) -> Self {
        Self {
            flags: flags.into(),
            payload: payload.into(),
        }
    }

    /// Bytes this frame occupies inside a record (header + payload).
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    pub fn as_frame_ref(&self) -> FrameRef<'_> {
        FrameRef {
            flags: self.flags,
            data: &self.payload,
        }
    }
}

/// An owned multipart message: an ordered list of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Frame>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame.
    pub fn push(&mut self, flags: impl Into<FrameFlags>, payload: impl Into<Bytes>) {
        self.frames.push(Frame::new(flags, payload));
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, flags: impl Into<FrameFlags>, payload: impl Into<Bytes>) -> Self {
        self.push(flags, payload);
        self
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bytes the whole message occupies as one record payload.
    pub fn wire_size(&self) -> usize {
        self.frames.iter().map(Frame::wire_size).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }
}

impl From<Vec<Frame>> for Message {
    fn from(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

impl FromIterator<Frame> for Message {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Message {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Write a frame header at the start of `dst`.
///
/// Layout:
/// ```text
/// ┌──────────────┬──────────────┬─────────────────┐
/// │ Size (4B NE) │ Flags (4B NE)│ Payload         │
/// │ i32          │ i32          │ (Size bytes)    │
/// └──────────────┴──────────────┴─────────────────┘
/// ```
pub(crate) fn encode_header(dst: &mut [u8], size: usize, flags: FrameFlags) {
    dst[..4].copy_from_slice(&(size as i32).to_ne_bytes());
    dst[4..FRAME_HEADER_SIZE].copy_from_slice(&flags.bits().to_ne_bytes());
}

/// Patch the size field of a header written by [`encode_header`].
pub(crate) fn patch_size(dst: &mut [u8], size: usize) {
    dst[..4].copy_from_slice(&(size as i32).to_ne_bytes());
}

/// Decode the frame at the start of `src`, the unread rest of a record.
///
/// Returns the frame and the number of bytes it occupies.
pub(crate) fn decode_frame(src: &[u8]) -> Result<(FrameRef<'_>, usize)> {
    if src.len() < FRAME_HEADER_SIZE {
        return Err(RingError::Corrupted("truncated frame header"));
    }
    let size = i32::from_ne_bytes([src[0], src[1], src[2], src[3]]);
    let flags = i32::from_ne_bytes([src[4], src[5], src[6], src[7]]);

    let size = usize::try_from(size).map_err(|_| RingError::Corrupted("negative frame size"))?;
    let end = FRAME_HEADER_SIZE + size;
    if end > src.len() {
        return Err(RingError::Corrupted("frame extends past record"));
    }

    let frame = FrameRef {
        flags: FrameFlags::from_bits(flags),
        data: &src[FRAME_HEADER_SIZE..end],
    };
    Ok((frame, end))
}
