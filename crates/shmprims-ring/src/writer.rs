use crate::config::RingType;
use crate::error::{Result, RingError};
use crate::flags::FrameFlags;
use crate::frame::{encode_header, patch_size, Message, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
use crate::record::{RecordRing, Reservation, RingWriter};

/// Builds multipart messages in place, one ring record per message.
///
/// Frames are appended to a single uncommitted record that grows as needed;
/// [`flush`](Self::flush) publishes the whole message at once. Nothing is
/// visible to the reader before that.
pub struct FramedWriter {
    inner: RingWriter,
    /// Reservation of the message being built.
    open: Option<Reservation>,
    /// Bytes of completed frames in the open message.
    write_off: usize,
    /// Payload capacity of the frame between `begin_frame` and `end_frame`.
    frame: Option<usize>,
    frames: usize,
}

impl FramedWriter {
    /// Wrap the writer side of a multipart ring.
    pub fn new(inner: RingWriter) -> Result<Self> {
        let found = inner.ring().ring_type();
        if found != RingType::Multipart {
            return Err(RingError::WrongRingType {
                expected: RingType::Multipart,
                found,
            });
        }
        Ok(Self {
            inner,
            open: None,
            write_off: 0,
            frame: None,
            frames: 0,
        })
    }

    /// Claim the writer side of `ring` and wrap it.
    pub fn claim(ring: &RecordRing) -> Result<Self> {
        Self::new(ring.writer()?)
    }

    /// Start a frame of up to `size` bytes and return its payload area.
    ///
    /// Opens a message if none is open, or grows the open one when it lacks
    /// room. On failure the message built so far is left intact.
    pub fn begin_frame(&mut self, size: usize, flags: FrameFlags) -> Result<&mut [u8]> {
        if self.frame.is_some() {
            return Err(RingError::InvalidState("frame already open"));
        }
        if size > MAX_FRAME_SIZE {
            return Err(RingError::TooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        let header_at = self.write_off;
        let payload_at = header_at + FRAME_HEADER_SIZE;
        let needed = payload_at
            .checked_add(size)
            .ok_or(RingError::TooLarge {
                size,
                max: MAX_FRAME_SIZE,
            })?;

        let reservation = match self.open.take() {
            None => self.inner.reserve_raw(needed)?,
            Some(current) if current.len() >= needed => current,
            Some(current) => match self.inner.grow(&current, needed, header_at) {
                Ok(grown) => grown,
                Err(err) => {
                    self.open = Some(current);
                    return Err(err);
                }
            },
        };
        let reservation = self.open.insert(reservation);
        self.frame = Some(size);

        let slot = self.inner.slot_mut(reservation);
        encode_header(&mut slot[header_at..payload_at], size, flags);
        Ok(&mut slot[payload_at..payload_at + size])
    }

    /// Close the frame opened by [`begin_frame`](Self::begin_frame), keeping
    /// its first `actual` bytes.
    pub fn end_frame(&mut self, actual: usize) -> Result<()> {
        let size = self
            .frame
            .ok_or(RingError::InvalidState("end_frame without begin_frame"))?;
        if actual > size {
            return Err(RingError::InvalidState("frame size exceeds begin_frame"));
        }
        let reservation = self
            .open
            .as_ref()
            .ok_or(RingError::InvalidState("frame open without a message"))?;

        let header_at = self.write_off;
        let slot = self.inner.slot_mut(reservation);
        patch_size(&mut slot[header_at..], actual);

        self.write_off += FRAME_HEADER_SIZE + actual;
        self.frames += 1;
        self.frame = None;
        Ok(())
    }

    /// Copy `data` into the open message as one frame.
    pub fn write_frame(&mut self, data: &[u8], flags: FrameFlags) -> Result<()> {
        let payload = self.begin_frame(data.len(), flags)?;
        payload.copy_from_slice(data);
        self.end_frame(data.len())
    }

    /// Publish the open message and return its frame count.
    ///
    /// Flushing with no frames written publishes a valid, empty message.
    pub fn flush(&mut self) -> Result<usize> {
        if self.frame.is_some() {
            return Err(RingError::InvalidState("flush with a frame still open"));
        }
        let mut reservation = match self.open.take() {
            Some(reservation) => reservation,
            None => self.inner.reserve_raw(0)?,
        };
        if self.inner.is_stale(&reservation) {
            reservation = match self.inner.grow(&reservation, self.write_off, self.write_off) {
                Ok(moved) => moved,
                Err(err) => {
                    self.open = Some(reservation);
                    return Err(err);
                }
            };
        }
        self.inner.commit_raw(reservation, self.write_off)?;

        let frames = self.frames;
        self.reset();
        Ok(frames)
    }

    /// Drop the open message without publishing it.
    ///
    /// Returns true if there was anything to drop.
    pub fn abort(&mut self) -> bool {
        let had_message = self.open.is_some();
        self.reset();
        had_message
    }

    /// Write and publish a complete message.
    ///
    /// The record is reserved at its final size up front, so no frame copy
    /// happens. Fails with `InvalidState` while another message is open.
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        if self.open.is_some() || self.frame.is_some() {
            return Err(RingError::InvalidState("message already open"));
        }
        self.open = Some(self.inner.reserve_raw(message.wire_size())?);
        for frame in message {
            if let Err(err) = self.write_frame(&frame.payload, frame.flags) {
                self.reset();
                return Err(err);
            }
        }
        self.flush().map(|_| ())
    }

    /// True while a message is being built.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Frames completed in the open message.
    pub fn frames_written(&self) -> usize {
        self.frames
    }

    /// Bytes of completed frames in the open message.
    pub fn bytes_written(&self) -> usize {
        self.write_off
    }

    /// Borrow the underlying record writer.
    pub fn get_ref(&self) -> &RingWriter {
        &self.inner
    }

    /// Consume the framed writer, dropping any open message.
    pub fn into_inner(self) -> RingWriter {
        self.inner
    }

    fn reset(&mut self) {
        self.open = None;
        self.write_off = 0;
        self.frame = None;
        self.frames = 0;
    }
}

impl std::fmt::Debug for FramedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedWriter")
            .field("ring", self.inner.ring())
            .field("open", &self.open.is_some())
            .field("frames", &self.frames)
            .field("bytes", &self.write_off)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shmprims_segment::HeapRegion;

    use super::*;
    use crate::config::RingConfig;
    use crate::flags::FrameType;
    use crate::frame::decode_frame;
    use crate::layout::record_span;

    fn ring(capacity: u32) -> RecordRing {
        let config = RingConfig::multipart(capacity);
        let region = Arc::new(HeapRegion::new(config.memory_size()).unwrap());
        RecordRing::create(region, &config).unwrap()
    }

    /// Decode every frame of the oldest record as `(data, flags)`.
    fn frames_of(record: &[u8]) -> Vec<(Vec<u8>, i32)> {
        let mut out = Vec::new();
        let mut off = 0;
        while off < record.len() {
            let (frame, used) = decode_frame(&record[off..]).unwrap();
            out.push((frame.data.to_vec(), frame.flags.bits()));
            off += used;
        }
        out
    }

    #[test]
    fn rejects_record_ring() {
        let config = RingConfig::record(256);
        let region = Arc::new(HeapRegion::new(config.memory_size()).unwrap());
        let ring = RecordRing::create(region, &config).unwrap();
        let err = FramedWriter::claim(&ring).unwrap_err();
        assert!(matches!(
            err,
            RingError::WrongRingType {
                expected: RingType::Multipart,
                found: RingType::Record
            }
        ));
    }

    #[test]
    fn frames_become_one_record() {
        let ring = ring(256);
        let mut writer = FramedWriter::claim(&ring).unwrap();
        let reader = ring.reader().unwrap();

        writer.write_frame(b"A", FrameFlags::from_bits(1)).unwrap();
        writer.write_frame(b"B", FrameFlags::from_bits(0)).unwrap();
        assert!(ring.is_empty());
        assert_eq!(writer.flush().unwrap(), 2);
        assert!(!writer.is_open());

        let record = reader.peek().unwrap();
        assert_eq!(record.len(), 2 * (FRAME_HEADER_SIZE + 1));
        assert_eq!(
            frames_of(record),
            vec![(b"A".to_vec(), 1), (b"B".to_vec(), 0)]
        );
    }

    #[test]
    fn end_frame_shrinks_to_actual_size() {
        let ring = ring(256);
        let mut writer = FramedWriter::claim(&ring).unwrap();

        let buf = writer
            .begin_frame(32, FrameType::Protobuf.into())
            .unwrap();
        assert_eq!(buf.len(), 32);
        buf[..5].copy_from_slice(b"short");
        writer.end_frame(5).unwrap();
        writer.write_frame(b"tail", FrameFlags::EMPTY).unwrap();
        assert_eq!(writer.bytes_written(), 2 * FRAME_HEADER_SIZE + 9);
        writer.flush().unwrap();

        let reader = ring.reader().unwrap();
        let frames = frames_of(reader.peek().unwrap());
        assert_eq!(frames[0].0, b"short");
        assert_eq!(frames[1].0, b"tail");
    }

    #[test]
    fn growth_copies_earlier_frames() {
        let ring = ring(256);
        let mut writer = FramedWriter::claim(&ring).unwrap();

        // Move the write head to offset 192 so the message has to relocate
        // to offset 0 when it grows.
        writer.write_frame(&[0u8; 180], FrameFlags::EMPTY).unwrap();
        writer.flush().unwrap();
        let mut reader = ring.reader().unwrap();
        reader.consume().unwrap();

        writer.write_frame(b"first", FrameFlags::from_bits(3)).unwrap();
        writer.write_frame(&[7u8; 40], FrameFlags::from_bits(4)).unwrap();
        writer.flush().unwrap();

        let frames = frames_of(reader.peek().unwrap());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], (b"first".to_vec(), 3));
        assert_eq!(frames[1], (vec![7u8; 40], 4));
    }

    #[test]
    fn empty_flush_publishes_empty_message() {
        let ring = ring(128);
        let mut writer = FramedWriter::claim(&ring).unwrap();
        assert_eq!(writer.flush().unwrap(), 0);

        let reader = ring.reader().unwrap();
        assert!(reader.peek().unwrap().is_empty());
        assert_eq!(ring.pending_bytes().unwrap(), record_span(0));
    }

    #[test]
    fn misuse_is_invalid_state() {
        let ring = ring(128);
        let mut writer = FramedWriter::claim(&ring).unwrap();

        assert!(matches!(
            writer.end_frame(0),
            Err(RingError::InvalidState(_))
        ));

        writer.begin_frame(4, FrameFlags::EMPTY).unwrap();
        assert!(matches!(
            writer.begin_frame(4, FrameFlags::EMPTY),
            Err(RingError::InvalidState(_))
        ));
        assert!(matches!(writer.flush(), Err(RingError::InvalidState(_))));
        assert!(matches!(
            writer.end_frame(5),
            Err(RingError::InvalidState(_))
        ));
        writer.end_frame(4).unwrap();
        assert_eq!(writer.flush().unwrap(), 1);
    }

    #[test]
    fn out_of_space_keeps_message_so_far() {
        let ring = ring(64);
        let mut writer = FramedWriter::claim(&ring).unwrap();
        writer.write_frame(&[1u8; 20], FrameFlags::EMPTY).unwrap();
        writer.flush().unwrap(); // span 32

        writer.write_frame(b"kept", FrameFlags::EMPTY).unwrap();
        let err = writer.begin_frame(16, FrameFlags::EMPTY).unwrap_err();
        assert!(matches!(err, RingError::OutOfSpace { .. }));
        assert_eq!(writer.frames_written(), 1);
        writer.flush().unwrap();

        let mut reader = ring.reader().unwrap();
        reader.consume().unwrap();
        assert_eq!(frames_of(reader.peek().unwrap()), vec![(b"kept".to_vec(), 0)]);
    }

    #[test]
    fn abort_drops_open_message() {
        let ring = ring(128);
        let mut writer = FramedWriter::claim(&ring).unwrap();
        writer.write_frame(b"gone", FrameFlags::EMPTY).unwrap();
        assert!(writer.abort());
        assert!(!writer.abort());
        assert!(ring.is_empty());

        writer.write_frame(b"kept", FrameFlags::EMPTY).unwrap();
        writer.flush().unwrap();
        let reader = ring.reader().unwrap();
        assert_eq!(frames_of(reader.peek().unwrap()), vec![(b"kept".to_vec(), 0)]);
    }

    #[test]
    fn write_message_reserves_once() {
        let ring = ring(256);
        let mut writer = FramedWriter::claim(&ring).unwrap();
        let message = Message::new()
            .with(FrameType::Originator, "node-a")
            .with(FrameType::Target, "node-b")
            .with(FrameType::Protobuf, vec![1u8, 2, 3]);
        writer.write_message(&message).unwrap();
        assert!(!writer.is_open());

        let reader = ring.reader().unwrap();
        let frames = frames_of(reader.peek().unwrap());
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].0, b"node-b");
        assert_eq!(reader.peek().unwrap().len(), message.wire_size());
    }

    #[test]
    fn frame_too_large_for_header() {
        let ring = ring(128);
        let mut writer = FramedWriter::claim(&ring).unwrap();
        assert!(matches!(
            writer.begin_frame(MAX_FRAME_SIZE + 1, FrameFlags::EMPTY),
            Err(RingError::TooLarge { .. })
        ));
        assert!(!writer.is_open());
    }
}
