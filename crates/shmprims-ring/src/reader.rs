use tracing::error;

use crate::config::RingType;
use crate::error::{Result, RingError};
use crate::frame::{decode_frame, FrameRef, Message};
use crate::record::{Located, RecordRing, RingReader};

/// Read position inside the message being consumed.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    record: Located,
    /// Offset of the next unread frame within the record payload.
    off: usize,
}

/// Consumes multipart messages frame by frame.
///
/// The oldest record is opened on the first [`read_frame`](Self::read_frame)
/// and stays in the ring until [`shift_message`](Self::shift_message).
pub struct FramedReader {
    inner: RingReader,
    cursor: Option<Cursor>,
}

impl FramedReader {
    /// Wrap the reader side of a multipart ring.
    pub fn new(inner: RingReader) -> Result<Self> {
        let found = inner.ring().ring_type();
        if found != RingType::Multipart {
            return Err(RingError::WrongRingType {
                expected: RingType::Multipart,
                found,
            });
        }
        Ok(Self {
            inner,
            cursor: None,
        })
    }

    /// Claim the reader side of `ring` and wrap it.
    pub fn claim(ring: &RecordRing) -> Result<Self> {
        Self::new(ring.reader()?)
    }

    /// The frame under the cursor.
    ///
    /// Returns `Empty` when no message is pending and `EndOfMessage` once
    /// every frame of the current message has been shifted past.
    pub fn read_frame(&mut self) -> Result<FrameRef<'_>> {
        let cursor = self.open()?;
        self.decode_at(cursor).map(|(frame, _)| frame)
    }

    /// Advance past the frame under the cursor.
    pub fn shift_frame(&mut self) -> Result<()> {
        let cursor = self.open()?;
        let (_, used) = self.decode_at(cursor)?;
        if let Some(open) = self.cursor.as_mut() {
            open.off += used;
        }
        Ok(())
    }

    /// Release the current message and reset the cursor.
    ///
    /// Fails with `InvalidState` unless a message was opened by reading it.
    pub fn shift_message(&mut self) -> Result<()> {
        if self.cursor.take().is_none() {
            return Err(RingError::InvalidState("shift_message without an open message"));
        }
        self.inner.consume()
    }

    /// Move the cursor back to the first frame of the current message.
    pub fn rewind(&mut self) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.off = 0;
        }
    }

    /// Iterate over the unread frames of the current message without
    /// moving the cursor.
    pub fn frames(&mut self) -> Result<Frames<'_>> {
        let cursor = self.open()?;
        let record = self.inner.bytes(cursor.record.payload, cursor.record.len);
        Ok(Frames {
            rest: &record[cursor.off..],
        })
    }

    /// Copy the current message out of the ring and shift it.
    ///
    /// Frames already shifted past are not included.
    pub fn read_message(&mut self) -> Result<Message> {
        let message = self
            .frames()?
            .map(|frame| frame.map(|f| f.to_frame()))
            .collect::<Result<Message>>()?;
        self.shift_message()?;
        Ok(message)
    }

    /// True while a message is open for reading.
    pub fn in_message(&self) -> bool {
        self.cursor.is_some()
    }

    /// Borrow the underlying record reader.
    pub fn get_ref(&self) -> &RingReader {
        &self.inner
    }

    /// Consume the framed reader and return the record reader.
    pub fn into_inner(self) -> RingReader {
        self.inner
    }

    fn open(&mut self) -> Result<Cursor> {
        if let Some(cursor) = self.cursor {
            return Ok(cursor);
        }
        let record = self.inner.peek_raw()?;
        let cursor = Cursor { record, off: 0 };
        self.cursor = Some(cursor);
        Ok(cursor)
    }

    fn decode_at(&self, cursor: Cursor) -> Result<(FrameRef<'_>, usize)> {
        if cursor.off >= cursor.record.len {
            return Err(RingError::EndOfMessage);
        }
        let record = self.inner.bytes(cursor.record.payload, cursor.record.len);
        decode_frame(&record[cursor.off..]).inspect_err(|err| {
            error!(error = %err, offset = cursor.off, "malformed frame in message");
        })
    }
}

impl std::fmt::Debug for FramedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedReader")
            .field("ring", self.inner.ring())
            .field("in_message", &self.cursor.is_some())
            .finish()
    }
}

/// Iterator over the frames remaining in a message.
///
/// Yields an error and stops if a frame header is malformed.
#[derive(Debug)]
pub struct Frames<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<FrameRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match decode_frame(self.rest) {
            Ok((frame, used)) => {
                self.rest = &self.rest[used..];
                Some(Ok(frame))
            }
            Err(err) => {
                self.rest = &[];
                Some(Err(err))
            }
        }
    }
}
