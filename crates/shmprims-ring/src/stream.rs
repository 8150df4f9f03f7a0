//! Byte-stream access to a [`RingType::Stream`] ring.
//!
//! A stream ring carries no record boundaries: the writer appends bytes,
//! possibly fewer than offered, and the reader sees everything written so
//! far as at most two contiguous slices.

use std::sync::atomic::Ordering;

use tracing::debug;

use crate::config::RingType;
use crate::error::{Result, RingError};
use crate::record::{claim, release, RecordRing};

impl RecordRing {
    /// Claim the writer side of a stream ring.
    pub fn stream_writer(&self) -> Result<StreamWriter> {
        self.expect_stream()?;
        let token = claim(&self.header().writer)
            .map_err(|owner| RingError::WriterClaimed { owner })?;
        debug!(token, "claimed stream writer");
        Ok(StreamWriter {
            ring: self.clone(),
            token,
        })
    }

    /// Claim the reader side of a stream ring.
    pub fn stream_reader(&self) -> Result<StreamReader> {
        self.expect_stream()?;
        let token = claim(&self.header().reader)
            .map_err(|owner| RingError::ReaderClaimed { owner })?;
        debug!(token, "claimed stream reader");
        Ok(StreamReader {
            ring: self.clone(),
            token,
        })
    }

    fn expect_stream(&self) -> Result<()> {
        let found = self.ring_type();
        if found != RingType::Stream {
            return Err(RingError::WrongRingType {
                expected: RingType::Stream,
                found,
            });
        }
        Ok(())
    }
}

/// Exclusive producer side of a stream ring.
pub struct StreamWriter {
    ring: RecordRing,
    token: u32,
}

impl StreamWriter {
    /// Bytes that can be written right now.
    pub fn available(&self) -> Result<usize> {
        self.ring.available()
    }

    /// Append as much of `data` as fits and return the number of bytes
    /// written. Returns 0 when the ring is full.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let ring = &self.ring;
        let hdr = ring.header();
        let write = hdr.write_head.load(Ordering::Relaxed);
        let read = hdr.read_head.load(Ordering::Acquire);
        let free = ring.capacity() - ring.used(write, read)? as usize;

        let n = data.len().min(free);
        if n == 0 {
            return Ok(0);
        }
        let at = ring.offset(write);
        let first = n.min(ring.capacity() - at);
        // SAFETY: both spans lie in free space, which only the writer touches
        // until the head store below publishes it.
        unsafe {
            ring.bytes_mut(at, first).copy_from_slice(&data[..first]);
            ring.bytes_mut(0, n - first)
                .copy_from_slice(&data[first..n]);
        }
        hdr.write_head
            .store(ring.advance(write, n as u64), Ordering::Release);
        Ok(n)
    }

    /// Append all of `data` or nothing.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let max = self.ring.capacity();
        if data.len() > max {
            return Err(RingError::TooLarge {
                size: data.len(),
                max,
            });
        }
        let free = self.available()?;
        if data.len() > free {
            return Err(RingError::OutOfSpace {
                requested: data.len(),
                free,
            });
        }
        self.write(data).map(|_| ())
    }

    /// The ring this writer feeds.
    pub fn ring(&self) -> &RecordRing {
        &self.ring
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        release(&self.ring.header().writer, self.token);
        debug!(token = self.token, "released stream writer");
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("ring", &self.ring)
            .field("token", &self.token)
            .finish()
    }
}

/// Exclusive consumer side of a stream ring.
pub struct StreamReader {
    ring: RecordRing,
    token: u32,
}

impl StreamReader {
    /// Bytes written and not yet consumed.
    pub fn readable(&self) -> Result<usize> {
        self.ring.pending_bytes()
    }

    /// The unread bytes, in order, as two slices.
    ///
    /// The second slice is non-empty only when the data wraps around the end
    /// of the buffer. Nothing is consumed.
    pub fn read_vector(&self) -> Result<(&[u8], &[u8])> {
        let (write, read) = self.ring.heads();
        let used = self.ring.used(write, read)? as usize;
        let at = self.ring.offset(read);
        let first = used.min(self.ring.capacity() - at);
        // SAFETY: the spans hold published bytes that stay put until
        // `consume`, which needs `&mut self`.
        unsafe { Ok((self.ring.bytes(at, first), self.ring.bytes(0, used - first))) }
    }

    /// Release the oldest `n` bytes.
    pub fn consume(&mut self, n: usize) -> Result<()> {
        let hdr = self.ring.header();
        let read = hdr.read_head.load(Ordering::Relaxed);
        let write = hdr.write_head.load(Ordering::Acquire);
        if n as u64 > self.ring.used(write, read)? {
            return Err(RingError::InvalidState("consume exceeds readable bytes"));
        }
        hdr.read_head
            .store(self.ring.advance(read, n as u64), Ordering::Release);
        Ok(())
    }

    /// Copy up to `buf.len()` bytes out and consume them.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (head, tail) = self.read_vector()?;
        let first = head.len().min(buf.len());
        let second = tail.len().min(buf.len() - first);
        buf[..first].copy_from_slice(&head[..first]);
        buf[first..first + second].copy_from_slice(&tail[..second]);
        let n = first + second;
        self.consume(n)?;
        Ok(n)
    }

    /// Copy out and consume everything readable; empty when nothing is.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let (head, tail) = self.read_vector()?;
        let data = [head, tail].concat();
        self.consume(data.len())?;
        Ok(data)
    }

    /// Discard everything readable and return the number of bytes dropped.
    pub fn flush(&mut self) -> Result<usize> {
        let hdr = self.ring.header();
        let read = hdr.read_head.load(Ordering::Relaxed);
        let write = hdr.write_head.load(Ordering::Acquire);
        let used = self.ring.used(write, read)?;
        hdr.read_head.store(write, Ordering::Release);
        Ok(used as usize)
    }

    /// The ring this reader drains.
    pub fn ring(&self) -> &RecordRing {
        &self.ring
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        release(&self.ring.header().reader, self.token);
        debug!(token = self.token, "released stream reader");
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("ring", &self.ring)
            .field("token", &self.token)
            .finish()
    }
}
