use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use shmprims_segment::{check_span, SegmentError, SharedRegion, REGION_ALIGN};
use tracing::{debug, error, warn};

use crate::config::{RingConfig, RingType};
use crate::error::{Result, RingError};
use crate::layout::{
    record_span, RingHeader, HEADER_SIZE, LAYOUT_VERSION, RECORD_ALIGN, RECORD_HEADER_SIZE,
    RING_MAGIC, SKIP_MARKER,
};

/// Handle to a record ring laid out in a shared region.
///
/// The handle itself only reads shared state. Mutation goes through
/// [`RingWriter`] and [`RingReader`], each of which claims its side of the
/// ring in the header so a second writer or reader is refused. Rings of type
/// [`RingType::Stream`] are accessed through
/// [`StreamWriter`](crate::StreamWriter) and
/// [`StreamReader`](crate::StreamReader) instead.
#[derive(Clone)]
pub struct RecordRing {
    region: Arc<dyn SharedRegion>,
    header: NonNull<RingHeader>,
    data: NonNull<u8>,
    capacity: u32,
    ring_type: RingType,
    scratchpad: Option<(NonNull<u8>, usize)>,
}

// SAFETY: all shared fields are accessed through atomics or through spans
// owned by exactly one side of the SPSC protocol; `region` keeps the memory
// alive for as long as any handle exists.
unsafe impl Send for RecordRing {}
unsafe impl Sync for RecordRing {}

/// What the read head currently points at.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    /// A committed record.
    Record(Located),
    /// Lap padding with no record after it; advance the read head by this.
    Padding(u64),
}

/// Position of one stored record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Located {
    /// Data offset of the first payload byte.
    pub(crate) payload: usize,
    /// Payload length.
    pub(crate) len: usize,
    /// Bytes to advance the read head by, including any skipped tail.
    pub(crate) advance: u64,
}

/// An uncommitted reservation held by the writer.
#[derive(Debug)]
pub(crate) struct Reservation {
    /// Write head the reservation was computed from.
    head: u64,
    /// Bytes left unused at the end of the lap before the record.
    skip: usize,
    /// Data offset of the record header.
    offset: usize,
    /// Writable payload bytes.
    len: usize,
}

impl Reservation {
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl RecordRing {
    /// Bytes of shared memory a ring of `capacity` payload bytes occupies.
    pub fn memory_size(capacity: u32) -> usize {
        RingConfig::record(capacity).memory_size()
    }

    /// Initialize a new, empty ring at the start of `region`.
    pub fn create(region: Arc<dyn SharedRegion>, config: &RingConfig) -> Result<Self> {
        Self::create_at(region, 0, config)
    }

    /// Initialize a new, empty ring at `offset` inside `region`.
    ///
    /// Any previous content at that location is overwritten, so nobody may be
    /// attached to it while this runs.
    pub fn create_at(
        region: Arc<dyn SharedRegion>,
        offset: usize,
        config: &RingConfig,
    ) -> Result<Self> {
        let config = config.validate()?;
        let span = check_span(&*region, offset, config.memory_size(), REGION_ALIGN)?;
        let header = span.cast::<RingHeader>();

        // SAFETY: the span is in bounds and cache-line aligned, and the caller
        // guarantees no other party uses this location yet.
        unsafe {
            header
                .as_ptr()
                .write(RingHeader::new(
                    config.capacity,
                    config.ring_type.as_raw(),
                    config.scratchpad,
                ));
        }
        // SAFETY: the header was just initialized.
        unsafe { header.as_ref() }
            .magic
            .store(RING_MAGIC, Ordering::Release);

        debug!(
            segment = region.name().unwrap_or("<unnamed>"),
            offset,
            capacity = config.capacity,
            ring_type = ?config.ring_type,
            scratchpad = config.scratchpad,
            "created record ring"
        );

        Ok(Self::from_parts(region, header, &config))
    }

    /// Attach the ring at the start of `region`.
    pub fn attach(region: Arc<dyn SharedRegion>) -> Result<Self> {
        Self::attach_at(region, 0)
    }

    /// Attach a ring previously created at `offset` inside `region`.
    pub fn attach_at(region: Arc<dyn SharedRegion>, offset: usize) -> Result<Self> {
        let span = check_span(&*region, offset, HEADER_SIZE, REGION_ALIGN)?;
        let header = span.cast::<RingHeader>();
        // SAFETY: the span covers a full, aligned header.
        let hdr = unsafe { header.as_ref() };

        let magic = hdr.magic.load(Ordering::Acquire);
        if magic != RING_MAGIC {
            return Err(RingError::BadMagic { found: magic });
        }
        if hdr.version != LAYOUT_VERSION {
            return Err(RingError::UnsupportedVersion {
                found: hdr.version,
                expected: LAYOUT_VERSION,
            });
        }
        let ring_type = RingType::from_raw(hdr.ring_type)
            .ok_or_else(|| corrupted("unknown ring type in header"))?;
        let capacity = hdr.capacity;
        let config = RingConfig {
            capacity,
            ring_type,
            scratchpad: hdr.scratchpad_size,
        };
        if config.validate()?.capacity != capacity {
            return Err(corrupted("unaligned capacity in header"));
        }
        check_span(&*region, offset, config.memory_size(), REGION_ALIGN)?;

        debug!(
            segment = region.name().unwrap_or("<unnamed>"),
            offset,
            capacity,
            ?ring_type,
            scratchpad = config.scratchpad,
            "attached record ring"
        );

        Ok(Self::from_parts(region, header, &config))
    }

    fn from_parts(
        region: Arc<dyn SharedRegion>,
        header: NonNull<RingHeader>,
        config: &RingConfig,
    ) -> Self {
        let base = header.cast::<u8>();
        // SAFETY: payload and scratchpad follow the header and were bounds
        // checked against the region together with it.
        let data = unsafe { base.add(HEADER_SIZE) };
        let scratchpad = match config.scratchpad {
            0 => None,
            len => Some((
                unsafe { base.add(config.scratchpad_offset()) },
                len as usize,
            )),
        };
        Self {
            region,
            header,
            data,
            capacity: config.capacity,
            ring_type: config.ring_type,
            scratchpad,
        }
    }

    pub(crate) fn header(&self) -> &RingHeader {
        // SAFETY: validated at create/attach; `region` keeps it mapped.
        unsafe { self.header.as_ref() }
    }

    /// Payload capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Access mode recorded in the header.
    pub fn ring_type(&self) -> RingType {
        self.ring_type
    }

    /// Largest payload a single record can carry.
    pub fn max_record_size(&self) -> usize {
        self.capacity() - RECORD_HEADER_SIZE
    }

    /// The shared scratchpad, empty if the ring was created without one.
    ///
    /// The ring does not order scratchpad accesses against its heads; both
    /// sides may read and write it at any time.
    pub fn scratchpad(&self) -> &[AtomicU8] {
        match self.scratchpad {
            // SAFETY: bounds checked at create/attach; `AtomicU8` has the
            // layout of `u8` and every access to it is atomic.
            Some((ptr, len)) => unsafe {
                std::slice::from_raw_parts(ptr.cast::<AtomicU8>().as_ptr(), len)
            },
            None => &[],
        }
    }

    /// Copy scratchpad bytes starting at `offset` into `buf`.
    pub fn read_scratchpad(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let src = self.scratchpad_span(offset, buf.len())?;
        for (dst, byte) in buf.iter_mut().zip(src) {
            *dst = byte.load(Ordering::Acquire);
        }
        Ok(())
    }

    /// Copy `data` into the scratchpad starting at `offset`.
    pub fn write_scratchpad(&self, offset: usize, data: &[u8]) -> Result<()> {
        let dst = self.scratchpad_span(offset, data.len())?;
        for (byte, &value) in dst.iter().zip(data) {
            byte.store(value, Ordering::Release);
        }
        Ok(())
    }

    fn scratchpad_span(&self, offset: usize, len: usize) -> Result<&[AtomicU8]> {
        let pad = self.scratchpad();
        offset
            .checked_add(len)
            .and_then(|end| pad.get(offset..end))
            .ok_or(RingError::Segment(SegmentError::OutOfBounds {
                offset,
                len,
                region_len: pad.len(),
            }))
    }

    /// The region this ring lives in.
    pub fn region(&self) -> &Arc<dyn SharedRegion> {
        &self.region
    }

    /// Bytes currently held by committed, unconsumed records.
    pub fn pending_bytes(&self) -> Result<usize> {
        let (write, read) = self.heads();
        Ok(self.used(write, read)? as usize)
    }

    /// Free bytes in the ring, ignoring record headers and lap padding.
    pub fn available(&self) -> Result<usize> {
        Ok(self.capacity() - self.pending_bytes()?)
    }

    /// True if no committed record is pending.
    pub fn is_empty(&self) -> bool {
        let (write, read) = self.heads();
        write == read
    }

    /// Current claim tokens as `(writer, reader)`; `None` when unclaimed.
    pub fn claims(&self) -> (Option<u32>, Option<u32>) {
        let token = |slot: &AtomicU32| match slot.load(Ordering::Acquire) {
            0 => None,
            owner => Some(owner),
        };
        let hdr = self.header();
        (token(&hdr.writer), token(&hdr.reader))
    }

    /// Forcibly release both claim tokens.
    ///
    /// Only for recovering a ring whose previous writer or reader died
    /// without releasing its side.
    pub fn clear_claims(&self) {
        let hdr = self.header();
        hdr.writer.store(0, Ordering::Release);
        hdr.reader.store(0, Ordering::Release);
        warn!("cleared ring claims");
    }

    /// Claim the writer side of the ring.
    pub fn writer(&self) -> Result<RingWriter> {
        self.expect_records()?;
        let token = claim(&self.header().writer)
            .map_err(|owner| RingError::WriterClaimed { owner })?;
        debug!(token, "claimed ring writer");
        Ok(RingWriter {
            ring: self.clone(),
            token,
        })
    }

    /// Claim the reader side of the ring.
    pub fn reader(&self) -> Result<RingReader> {
        self.expect_records()?;
        let token = claim(&self.header().reader)
            .map_err(|owner| RingError::ReaderClaimed { owner })?;
        debug!(token, "claimed ring reader");
        Ok(RingReader {
            ring: self.clone(),
            token,
        })
    }

    fn expect_records(&self) -> Result<()> {
        if self.ring_type == RingType::Stream {
            return Err(RingError::WrongRingType {
                expected: RingType::Record,
                found: self.ring_type,
            });
        }
        Ok(())
    }

    pub(crate) fn heads(&self) -> (u64, u64) {
        let hdr = self.header();
        let read = hdr.read_head.load(Ordering::Acquire);
        let write = hdr.write_head.load(Ordering::Acquire);
        (write, read)
    }

    fn wrap(&self) -> u64 {
        2 * self.capacity as u64
    }

    pub(crate) fn offset(&self, head: u64) -> usize {
        (head % self.capacity as u64) as usize
    }

    pub(crate) fn advance(&self, head: u64, by: u64) -> u64 {
        (head + by) % self.wrap()
    }

    /// Bytes between the heads, checking the doubled-range invariants.
    pub(crate) fn used(&self, write: u64, read: u64) -> Result<u64> {
        let wrap = self.wrap();
        if write >= wrap || read >= wrap {
            return Err(corrupted("head outside doubled range"));
        }
        let align = RECORD_ALIGN as u64;
        if self.ring_type != RingType::Stream && (write % align != 0 || read % align != 0) {
            return Err(corrupted("head not on a record boundary"));
        }
        let used = (write + wrap - read) % wrap;
        if used > self.capacity as u64 {
            return Err(corrupted("read head ahead of write head"));
        }
        Ok(used)
    }

    fn read_u32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.capacity());
        // SAFETY: `offset + 4 <= capacity` and the bytes belong to the caller's
        // side of the protocol.
        unsafe {
            self.data
                .as_ptr()
                .add(offset)
                .cast::<u32>()
                .read_unaligned()
        }
    }

    fn write_u32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.capacity());
        // SAFETY: as for `read_u32`; only the writer calls this, on free space.
        unsafe {
            self.data
                .as_ptr()
                .add(offset)
                .cast::<u32>()
                .write_unaligned(value)
        }
    }

    /// Find the record starting at `read`, given `used` pending bytes.
    fn locate(&self, read: u64, used: u64) -> Result<Slot> {
        let mut offset = self.offset(read);
        let mut skipped = 0u64;
        let mut size = self.read_u32(offset);

        if size == SKIP_MARKER {
            skipped = (self.capacity() - offset) as u64;
            if skipped == used {
                return Ok(Slot::Padding(skipped));
            }
            if skipped > used {
                return Err(corrupted("skip marker past write head"));
            }
            offset = 0;
            size = self.read_u32(0);
        }

        let span = record_span(size as usize) as u64;
        if size > self.max_record_size() as u32 || skipped + span > used {
            return Err(corrupted("record extends past write head"));
        }
        if offset + span as usize > self.capacity() {
            return Err(corrupted("record crosses end of lap"));
        }

        Ok(Slot::Record(Located {
            payload: offset + RECORD_HEADER_SIZE,
            len: size as usize,
            advance: skipped + span,
        }))
    }

    /// # Safety
    ///
    /// The span must belong to a committed, unconsumed record (or to the
    /// caller's own reservation) for the lifetime of the returned slice.
    pub(crate) unsafe fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        std::slice::from_raw_parts(self.data.as_ptr().add(offset), len)
    }

    /// # Safety
    ///
    /// The span must lie inside the writer's current reservation, and no
    /// other reference to it may exist for the lifetime of the slice.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.data.as_ptr().add(offset), len)
    }
}

impl std::fmt::Debug for RecordRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordRing")
            .field("capacity", &self.capacity)
            .field("ring_type", &self.ring_type)
            .field("scratchpad", &self.scratchpad().len())
            .field("segment", &self.region.name())
            .finish()
    }
}

/// Exclusive producer side of a [`RecordRing`].
pub struct RingWriter {
    ring: RecordRing,
    token: u32,
}

impl RingWriter {
    /// Reserve `size` contiguous payload bytes for in-place writing.
    ///
    /// Nothing becomes visible to the reader until the grant is committed;
    /// dropping the grant abandons the reservation.
    pub fn reserve(&mut self, size: usize) -> Result<WriteGrant<'_>> {
        let reservation = self.reserve_raw(size)?;
        Ok(WriteGrant {
            writer: self,
            reservation: Some(reservation),
        })
    }

    /// Copy `payload` into the ring as one record.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        let mut grant = self.reserve(payload.len())?;
        grant.copy_from_slice(payload);
        grant.commit(payload.len())
    }

    /// The ring this writer feeds.
    pub fn ring(&self) -> &RecordRing {
        &self.ring
    }

    pub(crate) fn reserve_raw(&mut self, size: usize) -> Result<Reservation> {
        let ring = &self.ring;
        let max = ring.max_record_size();
        if size > max {
            return Err(RingError::TooLarge { size, max });
        }
        let need = record_span(size);

        let hdr = ring.header();
        let write = hdr.write_head.load(Ordering::Relaxed);
        let read = hdr.read_head.load(Ordering::Acquire);
        let used = ring.used(write, read)? as usize;
        let free = ring.capacity() - used;

        let at = ring.offset(write);
        let (offset, skip) = if at + need <= ring.capacity() {
            (at, 0)
        } else {
            (0, ring.capacity() - at)
        };
        if skip + need > free {
            if used == 0 && skip > 0 {
                self.publish_padding(write, skip);
            }
            return Err(RingError::OutOfSpace {
                requested: skip + need,
                free,
            });
        }

        Ok(Reservation {
            head: write,
            skip,
            offset,
            len: size,
        })
    }

    /// Publish the rest of the current lap as padding.
    ///
    /// Only used on an empty ring, when a record fits the capacity but not
    /// the space left before the end of the lap. Once the reader has stepped
    /// over the padding, the whole capacity is contiguous again.
    fn publish_padding(&mut self, write: u64, skip: usize) {
        let ring = &self.ring;
        ring.write_u32(ring.offset(write), SKIP_MARKER);
        ring.header()
            .write_head
            .store(ring.advance(write, skip as u64), Ordering::Release);
    }

    /// True if the reservation was computed before the write head moved.
    pub(crate) fn is_stale(&self, reservation: &Reservation) -> bool {
        self.ring.header().write_head.load(Ordering::Relaxed) != reservation.head
    }

    /// Re-reserve the still uncommitted record with room for `size` bytes,
    /// keeping its first `keep` bytes.
    ///
    /// On failure the original reservation stays valid.
    pub(crate) fn grow(
        &mut self,
        reservation: &Reservation,
        size: usize,
        keep: usize,
    ) -> Result<Reservation> {
        let keep = keep.min(reservation.len);
        let grown = self.reserve_raw(size)?;
        if grown.offset != reservation.offset && keep > 0 {
            // SAFETY: both spans are inside the free area owned by the writer;
            // `ptr::copy` tolerates overlap.
            unsafe {
                let base = self.ring.data.as_ptr();
                std::ptr::copy(
                    base.add(reservation.offset + RECORD_HEADER_SIZE),
                    base.add(grown.offset + RECORD_HEADER_SIZE),
                    keep,
                );
            }
        }
        Ok(grown)
    }

    pub(crate) fn slot_mut(&mut self, reservation: &Reservation) -> &mut [u8] {
        // SAFETY: the reservation lies in free space only the writer touches,
        // and `&mut self` rules out a second live slice.
        unsafe {
            self.ring
                .bytes_mut(reservation.offset + RECORD_HEADER_SIZE, reservation.len)
        }
    }

    pub(crate) fn commit_raw(&mut self, reservation: Reservation, len: usize) -> Result<()> {
        if len > reservation.len {
            return Err(RingError::InvalidState(
                "commit size exceeds reservation",
            ));
        }
        let ring = &self.ring;
        let hdr = ring.header();
        if hdr.write_head.load(Ordering::Relaxed) != reservation.head {
            return Err(RingError::InvalidState("stale reservation"));
        }

        if reservation.skip > 0 {
            ring.write_u32(ring.offset(reservation.head), SKIP_MARKER);
        }
        ring.write_u32(reservation.offset, len as u32);

        let advance = (reservation.skip + record_span(len)) as u64;
        hdr.write_head
            .store(ring.advance(reservation.head, advance), Ordering::Release);
        Ok(())
    }
}

impl Drop for RingWriter {
    fn drop(&mut self) {
        release(&self.ring.header().writer, self.token);
        debug!(token = self.token, "released ring writer");
    }
}

impl std::fmt::Debug for RingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingWriter")
            .field("ring", &self.ring)
            .field("token", &self.token)
            .finish()
    }
}

/// A reserved, writable span of the ring.
///
/// Dereferences to the reserved payload bytes.
pub struct WriteGrant<'a> {
    writer: &'a mut RingWriter,
    reservation: Option<Reservation>,
}

impl WriteGrant<'_> {
    /// Grow the reservation to `size` bytes, preserving its first `keep`
    /// bytes. On failure the current reservation is kept.
    pub fn grow(&mut self, size: usize, keep: usize) -> Result<()> {
        let current = self
            .reservation
            .as_ref()
            .ok_or(RingError::InvalidState("grant already committed"))?;
        let grown = self.writer.grow(current, size, keep)?;
        self.reservation = Some(grown);
        Ok(())
    }

    /// Publish the first `len` bytes as one record.
    ///
    /// If an earlier failed [`grow`](Self::grow) left lap padding behind,
    /// the bytes are first moved to a fresh reservation, which may report
    /// `OutOfSpace`.
    pub fn commit(mut self, len: usize) -> Result<()> {
        let mut reservation = self
            .reservation
            .take()
            .ok_or(RingError::InvalidState("grant already committed"))?;
        if self.writer.is_stale(&reservation) {
            reservation = self.writer.grow(&reservation, reservation.len, len)?;
        }
        self.writer.commit_raw(reservation, len)
    }
}

impl std::fmt::Debug for WriteGrant<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteGrant")
            .field("reservation", &self.reservation)
            .finish()
    }
}

impl std::ops::Deref for WriteGrant<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.reservation {
            // SAFETY: the reservation is owned by this grant's writer.
            Some(r) => unsafe {
                self.writer
                    .ring
                    .bytes(r.offset + RECORD_HEADER_SIZE, r.len)
            },
            None => &[],
        }
    }
}

impl std::ops::DerefMut for WriteGrant<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &self.reservation {
            Some(r) => self.writer.slot_mut(r),
            None => &mut [],
        }
    }
}

/// Exclusive consumer side of a [`RecordRing`].
pub struct RingReader {
    ring: RecordRing,
    token: u32,
}

impl RingReader {
    /// The oldest committed record, left in place.
    pub fn peek(&self) -> Result<&[u8]> {
        let rec = self.peek_raw()?;
        // SAFETY: the record is committed and only `consume` (which needs
        // `&mut self`) can release it.
        Ok(unsafe { self.ring.bytes(rec.payload, rec.len) })
    }

    /// Release the oldest record.
    pub fn consume(&mut self) -> Result<()> {
        let rec = self.peek_raw()?;
        let hdr = self.ring.header();
        let read = hdr.read_head.load(Ordering::Relaxed);
        hdr.read_head
            .store(self.ring.advance(read, rec.advance), Ordering::Release);
        Ok(())
    }

    /// Payload size of the oldest record, `None` if the ring is empty.
    pub fn next_size(&self) -> Result<Option<usize>> {
        match self.peek_raw() {
            Ok(rec) => Ok(Some(rec.len)),
            Err(RingError::Empty) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Drop every pending record; returns the number of bytes released.
    pub fn discard_all(&mut self) -> Result<usize> {
        let hdr = self.ring.header();
        let read = hdr.read_head.load(Ordering::Relaxed);
        let write = hdr.write_head.load(Ordering::Acquire);
        let used = self.ring.used(write, read)?;
        hdr.read_head.store(write, Ordering::Release);
        Ok(used as usize)
    }

    /// Iterate over pending records without consuming them.
    ///
    /// Records committed after the iterator was created are not visited.
    pub fn iter(&self) -> RecordIter<'_> {
        let hdr = self.ring.header();
        let read = hdr.read_head.load(Ordering::Relaxed);
        let write = hdr.write_head.load(Ordering::Acquire);
        RecordIter {
            reader: self,
            read,
            remaining: self.ring.used(write, read),
        }
    }

    /// The ring this reader drains.
    pub fn ring(&self) -> &RecordRing {
        &self.ring
    }

    pub(crate) fn peek_raw(&self) -> Result<Located> {
        let hdr = self.ring.header();
        let read = hdr.read_head.load(Ordering::Relaxed);
        let write = hdr.write_head.load(Ordering::Acquire);
        if read == write {
            return Err(RingError::Empty);
        }
        let used = self.ring.used(write, read)?;
        match self.ring.locate(read, used)? {
            Slot::Record(rec) => Ok(rec),
            Slot::Padding(advance) => {
                // The read head belongs to this reader; stepping over padding
                // releases no record bytes.
                hdr.read_head
                    .store(self.ring.advance(read, advance), Ordering::Release);
                Err(RingError::Empty)
            }
        }
    }

    pub(crate) fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(offset + len <= self.ring.capacity());
        // SAFETY: callers only pass spans inside the record returned by
        // `peek_raw`, which stays committed until `consume`.
        unsafe { self.ring.bytes(offset, len) }
    }
}

impl Drop for RingReader {
    fn drop(&mut self) {
        release(&self.ring.header().reader, self.token);
        debug!(token = self.token, "released ring reader");
    }
}

impl std::fmt::Debug for RingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingReader")
            .field("ring", &self.ring)
            .field("token", &self.token)
            .finish()
    }
}

/// Non-destructive iterator over the pending records of a ring.
pub struct RecordIter<'a> {
    reader: &'a RingReader,
    read: u64,
    remaining: Result<u64>,
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = match &self.remaining {
            Ok(0) => return None,
            Ok(n) => *n,
            Err(_) => {
                let err = std::mem::replace(&mut self.remaining, Ok(0));
                return err.err().map(Err);
            }
        };

        match self.reader.ring.locate(self.read, remaining) {
            Ok(Slot::Record(rec)) => {
                self.read = self.reader.ring.advance(self.read, rec.advance);
                self.remaining = Ok(remaining - rec.advance);
                Some(Ok(self.reader.bytes(rec.payload, rec.len)))
            }
            Ok(Slot::Padding(_)) => {
                self.remaining = Ok(0);
                None
            }
            Err(err) => {
                self.remaining = Ok(0);
                Some(Err(err))
            }
        }
    }
}

pub(crate) fn corrupted(reason: &'static str) -> RingError {
    error!(reason, "record ring corruption detected");
    RingError::Corrupted(reason)
}

/// Claim a side of the ring, returning the token or the current owner.
pub(crate) fn claim(slot: &AtomicU32) -> std::result::Result<u32, u32> {
    let token = std::process::id().max(1);
    match slot.compare_exchange(0, token, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => Ok(token),
        Err(owner) => {
            warn!(owner, "ring side already claimed");
            Err(owner)
        }
    }
}

pub(crate) fn release(slot: &AtomicU32, token: u32) {
    let _ = slot.compare_exchange(token, 0, Ordering::AcqRel, Ordering::Relaxed);
}
