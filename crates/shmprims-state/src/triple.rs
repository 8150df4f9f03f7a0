use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use shmprims_segment::{check_span, SegmentError, SharedRegion, REGION_ALIGN};
use tracing::{debug, warn};

use crate::error::{Result, StateError};
use crate::flag::RoleFlag;

const WRITER_CLAIM: u8 = 0x01;
const READER_CLAIM: u8 = 0x02;

/// Wait-free single-writer, single-reader state snapshot.
///
/// Three slots rotate between the writer, a clean spare and the reader's
/// snapshot. Committing never waits for the reader and a snapshot never
/// waits for the writer; the reader always sees the latest complete commit.
///
/// The struct is `repr(C)` and self-contained, so it can live directly in
/// shared memory (see [`SharedTripleBuffer`]).
#[repr(C)]
pub struct TripleBuffer<T> {
    slots: [UnsafeCell<T>; 3],
    role_flag: AtomicU8,
    claims: AtomicU8,
}

// SAFETY: the role flag hands each slot to at most one side at a time, so
// values only move between threads, and the single reader may share `&T`.
unsafe impl<T: Send> Send for TripleBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for TripleBuffer<T> {}

impl<T: Clone> TripleBuffer<T> {
    /// A buffer whose three slots all start as `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            slots: [
                UnsafeCell::new(initial.clone()),
                UnsafeCell::new(initial.clone()),
                UnsafeCell::new(initial),
            ],
            role_flag: AtomicU8::new(RoleFlag::INITIAL.bits()),
            claims: AtomicU8::new(0),
        }
    }

    /// Copy out the newest committed value, if any arrived since the last
    /// snapshot.
    ///
    /// Holds the reader side only for the duration of the call, so several
    /// threads may poll one buffer; a caller that races another one gets
    /// `ReaderBusy` and can simply retry.
    pub fn try_snapshot(&self) -> Result<Option<T>> {
        let mut reader = self.claim_reader()?;
        if reader.snapshot() {
            Ok(Some(reader.get().clone()))
        } else {
            Ok(None)
        }
    }

    /// Copy out the value currently exposed to readers, refreshing it first.
    pub fn try_latest(&self) -> Result<T> {
        let mut reader = self.claim_reader()?;
        Ok(reader.latest().clone())
    }
}

impl<T> TripleBuffer<T> {
    /// Bytes of memory one buffer of `T` occupies.
    pub const fn memory_size() -> usize {
        size_of::<Self>()
    }

    /// Claim the writer side.
    pub fn writer(&self) -> Result<StateWriter<'_, T>> {
        if self.claims.fetch_or(WRITER_CLAIM, Ordering::AcqRel) & WRITER_CLAIM != 0 {
            warn!("triple buffer writer already claimed");
            return Err(StateError::WriterClaimed);
        }
        debug!("claimed triple buffer writer");
        Ok(StateWriter {
            buffer: self,
            _not_sync: PhantomData,
        })
    }

    /// Claim the reader side until the returned guard is dropped.
    pub fn reader(&self) -> Result<StateReader<'_, T>> {
        let reader = self.claim_reader()?;
        debug!("claimed triple buffer reader");
        Ok(reader)
    }

    fn claim_reader(&self) -> Result<StateReader<'_, T>> {
        if self.claims.fetch_or(READER_CLAIM, Ordering::AcqRel) & READER_CLAIM != 0 {
            return Err(StateError::ReaderBusy);
        }
        Ok(StateReader {
            buffer: self,
            _not_sync: PhantomData,
        })
    }

    /// Current role flag, for diagnostics.
    pub fn role_flag(&self) -> RoleFlag {
        RoleFlag::from_bits(self.role_flag.load(Ordering::Acquire))
    }

    /// True if a commit is waiting to be snapshotted.
    pub fn has_new_data(&self) -> bool {
        self.role_flag().has_new_data()
    }

    /// Forcibly release both sides.
    ///
    /// Only for recovering a shared buffer whose writer or reader process
    /// died while holding its claim.
    pub fn clear_claims(&self) {
        self.claims.store(0, Ordering::Release);
        warn!("cleared triple buffer claims");
    }

    fn slot(&self, index: usize) -> *mut T {
        self.slots[index].get()
    }

    /// Swap write and clean slots and mark new data.
    fn flip(&self) {
        let mut current = self.role_flag.load(Ordering::Relaxed);
        loop {
            let next = RoleFlag::from_bits(current).flipped().bits();
            match self.role_flag.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Swap clean and snapshot slots if new data is pending.
    fn take_snapshot(&self) -> bool {
        let mut current = self.role_flag.load(Ordering::Relaxed);
        loop {
            let Some(next) = RoleFlag::from_bits(current).snapped() else {
                return false;
            };
            match self.role_flag.compare_exchange_weak(
                current,
                next.bits(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

impl<T: Clone + Default> Default for TripleBuffer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> std::fmt::Debug for TripleBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripleBuffer")
            .field("role_flag", &self.role_flag())
            .field("claims", &self.claims.load(Ordering::Relaxed))
            .finish()
    }
}

/// Exclusive writer side of a [`TripleBuffer`].
pub struct StateWriter<'a, T> {
    buffer: &'a TripleBuffer<T>,
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

impl<T> StateWriter<'_, T> {
    /// Index of the slot the writer owns right now.
    pub fn write_slot(&self) -> usize {
        // Only `flip` moves the write slot, and only this writer flips.
        RoleFlag::from_bits(self.buffer.role_flag.load(Ordering::Acquire)).write_slot()
    }

    /// The slot being written. Its content is whatever that slot last held,
    /// not necessarily the previous commit.
    pub fn slot_mut(&mut self) -> &mut T {
        // SAFETY: the write slot is never the snapshot slot and is only
        // reassigned by `commit`, which needs `&mut self`.
        unsafe { &mut *self.buffer.slot(self.write_slot()) }
    }

    /// Publish the write slot to the reader.
    pub fn commit(&mut self) {
        self.buffer.flip();
    }

    /// Store `value` and commit it.
    pub fn publish(&mut self, value: T) {
        *self.slot_mut() = value;
        self.commit();
    }
}

impl<T> Drop for StateWriter<'_, T> {
    fn drop(&mut self) {
        self.buffer
            .claims
            .fetch_and(!WRITER_CLAIM, Ordering::AcqRel);
    }
}

/// Exclusive reader side of a [`TripleBuffer`].
pub struct StateReader<'a, T> {
    buffer: &'a TripleBuffer<T>,
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

impl<T> StateReader<'_, T> {
    /// Take the newest commit as the snapshot. Returns false, keeping the
    /// current snapshot, if nothing was committed since the last call.
    pub fn snapshot(&mut self) -> bool {
        self.buffer.take_snapshot()
    }

    /// Index of the slot exposed to the reader.
    pub fn snapshot_slot(&self) -> usize {
        RoleFlag::from_bits(self.buffer.role_flag.load(Ordering::Acquire)).snapshot_slot()
    }

    /// The current snapshot.
    pub fn get(&self) -> &T {
        // SAFETY: the writer never touches the snapshot slot, and only
        // `snapshot` (which needs `&mut self`) reassigns it.
        unsafe { &*self.buffer.slot(self.snapshot_slot()) }
    }

    /// Snapshot if possible, then return the current value.
    pub fn latest(&mut self) -> &T {
        self.snapshot();
        self.get()
    }
}

impl<T> Drop for StateReader<'_, T> {
    fn drop(&mut self) {
        self.buffer
            .claims
            .fetch_and(!READER_CLAIM, Ordering::AcqRel);
    }
}

/// A [`TripleBuffer`] placed in a shared region, e.g. a mapped segment.
///
/// `T` must be plain data (`Copy`, no pointers) since other processes see
/// the same bytes.
pub struct SharedTripleBuffer<T> {
    region: Arc<dyn SharedRegion>,
    ptr: NonNull<TripleBuffer<T>>,
}

// SAFETY: as for `TripleBuffer`; `region` keeps the memory mapped.
unsafe impl<T: Send> Send for SharedTripleBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for SharedTripleBuffer<T> {}

impl<T: Copy> SharedTripleBuffer<T> {
    /// Initialize a buffer at `offset` inside `region`, all slots `initial`.
    ///
    /// Overwrites whatever was there; nobody may be attached yet.
    pub fn create_at(region: Arc<dyn SharedRegion>, offset: usize, initial: T) -> Result<Self> {
        let ptr = locate::<T>(&*region, offset)?;
        // SAFETY: the span is in bounds and aligned for the buffer.
        unsafe { ptr.as_ptr().write(TripleBuffer::new(initial)) };
        debug!(
            segment = region.name().unwrap_or("<unnamed>"),
            offset,
            size = TripleBuffer::<T>::memory_size(),
            "created shared triple buffer"
        );
        Ok(Self { region, ptr })
    }

    /// Attach a buffer previously created at `offset` inside `region`.
    ///
    /// Fails with `Corrupted` if the role flag is not a valid permutation.
    ///
    /// # Safety
    ///
    /// The location must hold a buffer created with the same `T` (same size
    /// and layout), and every bit pattern the writer may store must be a
    /// valid `T`.
    pub unsafe fn attach_at(region: Arc<dyn SharedRegion>, offset: usize) -> Result<Self> {
        let ptr = locate::<T>(&*region, offset)?;
        let flag = ptr.as_ref().role_flag();
        if !flag.is_valid() {
            warn!(flag = flag.bits(), "invalid triple buffer role flag");
            return Err(StateError::Corrupted("role flag is not a slot permutation"));
        }
        debug!(
            segment = region.name().unwrap_or("<unnamed>"),
            offset, "attached shared triple buffer"
        );
        Ok(Self { region, ptr })
    }

    /// The region this buffer lives in.
    pub fn region(&self) -> &Arc<dyn SharedRegion> {
        &self.region
    }
}

impl<T> std::ops::Deref for SharedTripleBuffer<T> {
    type Target = TripleBuffer<T>;

    fn deref(&self) -> &TripleBuffer<T> {
        // SAFETY: initialized or validated at create/attach, and `region`
        // keeps it mapped.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> std::fmt::Debug for SharedTripleBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTripleBuffer")
            .field("segment", &self.region.name())
            .field("buffer", &**self)
            .finish()
    }
}

fn locate<T>(region: &dyn SharedRegion, offset: usize) -> Result<NonNull<TripleBuffer<T>>> {
    let align = align_of::<TripleBuffer<T>>();
    if align > REGION_ALIGN {
        return Err(SegmentError::Misaligned { offset, align }.into());
    }
    let span = check_span(region, offset, TripleBuffer::<T>::memory_size(), align)?;
    Ok(span.cast())
}

#[cfg(test)]
mod tests {
    use shmprims_segment::HeapRegion;

    use super::*;

    #[test]
    fn publish_and_snapshot_sequence() {
        let buffer = TripleBuffer::new(0u32);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();

        *writer.slot_mut() = 3;
        writer.commit();
        assert!(reader.snapshot());
        assert_eq!(*reader.get(), 3);
        assert!(!reader.snapshot());

        // An uncommitted write is invisible.
        *writer.slot_mut() = 4;
        writer.commit();
        *writer.slot_mut() = 5;
        assert!(reader.snapshot());
        assert_eq!(*reader.get(), 4);
        writer.commit();
        assert_eq!(*reader.get(), 4);
        assert!(reader.snapshot());
        assert_eq!(*reader.get(), 5);

        writer.commit();
        *writer.slot_mut() = 6;
        writer.commit();
        assert!(reader.snapshot());
        assert_eq!(*reader.get(), 6);

        // Two commits between snapshots: only the newest is seen.
        writer.publish(7);
        writer.publish(8);
        assert_eq!(*reader.get(), 6);
        assert!(reader.snapshot());
        assert_eq!(*reader.get(), 8);
        assert!(!reader.snapshot());
        assert_eq!(*reader.get(), 8);
    }

    #[test]
    fn writer_and_snapshot_slots_never_coincide() {
        let buffer = TripleBuffer::new(0u64);
        let mut writer = buffer.writer().unwrap();
        let mut reader = buffer.reader().unwrap();
        for i in 0..100u64 {
            writer.publish(i);
            if i % 3 == 0 {
                reader.snapshot();
            }
            assert_ne!(writer.write_slot(), reader.snapshot_slot());
            assert!(buffer.role_flag().is_valid());
        }
    }

    #[test]
    fn second_writer_is_refused() {
        let buffer = TripleBuffer::new(0u8);
        let writer = buffer.writer().unwrap();
        assert!(matches!(buffer.writer(), Err(StateError::WriterClaimed)));
        drop(writer);
        assert!(buffer.writer().is_ok());
    }

    #[test]
    fn try_snapshot_reports_busy_reader() {
        let buffer = TripleBuffer::new(1i32);
        buffer.writer().unwrap().publish(2);

        let held = buffer.reader().unwrap();
        assert!(matches!(buffer.try_snapshot(), Err(StateError::ReaderBusy)));
        drop(held);

        assert_eq!(buffer.try_snapshot().unwrap(), Some(2));
        assert_eq!(buffer.try_snapshot().unwrap(), None);
        assert_eq!(buffer.try_latest().unwrap(), 2);
    }

    #[test]
    fn clear_claims_recovers() {
        let buffer = TripleBuffer::new(0u8);
        let writer = buffer.writer().unwrap();
        std::mem::forget(writer);
        assert!(buffer.writer().is_err());
        buffer.clear_claims();
        assert!(buffer.writer().is_ok());
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    #[repr(C)]
    struct Status {
        cycle: u64,
        position: [f64; 3],
    }

    #[test]
    fn shared_buffer_seen_through_region() {
        let initial = Status {
            cycle: 0,
            position: [0.0; 3],
        };
        let region: Arc<dyn SharedRegion> =
            Arc::new(HeapRegion::new(64 + TripleBuffer::<Status>::memory_size()).unwrap());
        let created = SharedTripleBuffer::create_at(Arc::clone(&region), 64, initial).unwrap();
        // SAFETY: created above with the same `T`.
        let attached = unsafe { SharedTripleBuffer::<Status>::attach_at(region, 64) }.unwrap();

        created.writer().unwrap().publish(Status {
            cycle: 7,
            position: [1.0, 2.0, 3.0],
        });
        let seen = attached.try_snapshot().unwrap().unwrap();
        assert_eq!(seen.cycle, 7);
        assert_eq!(seen.position, [1.0, 2.0, 3.0]);
        assert!(!created.has_new_data());
    }

    #[test]
    fn attach_rejects_garbage_flag() {
        let region: Arc<dyn SharedRegion> =
            Arc::new(HeapRegion::new(TripleBuffer::<u32>::memory_size()).unwrap());
        // Zeroed memory: every role points at slot 0.
        // SAFETY: `u32` accepts any bit pattern.
        let err = unsafe { SharedTripleBuffer::<u32>::attach_at(region, 0) }.unwrap_err();
        assert!(matches!(err, StateError::Corrupted(_)));
    }

    #[test]
    fn attach_rejects_out_of_bounds() {
        let region: Arc<dyn SharedRegion> = Arc::new(HeapRegion::new(16).unwrap());
        let result = SharedTripleBuffer::create_at(region, 0, 0u64);
        assert!(matches!(
            result,
            Err(StateError::Segment(SegmentError::OutOfBounds { .. }))
        ));
    }
}
