use std::alloc::Layout;
use std::ptr::NonNull;

use crate::error::{Result, SegmentError};

/// Alignment guaranteed for the base address of every region (one cache line).
pub const REGION_ALIGN: usize = 64;

/// A fixed block of memory that may be shared between threads or processes.
///
/// This is the fundamental memory type the ring and state layers are laid
/// out in. Implementations hand out a raw base pointer; all typed access
/// happens in the layers above, which treat the bytes as shared and only
/// touch them through atomics or through disjoint, protocol-owned spans.
///
/// # Safety
///
/// Implementors must guarantee that `as_ptr()` is non-null, aligned to
/// [`REGION_ALIGN`], valid for reads and writes of `len()` bytes, and never
/// changes for as long as the value is alive.
pub unsafe trait SharedRegion: Send + Sync {
    /// Base address of the region.
    fn as_ptr(&self) -> *mut u8;

    /// Length of the region in bytes.
    fn len(&self) -> usize;

    /// True if the region holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the backing segment, if it has one.
    fn name(&self) -> Option<&str> {
        None
    }
}

/// Validate that `len` bytes at `offset` fit inside `region` with the given
/// alignment, returning the address of the span.
pub fn check_span(
    region: &dyn SharedRegion,
    offset: usize,
    len: usize,
    align: usize,
) -> Result<NonNull<u8>> {
    if offset % align != 0 {
        return Err(SegmentError::Misaligned { offset, align });
    }
    let end = offset.checked_add(len).ok_or(SegmentError::OutOfBounds {
        offset,
        len,
        region_len: region.len(),
    })?;
    if end > region.len() {
        return Err(SegmentError::OutOfBounds {
            offset,
            len,
            region_len: region.len(),
        });
    }
    // SAFETY: `offset + len <= region.len()`, so the result stays inside the
    // region, and the region base is non-null per the trait contract.
    let ptr = unsafe { region.as_ptr().add(offset) };
    NonNull::new(ptr).ok_or(SegmentError::TooSmall { len: 0, min: 1 })
}

/// A zeroed, cache-line aligned heap allocation.
///
/// Useful when producer and consumer are threads of one process, and in
/// tests. Layout is identical to a mapped segment of the same size.
pub struct HeapRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl HeapRegion {
    /// Allocate `len` zeroed bytes.
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(SegmentError::TooSmall { len, min: 1 });
        }
        let layout =
            Layout::from_size_align(len, REGION_ALIGN).map_err(|_| SegmentError::OutOfBounds {
                offset: 0,
                len,
                region_len: isize::MAX as usize,
            })?;

        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => std::alloc::handle_alloc_error(layout),
        };

        Ok(Self { ptr, layout })
    }
}

// SAFETY: the allocation is owned by this value, aligned to REGION_ALIGN and
// valid for `layout.size()` bytes until drop.
unsafe impl SharedRegion for HeapRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

// SAFETY: the region is plain memory; synchronization is the job of the
// structures laid out in it.
unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc_zeroed` with this exact layout.
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for HeapRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapRegion")
            .field("len", &self.layout.size())
            .finish()
    }
}
