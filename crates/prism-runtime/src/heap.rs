//! Allocator for runtime-managed storage
//!
//! Every allocation is zeroed and typed by a descriptor. Storage is never
//! handed back: reclamation belongs to the embedding runtime.

use crate::config;
use crate::types::{Type, PTR_SIZE};
use once_cell::sync::Lazy;
use std::alloc::{alloc_zeroed, handle_alloc_error, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared base address for zero-sized allocations
static ZERO_BASE: u64 = 0;

/// Total bytes allocated
static ALLOCATED_BYTES: AtomicUsize = AtomicUsize::new(0);

/// Number of allocations
static ALLOCATION_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Maximum heap size (0 = unlimited)
static MAX_HEAP_BYTES: Lazy<AtomicUsize> =
    Lazy::new(|| AtomicUsize::new(config::get().max_heap_bytes.unwrap_or(0)));

/// Allocator statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Total bytes allocated
    pub allocated_bytes: usize,
    /// Number of allocations
    pub allocation_count: usize,
    /// Maximum heap size (None = unlimited)
    pub max_heap_bytes: Option<usize>,
}

/// Current allocator statistics
pub fn stats() -> HeapStats {
    let max = MAX_HEAP_BYTES.load(Ordering::Relaxed);
    HeapStats {
        allocated_bytes: ALLOCATED_BYTES.load(Ordering::Relaxed),
        allocation_count: ALLOCATION_COUNT.load(Ordering::Relaxed),
        max_heap_bytes: (max > 0).then_some(max),
    }
}

/// Set maximum heap size (0 = unlimited)
pub fn set_max_heap_size(bytes: usize) {
    MAX_HEAP_BYTES.store(bytes, Ordering::Relaxed);
}

/// Largest single allocation the heap hands out
#[cfg(target_pointer_width = "64")]
pub const MAX_ALLOC_BYTES: usize = 1 << 48;
/// Largest single allocation the heap hands out
#[cfg(not(target_pointer_width = "64"))]
pub const MAX_ALLOC_BYTES: usize = isize::MAX as usize;

/// Whether `size` more bytes stay within [`MAX_ALLOC_BYTES`] and the heap limit
///
/// Construction helpers check this up front so an oversized request becomes
/// an error rather than a panic inside [`alloc_bytes`].
pub fn fits(size: usize) -> bool {
    if size > MAX_ALLOC_BYTES {
        return false;
    }
    let max = MAX_HEAP_BYTES.load(Ordering::Relaxed);
    max == 0 || ALLOCATED_BYTES.load(Ordering::Relaxed).saturating_add(size) <= max
}

/// Allocate zeroed storage for one value of `typ`
///
/// # Panics
///
/// Panics if the heap size limit is exceeded.
pub fn alloc(typ: &Type) -> *mut u8 {
    alloc_bytes(typ.size(), typ.align())
}

/// Allocate zeroed storage for `len` consecutive values of `elem`
///
/// # Panics
///
/// Panics if the size overflows or the heap size limit is exceeded.
pub fn alloc_array(elem: &Type, len: usize) -> *mut u8 {
    let size = elem
        .size()
        .checked_mul(len)
        .unwrap_or_else(|| panic!("allocation of {} x {} overflows", len, elem));
    alloc_bytes(size, elem.align())
}

/// Allocate `size` zeroed bytes with at least `align` alignment
///
/// Zero-sized requests all share one non-null base address.
///
/// # Panics
///
/// Panics if the heap size limit is exceeded.
pub fn alloc_bytes(size: usize, align: usize) -> *mut u8 {
    if size == 0 {
        return &ZERO_BASE as *const u64 as *mut u8;
    }

    // Word alignment lets scalar loads/stores use the whole word
    let layout = match Layout::from_size_align(size, align.max(PTR_SIZE).next_power_of_two()) {
        Ok(layout) => layout,
        Err(_) => panic!("invalid allocation layout: size {} align {}", size, align),
    };

    // Check heap size limit
    let max = MAX_HEAP_BYTES.load(Ordering::Relaxed);
    let allocated = ALLOCATED_BYTES.load(Ordering::Relaxed);
    if max > 0 && allocated + layout.size() > max {
        tracing::error!(
            allocated,
            requested = layout.size(),
            max,
            "heap size limit exceeded"
        );
        panic!("Heap size limit exceeded");
    }

    // SAFETY: layout has non-zero size
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        handle_alloc_error(layout);
    }

    ALLOCATED_BYTES.fetch_add(layout.size(), Ordering::Relaxed);
    ALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
    ptr
}

/// Allocate a copy of the `typ` value at `src`
///
/// # Safety
///
/// `src` must be valid for reads of `typ.size()` bytes.
pub unsafe fn clone_value(typ: &Type, src: *const u8) -> *mut u8 {
    let dst = alloc(typ);
    memmove(dst, src, typ.size());
    dst
}

/// Copy `n` bytes from `src` to `dst`; the ranges may overlap
///
/// # Safety
///
/// Both pointers must be valid for `n` bytes.
pub unsafe fn memmove(dst: *mut u8, src: *const u8, n: usize) {
    if n > 0 && dst as *const u8 != src {
        std::ptr::copy(src, dst, n);
    }
}

/// Zero `n` bytes at `dst`
///
/// # Safety
///
/// `dst` must be valid for writes of `n` bytes.
pub unsafe fn memclr(dst: *mut u8, n: usize) {
    if n > 0 {
        std::ptr::write_bytes(dst, 0, n);
    }
}

/// Load a value of at most one word into a word
///
/// The value's bytes occupy the word's first `size` bytes in memory, so the
/// word can stand in for the value's storage.
///
/// # Safety
///
/// `src` must be valid for reads of `size` bytes and `size <= PTR_SIZE`.
pub unsafe fn load_scalar(src: *const u8, size: usize) -> usize {
    debug_assert!(size <= PTR_SIZE);
    let mut word = 0usize;
    std::ptr::copy_nonoverlapping(src, &mut word as *mut usize as *mut u8, size);
    word
}

/// Store the first `size` bytes of `word` to `dst`
///
/// # Safety
///
/// `dst` must be valid for writes of `size` bytes and `size <= PTR_SIZE`.
pub unsafe fn store_scalar(dst: *mut u8, word: usize, size: usize) {
    debug_assert!(size <= PTR_SIZE);
    std::ptr::copy_nonoverlapping(&word as *const usize as *const u8, dst, size);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{array_of, INT16, INT64};

    #[test]
    fn test_alloc_is_zeroed_and_counted() {
        let before = stats();
        let p = alloc(array_of(4, &INT64));
        let bytes = unsafe { std::slice::from_raw_parts(p, 32) };
        assert!(bytes.iter().all(|&b| b == 0));
        let after = stats();
        assert!(after.allocation_count > before.allocation_count);
        assert!(after.allocated_bytes >= before.allocated_bytes + 32);
    }

    #[test]
    fn test_fits_rejects_oversized_requests() {
        assert!(fits(0));
        assert!(fits(4096));
        assert!(!fits(MAX_ALLOC_BYTES + 1));
        assert!(!fits(usize::MAX));
    }

    #[test]
    fn test_zero_size_shares_base() {
        assert_eq!(alloc_bytes(0, 1), alloc_bytes(0, 8));
        assert!(!alloc_bytes(0, 1).is_null());
    }

    #[test]
    fn test_scalar_round_trip() {
        let p = alloc(&INT16);
        unsafe {
            store_scalar(p, (-2i16) as u16 as usize, 2);
            assert_eq!(*(p as *const i16), -2);
            let w = load_scalar(p, 2);
            assert_eq!(w, 0xfffe);
        }
    }

    #[test]
    fn test_memmove_overlap() {
        let p = alloc_bytes(8, 1);
        unsafe {
            for i in 0..8 {
                *p.add(i) = i as u8;
            }
            memmove(p.add(2), p, 4);
            let bytes = std::slice::from_raw_parts(p, 8);
            assert_eq!(bytes, &[0, 1, 0, 1, 2, 3, 6, 7]);
        }
    }
}
