//! Heap limit enforcement
//!
//! Runs in its own test binary because the limit is process-wide.
//! - Allocations within the limit succeed and are counted
//! - Crossing the limit panics

use prism_runtime::config::{self, RuntimeConfig};
use prism_runtime::heap;
use prism_runtime::types::{array_of, INT64};

#[test]
#[should_panic(expected = "Heap size limit exceeded")]
fn test_heap_limit_enforcement() {
    assert!(config::configure(RuntimeConfig::with_heap_limit(64 * 1024)));
    assert_eq!(heap::stats().max_heap_bytes, Some(64 * 1024));

    let before = heap::stats();
    let small = heap::alloc(&INT64);
    assert!(!small.is_null());
    let after = heap::stats();
    assert!(after.allocated_bytes >= before.allocated_bytes + 8);
    assert!(after.allocation_count > before.allocation_count);

    // 128 KiB in one go
    heap::alloc(array_of(16 * 1024, &INT64));
}
