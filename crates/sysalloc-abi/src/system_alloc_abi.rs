//! ABI layer for the system allocator.
//!
//! Four entry points: allocate an aligned extent, release (advise) a range,
//! and explicit init / exit of the process-wide context. Allocation and
//! release also initialize lazily, so explicit init is optional.
//!
//! Callers pass raw pointers: `actual_size` must be null or writable, and a
//! released range must be owned by the caller.

use std::ffi::{c_int, c_void};
use std::ptr;

use sysalloc_core::syscall;

use crate::global;

/// Allocate at least `size` bytes aligned to `alignment` (a power of two,
/// or 0 for the platform minimum) directly from the OS.
///
/// Writes the usable size to `actual_size` when it is non-null. Returns null
/// when every backend failed, the alignment is invalid, or the context could
/// not be initialized.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn sysalloc_system_alloc(
    size: usize,
    actual_size: *mut usize,
    alignment: usize,
) -> *mut c_void {
    let Ok(result) = global::with_allocator(|sys| sys.allocate(size, alignment)) else {
        return ptr::null_mut();
    };
    match result {
        Ok(extent) => {
            if !actual_size.is_null() {
                // SAFETY: caller guarantees a non-null `actual_size` is writable.
                unsafe { *actual_size = extent.actual_size() };
            }
            extent.as_mut_ptr().cast()
        }
        Err(_) => ptr::null_mut(),
    }
}

/// Tell the OS the whole pages inside `[start, start + length)` are unused.
/// Advisory only; the range stays mapped and reads back as zeroes.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn sysalloc_system_release(start: *mut c_void, length: usize) {
    if start.is_null() || length == 0 {
        return;
    }
    let start = start.cast::<u8>();
    // SAFETY: caller owns the range.
    let released = global::with_existing(|sys| unsafe { sys.release(start, length) });
    if released.is_none() {
        // Nothing was ever allocated through the context; advise directly.
        // SAFETY: caller owns the range.
        unsafe { sysalloc_core::reclaim::release(start, length, syscall::page_size()) };
    }
}

/// Initialize the process-wide context from the environment.
/// Returns 0 on success (including when already initialized), -1 otherwise.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn sysalloc_init_system_allocator() -> c_int {
    match global::with_allocator(|_| ()) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Drop the process-wide context. Extents already handed out stay valid.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn sysalloc_exit_system_allocator() {
    if let Some(sys) = global::take() {
        let _report = sys.shutdown();
    }
}
