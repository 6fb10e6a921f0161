//! Advisory release of physical backing.
//!
//! `release` tells the kernel it may drop the pages inside a range while the
//! virtual mapping stays valid. Only whole pages strictly inside the range
//! are advised, so a sub-page range releases nothing. The call is
//! best-effort: `EAGAIN` is retried, every other error is dropped.

use crate::syscall::{MADV_DONTNEED, sys_madvise};

/// What a single release attempt ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Rounding left no whole page; no advisory call was made.
    Empty,
    /// The kernel accepted the advice for `[start, start + length)`.
    Advised { start: usize, length: usize },
    /// The kernel rejected the advice with a non-transient errno.
    Ignored { errno: i32 },
}

/// Page-aligned sub-range `(start, length)` of `[start, start + length)`.
///
/// The start rounds up and the end rounds down. `None` when nothing of a
/// whole page remains.
#[must_use]
pub fn page_span(start: usize, length: usize, page_size: usize) -> Option<(usize, usize)> {
    debug_assert!(page_size.is_power_of_two());
    let mask = page_size - 1;
    let first = start.checked_add(mask)? & !mask;
    let end = start.saturating_add(length) & !mask;
    (end > first).then(|| (first, end - first))
}

pub(crate) unsafe fn release_with_outcome(
    start: *mut u8,
    length: usize,
    page_size: usize,
) -> ReleaseOutcome {
    let Some((first, span)) = page_span(start as usize, length, page_size) else {
        return ReleaseOutcome::Empty;
    };
    let addr = start.wrapping_add(first - start as usize);
    loop {
        // SAFETY: caller owns [start, start + length), which contains the span.
        match unsafe { sys_madvise(addr, span, MADV_DONTNEED) } {
            Ok(()) => {
                return ReleaseOutcome::Advised {
                    start: first,
                    length: span,
                };
            }
            Err(errno) if errno == libc::EAGAIN => continue,
            Err(errno) => return ReleaseOutcome::Ignored { errno },
        }
    }
}

/// Let the OS discard the physical pages inside `[start, start + length)`.
///
/// Contents of the advised pages become undefined (zero-filled on Linux for
/// private anonymous memory); the addresses stay valid.
///
/// # Safety
///
/// The caller must own every byte of `[start, start + length)` and must not
/// rely on its contents afterwards.
pub unsafe fn release(start: *mut u8, length: usize, page_size: usize) {
    // SAFETY: forwarded caller contract.
    let _ = unsafe { release_with_outcome(start, length, page_size) };
}
