//! Anonymous mapping backend (`mmap`).
//!
//! The kernel only promises page alignment. For larger alignments the
//! mapping is over-sized by `alignment - page_size`, then the misaligned head
//! and the unused tail are unmapped so exactly `rounded` bytes stay mapped.

use core::ptr::NonNull;

use super::{BackendFailure, Extent, checked_round_up, misalignment_gap};
use crate::syscall::{map_anonymous, sys_munmap};

/// Sizes for one mapping request: `(rounded, extra)`.
///
/// `rounded` is `size` rounded up to `max(alignment, page_size)`; `extra` is
/// the over-allocation needed to find an aligned start inside the mapping.
pub(crate) fn mapping_layout(
    size: usize,
    alignment: usize,
    page_size: usize,
) -> Result<(usize, usize), BackendFailure> {
    let overflow = BackendFailure::Overflow { size, alignment };
    let unit = alignment.max(page_size);
    let rounded = checked_round_up(size, unit).ok_or(overflow)?;
    let extra = alignment.saturating_sub(page_size);
    rounded.checked_add(extra).ok_or(overflow)?;
    Ok((rounded, extra))
}

/// Map `size` bytes aligned to `alignment`.
pub fn acquire(
    size: usize,
    alignment: usize,
    page_size: usize,
) -> Result<Extent, BackendFailure> {
    let (rounded, extra) = mapping_layout(size, alignment, page_size)?;
    let base = map_anonymous(rounded + extra).map_err(|errno| BackendFailure::Os { errno })?;
    // SAFETY: `base` is a fresh mapping of exactly `rounded + extra` bytes.
    unsafe { trim_to_alignment(base, rounded, extra, alignment) }
}

/// Cut a `rounded + extra` byte mapping at `base` down to the aligned
/// `rounded` bytes inside it.
///
/// A head gap larger than `extra` means the aligned extent would run past
/// the mapping; the whole mapping is dropped and `ENOMEM` returned.
///
/// # Safety
///
/// `[base, base + rounded + extra)` must be a mapping owned by the caller
/// and not referenced anywhere else.
unsafe fn trim_to_alignment(
    base: *mut u8,
    rounded: usize,
    extra: usize,
    alignment: usize,
) -> Result<Extent, BackendFailure> {
    let adjust = misalignment_gap(base as usize, alignment);
    if adjust > extra {
        // SAFETY: the caller owns the whole mapping.
        let _ = unsafe { sys_munmap(base, rounded + extra) };
        return Err(BackendFailure::Os {
            errno: libc::ENOMEM,
        });
    }

    // Trim failures only leave slack mapped; the aligned extent is intact.
    if adjust > 0 {
        // SAFETY: the head lies inside the caller's mapping.
        let _ = unsafe { sys_munmap(base, adjust) };
    }
    if adjust < extra {
        // SAFETY: the tail lies inside the caller's mapping.
        let _ = unsafe { sys_munmap(base.wrapping_add(adjust + rounded), extra - adjust) };
    }

    NonNull::new(base.wrapping_add(adjust))
        .map(|ptr| Extent::new(ptr, rounded))
        .ok_or(BackendFailure::Os {
            errno: libc::ENOMEM,
        })
}
