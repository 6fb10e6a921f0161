//! Heap-break growth backend (`sbrk`).
//!
//! The break only ever moves up. Alignment the kernel does not give us for
//! free is bought with a second, small growth; if that one lands somewhere
//! else (another actor moved the break in between) the request is redone as
//! a single over-sized growth and up to `alignment - 1` bytes of slack are
//! abandoned. Nothing here ever gives memory back.

use core::ptr::NonNull;

use super::{BackendFailure, Extent, checked_round_up, misalignment_gap};
use crate::syscall::{current_break, sys_sbrk};

/// Validate a request and return the rounded size to take from the break.
///
/// The break increment is signed, so `size + alignment` must fit `isize`:
/// a wrapped request would otherwise turn into a shrink. The rounded size
/// must also not carry the break past the top of the address space.
pub(crate) fn growth_increment(
    size: usize,
    alignment: usize,
    current_break: usize,
) -> Result<usize, BackendFailure> {
    let overflow = BackendFailure::Overflow { size, alignment };
    let fits_signed = size
        .checked_add(alignment)
        .is_some_and(|total| isize::try_from(total).is_ok());
    if !fits_signed {
        return Err(overflow);
    }
    let actual_size = checked_round_up(size, alignment).ok_or(overflow)?;
    if current_break.checked_add(actual_size).is_none() {
        return Err(overflow);
    }
    Ok(actual_size)
}

fn grow(bytes: usize, overflow: BackendFailure) -> Result<*mut u8, BackendFailure> {
    let increment = isize::try_from(bytes).map_err(|_| overflow)?;
    // SAFETY: increment is non-negative; growth never releases memory.
    unsafe { sys_sbrk(increment) }.map_err(|errno| BackendFailure::Os { errno })
}

fn extent_at(
    base: *mut u8,
    offset: usize,
    actual_size: usize,
) -> Result<Extent, BackendFailure> {
    NonNull::new(base.wrapping_add(offset))
        .map(|ptr| Extent::new(ptr, actual_size))
        .ok_or(BackendFailure::Os {
            errno: libc::ENOMEM,
        })
}

/// Take `size` bytes aligned to `alignment` from the heap break.
pub fn acquire(size: usize, alignment: usize) -> Result<Extent, BackendFailure> {
    let overflow = BackendFailure::Overflow { size, alignment };
    let brk = current_break().ok_or(BackendFailure::Os {
        errno: libc::ENOMEM,
    })?;
    acquire_with(size, alignment, brk, |bytes| grow(bytes, overflow))
}

/// Growth decisions over an injectable `grow`, which moves the break up by
/// the given byte count and returns the old break.
fn acquire_with(
    size: usize,
    alignment: usize,
    brk: usize,
    mut grow: impl FnMut(usize) -> Result<*mut u8, BackendFailure>,
) -> Result<Extent, BackendFailure> {
    let overflow = BackendFailure::Overflow { size, alignment };
    let actual_size = growth_increment(size, alignment, brk)?;

    let base = grow(actual_size)?;
    let addr = base as usize;
    let gap = misalignment_gap(addr, alignment);
    if gap == 0 {
        return extent_at(base, 0, actual_size);
    }

    // Extend by exactly the gap; usable only if it lands right after us.
    if let Ok(tail) = grow(gap) {
        if addr.checked_add(actual_size) == Some(tail as usize) {
            return extent_at(base, gap, actual_size);
        }
    }

    // Non-contiguous: take enough in one step to contain an aligned extent.
    // The first growth and the leading slack here stay consumed.
    let padded = actual_size.checked_add(alignment - 1).ok_or(overflow)?;
    let base = grow(padded)?;
    let gap = misalignment_gap(base as usize, alignment);
    extent_at(base, gap, actual_size)
}
