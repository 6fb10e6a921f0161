//! Memory acquisition strategies.
//!
//! The set of strategies is closed: [`BackendKind`] names each one and
//! [`acquire`] dispatches with an exhaustive match. Both strategies share one
//! contract: hand back an extent whose start is a multiple of `alignment`
//! and whose `actual_size` is at least the requested size, or a
//! [`BackendFailure`].

pub mod growth;
pub mod mapping;

use core::ptr::NonNull;

use thiserror::Error;

/// One way of obtaining OS-backed memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Advance the process heap break.
    Growth,
    /// Anonymous private mapping.
    Mapping,
}

impl BackendKind {
    pub const COUNT: usize = 2;

    /// Attempt order. Growth always goes first.
    pub const ALL: [BackendKind; Self::COUNT] = [BackendKind::Growth, BackendKind::Mapping];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Growth => "sbrk",
            Self::Mapping => "mmap",
        }
    }

    /// Position in the registry table.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Growth => 0,
            Self::Mapping => 1,
        }
    }
}

/// Why a single backend call produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BackendFailure {
    /// The request cannot be expressed without wrapping address arithmetic.
    /// Retrying with the same parameters can never succeed.
    #[error("{size} bytes at alignment {alignment} overflows address arithmetic")]
    Overflow { size: usize, alignment: usize },
    /// The OS refused (errno).
    #[error("os error {errno}")]
    Os { errno: i32 },
    /// Simulated exhaustion requested through
    /// [`crate::SystemAllocator::inject_failures`].
    #[error("injected failure")]
    Injected,
}

impl BackendFailure {
    /// Short machine-readable label for lifecycle records.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Overflow { .. } => "overflow",
            Self::Os { .. } => "os_error",
            Self::Injected => "injected",
        }
    }
}

/// A raw extent handed to the caller, who owns it from then on.
///
/// `[ptr, ptr + actual_size)` is addressable and writable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    ptr: NonNull<u8>,
    actual_size: usize,
}

impl Extent {
    pub(crate) fn new(ptr: NonNull<u8>, actual_size: usize) -> Self {
        Self { ptr, actual_size }
    }

    #[must_use]
    pub const fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[must_use]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Usable bytes starting at [`Extent::ptr`]; never less than requested.
    #[must_use]
    pub const fn actual_size(&self) -> usize {
        self.actual_size
    }
}

/// Round `value` up to a multiple of the power-of-two `align`.
#[inline]
pub(crate) fn checked_round_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

/// Bytes needed to move `addr` forward to the next multiple of `align`.
#[inline]
pub(crate) fn misalignment_gap(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    let rem = addr & (align - 1);
    if rem == 0 { 0 } else { align - rem }
}

/// Run one strategy.
///
/// `alignment` must already be a power of two at or above the scalar
/// minimum; [`crate::SystemAllocator::allocate`] normalizes it.
pub fn acquire(
    kind: BackendKind,
    size: usize,
    alignment: usize,
    page_size: usize,
) -> Result<Extent, BackendFailure> {
    match kind {
        BackendKind::Growth => growth::acquire(size, alignment),
        BackendKind::Mapping => mapping::acquire(size, alignment, page_size),
    }
}
