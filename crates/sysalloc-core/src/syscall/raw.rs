//! Raw x86_64 Linux `syscall` instruction wrappers.
//!
//! Only the arities the extent source needs are provided: two arguments for
//! `munmap`, three for `madvise`, six for `mmap`. The kernel's return value
//! comes back untouched in `rax`; decoding `-errno` is left to
//! [`super::syscall_result`].
//!
//! Register mapping: number in `rax`, arguments in `rdi`, `rsi`, `rdx`,
//! `r10`, `r8`, `r9`; `rcx` and `r11` are clobbered.

use core::arch::asm;

/// Two-argument syscall.
///
/// # Safety
///
/// `nr` must be a valid syscall number and the arguments must satisfy that
/// syscall's contract.
#[inline]
pub unsafe fn syscall2(nr: usize, a1: usize, a2: usize) -> usize {
    let ret: usize;
    // SAFETY: a bare syscall instruction; argument validity is on the caller.
    unsafe {
        asm!(
            "syscall",
            inlateout("rax") nr => ret,
            in("rdi") a1,
            in("rsi") a2,
            lateout("rcx") _,
            lateout("r11") _,
            options(nostack, preserves_flags),
        );
    }
    ret
}

/// Three-argument syscall.
///
/// # Safety
///
/// Same contract as [`syscall2`].
#[inline]
pub unsafe fn syscall3(nr: usize, a1: usize, a2: usize, a3: usize) -> usize {
    let ret: usize;
    // SAFETY: a bare syscall instruction; argument validity is on the caller.
    unsafe {
        asm!(
            "syscall",
            inlateout("rax") nr => ret,
            in("rdi") a1,
            in("rsi") a2,
            in("rdx") a3,
            lateout("rcx") _,
            lateout("r11") _,
            options(nostack, preserves_flags),
        );
    }
    ret
}

/// Six-argument syscall (`mmap`).
///
/// # Safety
///
/// Same contract as [`syscall2`].
#[inline]
pub unsafe fn syscall6(
    nr: usize,
    a1: usize,
    a2: usize,
    a3: usize,
    a4: usize,
    a5: usize,
    a6: usize,
) -> usize {
    let ret: usize;
    // SAFETY: a bare syscall instruction; argument validity is on the caller.
    unsafe {
        asm!(
            "syscall",
            inlateout("rax") nr => ret,
            in("rdi") a1,
            in("rsi") a2,
            in("rdx") a3,
            in("r10") a4,
            in("r8") a5,
            in("r9") a6,
            lateout("rcx") _,
            lateout("r11") _,
            options(nostack, preserves_flags),
        );
    }
    ret
}
