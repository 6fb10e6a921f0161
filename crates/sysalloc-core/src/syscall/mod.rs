//! OS veneer for the extent source.
//!
//! On x86_64 Linux the mapping calls (`mmap`, `munmap`, `madvise`) go
//! through raw `syscall` instructions. Other Unix targets route through the
//! `libc` crate. Every wrapper reports failure as `Err(errno)`.
//!
//! The heap break is the exception: it is always moved through libc's
//! `sbrk`, because the C library caches the current break and its own
//! malloc reads that cache. Issuing `brk` behind its back would let the next
//! libc `sbrk` shrink the heap underneath an extent we already handed out.

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod raw;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use raw::*;

pub const SYS_MMAP: usize = 9;
pub const SYS_MUNMAP: usize = 11;
pub const SYS_MADVISE: usize = 28;

pub const PROT_READ: i32 = libc::PROT_READ;
pub const PROT_WRITE: i32 = libc::PROT_WRITE;
pub const MAP_PRIVATE: i32 = libc::MAP_PRIVATE;
pub const MAP_ANONYMOUS: i32 = libc::MAP_ANON;
pub const MADV_DONTNEED: i32 = libc::MADV_DONTNEED;

/// Page size assumed when the OS refuses to report one.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// Largest errno the kernel encodes in a syscall return.
const MAX_ERRNO: usize = 4095;

/// Decode a raw kernel return: values in `[-4095, -1]` are `-errno`.
#[inline]
pub fn syscall_result(ret: usize) -> Result<usize, i32> {
    if ret > usize::MAX - MAX_ERRNO {
        Err(-(ret as isize) as i32)
    } else {
        Ok(ret)
    }
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::ENOMEM)
}

/// `mmap(addr, length, prot, flags, fd, offset)`.
///
/// # Safety
///
/// A non-null `addr` combined with `MAP_FIXED` replaces existing mappings;
/// the caller owns that consequence.
#[inline]
pub unsafe fn sys_mmap(
    addr: *mut u8,
    length: usize,
    prot: i32,
    flags: i32,
    fd: i32,
    offset: i64,
) -> Result<*mut u8, i32> {
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    {
        // SAFETY: mapping validity is the caller's responsibility.
        let ret = unsafe {
            raw::syscall6(
                SYS_MMAP,
                addr as usize,
                length,
                prot as usize,
                flags as usize,
                fd as usize,
                offset as usize,
            )
        };
        syscall_result(ret).map(|v| v as *mut u8)
    }
    #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
    {
        // SAFETY: mapping validity is the caller's responsibility.
        let ret = unsafe {
            libc::mmap(
                addr.cast(),
                length,
                prot,
                flags,
                fd,
                offset as libc::off_t,
            )
        };
        if ret == libc::MAP_FAILED {
            Err(last_errno())
        } else {
            Ok(ret.cast())
        }
    }
}

/// Anonymous, private, read-write mapping of `length` bytes.
#[inline]
pub fn map_anonymous(length: usize) -> Result<*mut u8, i32> {
    // SAFETY: a null hint without MAP_FIXED never disturbs existing mappings.
    unsafe {
        sys_mmap(
            core::ptr::null_mut(),
            length,
            PROT_READ | PROT_WRITE,
            MAP_PRIVATE | MAP_ANONYMOUS,
            -1,
            0,
        )
    }
}

/// `munmap(addr, length)`.
///
/// # Safety
///
/// `addr` must be page-aligned and nothing may still reference
/// `[addr, addr + length)`.
#[inline]
pub unsafe fn sys_munmap(addr: *mut u8, length: usize) -> Result<(), i32> {
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    {
        // SAFETY: caller guarantees the range is ours to drop.
        let ret = unsafe { raw::syscall2(SYS_MUNMAP, addr as usize, length) };
        syscall_result(ret).map(|_| ())
    }
    #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
    {
        // SAFETY: caller guarantees the range is ours to drop.
        if unsafe { libc::munmap(addr.cast(), length) } == 0 {
            Ok(())
        } else {
            Err(last_errno())
        }
    }
}

/// `madvise(addr, length, advice)`.
///
/// # Safety
///
/// With `MADV_DONTNEED` the contents of the range are discarded; the caller
/// must own every byte of `[addr, addr + length)`.
#[inline]
pub unsafe fn sys_madvise(addr: *mut u8, length: usize, advice: i32) -> Result<(), i32> {
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    {
        // SAFETY: caller owns the advised range.
        let ret = unsafe { raw::syscall3(SYS_MADVISE, addr as usize, length, advice as usize) };
        syscall_result(ret).map(|_| ())
    }
    #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
    {
        // SAFETY: caller owns the advised range.
        if unsafe { libc::madvise(addr.cast(), length, advice) } == 0 {
            Ok(())
        } else {
            Err(last_errno())
        }
    }
}

/// Move the heap break by `increment` bytes and return the previous break.
///
/// `sys_sbrk(0)` reads the current break without moving it.
///
/// # Safety
///
/// A negative increment releases heap memory that may still be in use. The
/// break is process-global: concurrent movers must be serialized.
#[inline]
pub unsafe fn sys_sbrk(increment: isize) -> Result<*mut u8, i32> {
    // SAFETY: caller upholds the break-movement contract above.
    let ret = unsafe { libc::sbrk(increment as libc::intptr_t) };
    if ret as usize == usize::MAX {
        Err(std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::ENOMEM))
    } else {
        Ok(ret.cast())
    }
}

/// Current break, or `None` when the C library cannot report it.
#[inline]
pub fn current_break() -> Option<usize> {
    // SAFETY: a zero increment never moves the break.
    unsafe { sys_sbrk(0) }.ok().map(|p| p as usize)
}

/// System page size, falling back to [`FALLBACK_PAGE_SIZE`].
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    match usize::try_from(raw) {
        Ok(size) if size.is_power_of_two() => size,
        _ => FALLBACK_PAGE_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_result_success() {
        assert_eq!(syscall_result(0), Ok(0));
        assert_eq!(syscall_result(0x7f00_0000_0000), Ok(0x7f00_0000_0000));
        assert_eq!(syscall_result(usize::MAX - 4095), Ok(usize::MAX - 4095));
    }

    #[test]
    fn syscall_result_error() {
        assert_eq!(syscall_result(usize::MAX), Err(1));
        assert_eq!(syscall_result((-12isize) as usize), Err(12));
        assert_eq!(syscall_result((-4095isize) as usize), Err(4095));
    }

    #[test]
    fn page_size_is_power_of_two() {
        let size = page_size();
        assert!(size.is_power_of_two());
        assert!(size >= 4096, "unexpectedly small page size {size}");
    }

    #[test]
    fn anonymous_mapping_is_writable() {
        let len = page_size();
        let ptr = map_anonymous(len).expect("anonymous mmap should succeed");
        assert_eq!(ptr as usize % len, 0, "mmap returns page-aligned memory");

        // SAFETY: freshly mapped RW page.
        unsafe {
            *ptr = 0xA5;
            *ptr.add(len - 1) = 0x5A;
            assert_eq!(*ptr, 0xA5);
            assert_eq!(*ptr.add(len - 1), 0x5A);
        }

        // SAFETY: we own the mapping.
        assert!(unsafe { sys_munmap(ptr, len) }.is_ok());
    }

    #[test]
    fn dontneed_zeroes_private_anonymous_page() {
        let len = page_size();
        let ptr = map_anonymous(len).expect("anonymous mmap should succeed");

        // SAFETY: we own the mapping for the whole test.
        unsafe {
            ptr.write_bytes(0xCC, len);
            assert!(sys_madvise(ptr, len, MADV_DONTNEED).is_ok());
            assert_eq!(*ptr, 0, "discarded private page reads back as zero");
            assert!(sys_munmap(ptr, len).is_ok());
        }
    }

    #[test]
    fn munmap_unaligned_address_is_einval() {
        let len = page_size();
        let ptr = map_anonymous(len).expect("anonymous mmap should succeed");

        // SAFETY: the unaligned call is rejected by the kernel before it
        // touches anything; the aligned call drops our own mapping.
        unsafe {
            assert_eq!(sys_munmap(ptr.add(1), len), Err(libc::EINVAL));
            assert!(sys_munmap(ptr, len).is_ok());
        }
    }

    #[test]
    fn zero_increment_reads_break() {
        let first = current_break().expect("sbrk(0) should report the break");
        assert_ne!(first, 0);
    }
}
