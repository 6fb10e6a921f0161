//! The process-wide allocator context.

use parking_lot::Mutex;
use sysalloc_core::{AllocatorStats, SysAllocError, SystemAllocator};

static GLOBAL: Mutex<Option<SystemAllocator>> = Mutex::new(None);

/// Run `f` against the global context, initializing it from the environment
/// first if needed.
pub(crate) fn with_allocator<R>(
    f: impl FnOnce(&mut SystemAllocator) -> R,
) -> Result<R, SysAllocError> {
    let mut guard = GLOBAL.lock();
    if guard.is_none() {
        *guard = Some(SystemAllocator::from_env()?);
    }
    match guard.as_mut() {
        Some(allocator) => Ok(f(allocator)),
        None => Err(SysAllocError::InitializationFailure(
            "global allocator unavailable".to_string(),
        )),
    }
}

/// Run `f` only if the global context already exists.
pub(crate) fn with_existing<R>(f: impl FnOnce(&mut SystemAllocator) -> R) -> Option<R> {
    GLOBAL.lock().as_mut().map(f)
}

/// Remove the global context. The next call re-initializes.
pub(crate) fn take() -> Option<SystemAllocator> {
    GLOBAL.lock().take()
}

#[must_use]
pub fn is_initialized() -> bool {
    GLOBAL.lock().is_some()
}

/// Counters of the global context, if it has been initialized.
#[must_use]
pub fn global_stats() -> Option<AllocatorStats> {
    GLOBAL.lock().as_ref().map(SystemAllocator::stats)
}
