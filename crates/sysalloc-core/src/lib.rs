//! # sysalloc-core
//!
//! The bottom of the allocation stack: aligned, page-backed extents taken
//! straight from the operating system, plus an advisory hook that lets the
//! kernel drop the physical backing of a range while the virtual mapping
//! stays valid.
//!
//! Two backends feed [`SystemAllocator`]:
//! - growth: advances the process heap break (`sbrk`)
//! - mapping: anonymous private mappings (`mmap`)
//!
//! They are tried in that fixed order. A backend that fails is skipped for
//! the rest of the burst; once every backend has failed in one request the
//! flags are cleared so a transient failure never disables a strategy for
//! good.
//!
//! The allocator is an explicit context object. It keeps no record of live
//! extents and provides no internal locking: callers serialize access.

#![deny(unsafe_code)]

pub mod allocator;
#[allow(unsafe_code)]
pub mod backend;
pub mod config;
pub mod error;
pub mod log;
#[allow(unsafe_code)]
pub mod reclaim;
pub mod registry;
#[allow(unsafe_code)]
pub mod syscall;

/// Serializes unit tests that move the process heap break.
#[cfg(test)]
pub(crate) static HEAP_BREAK_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

pub use allocator::{AllocatorStats, MIN_ALIGNMENT, ShutdownReport, SystemAllocator};
pub use backend::{BackendFailure, BackendKind, Extent};
pub use config::SysAllocConfig;
pub use error::SysAllocError;
pub use log::{SysAllocLogLevel, SysAllocLogRecord};
pub use registry::{BackendDescriptor, BackendRegistry, BackendStats};
