// All extern "C" exports take raw pointers from C callers; the contracts are
// documented once on each module.
#![allow(clippy::missing_safety_doc)]
//! # sysalloc-abi
//!
//! Process-wide C surface for the system allocator.
//!
//! ```text
//! C caller -> extern "C" entry (this crate) -> global SystemAllocator -> sbrk / mmap / madvise
//! ```
//!
//! The global context is created from the environment on first use. A
//! failed initialization leaves it empty and is retried by the next call.

mod global;
pub mod system_alloc_abi;

pub use global::{global_stats, is_initialized};
