//! # sysalloc-index
//!
//! Ordered index over free extents for the span/arena layer that sits on
//! top of `sysalloc-core`.
//!
//! A red-black tree whose nodes live in a contiguous pool and refer to each
//! other by [`NodeId`]. Slot 0 is the sentinel: one shared, always-black
//! leaf that terminates every absent child or parent link, so the balancing
//! code never branches on "no node". Freed slots are recycled.
//!
//! Ordering is pluggable through [`OrderPolicy`]:
//! - [`KeyThenIdentity`] (default): strict less-than on the key, ties broken
//!   by node identity, so equal keys stay distinct and ordered.
//! - [`WrappingTimer`]: modular comparison for keys that wrap around, such
//!   as timer deadlines or sequence numbers.

#![forbid(unsafe_code)]

mod tree;

pub use tree::{
    Color, ExtentTree, InOrder, KeyThenIdentity, NodeId, OrderPolicy, SENTINEL,
    TreeInvariantError, WrappingTimer,
};

/// Key type: one machine word (an address or a size).
pub type RbKey = usize;
