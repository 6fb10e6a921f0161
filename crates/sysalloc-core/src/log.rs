//! Structured lifecycle records.
//!
//! Every init, allocation attempt, flag reset, release and shutdown leaves a
//! [`SysAllocLogRecord`] in a bounded ring owned by the allocator. Records
//! carry a monotonic decision id, a trace id of the form
//! `core::sysalloc::<symbol>::<id as 16 hex digits>` and a snapshot of the
//! allocator counters at the time of the event.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SysAllocLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl SysAllocLogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysAllocLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Correlation id for this record.
    pub trace_id: String,
    pub level: SysAllocLogLevel,
    /// API symbol (`init`, `allocate`, `release`, `shutdown`).
    pub symbol: &'static str,
    /// Event kind (`backend_attempt`, `flags_reset`, `advise`, ...).
    pub event: &'static str,
    /// Backend involved, by name.
    pub backend: Option<&'static str>,
    pub ptr: Option<usize>,
    pub size: Option<usize>,
    pub alignment: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details.
    pub details: String,
    /// Snapshot: total bytes handed out since init.
    pub taken_bytes: usize,
    /// Snapshot: requests that ended in out-of-memory.
    pub oom_count: u64,
}

/// Bounded ring of lifecycle records; the oldest record drops first.
#[derive(Debug)]
pub(crate) struct LifecycleLog {
    records: VecDeque<SysAllocLogRecord>,
    capacity: usize,
    next_decision_id: u64,
}

impl LifecycleLog {
    /// Reserve the full ring up front; the ring never grows after init.
    pub(crate) fn try_with_capacity(
        capacity: usize,
    ) -> Result<Self, std::collections::TryReserveError> {
        let mut records = VecDeque::new();
        records.try_reserve_exact(capacity)?;
        Ok(Self {
            records,
            capacity,
            next_decision_id: 1,
        })
    }

    pub(crate) fn next_decision_id(&mut self) -> u64 {
        let id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        id
    }

    pub(crate) fn push(&mut self, record: SysAllocLogRecord) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub(crate) fn records(&self) -> &VecDeque<SysAllocLogRecord> {
        &self.records
    }

    pub(crate) fn drain(&mut self) -> Vec<SysAllocLogRecord> {
        self.records.drain(..).collect()
    }
}

pub(crate) fn trace_id(symbol: &str, decision_id: u64) -> String {
    format!("core::sysalloc::{symbol}::{decision_id:016x}")
}
