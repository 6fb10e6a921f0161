//! The system allocator context.
//!
//! [`SystemAllocator`] owns the backend registry and is passed explicitly to
//! every operation; there is no hidden global. Its lifecycle is
//! [`SystemAllocator::init`] followed eventually by
//! [`SystemAllocator::shutdown`]. Extents handed out are not tracked and
//! outlive the context.
//!
//! Allocation policy:
//! 1. Raise the alignment to [`MIN_ALIGNMENT`].
//! 2. Try each eligible backend in registry order; the first success wins.
//! 3. A failing backend is marked `failed` and skipped by later requests.
//! 4. When a request runs out of backends, all flags are cleared and the
//!    request reports out-of-memory. Failures are therefore sticky within a
//!    burst of failing requests and forgotten across bursts.

use crate::backend::{self, BackendFailure, BackendKind, Extent};
use crate::config::SysAllocConfig;
use crate::error::SysAllocError;
use crate::log::{LifecycleLog, SysAllocLogLevel, SysAllocLogRecord, trace_id};
use crate::reclaim::{self, ReleaseOutcome};
use crate::registry::{BackendRegistry, BackendStats};

const fn max_usize(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}

/// Strictest alignment any fundamental scalar needs on this target.
pub const MIN_ALIGNMENT: usize = max_usize(
    max_usize(
        core::mem::align_of::<*const u8>(),
        core::mem::align_of::<f64>(),
    ),
    max_usize(
        core::mem::align_of::<usize>(),
        core::mem::align_of::<u128>(),
    ),
);

/// Allocator-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub requests: u64,
    pub oom_count: u64,
    /// Times every failure flag was cleared after exhaustion.
    pub flag_resets: u64,
    pub releases: u64,
    /// `madvise` calls actually issued (sub-page releases issue none).
    pub advisory_calls: u64,
    /// Advisory calls the kernel rejected; swallowed.
    pub advisory_failures: u64,
    /// Total `actual_size` handed out since init.
    pub taken_bytes: usize,
}

/// Final state returned by [`SystemAllocator::shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub stats: AllocatorStats,
    pub backends: [(BackendKind, BackendStats); BackendKind::COUNT],
    /// Lifecycle records still in the ring, oldest first.
    pub logs: Vec<SysAllocLogRecord>,
}

#[derive(Debug, Clone, Copy, Default)]
struct EventFields {
    backend: Option<BackendKind>,
    ptr: Option<usize>,
    size: Option<usize>,
    alignment: Option<usize>,
}

/// Normalize a caller alignment: 0 means "don't care", anything else must be
/// a power of two. The result is never below [`MIN_ALIGNMENT`].
pub fn effective_alignment(alignment: usize) -> Result<usize, SysAllocError> {
    let alignment = alignment.max(1);
    if !alignment.is_power_of_two() {
        return Err(SysAllocError::InvalidAlignment(alignment));
    }
    Ok(alignment.max(MIN_ALIGNMENT))
}

#[derive(Debug)]
pub struct SystemAllocator {
    config: SysAllocConfig,
    registry: BackendRegistry,
    log: LifecycleLog,
    stats: AllocatorStats,
}

impl SystemAllocator {
    /// Build the backend table.
    ///
    /// Fails with [`SysAllocError::InvalidConfig`] for an unusable
    /// configuration and with [`SysAllocError::InitializationFailure`] when
    /// the bookkeeping ring cannot be reserved.
    pub fn init(config: SysAllocConfig) -> Result<Self, SysAllocError> {
        config.validate()?;
        let log = LifecycleLog::try_with_capacity(config.log_capacity).map_err(|err| {
            SysAllocError::InitializationFailure(format!(
                "cannot reserve {} lifecycle records: {err}",
                config.log_capacity
            ))
        })?;
        let registry = BackendRegistry::new(&config);
        let mut this = Self {
            config,
            registry,
            log,
            stats: AllocatorStats::default(),
        };
        let details = format!(
            "page_size={};sbrk={};mmap={}",
            this.config.page_size,
            this.registry.descriptor(BackendKind::Growth).enabled(),
            this.registry.descriptor(BackendKind::Mapping).enabled(),
        );
        this.record(
            SysAllocLogLevel::Info,
            "init",
            "init",
            EventFields::default(),
            "success",
            details,
        );
        Ok(this)
    }

    /// [`SystemAllocator::init`] with [`SysAllocConfig::from_env`].
    pub fn from_env() -> Result<Self, SysAllocError> {
        Self::init(SysAllocConfig::from_env())
    }

    #[must_use]
    pub fn config(&self) -> &SysAllocConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        self.stats
    }

    /// Total bytes handed out since init.
    #[must_use]
    pub fn taken_bytes(&self) -> usize {
        self.stats.taken_bytes
    }

    /// Retained lifecycle records, oldest first.
    pub fn lifecycle_logs(&self) -> impl Iterator<Item = &SysAllocLogRecord> {
        self.log.records().iter()
    }

    pub fn drain_lifecycle_logs(&mut self) -> Vec<SysAllocLogRecord> {
        self.log.drain()
    }

    /// Make the next `count` attempts on `kind` fail as if the OS were out
    /// of memory, without issuing any system call.
    pub fn inject_failures(&mut self, kind: BackendKind, count: u32) {
        let descriptor = self.registry.descriptor_mut(kind);
        descriptor.forced_failures = descriptor.forced_failures.saturating_add(count);
    }

    fn record(
        &mut self,
        level: SysAllocLogLevel,
        symbol: &'static str,
        event: &'static str,
        fields: EventFields,
        outcome: &'static str,
        details: impl Into<String>,
    ) {
        let decision_id = self.log.next_decision_id();
        self.log.push(SysAllocLogRecord {
            decision_id,
            trace_id: trace_id(symbol, decision_id),
            level,
            symbol,
            event,
            backend: fields.backend.map(BackendKind::name),
            ptr: fields.ptr,
            size: fields.size,
            alignment: fields.alignment,
            outcome,
            details: details.into(),
            taken_bytes: self.stats.taken_bytes,
            oom_count: self.stats.oom_count,
        });
    }

    fn attempt(
        &mut self,
        kind: BackendKind,
        size: usize,
        alignment: usize,
    ) -> Result<Extent, BackendFailure> {
        let page_size = self.config.page_size;
        let descriptor = self.registry.descriptor_mut(kind);
        descriptor.stats.attempts += 1;
        let result = if descriptor.take_forced_failure() {
            Err(BackendFailure::Injected)
        } else {
            backend::acquire(kind, size, alignment, page_size)
        };
        match &result {
            Ok(extent) => {
                descriptor.stats.successes += 1;
                descriptor.stats.bytes_taken =
                    descriptor.stats.bytes_taken.saturating_add(extent.actual_size());
            }
            Err(_) => {
                descriptor.failed = true;
                descriptor.stats.failures += 1;
            }
        }
        result
    }

    /// Obtain at least `size` bytes aligned to `alignment`.
    ///
    /// The returned extent's start is a multiple of
    /// `max(alignment, MIN_ALIGNMENT)` and its `actual_size` is a multiple of
    /// that alignment, never smaller than `size`. A zero `size` is served as
    /// one byte.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> Result<Extent, SysAllocError> {
        let alignment = effective_alignment(alignment)?;
        let requested = size;
        let size = size.max(1);
        self.stats.requests += 1;

        for kind in BackendKind::ALL {
            if !self.registry.descriptor(kind).is_eligible() {
                continue;
            }
            let fields = EventFields {
                backend: Some(kind),
                ptr: None,
                size: Some(size),
                alignment: Some(alignment),
            };
            match self.attempt(kind, size, alignment) {
                Ok(extent) => {
                    self.stats.taken_bytes =
                        self.stats.taken_bytes.saturating_add(extent.actual_size());
                    self.record(
                        SysAllocLogLevel::Trace,
                        "allocate",
                        "backend_attempt",
                        EventFields {
                            ptr: Some(extent.addr()),
                            ..fields
                        },
                        "success",
                        format!("actual_size={}", extent.actual_size()),
                    );
                    return Ok(extent);
                }
                Err(failure) => {
                    self.record(
                        SysAllocLogLevel::Debug,
                        "allocate",
                        "backend_attempt",
                        fields,
                        failure.label(),
                        failure.to_string(),
                    );
                }
            }
        }

        self.registry.reset_failures();
        self.stats.oom_count += 1;
        self.stats.flag_resets += 1;
        self.record(
            SysAllocLogLevel::Warn,
            "allocate",
            "flags_reset",
            EventFields {
                size: Some(size),
                alignment: Some(alignment),
                ..EventFields::default()
            },
            "oom",
            "every backend failed; failure flags cleared",
        );
        Err(SysAllocError::OutOfMemory {
            size: requested,
            alignment,
        })
    }

    /// Advise the OS that the whole pages inside `[start, start + length)`
    /// may lose their physical backing. Best-effort, no failure channel.
    ///
    /// # Safety
    ///
    /// The caller must own every byte of the range and must not rely on its
    /// contents afterwards.
    #[allow(unsafe_code)]
    pub unsafe fn release(&mut self, start: *mut u8, length: usize) {
        // SAFETY: forwarded caller contract.
        let outcome =
            unsafe { reclaim::release_with_outcome(start, length, self.config.page_size) };
        self.stats.releases += 1;
        let fields = EventFields {
            ptr: Some(start as usize),
            size: Some(length),
            ..EventFields::default()
        };
        match outcome {
            ReleaseOutcome::Empty => self.record(
                SysAllocLogLevel::Trace,
                "release",
                "advise",
                fields,
                "empty",
                "no whole page inside range",
            ),
            ReleaseOutcome::Advised { start, length } => {
                self.stats.advisory_calls += 1;
                self.record(
                    SysAllocLogLevel::Trace,
                    "release",
                    "advise",
                    fields,
                    "advised",
                    format!("span_start={start:#x};span_len={length}"),
                );
            }
            ReleaseOutcome::Ignored { errno } => {
                self.stats.advisory_calls += 1;
                self.stats.advisory_failures += 1;
                self.record(
                    SysAllocLogLevel::Warn,
                    "release",
                    "advise",
                    fields,
                    "ignored",
                    format!("errno={errno}"),
                );
            }
        }
    }

    /// Tear down the context. Extents already handed out stay valid.
    pub fn shutdown(mut self) -> ShutdownReport {
        let details = format!(
            "requests={};oom={};taken_bytes={}",
            self.stats.requests, self.stats.oom_count, self.stats.taken_bytes
        );
        self.record(
            SysAllocLogLevel::Info,
            "shutdown",
            "shutdown",
            EventFields::default(),
            "success",
            details,
        );
        let backends = BackendKind::ALL.map(|kind| (kind, self.registry.descriptor(kind).stats()));
        ShutdownReport {
            stats: self.stats,
            backends,
            logs: self.log.drain(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HEAP_BREAK_LOCK;

    fn mapping_only() -> SystemAllocator {
        SystemAllocator::init(SysAllocConfig {
            skip_growth: true,
            ..SysAllocConfig::default()
        })
        .expect("config is valid")
    }

    #[test]
    fn min_alignment_covers_scalars() {
        assert!(MIN_ALIGNMENT.is_power_of_two());
        assert!(MIN_ALIGNMENT >= core::mem::align_of::<f64>());
        assert!(MIN_ALIGNMENT >= core::mem::align_of::<*const u8>());
        assert!(MIN_ALIGNMENT >= core::mem::align_of::<u128>());
    }

    #[test]
    fn alignment_normalization() {
        assert_eq!(effective_alignment(0), Ok(MIN_ALIGNMENT));
        assert_eq!(effective_alignment(1), Ok(MIN_ALIGNMENT));
        assert_eq!(effective_alignment(4096), Ok(4096));
        assert_eq!(
            effective_alignment(24),
            Err(SysAllocError::InvalidAlignment(24))
        );
    }

    #[test]
    fn init_rejects_invalid_config() {
        let err = SystemAllocator::init(SysAllocConfig {
            skip_growth: true,
            skip_mapping: true,
            ..SysAllocConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, SysAllocError::InvalidConfig(_)));
    }

    #[test]
    fn init_reports_unreservable_log_ring() {
        let err = SystemAllocator::init(SysAllocConfig {
            log_capacity: usize::MAX,
            ..SysAllocConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, SysAllocError::InitializationFailure(_)));
    }

    #[test]
    fn init_is_logged() {
        let allocator = mapping_only();
        let first = allocator.lifecycle_logs().next().expect("init record");
        assert_eq!(first.symbol, "init");
        assert_eq!(first.decision_id, 1);
        assert!(first.details.contains("sbrk=false"));
    }

    #[test]
    fn mapping_only_allocation_succeeds() {
        let mut allocator = mapping_only();
        let extent = allocator.allocate(100, 64).expect("mmap should succeed");
        assert_eq!(extent.addr() % 64, 0);
        assert!(extent.actual_size() >= 100);
        let growth = allocator.registry().descriptor(BackendKind::Growth);
        assert_eq!(growth.stats().attempts, 0, "disabled backend never runs");
        assert_eq!(allocator.taken_bytes(), extent.actual_size());
    }

    #[test]
    fn zero_size_is_served() {
        let mut allocator = mapping_only();
        let extent = allocator.allocate(0, 0).expect("mmap should succeed");
        assert!(extent.actual_size() >= 1);
        assert_eq!(extent.addr() % MIN_ALIGNMENT, 0);
    }

    #[test]
    fn invalid_alignment_is_not_an_attempt() {
        let mut allocator = mapping_only();
        assert_eq!(
            allocator.allocate(64, 48),
            Err(SysAllocError::InvalidAlignment(48))
        );
        assert_eq!(allocator.stats().requests, 0);
    }

    #[test]
    fn exhaustion_resets_flags_and_reports_oom() {
        let _guard = HEAP_BREAK_LOCK.lock();
        let mut allocator = SystemAllocator::init(SysAllocConfig::default()).unwrap();
        let err = allocator.allocate(usize::MAX - 1, 4096).unwrap_err();
        assert_eq!(
            err,
            SysAllocError::OutOfMemory {
                size: usize::MAX - 1,
                alignment: 4096
            }
        );
        assert!(
            allocator
                .registry()
                .descriptors()
                .iter()
                .all(|d| !d.failed())
        );
        let stats = allocator.stats();
        assert_eq!(stats.oom_count, 1);
        assert_eq!(stats.flag_resets, 1);
        let last = allocator.lifecycle_logs().last().unwrap();
        assert_eq!(last.event, "flags_reset");
        assert_eq!(last.outcome, "oom");
    }

    #[test]
    fn injected_failure_falls_through_to_mapping() {
        let _guard = HEAP_BREAK_LOCK.lock();
        let mut allocator = SystemAllocator::init(SysAllocConfig::default()).unwrap();
        allocator.inject_failures(BackendKind::Growth, 1);
        let extent = allocator.allocate(512, 32).expect("mmap fallback");
        assert_eq!(extent.addr() % 32, 0);
        let growth = allocator.registry().descriptor(BackendKind::Growth);
        assert!(growth.failed(), "failure is sticky within the burst");
        assert_eq!(growth.stats().failures, 1);
        assert_eq!(
            allocator
                .registry()
                .descriptor(BackendKind::Mapping)
                .stats()
                .successes,
            1
        );
    }

    #[test]
    #[allow(unsafe_code)]
    fn release_counts_only_real_advice() {
        let mut allocator = mapping_only();
        let page = allocator.config().page_size;
        let extent = allocator.allocate(2 * page, page).unwrap();
        // SAFETY: the extent is ours.
        unsafe {
            allocator.release(extent.as_mut_ptr().add(1), page);
            allocator.release(extent.as_mut_ptr(), extent.actual_size());
        }
        let stats = allocator.stats();
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.advisory_calls, 1);
        assert_eq!(stats.advisory_failures, 0);
    }

    #[test]
    fn shutdown_reports_final_state() {
        let mut allocator = mapping_only();
        let extent = allocator.allocate(10, 16).unwrap();
        let report = allocator.shutdown();
        assert_eq!(report.stats.requests, 1);
        assert_eq!(report.stats.taken_bytes, extent.actual_size());
        assert_eq!(report.backends[1].0, BackendKind::Mapping);
        assert_eq!(report.backends[1].1.successes, 1);
        assert_eq!(report.logs.last().unwrap().symbol, "shutdown");
    }
}
