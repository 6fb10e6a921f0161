//! Backend registry.
//!
//! Exactly one descriptor per [`BackendKind`], stored in attempt order.
//! A descriptor's `failed` flag is sticky for the current burst of failing
//! requests and is cleared for all descriptors at once when a request
//! exhausts every backend.

use crate::backend::BackendKind;
use crate::config::SysAllocConfig;

/// Per-backend counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Sum of `actual_size` over successful attempts.
    pub bytes_taken: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    kind: BackendKind,
    /// Failed during the current burst; skipped until the next reset.
    pub(crate) failed: bool,
    /// Disabled by configuration; never attempted.
    pub(crate) enabled: bool,
    /// Upcoming attempts that fail without calling the OS.
    pub(crate) forced_failures: u32,
    pub(crate) stats: BackendStats,
}

impl BackendDescriptor {
    fn new(kind: BackendKind, enabled: bool) -> Self {
        Self {
            kind,
            failed: false,
            enabled,
            forced_failures: 0,
            stats: BackendStats::default(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }

    #[must_use]
    pub const fn failed(&self) -> bool {
        self.failed
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn forced_failures(&self) -> u32 {
        self.forced_failures
    }

    #[must_use]
    pub const fn stats(&self) -> BackendStats {
        self.stats
    }

    /// Whether the dispatcher should try this backend now.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        self.enabled && !self.failed
    }

    /// Consume one injected failure, if any are pending.
    pub(crate) fn take_forced_failure(&mut self) -> bool {
        if self.forced_failures == 0 {
            return false;
        }
        self.forced_failures -= 1;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRegistry {
    descriptors: [BackendDescriptor; BackendKind::COUNT],
}

impl BackendRegistry {
    #[must_use]
    pub fn new(config: &SysAllocConfig) -> Self {
        Self {
            descriptors: [
                BackendDescriptor::new(BackendKind::Growth, !config.skip_growth),
                BackendDescriptor::new(BackendKind::Mapping, !config.skip_mapping),
            ],
        }
    }

    /// Descriptors in attempt order.
    #[must_use]
    pub fn descriptors(&self) -> &[BackendDescriptor; BackendKind::COUNT] {
        &self.descriptors
    }

    #[must_use]
    pub fn descriptor(&self, kind: BackendKind) -> &BackendDescriptor {
        &self.descriptors[kind.index()]
    }

    pub(crate) fn descriptor_mut(&mut self, kind: BackendKind) -> &mut BackendDescriptor {
        &mut self.descriptors[kind.index()]
    }

    /// Clear every `failed` flag.
    pub fn reset_failures(&mut self) {
        for descriptor in &mut self.descriptors {
            descriptor.failed = false;
        }
    }

    /// True when no enabled backend is currently eligible.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.descriptors.iter().all(|d| !d.is_eligible())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_is_ordered_and_clean() {
        let registry = BackendRegistry::new(&SysAllocConfig::default());
        let kinds: Vec<BackendKind> = registry.descriptors().iter().map(|d| d.kind()).collect();
        assert_eq!(kinds, vec![BackendKind::Growth, BackendKind::Mapping]);
        assert!(registry.descriptors().iter().all(|d| !d.failed()));
        assert!(registry.descriptors().iter().all(|d| d.enabled()));
        assert!(!registry.all_failed());
    }

    #[test]
    fn skip_switches_disable_descriptors() {
        let config = SysAllocConfig {
            skip_growth: true,
            ..SysAllocConfig::default()
        };
        let registry = BackendRegistry::new(&config);
        assert!(!registry.descriptor(BackendKind::Growth).is_eligible());
        assert!(registry.descriptor(BackendKind::Mapping).is_eligible());
    }

    #[test]
    fn reset_clears_every_flag() {
        let mut registry = BackendRegistry::new(&SysAllocConfig::default());
        for kind in BackendKind::ALL {
            registry.descriptor_mut(kind).failed = true;
        }
        assert!(registry.all_failed());
        registry.reset_failures();
        assert!(!registry.all_failed());
        assert!(registry.descriptors().iter().all(|d| !d.failed()));
    }

    #[test]
    fn forced_failures_are_consumed_one_at_a_time() {
        let mut registry = BackendRegistry::new(&SysAllocConfig::default());
        let descriptor = registry.descriptor_mut(BackendKind::Mapping);
        descriptor.forced_failures = 2;
        assert!(descriptor.take_forced_failure());
        assert!(descriptor.take_forced_failure());
        assert!(!descriptor.take_forced_failure());
        assert_eq!(descriptor.forced_failures(), 0);
    }
}
