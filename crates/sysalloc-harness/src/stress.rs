//! Seeded allocate / fill / release loop against a live [`SystemAllocator`].

use serde::Serialize;
use sysalloc_core::{BackendKind, SysAllocError, SystemAllocator};

use crate::error::HarnessError;
use crate::structured_log::LogEmitter;

/// Parameters of one stress run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    pub iterations: u64,
    /// Sizes are drawn from `1..=max_size`.
    pub max_size: usize,
    pub alignment: usize,
    pub seed: u64,
    /// Injected failures queued on the growth backend before the loop.
    pub fail_growth: u32,
    /// Injected failures queued on the mapping backend before the loop.
    pub fail_mapping: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            max_size: 32_767,
            alignment: 32,
            seed: 0xDEAD_BEEF,
            fail_growth: 0,
            fail_mapping: 0,
        }
    }
}

impl StressConfig {
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.max_size == 0 {
            return Err(HarnessError::InvalidArgument(
                "max_size must be at least 1".to_string(),
            ));
        }
        if self.alignment != 0 && !self.alignment.is_power_of_two() {
            return Err(HarnessError::InvalidArgument(format!(
                "alignment {} is not a power of two",
                self.alignment
            )));
        }
        if self.seed == 0 {
            return Err(HarnessError::InvalidArgument(
                "seed must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackendSummary {
    pub name: &'static str,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub bytes_taken: usize,
}

/// Totals for one stress run, printed as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StressSummary {
    pub iterations: u64,
    pub succeeded: u64,
    pub out_of_memory: u64,
    /// Extents that came back misaligned or short. Always 0 on a healthy run.
    pub violations: u64,
    pub bytes_requested: u64,
    pub taken_bytes: usize,
    pub flag_resets: u64,
    pub advisory_calls: u64,
    pub advisory_failures: u64,
    pub backends: Vec<BackendSummary>,
}

#[derive(Debug, Clone, Copy)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        let span = (high_inclusive - low) as u64 + 1;
        low + (self.next_u64() % span) as usize
    }
}

/// Run the loop: each iteration allocates a random size, writes every
/// requested byte, NUL-terminates, and releases the range.
///
/// With an emitter, the lifecycle ring is drained into it after every
/// iteration so nothing is lost to the ring bound.
pub fn run_stress(
    sys: &mut SystemAllocator,
    config: &StressConfig,
    mut emitter: Option<&mut LogEmitter>,
) -> Result<StressSummary, HarnessError> {
    config.validate()?;
    sys.inject_failures(BackendKind::Growth, config.fail_growth);
    sys.inject_failures(BackendKind::Mapping, config.fail_mapping);

    let effective = config.alignment.max(sysalloc_core::MIN_ALIGNMENT);
    let mut rng = XorShift64::new(config.seed);
    let mut succeeded = 0u64;
    let mut out_of_memory = 0u64;
    let mut violations = 0u64;
    let mut bytes_requested = 0u64;

    for _ in 0..config.iterations {
        let size = rng.gen_range(1, config.max_size);
        bytes_requested += size as u64;
        match sys.allocate(size, config.alignment) {
            Ok(extent) => {
                succeeded += 1;
                if extent.addr() % effective != 0 || extent.actual_size() < size {
                    violations += 1;
                } else {
                    // SAFETY: the extent is exclusively ours for `actual_size >= size`
                    // bytes and is not touched again after the release.
                    unsafe {
                        let base = extent.as_mut_ptr();
                        base.write_bytes(b'a', size);
                        *base.add(size - 1) = 0;
                        sys.release(base, size);
                    }
                }
            }
            Err(SysAllocError::OutOfMemory { .. }) => out_of_memory += 1,
            Err(err) => return Err(err.into()),
        }
        if let Some(emitter) = emitter.as_deref_mut() {
            emitter.emit_records(&sys.drain_lifecycle_logs())?;
        }
    }

    let stats = sys.stats();
    let backends = sys
        .registry()
        .descriptors()
        .iter()
        .map(|d| {
            let s = d.stats();
            BackendSummary {
                name: d.name(),
                attempts: s.attempts,
                successes: s.successes,
                failures: s.failures,
                bytes_taken: s.bytes_taken,
            }
        })
        .collect();

    Ok(StressSummary {
        iterations: config.iterations,
        succeeded,
        out_of_memory,
        violations,
        bytes_requested,
        taken_bytes: stats.taken_bytes,
        flag_resets: stats.flag_resets,
        advisory_calls: stats.advisory_calls,
        advisory_failures: stats.advisory_failures,
        backends,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        assert!(StressConfig::default().validate().is_ok());
        let bad = StressConfig {
            alignment: 48,
            ..StressConfig::default()
        };
        assert!(matches!(bad.validate(), Err(HarnessError::InvalidArgument(_))));
        let zero = StressConfig {
            max_size: 0,
            ..StressConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn rng_stays_in_range() {
        let mut rng = XorShift64::new(99);
        for _ in 0..1000 {
            let v = rng.gen_range(1, 7);
            assert!((1..=7).contains(&v));
        }
    }
}
