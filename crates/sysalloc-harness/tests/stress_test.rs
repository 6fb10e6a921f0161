//! Stress driver runs against the live allocator.

use parking_lot::Mutex;
use sysalloc_core::{SysAllocConfig, SystemAllocator};
use sysalloc_harness::structured_log::{LogEmitter, validate_log_line};
use sysalloc_harness::{StressConfig, run_stress};

/// Runs move the heap break; keep them apart.
static SERIAL: Mutex<()> = Mutex::new(());

fn small(iterations: u64) -> StressConfig {
    StressConfig {
        iterations,
        max_size: 9000,
        ..StressConfig::default()
    }
}

#[test]
fn clean_run_has_no_violations() {
    let _serial = SERIAL.lock();
    let mut sys = SystemAllocator::init(SysAllocConfig::default()).unwrap();
    let summary = run_stress(&mut sys, &small(300), None).unwrap();
    assert_eq!(summary.iterations, 300);
    assert_eq!(summary.succeeded + summary.out_of_memory, 300);
    assert_eq!(summary.violations, 0);
    assert!(summary.succeeded > 0);
    assert_eq!(summary.backends.len(), 2);
    assert_eq!(summary.backends[0].name, "sbrk");
    assert_eq!(summary.backends[1].name, "mmap");
    let served: u64 = summary.backends.iter().map(|b| b.successes).sum();
    assert_eq!(served, summary.succeeded);
}

#[test]
fn growth_failure_sticks_for_the_burst() {
    let _serial = SERIAL.lock();
    let mut sys = SystemAllocator::init(SysAllocConfig::default()).unwrap();
    let config = StressConfig {
        fail_growth: 1,
        ..small(50)
    };
    let summary = run_stress(&mut sys, &config, None).unwrap();
    let growth = summary.backends[0];
    let mapping = summary.backends[1];
    // Growth fails once and is then skipped until an exhaustion reset.
    assert_eq!(growth.successes, 0);
    assert_eq!(growth.failures, 1);
    assert_eq!(mapping.successes, summary.succeeded);
}

#[test]
fn double_injection_costs_exactly_one_request() {
    let _serial = SERIAL.lock();
    let mut sys = SystemAllocator::init(SysAllocConfig::default()).unwrap();
    let config = StressConfig {
        fail_growth: 1,
        fail_mapping: 1,
        ..small(40)
    };
    let summary = run_stress(&mut sys, &config, None).unwrap();
    assert_eq!(summary.out_of_memory, 1);
    assert_eq!(summary.flag_resets, 1);
    assert_eq!(summary.succeeded, 39);
}

#[test]
fn emitted_lines_validate() {
    let _serial = SERIAL.lock();
    let mut sys = SystemAllocator::init(SysAllocConfig {
        skip_growth: true,
        ..SysAllocConfig::default()
    })
    .unwrap();
    let mut emitter = LogEmitter::to_buffer("test");
    let summary = run_stress(&mut sys, &small(20), Some(&mut emitter)).unwrap();
    assert_eq!(summary.succeeded, 20);

    let text = String::from_utf8(emitter.buffer().to_vec()).unwrap();
    let mut attempts = 0;
    for (i, line) in text.lines().enumerate() {
        let entry = validate_log_line(line, i + 1).unwrap();
        assert!(entry.trace_id.starts_with("core::sysalloc::"));
        if entry.event == "backend_attempt" {
            attempts += 1;
            assert_eq!(entry.backend.as_deref(), Some("mmap"));
        }
    }
    assert_eq!(attempts, 20);
    assert_eq!(emitter.lines_written(), text.lines().count());
}

#[test]
fn invalid_alignment_is_rejected_up_front() {
    let _serial = SERIAL.lock();
    let mut sys = SystemAllocator::init(SysAllocConfig::default()).unwrap();
    let config = StressConfig {
        alignment: 12,
        ..small(5)
    };
    assert!(run_stress(&mut sys, &config, None).is_err());
    assert_eq!(sys.stats().requests, 0);
}
