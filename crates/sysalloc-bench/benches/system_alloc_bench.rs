//! System allocator benchmarks.
//!
//! Extents are never returned to the OS, so allocation benches time at most
//! `ALLOC_CAP` real calls per sample and scale the result.

use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sysalloc_core::reclaim::page_span;
use sysalloc_core::{SysAllocConfig, SystemAllocator};

const ALLOC_CAP: u64 = 2048;

fn scaled(iters: u64, run: impl FnOnce(u64) -> Duration) -> Duration {
    let n = iters.clamp(1, ALLOC_CAP);
    let elapsed = run(n);
    elapsed.mul_f64(iters as f64 / n as f64)
}

fn quiet(config: SysAllocConfig) -> SystemAllocator {
    SystemAllocator::init(SysAllocConfig {
        log_capacity: 0,
        ..config
    })
    .expect("bench config is valid")
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");
    group.sample_size(10);

    for (label, config) in [
        ("sbrk", SysAllocConfig {
            skip_mapping: true,
            ..SysAllocConfig::default()
        }),
        ("mmap", SysAllocConfig {
            skip_growth: true,
            ..SysAllocConfig::default()
        }),
    ] {
        for &size in &[64usize, 4096, 65536] {
            group.bench_with_input(BenchmarkId::new(label, size), &size, |b, &sz| {
                let mut sys = quiet(config);
                b.iter_custom(|iters| {
                    scaled(iters, |n| {
                        let start = Instant::now();
                        for _ in 0..n {
                            criterion::black_box(sys.allocate(sz, 64).ok());
                        }
                        start.elapsed()
                    })
                });
            });
        }
    }
    group.finish();
}

fn bench_release(c: &mut Criterion) {
    let mut sys = quiet(SysAllocConfig {
        skip_growth: true,
        ..SysAllocConfig::default()
    });
    let page = sys.config().page_size;
    let extent = sys
        .allocate(64 * page, page)
        .expect("mapping available for bench");

    let mut group = c.benchmark_group("release");
    for &pages in &[1usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("dontneed", pages), &pages, |b, &p| {
            b.iter(|| {
                // SAFETY: the extent is owned by this bench and never read.
                unsafe { sys.release(extent.as_mut_ptr(), p * page) };
            });
        });
    }
    group.bench_function("sub_page_noop", |b| {
        b.iter(|| {
            // SAFETY: as above; the span is below one page.
            unsafe { sys.release(extent.as_mut_ptr().wrapping_add(1), page - 2) };
        });
    });
    group.finish();
}

fn bench_page_span(c: &mut Criterion) {
    c.bench_function("page_span", |b| {
        b.iter(|| {
            criterion::black_box(page_span(
                criterion::black_box(0x1234_5678),
                criterion::black_box(1 << 20),
                4096,
            ))
        });
    });
}

criterion_group!(benches, bench_allocate, bench_release, bench_page_span);
criterion_main!(benches);
