//! Benchmarks for guardheap.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use guardheap::{AllocClass, CheckedHeap, HeapConfig};

fn bench_alloc_free(c: &mut Criterion) {
    let heap = CheckedHeap::new(HeapConfig::default());

    let mut group = c.benchmark_group("alloc_free");

    for size in [16usize, 256, 4096] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("round_trip", size), &size, |b, &size| {
            b.iter(|| {
                let ptr = heap.alloc_checked(black_box(size), AllocClass::Scalar);
                black_box(ptr);
                heap.free_checked(ptr, AllocClass::Scalar);
            })
        });
    }

    group.bench_function("round_trip_with_stacks_256", |b| {
        let heap = CheckedHeap::new(HeapConfig::default().with_stacks(true));
        b.iter(|| {
            let ptr = heap.alloc_checked(256, AllocClass::Scalar);
            black_box(ptr);
            heap.free_checked(ptr, AllocClass::Scalar);
        })
    });

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let heap = CheckedHeap::new(HeapConfig::default());
    let ptr = heap.alloc_checked(4096, AllocClass::Flat);

    c.bench_function("validate_4kb", |b| {
        b.iter(|| {
            let result = heap.validate(black_box(ptr as *const u8));
            black_box(result).unwrap();
        })
    });

    heap.free_checked(ptr, AllocClass::Flat);
}

fn bench_leak_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("leak_scan");
    group.sample_size(20);

    for count in [100usize, 1000] {
        let heap = CheckedHeap::new(HeapConfig::default());
        let blocks: Vec<_> = (0..count)
            .map(|i| heap.alloc_checked(64 + (i % 8) * 16, AllocClass::Scalar))
            .collect();
        // Chain every block to its predecessor so the scans have edges
        for pair in blocks.windows(2) {
            unsafe { (pair[1] as *mut usize).write(pair[0] as usize) };
        }

        group.bench_with_input(BenchmarkId::new("ownership_v1", count), &(), |b, _| {
            b.iter(|| black_box(heap.scan_ownership()))
        });
        group.bench_with_input(BenchmarkId::new("graph_v2", count), &(), |b, _| {
            b.iter(|| black_box(heap.classify_graph()))
        });

        for &ptr in &blocks {
            heap.free_checked(ptr, AllocClass::Scalar);
        }
    }

    group.finish();
}

criterion_group!(benches, bench_alloc_free, bench_validate, bench_leak_scan);
criterion_main!(benches);
