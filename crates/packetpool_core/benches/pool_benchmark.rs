//! # Pool and Queue Benchmark
//!
//! Allocation is a bitmap scan, so its cost should track the word count,
//! not the block count. Queue churn is a handful of index updates under
//! the pool lock.
//!
//! Run with: `cargo bench --package packetpool_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use packetpool_core::{BufferQueue, HostInterrupts, IrqLock, MemoryPool};

/// Benchmark: allocate + free of a single block on an empty pool.
fn bench_allocate_free(c: &mut Criterion) {
    let pool = MemoryPool::new(1536, 32).unwrap();
    c.bench_function("allocate_free", |b| {
        b.iter(|| {
            let block = pool.allocate(black_box(false)).unwrap();
            pool.free(block).unwrap();
        });
    });
}

/// Benchmark: allocate + free with the interrupt-mask lock.
fn bench_allocate_free_irq_lock(c: &mut Criterion) {
    let pool: MemoryPool<IrqLock<HostInterrupts>> = MemoryPool::create(1536, 32).unwrap();
    c.bench_function("allocate_free_irq_lock", |b| {
        b.iter(|| {
            let block = pool.allocate(black_box(true)).unwrap();
            pool.free(block).unwrap();
        });
    });
}

/// Benchmark: allocation when only the last block is free, the worst scan.
fn bench_allocate_last_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_last_free");

    for count in [64, 128, 256] {
        let pool = MemoryPool::new(64, count).unwrap();
        let _held: Vec<_> = (0..count - 1).map(|_| pool.allocate(false).unwrap()).collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let block = pool.allocate(false).unwrap();
                black_box(block.index());
                pool.free(block).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark: enqueue + dequeue of one block.
fn bench_queue_churn(c: &mut Criterion) {
    let pool = MemoryPool::new(1536, 32).unwrap();
    let queue = BufferQueue::new(&pool, 32).unwrap();
    let block = pool.allocate(true).unwrap();

    c.bench_function("queue_enqueue_dequeue", |b| {
        b.iter(|| {
            queue.enqueue_with_length(block, black_box(1514)).unwrap();
            black_box(queue.dequeue_with_length());
        });
    });
}

/// Benchmark: draining a full queue in one batch versus one by one.
fn bench_queue_batch(c: &mut Criterion) {
    let pool = MemoryPool::new(1536, 32).unwrap();
    let queue = BufferQueue::new(&pool, 32).unwrap();
    let blocks: Vec<_> = (0..32).map(|_| pool.allocate(true).unwrap()).collect();
    let mut out = Vec::with_capacity(32);

    let mut group = c.benchmark_group("queue_drain_32");
    group.bench_function("batch", |b| {
        b.iter(|| {
            for &block in &blocks {
                queue.enqueue(block).unwrap();
            }
            out.clear();
            black_box(queue.dequeue_batch(&mut out, 32));
        });
    });
    group.bench_function("single", |b| {
        b.iter(|| {
            for &block in &blocks {
                queue.enqueue(block).unwrap();
            }
            while let Some(block) = queue.dequeue() {
                black_box(block);
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_allocate_free,
    bench_allocate_free_irq_lock,
    bench_allocate_last_free,
    bench_queue_churn,
    bench_queue_batch,
);
criterion_main!(benches);
