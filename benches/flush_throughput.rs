//! Benchmarks for flush throughput with shared and distinct sub-tasks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use offload_rs::prelude::*;
use std::sync::Arc;

struct Op(String);

impl SubTask for Op {
    fn canonical_text(&self) -> String {
        self.0.clone()
    }
}

struct Batch {
    ops: Vec<Arc<Op>>,
}

impl Kernel for Batch {
    type Task = Op;
    type Context = u64;

    fn name(&self) -> &str {
        "batch"
    }

    fn is_lowered(&self) -> bool {
        true
    }

    fn lower(&self) -> Result<()> {
        Ok(())
    }

    fn ir(&self) -> IrNode<Op> {
        IrNode::Block(self.ops.iter().cloned().map(IrNode::Offload).collect())
    }

    fn context(&self) -> u64 {
        0
    }
}

struct Accumulate;

impl CodeGen<Batch> for Accumulate {
    fn codegen(&self, _kernel: &Batch, task: &Op) -> Result<Artifact<u64>> {
        let weight = task.0.len() as u64;
        Ok(Arc::new(move |acc: &mut u64| {
            *acc = black_box(acc.wrapping_add(weight));
        }))
    }
}

fn batch(size: usize, distinct: usize) -> Arc<Batch> {
    Arc::new(Batch {
        ops: (0..size)
            .map(|i| Arc::new(Op(format!("op_{}", i % distinct))))
            .collect(),
    })
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");

    for size in [16, 256, 1024].iter() {
        let shared = batch(*size, 4);
        let distinct = batch(*size, *size);

        group.bench_with_input(BenchmarkId::new("shared", size), size, |b, _| {
            let mut engine = AsyncEngine::new(Config::default(), Accumulate).unwrap();
            b.iter(|| black_box(engine.launch(&shared).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("distinct", size), size, |b, _| {
            let mut engine = AsyncEngine::new(Config::default(), Accumulate).unwrap();
            b.iter(|| black_box(engine.launch(&distinct).unwrap()));
        });
    }

    group.finish();
}

fn bench_persistent_cache(c: &mut Criterion) {
    let config = Config::builder()
        .cache_policy(CachePolicy::Persistent { max_entries: 1024 })
        .build()
        .unwrap();
    let mut engine = AsyncEngine::new(config, Accumulate).unwrap();
    let kernel = batch(256, 256);

    c.bench_function("persistent_cache_warm", |b| {
        b.iter(|| black_box(engine.launch(&kernel).unwrap()));
    });
}

criterion_group!(benches, bench_flush, bench_persistent_cache);
criterion_main!(benches);
