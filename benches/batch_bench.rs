use blocktx_core::{
    BlockNode, DelayedTaskQueue, EngineConfig, MemoryBackend, Operation, Services, Transaction,
    Tree,
};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::sync::Arc;

fn seeded(paragraphs: usize, config: EngineConfig) -> (Arc<MemoryBackend>, Services) {
    let backend = Arc::new(MemoryBackend::new());
    let root = BlockNode::document("root").with_children(
        (0..paragraphs).map(|i| BlockNode::paragraph(format!("p{i}"), "paragraph text")),
    );
    backend.add_tree(Tree::new("box", "/bench.sy", root).expect("valid tree"));
    let services = Services::in_memory(backend.clone(), Arc::new(DelayedTaskQueue::new()))
        .with_config(config);
    (backend, services)
}

fn paste(n: usize) -> Vec<Operation> {
    let mut previous = "p0".to_string();
    (0..n)
        .map(|i| {
            let id = format!("n{i}");
            let op = Operation::insert_after(previous.clone(), &BlockNode::paragraph(id.as_str(), "pasted"));
            previous = id;
            op
        })
        .collect()
}

fn config(bulk: bool) -> EngineConfig {
    EngineConfig {
        batch_threshold: if bulk { 32 } else { usize::MAX },
        ..EngineConfig::default()
    }
}

/// Paste N blocks into a document, bulk path vs per-operation dispatch
fn bench_paste(c: &mut Criterion) {
    let mut group = c.benchmark_group("paste");

    for size in [32, 256, 1024].iter() {
        for bulk in [true, false] {
            let label = if bulk { "bulk" } else { "per_op" };
            group.bench_with_input(BenchmarkId::new(label, size), size, |b, &size| {
                b.iter_batched(
                    || (seeded(200, config(bulk)), Transaction::new(paste(size))),
                    |((_backend, services), mut tx)| {
                        black_box(tx.run(&services).expect("paste commits"));
                    },
                    BatchSize::SmallInput,
                );
            });
        }
    }

    group.finish();
}

/// Delete a run of blocks
fn bench_delete_run(c: &mut Criterion) {
    c.bench_function("delete_run_500", |b| {
        b.iter_batched(
            || {
                let ops = (1..=500).map(|i| Operation::delete(format!("p{i}"))).collect();
                (seeded(600, config(true)), Transaction::new(ops))
            },
            |((_backend, services), mut tx)| {
                black_box(tx.run(&services).expect("delete commits"));
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_paste, bench_delete_run);
criterion_main!(benches);
