use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ember_engine::vm::types::{ClassId, FieldDescriptor, TypeRegistryBuilder};
use ember_engine::{
    assemble, GarbageCollector, GcConfig, GcStrategy, NoRoots, Reference, RootSet, Value, Vm,
    VmOptions,
};
use std::sync::Arc;

const STRATEGIES: [GcStrategy; 2] = [GcStrategy::Compact, GcStrategy::Sweep];

fn create_gc(heap_size: usize, strategy: GcStrategy) -> (GarbageCollector, ClassId) {
    let mut builder = TypeRegistryBuilder::new();
    let node = builder.declare_class("Node").unwrap();
    builder
        .define_fields(
            node,
            vec![FieldDescriptor::int("value"), FieldDescriptor::reference("next", node)],
        )
        .unwrap();
    let config = GcConfig {
        heap_size,
        strategy,
    };
    (GarbageCollector::new(config, Arc::new(builder.build())).unwrap(), node)
}

fn bench_short_lived(c: &mut Criterion) {
    let mut group = c.benchmark_group("short_lived");
    group.throughput(Throughput::Elements(10_000));

    for strategy in STRATEGIES {
        group.bench_with_input(
            BenchmarkId::new("alloc_10k", strategy),
            &strategy,
            |b, &strategy| {
                let (mut gc, node) = create_gc(64 * 1024, strategy);
                b.iter(|| {
                    for i in 0..10_000 {
                        let obj = gc.allocate_object(node, &mut NoRoots).unwrap();
                        gc.store_field(obj, 0, Value::int(black_box(i))).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_retained_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("retained_list");
    group.throughput(Throughput::Elements(10_000));

    for strategy in STRATEGIES {
        group.bench_with_input(
            BenchmarkId::new("list_1k_with_churn", strategy),
            &strategy,
            |b, &strategy| {
                let (mut gc, node) = create_gc(64 * 1024, strategy);
                b.iter(|| {
                    let mut roots = RootSet::new();
                    let head = roots.push(Reference::Null);
                    for i in 0..10_000 {
                        let obj = gc.allocate_object(node, &mut roots).unwrap();
                        if i % 10 == 0 {
                            gc.store_field(obj, 1, Value::Ref(roots.get(head))).unwrap();
                            roots.set(head, obj);
                        }
                    }
                    black_box(roots.get(head))
                });
            },
        );
    }

    group.finish();
}

fn bench_benchmark_program(c: &mut Criterion) {
    let source = include_str!("../../../demos/benchmark.easm")
        .replace("movi x0, 40000", "movi x0, 2000")
        .replace("movi x1, 1000", "movi x1, 100");
    let module = assemble(&source).unwrap();

    let mut group = c.benchmark_group("benchmark_program");
    group.sample_size(20);

    for strategy in STRATEGIES {
        group.bench_with_input(
            BenchmarkId::new("n2000_m100", strategy),
            &strategy,
            |b, &strategy| {
                let options = VmOptions {
                    gc: GcConfig {
                        heap_size: 256 * 1024,
                        strategy,
                    },
                    ..VmOptions::default()
                };
                let mut vm = Vm::new(options).unwrap();
                b.iter(|| vm.run(&module, &mut std::io::sink()).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_short_lived,
    bench_retained_list,
    bench_benchmark_program
);
criterion_main!(benches);
