//! Benchmarks for twinform core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;
use twinform::core::allocator::{PortAllocator, PortSeed};
use twinform::core::app::App;
use twinform::core::config::AppConfig;
use twinform::core::naming;
use twinform::core::types::Environment;
use twinform::resources::backend;

fn bench_short_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("short_id");
    for depth in [1, 4, 16] {
        let path = vec!["Construct"; depth].join("/");
        group.bench_with_input(BenchmarkId::from_parameter(depth), &path, |b, path| {
            b.iter(|| black_box(naming::short_id(black_box(path))));
        });
    }
    group.finish();
}

fn bench_port_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("port_allocation");
    for count in [16, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut alloc = PortAllocator::new();
                for i in 0..count {
                    let seed = PortSeed::Name(format!("Service{i}"));
                    black_box(alloc.allocate(Some(seed)).unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_declare_backend(c: &mut Criterion) {
    c.bench_function("declare_backend", |b| {
        b.iter(|| {
            let mut app = App::new(AppConfig::for_root(Path::new("/proj"), Environment::Development));
            backend::declare_backend(&mut app, backend::DEFAULT_STACK).unwrap();
            black_box(app.render_manifest().unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_short_id,
    bench_port_allocation,
    bench_declare_backend
);
criterion_main!(benches);
