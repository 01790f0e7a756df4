//! Dispatch Site Performance Benchmarks
//!
//! Measures the cost of a call through a dispatch site in each of its states.
//!
//! # Benchmark Categories
//!
//! 1. **Cached Hits**: monomorphic instance, static, property and math sites
//! 2. **Slow Path**: full resolution with caching disabled
//! 3. **Argument Adaptation**: vararg collection on the cached path
//! 4. **Invalidation**: epoch bump plus re-resolution
//! 5. **Polymorphism**: alternating receivers, megamorphic fallback
//!
//! # Performance Targets
//!
//! - Cached hit: < 20ns over the callable itself
//! - Epoch bump: constant regardless of site count

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use switchyard_core::{ClassId, MetaObject, Value};
use switchyard_dispatch::{
    CallKind, DispatchConfig, DispatchSiteTable, RuntimeContext, SiteDescriptor,
};
use switchyard_runtime::ClassRegistry;

// =============================================================================
// Benchmark Helpers
// =============================================================================

fn runtime(config: DispatchConfig) -> (Arc<ClassRegistry>, Arc<RuntimeContext>) {
    let registry = ClassRegistry::new();
    let ctx = RuntimeContext::with_config(registry.clone(), config).unwrap();
    (registry, ctx)
}

/// A class answering `name()` with a constant, plus one instance.
fn widget(registry: &Arc<ClassRegistry>, class: &str) -> Value {
    let meta = registry
        .define_class(class)
        .field("size")
        .method("name", [], |_, _| Ok(Value::str("widget")))
        .build();
    Value::Object(registry.new_instance(meta.class_id()).unwrap())
}

fn table(ctx: &Arc<RuntimeContext>, sites: impl IntoIterator<Item = SiteDescriptor>) -> DispatchSiteTable {
    DispatchSiteTable::create(Arc::clone(ctx), "Bench", sites)
}

// =============================================================================
// Cached Hits
// =============================================================================

fn bench_cached(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached");
    let (registry, ctx) = runtime(DispatchConfig::eager());
    let receiver = widget(&registry, "Widget");
    let table = table(
        &ctx,
        [
            SiteDescriptor::method("name"),
            SiteDescriptor::method("valueOf"),
            SiteDescriptor::property("size"),
            SiteDescriptor::method("plus"),
        ],
    );
    let string_class = Value::Class(ClassId::STRING);

    // Prime every site
    table.call0(0, CallKind::Method, &receiver).unwrap();
    table.call1(1, CallKind::Method, &string_class, Value::Int(1)).unwrap();
    table.call0(2, CallKind::GetProperty, &receiver).unwrap();
    table.call1(3, CallKind::Method, &Value::Int(1), Value::Int(2)).unwrap();

    group.bench_function("instance_method", |b| {
        b.iter(|| black_box(table.call0(0, CallKind::Method, black_box(&receiver))))
    });

    group.bench_function("static_method", |b| {
        b.iter(|| black_box(table.call1(1, CallKind::Method, &string_class, Value::Int(1))))
    });

    group.bench_function("field_property", |b| {
        b.iter(|| black_box(table.call0(2, CallKind::GetProperty, black_box(&receiver))))
    });

    group.bench_function("int_plus", |b| {
        b.iter(|| {
            black_box(table.call1(3, CallKind::Method, &Value::Int(black_box(1)), Value::Int(2)))
        })
    });

    group.finish();
}

// =============================================================================
// Slow Path
// =============================================================================

fn bench_uncached(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncached");
    let (registry, ctx) = runtime(DispatchConfig::uncached());
    let receiver = widget(&registry, "Widget");
    let table = table(&ctx, [SiteDescriptor::method("name"), SiteDescriptor::method("format")]);
    let string_class = Value::Class(ClassId::STRING);

    group.bench_function("instance_method", |b| {
        b.iter(|| black_box(table.call0(0, CallKind::Method, black_box(&receiver))))
    });

    group.bench_function("varargs_static", |b| {
        b.iter(|| {
            black_box(table.call3(
                1,
                CallKind::Method,
                &string_class,
                Value::str("%s%s"),
                Value::Int(1),
                Value::Int(2),
            ))
        })
    });

    group.finish();
}

// =============================================================================
// Argument Adaptation
// =============================================================================

fn bench_varargs(c: &mut Criterion) {
    let mut group = c.benchmark_group("varargs");
    let (_registry, ctx) = runtime(DispatchConfig::eager());
    let table = table(&ctx, [SiteDescriptor::method("format")]);
    let string_class = Value::Class(ClassId::STRING);

    for count in [1usize, 4, 16] {
        let mut args = vec![Value::str("%s")];
        args.extend((0..count).map(|i| Value::Int(i as i32)));
        table.call(0, CallKind::Method, &string_class, &args).unwrap();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("collect", count), &args, |b, args| {
            b.iter(|| black_box(table.call(0, CallKind::Method, &string_class, black_box(args))))
        });
    }

    group.finish();
}

// =============================================================================
// Invalidation
// =============================================================================

fn bench_invalidation(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidation");

    for sites in [1usize, 100, 10_000] {
        let (registry, ctx) = runtime(DispatchConfig::eager());
        let receiver = widget(&registry, "Widget");
        let table = table(&ctx, (0..sites).map(|_| SiteDescriptor::method("name")));
        for i in 0..sites {
            table.call0(i, CallKind::Method, &receiver).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("bump", sites), &sites, |b, _| {
            b.iter(|| black_box(ctx.invalidate("bench")))
        });
    }

    let (registry, ctx) = runtime(DispatchConfig::eager());
    let receiver = widget(&registry, "Widget");
    let table = table(&ctx, [SiteDescriptor::method("name")]);
    group.bench_function("bump_and_reresolve", |b| {
        b.iter(|| {
            ctx.invalidate("bench");
            black_box(table.call0(0, CallKind::Method, &receiver))
        })
    });

    group.finish();
}

// =============================================================================
// Polymorphism
// =============================================================================

fn bench_polymorphic(c: &mut Criterion) {
    let mut group = c.benchmark_group("polymorphic");

    for threshold in [2u32, 1_000_000] {
        let config = DispatchConfig {
            warmup_calls: 0,
            megamorphic_threshold: threshold,
            ..Default::default()
        };
        let (registry, ctx) = runtime(config);
        let receivers: Vec<Value> = (0..4).map(|i| widget(&registry, &format!("W{i}"))).collect();
        let table = table(&ctx, [SiteDescriptor::method("name")]);

        let label = if threshold == 2 { "megamorphic" } else { "thrashing" };
        group.bench_function(label, |b| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % receivers.len();
                black_box(table.call0(0, CallKind::Method, &receivers[i]))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cached,
    bench_uncached,
    bench_varargs,
    bench_invalidation,
    bench_polymorphic,
);

criterion_main!(benches);
