//! Many threads dispatching through the same sites.

mod common;

use common::*;
use std::sync::Barrier;
use std::thread;
use switchyard_core::Value;
use switchyard_dispatch::{CallKind, DispatchConfig, SiteDescriptor, SiteState};

const THREADS: usize = 8;
const CALLS: usize = 2_000;

#[test]
fn test_shared_site_converges() {
    let (registry, ctx) = eager_runtime();
    let receiver = instance(&registry, named_class(&registry, "Widget", "widget"));
    let table = table(&ctx, [SiteDescriptor::method("name")]);
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..CALLS {
                    let out = table.call0(0, CallKind::Method, &receiver).unwrap();
                    assert_eq!(out, Value::str("widget"));
                }
            });
        }
    });

    assert_eq!(table.site(0).unwrap().state(), SiteState::Cached);
    // Racing misses may each resolve once; hits never do.
    let resolutions = ctx.stats().resolutions();
    assert!((1..=THREADS as u64).contains(&resolutions), "{resolutions}");
}

#[test]
fn test_invalidation_races_with_calls() {
    let (registry, ctx) = eager_runtime();
    let receiver = instance(&registry, named_class(&registry, "Widget", "widget"));
    let table = table(&ctx, [SiteDescriptor::method("name")]);
    let barrier = Barrier::new(THREADS + 1);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..CALLS {
                    let out = table.call0(0, CallKind::Method, &receiver).unwrap();
                    assert_eq!(out, Value::str("widget"));
                }
            });
        }
        s.spawn(|| {
            barrier.wait();
            for i in 0..100 {
                ctx.invalidate(&format!("round {i}"));
                thread::yield_now();
            }
        });
    });

    assert_eq!(ctx.epoch().generation(), 100);
    table.call0(0, CallKind::Method, &receiver).unwrap();
    assert_eq!(table.site(0).unwrap().state(), SiteState::Cached);
}

#[test]
fn test_method_replaced_while_running() {
    let (registry, ctx) = eager_runtime();
    let class = named_class(&registry, "Widget", "widget");
    let receiver = instance(&registry, class);
    let table = table(&ctx, [SiteDescriptor::method("name")]);
    let barrier = Barrier::new(THREADS + 1);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..CALLS {
                    let out = table.call0(0, CallKind::Method, &receiver).unwrap();
                    assert!(out == Value::str("widget") || out == Value::str("gadget"), "{out:?}");
                }
            });
        }
        s.spawn(|| {
            barrier.wait();
            registry.add_method(
                class,
                switchyard_core::MetaMethod::new("name", class, [], |_, _| Ok(Value::str("gadget"))),
            );
        });
    });

    // Every call after the change observes it.
    assert_eq!(table.call0(0, CallKind::Method, &receiver).unwrap(), Value::str("gadget"));
}

#[test]
fn test_mixed_receivers_across_threads() {
    let config = DispatchConfig {
        warmup_calls: 0,
        megamorphic_threshold: 4,
        ..Default::default()
    };
    let (registry, ctx) = runtime_with(config);
    let receivers = [
        (instance(&registry, named_class(&registry, "A", "a")), "a"),
        (instance(&registry, named_class(&registry, "B", "b")), "b"),
        (Value::str("text"), "text"),
    ];
    let table = table(
        &ctx,
        [SiteDescriptor::method("name"), SiteDescriptor::method("toString")],
    );
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for t in 0..THREADS {
            let receivers = &receivers;
            let table = &table;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for i in 0..CALLS {
                    let (receiver, label) = &receivers[(t + i) % 2];
                    let out = table.call0(0, CallKind::Method, receiver).unwrap();
                    assert_eq!(out, Value::str(*label));

                    let (text, label) = &receivers[2];
                    let out = table.call0(1, CallKind::Method, text).unwrap();
                    assert_eq!(out, Value::str(*label));
                }
            });
        }
    });

    assert_eq!(table.site(1).unwrap().strategy_name(), Some("mono-instance"));
}
