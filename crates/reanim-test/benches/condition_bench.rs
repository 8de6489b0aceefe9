//! Benchmarks for condition evaluation

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use reanim_core::{EmptyWorld, HostCatalog};
use reanim_rules::{Condition, ConditionSet, EvalContext, ParseContext, PresetRegistry, RuleFactory};
use reanim_test::{MockSubject, MockWorld};

fn parse_nodes(input: &Value, presets: &PresetRegistry) -> Vec<Condition> {
    let factory = RuleFactory::with_builtins();
    let catalog = HostCatalog::permissive();
    let mut ctx = ParseContext::new(&factory, &catalog).with_presets(presets);
    ConditionSet::parse_nodes(input, &mut ctx).unwrap_or_default()
}

fn parse_set(input: &Value, presets: &PresetRegistry) -> Arc<ConditionSet> {
    let set = ConditionSet::new();
    set.replace_all(parse_nodes(input, presets));
    set
}

fn bench_flat_and(c: &mut Criterion) {
    let presets = PresetRegistry::new();
    let subject = MockSubject::new(1)
        .with_flag("a")
        .with_flag("b")
        .with_variable("speed", 4.0);
    let mut group = c.benchmark_group("flat_and");

    for size in [1usize, 8, 32] {
        let conditions: Vec<Value> = (0..size)
            .map(|i| match i % 3 {
                0 => json!({"condition": "HasFlag", "flag": "a"}),
                1 => json!({"condition": "HasFlag", "flag": "c", "negated": true}),
                _ => json!({
                    "condition": "CompareValues",
                    "valueA": {"variable": "speed", "scope": "subject"},
                    "comparison": ">",
                    "valueB": 2.0
                }),
            })
            .collect();
        let set = parse_set(&Value::Array(conditions), &presets);

        group.bench_with_input(BenchmarkId::from_parameter(size), &set, |b, set| {
            b.iter(|| {
                let mut ctx = EvalContext::new(&subject, &EmptyWorld);
                black_box(set.evaluate_all(&mut ctx))
            })
        });
    }
    group.finish();
}

fn bench_nested_or(c: &mut Criterion) {
    let presets = PresetRegistry::new();
    let subject = MockSubject::new(1).with_flag("deep");
    let mut node = json!({"condition": "HasFlag", "flag": "deep"});
    for _ in 0..8 {
        node = json!({
            "condition": "OR",
            "conditions": [{"condition": "HasFlag", "flag": "never"}, node]
        });
    }
    let set = parse_set(&json!([node]), &presets);

    c.bench_function("nested_or_depth_8", |b| {
        b.iter(|| {
            let mut ctx = EvalContext::new(&subject, &EmptyWorld);
            black_box(set.evaluate_all(&mut ctx))
        })
    });
}

fn bench_preset_and_random(c: &mut Criterion) {
    let presets = PresetRegistry::new();
    if let Ok(shared) = presets.create("shared") {
        let body = parse_nodes(&json!([{"condition": "HasFlag", "flag": "a"}]), &presets);
        shared.conditions().replace_all(body);
    }
    let set = parse_set(
        &json!([
            {"condition": "PRESET", "preset": "shared"},
            {"condition": "Random", "comparison": "<", "value": 0.5}
        ]),
        &presets,
    );
    let subject = MockSubject::new(1).with_flag("a");
    let world = MockWorld::new().with_global("difficulty", 2.0);
    let mut rng = StdRng::seed_from_u64(42);

    c.bench_function("preset_plus_random", |b| {
        b.iter(|| {
            let mut ctx = EvalContext::new(&subject, &world).with_rng(&mut rng);
            black_box(set.evaluate_all(&mut ctx))
        })
    });
}

criterion_group!(benches, bench_flat_and, bench_nested_or, bench_preset_and_random);
criterion_main!(benches);
