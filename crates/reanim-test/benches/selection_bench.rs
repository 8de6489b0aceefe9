//! Benchmarks for candidate selection and playback callbacks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use reanim_core::{EmptyWorld, MotionSlot, PlaybackHandle};
use reanim_playback::Frame;
use reanim_rules::EvalContext;
use reanim_test::{flag_name, MockMotionHost, MockSubject, Scenario, ScenarioConfig};

fn bench_select_hit(c: &mut Criterion) {
    let scenario = Scenario::build(ScenarioConfig::default());
    let subject = MockSubject::new(1);
    for i in 0..scenario.config.flag_pool {
        subject.set_flag(&flag_name(i), true);
    }
    let slot = MotionSlot::new(3);

    c.bench_function("select_first_match", |b| {
        b.iter(|| {
            let mut ctx = EvalContext::new(&subject, &EmptyWorld);
            black_box(scenario.engine.select(black_box(slot), &mut ctx))
        })
    });
}

fn bench_select_miss(c: &mut Criterion) {
    let scenario = Scenario::build(ScenarioConfig::heavy());
    let subject = MockSubject::new(1);
    let slot = MotionSlot::new(3);

    c.bench_function("select_full_walk_miss", |b| {
        b.iter(|| {
            let mut ctx = EvalContext::new(&subject, &EmptyWorld);
            black_box(scenario.engine.select(black_box(slot), &mut ctx))
        })
    });
}

fn bench_select_traced(c: &mut Criterion) {
    let scenario = Scenario::build(ScenarioConfig::heavy());
    let subject = MockSubject::new(1).with_flag(&flag_name(5));
    let slot = MotionSlot::new(3);

    c.bench_function("select_with_trace", |b| {
        b.iter(|| black_box(scenario.engine.evaluate_with_trace(slot, &subject, &EmptyWorld)))
    });
}

fn bench_playback_cycle(c: &mut Criterion) {
    let scenario = Scenario::build(ScenarioConfig::default());
    let subject = MockSubject::new(1).with_flag(&flag_name(1));
    let motions = MockMotionHost::new();
    let slot = MotionSlot::new(2);
    let mut next = 0u64;

    c.bench_function("activate_sample_loop_deactivate", |b| {
        b.iter(|| {
            next += 1;
            let handle = PlaybackHandle::new(next);
            let mut frame = Frame::new(&subject, &EmptyWorld);
            let engine = &scenario.engine;
            let _ = engine.activate(handle, slot, &mut frame, false);
            let _ = engine.update(handle, 1.0 / 60.0);
            black_box(engine.generate(handle, &motions).ok());
            let _ = engine.on_loop(handle, &mut frame);
            let _ = engine.deactivate(handle, &mut frame);
        })
    });
}

criterion_group!(
    benches,
    bench_select_hit,
    bench_select_miss,
    bench_select_traced,
    bench_playback_cycle
);
criterion_main!(benches);
