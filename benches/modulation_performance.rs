//! Modulation Performance Benchmarks
//!
//! Checks that one control tick fits comfortably inside a frame. At the
//! usual control rates the whole pipeline (advance sources, follow audio,
//! publish, evaluate every parameter) has this budget:
//!
//! ```text
//! time_budget = 1 / control_rate
//! ```
//!
//! | Control Rate | Budget   | Audio block @ 44.1 kHz |
//! |--------------|----------|------------------------|
//! | 60 Hz        | 16.67 ms | 735 samples            |
//! | 120 Hz       | 8.33 ms  | 368 samples            |
//! | 240 Hz       | 4.17 ms  | 184 samples            |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cvmod::prelude::*;

// ============================================================================
// Constants
// ============================================================================

const CONTROL_RATES: [f64; 3] = [60.0, 120.0, 240.0];
const SAMPLE_RATE: f64 = 44100.0;
const CHAIN_LENGTHS: [usize; 4] = [1, 4, 16, 64];
const PARAMETER_COUNTS: [usize; 3] = [8, 32, 128];

// ============================================================================
// Helper Functions
// ============================================================================

fn seeded_registry(control_rate: f64) -> SignalRegistry {
    let mut config = EngineConfig::default().with_seed(42);
    config.control_rate_hz = control_rate;
    SignalRegistry::new(&config).unwrap()
}

/// Deterministic noisy block with a kick every `period` samples
fn test_block(len: usize, period: usize) -> Vec<f32> {
    let mut rng = XorShift::from_seed(3);
    (0..len)
        .map(|i| {
            let kick = if i % period < 32 { 0.8 } else { 0.0 };
            kick + 0.1 * rng.next_f64_bipolar() as f32
        })
        .collect()
}

/// Parameter whose chain cycles through every built-in source and operator
fn chain(len: usize) -> ModulatableParameter {
    let sources = ["beatPhase", "lfo1", "amp", "randomWalk", "accent", "lfo2"];
    let waveforms = [Waveform::Sine, Waveform::Triangle, Waveform::Square];
    (0..len).fold(ModulatableParameter::new(0.5), |param, i| {
        let operator = if i % 3 == 2 {
            Operator::Multiply
        } else {
            Operator::Add
        };
        param.with_modulator(
            Modulator::new(sources[i % sources.len()])
                .with_waveform(waveforms[i % waveforms.len()])
                .with_operator(operator)
                .with_weight(0.1)
                .with_subdivision(subdivision::STANDARD[i % subdivision::STANDARD.len()]),
        )
    })
}

fn instrument(parameters: usize) -> Instrument {
    (0..parameters).fold(Instrument::new("bench"), |inst, i| {
        inst.with_parameter(format!("p{:03}", i), chain(4))
    })
}

// ============================================================================
// Source Benchmarks
// ============================================================================

fn bench_audio_follower(c: &mut Criterion) {
    let mut group = c.benchmark_group("sources/audio");

    for rate in CONTROL_RATES {
        let block_len = (SAMPLE_RATE / rate).round() as usize;
        let block = test_block(block_len, 512);

        group.throughput(Throughput::Elements(block_len as u64));
        group.bench_with_input(
            BenchmarkId::new("process", format!("{}Hz", rate as u32)),
            &block,
            |b, block| {
                let mut engine = AudioEngine::new(&AudioConfig::default(), rate);
                b.iter(|| {
                    engine.process(black_box(block));
                    engine.levels()
                });
            },
        );
    }

    group.finish();
}

fn bench_audio_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("sources/audio_queue");
    let block = test_block(735, 512);

    group.throughput(Throughput::Elements(block.len() as u64));
    group.bench_function("push_drain", |b| {
        let (mut producer, mut consumer) = AudioInput::with_capacity(4096);
        let mut engine = AudioEngine::default();
        b.iter(|| {
            producer.push(black_box(&block));
            engine.drain(&mut consumer);
            engine.amp()
        });
    });

    group.finish();
}

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("sources/history");
    let buffer = HistoryBuffer::default();
    let mut dest = vec![0.0; buffer.capacity()];

    group.bench_function("push", |b| {
        let mut x = 0.0;
        b.iter(|| {
            x += 0.01;
            buffer.push(black_box(x));
        });
    });

    group.throughput(Throughput::Elements(dest.len() as u64));
    group.bench_function("copy_into", |b| {
        b.iter(|| {
            buffer.copy_into(black_box(&mut dest));
            dest[0]
        });
    });

    group.finish();
}

// ============================================================================
// Registry Benchmarks
// ============================================================================

fn bench_registry_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry/tick");

    for rate in CONTROL_RATES {
        let block = test_block((SAMPLE_RATE / rate).round() as usize, 512);
        let name = format!("{}Hz", rate as u32);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("audio", &name), &rate, |b, &rate| {
            let mut registry = seeded_registry(rate);
            b.iter(|| registry.tick(black_box(1.0 / rate), Some(block.as_slice())));
        });
        group.bench_with_input(BenchmarkId::new("idle", &name), &rate, |b, &rate| {
            let mut registry = seeded_registry(rate);
            b.iter(|| registry.tick(black_box(1.0 / rate), None));
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry/snapshot");
    let mut registry = seeded_registry(60.0);
    registry.tick(1.0 / 60.0, None);

    group.bench_function("snapshot_into", |b| {
        let mut snapshot = registry.snapshot();
        b.iter(|| {
            registry.snapshot_into(black_box(&mut snapshot));
        });
    });

    group.finish();
}

// ============================================================================
// Evaluation Benchmarks
// ============================================================================

fn bench_chain_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate/chain_length");
    let mut registry = seeded_registry(60.0);
    registry.tick(0.37, Some(test_block(735, 256).as_slice()));

    for len in CHAIN_LENGTHS {
        let param = chain(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &param, |b, param| {
            b.iter(|| param.evaluate(black_box(&registry)));
        });
    }

    group.finish();
}

/// Full control tick: advance, publish, and evaluate an instrument
fn bench_control_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate/control_frame");
    let block = test_block(735, 512);

    for count in PARAMETER_COUNTS {
        let inst = instrument(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("parameters", count), &inst, |b, inst| {
            let mut registry = seeded_registry(60.0);
            b.iter(|| {
                registry.tick(1.0 / 60.0, Some(block.as_slice()));
                let mut sum = 0.0;
                inst.evaluate_each(&registry, |_, v| sum += v);
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_knob(c: &mut Criterion) {
    let config = KnobConfig::bipolar();
    c.bench_function("knob/compute_new_value", |b| {
        let mut step = KnobStep {
            value: 0.0,
            smoothed_velocity: 0.0,
        };
        b.iter(|| {
            step = compute_new_value(
                black_box(-3.0),
                black_box(0.016),
                step.value,
                step.smoothed_velocity,
                &config,
            );
            if step.value >= 1.0 {
                step.value = -1.0;
            }
            step.value
        });
    });
}

criterion_group!(
    source_benches,
    bench_audio_follower,
    bench_audio_queue,
    bench_history,
);

criterion_group!(registry_benches, bench_registry_tick, bench_snapshot,);

criterion_group!(
    evaluate_benches,
    bench_chain_length,
    bench_control_frame,
    bench_knob,
);

criterion_main!(source_benches, registry_benches, evaluate_benches);
