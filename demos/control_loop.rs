//! Control Loop Example
//!
//! A complete modulation session: a capture thread feeds synthetic audio
//! through the lock-free queue, an editor thread rewrites a parameter chain,
//! and the control loop ticks the registry at 60 Hz and evaluates a small
//! instrument each frame.
//!
//! Run with: cargo run --example control_loop

use cvmod::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const CONTROL_RATE: f64 = 60.0;
const SAMPLE_RATE: f64 = 44100.0;
const FRAMES: usize = 240;

fn main() {
    tracing_subscriber::fmt::init();

    let config = EngineConfig::default().with_seed(2024);
    let mut registry = SignalRegistry::new(&config).unwrap();
    registry.set_tempo(128.0);
    registry.register_external("mouseX").unwrap();

    // Capture side: kick on every beat at 128 bpm over a quiet hiss
    let (mut producer, mut consumer) = AudioInput::with_capacity(16384);
    let running = Arc::new(AtomicBool::new(true));
    let capture = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let block_len = (SAMPLE_RATE / CONTROL_RATE) as usize;
            let beat_len = (SAMPLE_RATE * 60.0 / 128.0) as usize;
            let mut rng = XorShift::from_seed(1);
            let mut t = 0usize;
            let mut block = vec![0.0f32; block_len];
            while running.load(Ordering::Relaxed) {
                for s in block.iter_mut() {
                    let since_kick = (t % beat_len) as f32 / SAMPLE_RATE as f32;
                    let kick = (-since_kick * 30.0).exp()
                        * (std::f32::consts::TAU * 55.0 * since_kick).sin();
                    *s = 0.8 * kick + 0.02 * rng.next_f64_bipolar() as f32;
                    t += 1;
                }
                producer.push(&block);
                thread::sleep(Duration::from_secs_f64(1.0 / CONTROL_RATE));
            }
        })
    };

    // Instrument: hue drifts with an LFO, size pumps with the kick
    let mut mandala = Instrument::new("mandala")
        .with_parameter(
            "hue",
            ModulatableParameter::new(0.5)
                .with_modulator(Modulator::new("lfo1").with_weight(0.25))
                .with_modulator(Modulator::new("randomWalk").with_weight(0.05)),
        )
        .with_parameter(
            "size",
            ModulatableParameter::new(0.6).with_modulator(
                Modulator::new("accent")
                    .with_operator(Operator::Multiply)
                    .with_weight(0.5),
            ),
        )
        .with_parameter(
            "spin",
            ModulatableParameter::new(0.0).with_modulator(
                Modulator::new("beatPhase")
                    .with_waveform(Waveform::Triangle)
                    .with_subdivision(subdivision::BAR),
            ),
        );

    // Editor side: the patch editor republishes the twist chain mid-session
    let twist = Arc::new(SharedParameter::new(ModulatableParameter::new(0.2)));
    let editor = {
        let twist = Arc::clone(&twist);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(1500));
            twist.add_modulator(
                Modulator::new("bassFlux")
                    .with_weight(2.0)
                    .with_operator(Operator::Add),
            );
        })
    };

    // UI side: a slow upward drag on the size knob
    let mut knob = KnobGesture::new(KnobConfig::unipolar());
    if let Some(size) = mandala.get("size") {
        knob.begin(size.base_value());
    }

    let frame = Duration::from_secs_f64(1.0 / CONTROL_RATE);
    let mut last = Instant::now();
    for i in 0..FRAMES {
        thread::sleep(frame);
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;

        registry.set_external("mouseX", (i as f64 / FRAMES as f64).fract());
        registry.tick_from(dt, &mut consumer);

        if knob.is_active() {
            let value = knob.drag(-2.0, dt);
            if let Some(size) = mandala.get("size") {
                let edited = size.with_base_value(value);
                mandala.set("size", edited);
            }
            if i == FRAMES / 2 {
                knob.release();
            }
        }

        if i % 15 == 0 {
            let mut line = format!(
                "t={:5.2}s beats={:6.2}",
                i as f64 / CONTROL_RATE,
                registry.clock().total_beats()
            );
            mandala.evaluate_each(&registry, |slot, value| {
                line.push_str(&format!(" {}={:+.3}", slot, value));
            });
            line.push_str(&format!(
                " twist={:+.3} amp={:.3} accent={:.3}",
                twist.evaluate(&registry),
                registry.get(signal_names::AMP),
                registry.get(signal_names::ACCENT),
            ));
            println!("{}", line);
        }
    }

    running.store(false, Ordering::Relaxed);
    capture.join().unwrap();
    editor.join().unwrap();

    // Scope view of the accent envelope
    let mut scope = vec![0.0; 32];
    registry.copy_history(signal_names::ACCENT, &mut scope);
    let bars: String = scope
        .iter()
        .map(|v| match (v * 4.0) as usize {
            0 => '.',
            1 => ':',
            2 => '|',
            _ => '#',
        })
        .collect();
    println!("accent history: {}", bars);

    println!("{}", mandala.to_json().unwrap());
}
