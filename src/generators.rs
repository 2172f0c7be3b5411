//! Free-running Signal Generators
//!
//! Low-frequency oscillators and random sources advanced once per control
//! tick by elapsed seconds. Each exposes a value and a phase in [0, 1) that
//! modulators can reshape.

use crate::clock::wrap_phase;
use crate::config::{LfoConfig, RandomConfig, RandomMode};
use crate::modulator::Waveform;
use crate::rng::XorShift;

/// Low-Frequency Oscillator with a period in seconds
#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f64,
    period_seconds: f64,
    waveform: Waveform,
}

impl Lfo {
    pub fn new(period_seconds: f64, waveform: Waveform) -> Self {
        Self {
            phase: 0.0,
            period_seconds: period_seconds.max(f64::MIN_POSITIVE),
            waveform,
        }
    }

    pub fn from_config(config: &LfoConfig) -> Self {
        Self::new(config.period_seconds, config.waveform)
    }

    pub fn advance(&mut self, delta_seconds: f64) {
        if delta_seconds.is_finite() && delta_seconds > 0.0 {
            self.phase = wrap_phase(self.phase + delta_seconds / self.period_seconds);
        }
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Bipolar output of the configured waveform
    pub fn value(&self) -> f64 {
        self.waveform.shape(self.phase, 0.0)
    }

    pub fn period_seconds(&self) -> f64 {
        self.period_seconds
    }

    pub fn set_period(&mut self, period_seconds: f64) {
        self.period_seconds = period_seconds.max(f64::MIN_POSITIVE);
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Sample-and-hold or random-walk source with linear glide.
///
/// A new target is drawn every `interval` seconds and the output travels
/// linearly from where it was to the target over `glide` seconds. Output stays
/// within [0, 1].
#[derive(Debug, Clone)]
pub struct RandomSource {
    mode: RandomMode,
    interval: f64,
    glide: f64,
    elapsed: f64,
    since_draw: f64,
    start: f64,
    target: f64,
    value: f64,
    rng: XorShift,
}

impl RandomSource {
    pub fn new(mode: RandomMode, interval: f64, glide: f64, rng: XorShift) -> Self {
        let mut source = Self {
            mode,
            interval: interval.max(f64::MIN_POSITIVE),
            glide: glide.max(0.0),
            elapsed: 0.0,
            since_draw: 0.0,
            start: 0.5,
            target: 0.5,
            value: 0.5,
            rng,
        };
        // Start from a drawn value rather than a fixed midpoint
        let first = source.draw();
        source.start = first;
        source.target = first;
        source.value = first;
        source
    }

    pub fn from_config(config: &RandomConfig, rng: XorShift) -> Self {
        Self::new(config.mode, config.interval_seconds, config.glide_seconds, rng)
    }

    fn draw(&mut self) -> f64 {
        match self.mode {
            RandomMode::SampleAndHold => self.rng.next_f64(),
            RandomMode::RandomWalk { step } => {
                (self.target + step * self.rng.next_f64_bipolar()).clamp(0.0, 1.0)
            }
        }
    }

    pub fn advance(&mut self, delta_seconds: f64) {
        if !(delta_seconds.is_finite() && delta_seconds > 0.0) {
            return;
        }

        self.elapsed += delta_seconds;
        self.since_draw += delta_seconds;

        if self.elapsed >= self.interval {
            // One draw however many intervals were skipped
            self.elapsed %= self.interval;
            self.start = self.value;
            self.target = self.draw();
            self.since_draw = self.elapsed;
        }

        self.value = if self.glide <= 0.0 || self.since_draw >= self.glide {
            self.target
        } else {
            let t = self.since_draw / self.glide;
            self.start + (self.target - self.start) * t
        };
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Progress through the current hold interval
    pub fn phase(&self) -> f64 {
        wrap_phase(self.elapsed / self.interval)
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}
