//! Audio Envelope and Onset Follower
//!
//! Turns blocks of mono PCM into control signals once per tick:
//! - `amp`: RMS envelope with separate attack and release
//! - `onset`: rectified rise in block RMS since the previous block
//! - `bassFlux`: the same rise measured on a low-passed bass band
//! - `accent`: a percussive pulse raised by strong onsets, decaying between them
//!
//! Capture runs on another thread. It pushes samples into an [`AudioProducer`];
//! the control thread drains the matching [`AudioConsumer`] without blocking.
//! When nothing arrives the follower idles and its envelopes decay.

use crate::config::AudioConfig;
use core::f64::consts::TAU;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::trace;

/// Levels below this are flushed to zero so decays settle
const SILENCE_FLOOR: f64 = 1e-12;

/// Convert a time constant to a per-tick smoothing coefficient.
///
/// `exp(-1 / (rate_hz * seconds))`; a zero time gives 0.0 (no smoothing).
pub fn smoothing_coefficient(time_ms: f64, rate_hz: f64) -> f64 {
    let seconds = time_ms / 1000.0;
    if seconds <= 0.0 || rate_hz <= 0.0 {
        0.0
    } else {
        libm::exp(-1.0 / (rate_hz * seconds))
    }
}

#[inline]
fn flush(value: f64) -> f64 {
    if value.abs() < SILENCE_FLOOR {
        0.0
    } else {
        value
    }
}

/// Snapshot of the follower outputs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioLevels {
    pub amp: f64,
    pub bass_flux: f64,
    pub onset: f64,
    pub accent: f64,
}

/// Envelope follower and onset detector
#[derive(Debug, Clone)]
pub struct AudioEngine {
    attack: f64,
    release: f64,
    accent_decay: f64,
    onset_floor: f64,
    accent_gain: f64,
    bass_coef: f64,
    max_block_len: usize,

    envelope: f64,
    prev_rms: f64,
    prev_bass: f64,
    bass_state: f64,
    onset: f64,
    bass_flux: f64,
    accent: f64,

    scratch: Vec<f32>,
}

impl AudioEngine {
    /// Build a follower whose time constants are expressed per control tick
    pub fn new(config: &AudioConfig, control_rate_hz: f64) -> Self {
        let max_block_len = config.max_block_len.max(1);
        Self {
            attack: smoothing_coefficient(config.attack_ms, control_rate_hz),
            release: smoothing_coefficient(config.release_ms, control_rate_hz),
            accent_decay: smoothing_coefficient(config.accent_decay_ms, control_rate_hz),
            onset_floor: config.onset_floor,
            accent_gain: config.accent_gain,
            bass_coef: libm::exp(-TAU * config.bass_cutoff_hz.max(0.0) / config.sample_rate),
            max_block_len,
            envelope: 0.0,
            prev_rms: 0.0,
            prev_bass: 0.0,
            bass_state: 0.0,
            onset: 0.0,
            bass_flux: 0.0,
            accent: 0.0,
            scratch: vec![0.0; max_block_len],
        }
    }

    /// Consume one block of mono samples.
    ///
    /// Empty blocks and blocks containing non-finite samples count as an idle
    /// tick. Blocks longer than the configured maximum keep their tail.
    pub fn process(&mut self, samples: &[f32]) {
        if samples.is_empty() || samples.iter().any(|s| !s.is_finite()) {
            trace!(len = samples.len(), "audio block ignored");
            self.idle();
            return;
        }

        let block = if samples.len() > self.max_block_len {
            &samples[samples.len() - self.max_block_len..]
        } else {
            samples
        };

        let mut sum_sq = 0.0;
        let mut bass_sq = 0.0;
        for &sample in block {
            let x = sample as f64;
            sum_sq += x * x;
            self.bass_state = (1.0 - self.bass_coef) * x + self.bass_coef * self.bass_state;
            bass_sq += self.bass_state * self.bass_state;
        }
        self.bass_state = flush(self.bass_state);

        let n = block.len() as f64;
        let rms = libm::sqrt(sum_sq / n);
        let bass = libm::sqrt(bass_sq / n);

        let coef = if rms > self.envelope {
            self.attack
        } else {
            self.release
        };
        self.envelope = flush(coef * self.envelope + (1.0 - coef) * rms);

        self.onset = (rms - self.prev_rms).max(0.0);
        self.bass_flux = (bass - self.prev_bass).max(0.0);
        self.prev_rms = rms;
        self.prev_bass = bass;

        self.update_accent();
    }

    /// Advance one tick without audio: envelopes decay toward zero
    pub fn idle(&mut self) {
        self.envelope = flush(self.envelope * self.release);
        self.prev_rms = flush(self.prev_rms * self.release);
        self.prev_bass = flush(self.prev_bass * self.release);
        self.onset = 0.0;
        self.bass_flux = 0.0;
        self.update_accent();
    }

    fn update_accent(&mut self) {
        self.accent = flush(self.accent * self.accent_decay);
        if self.onset > self.onset_floor {
            self.accent = self.accent.max((self.onset * self.accent_gain).min(1.0));
        }
    }

    /// Drain whatever the capture thread has queued and process it as one
    /// block, or idle when the queue is empty. Never blocks or allocates.
    pub fn drain(&mut self, input: &mut AudioConsumer) {
        let available = input.inner.occupied_len();
        if available == 0 {
            self.idle();
            return;
        }

        // Keep only the most recent samples that fit the scratch buffer
        let excess = available.saturating_sub(self.scratch.len());
        if excess > 0 {
            input.inner.skip(excess);
        }

        let mut scratch = core::mem::take(&mut self.scratch);
        let read = input.inner.pop_slice(&mut scratch);
        self.process(&scratch[..read]);
        self.scratch = scratch;
    }

    pub fn levels(&self) -> AudioLevels {
        AudioLevels {
            amp: self.envelope,
            bass_flux: self.bass_flux,
            onset: self.onset,
            accent: self.accent,
        }
    }

    pub fn amp(&self) -> f64 {
        self.envelope
    }

    pub fn accent(&self) -> f64 {
        self.accent
    }

    /// Return to silence, keeping the configuration
    pub fn reset(&mut self) {
        self.envelope = 0.0;
        self.prev_rms = 0.0;
        self.prev_bass = 0.0;
        self.bass_state = 0.0;
        self.onset = 0.0;
        self.bass_flux = 0.0;
        self.accent = 0.0;
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new(&AudioConfig::default(), 60.0)
    }
}

/// Lock-free sample queue between a capture callback and the control thread
pub struct AudioInput;

impl AudioInput {
    /// Create a queue holding up to `capacity` samples
    pub fn with_capacity(capacity: usize) -> (AudioProducer, AudioConsumer) {
        let (prod, cons) = HeapRb::<f32>::new(capacity.max(1)).split();
        (AudioProducer { inner: prod }, AudioConsumer { inner: cons })
    }
}

/// Capture-side handle
pub struct AudioProducer {
    inner: HeapProd<f32>,
}

impl AudioProducer {
    /// Queue samples; returns how many fit. Samples that do not fit are dropped.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }

    /// Free space in samples
    pub fn vacant(&self) -> usize {
        self.inner.vacant_len()
    }
}

/// Control-side handle
pub struct AudioConsumer {
    inner: HeapCons<f32>,
}

impl AudioConsumer {
    /// Samples waiting to be drained
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn loud_block() -> Vec<f32> {
        (0..512).map(|i| if i % 2 == 0 { 0.8 } else { -0.8 }).collect()
    }

    #[test]
    fn test_coefficient_formula() {
        let c = smoothing_coefficient(250.0, 60.0);
        assert_abs_diff_eq!(c, (-1.0_f64 / 15.0).exp(), epsilon = 1e-12);
        assert_eq!(smoothing_coefficient(0.0, 60.0), 0.0);
    }

    #[test]
    fn test_attack_rises_toward_rms() {
        let mut engine = AudioEngine::default();
        engine.process(&loud_block());
        let first = engine.amp();
        assert!(first > 0.0 && first < 0.8);

        for _ in 0..20 {
            engine.process(&loud_block());
        }
        assert_abs_diff_eq!(engine.amp(), 0.8, epsilon = 1e-3);
    }

    #[test]
    fn test_release_decreases_monotonically_on_silence() {
        let mut engine = AudioEngine::default();
        for _ in 0..10 {
            engine.process(&loud_block());
        }

        let silence = vec![0.0_f32; 512];
        let mut previous = engine.amp();
        for _ in 0..200 {
            engine.process(&silence);
            let amp = engine.amp();
            assert!(amp <= previous, "amp rose from {previous} to {amp}");
            previous = amp;
        }
        assert!(previous < 0.01);
    }

    #[test]
    fn test_onset_triggers_accent_which_decays() {
        let mut engine = AudioEngine::default();
        engine.process(&vec![0.0; 256]);
        assert_eq!(engine.accent(), 0.0);

        engine.process(&loud_block());
        let levels = engine.levels();
        assert_abs_diff_eq!(levels.onset, 0.8, epsilon = 1e-6);
        assert_eq!(levels.accent, 1.0);

        // Sustained level: no new onset, accent decays
        engine.process(&loud_block());
        assert_eq!(engine.levels().onset, 0.0);
        assert!(engine.accent() < 1.0);
    }

    #[test]
    fn test_bass_flux_tracks_low_frequencies() {
        let mut engine = AudioEngine::default();
        let sr = 44100.0;
        let low: Vec<f32> = (0..2048)
            .map(|i| (TAU * 60.0 * i as f64 / sr).sin() as f32 * 0.8)
            .collect();
        let high: Vec<f32> = (0..2048)
            .map(|i| (TAU * 8000.0 * i as f64 / sr).sin() as f32 * 0.8)
            .collect();

        let mut low_engine = engine.clone();
        low_engine.process(&low);
        engine.process(&high);

        assert!(low_engine.levels().bass_flux > 4.0 * engine.levels().bass_flux);
    }

    #[test]
    fn test_oversized_block_keeps_tail() {
        let config = AudioConfig {
            max_block_len: 4,
            ..AudioConfig::default()
        };

        // Loud head beyond the limit is dropped; only the silent tail counts
        let mut engine = AudioEngine::new(&config, 60.0);
        let mut head_loud = vec![1.0_f32; 8];
        head_loud.extend_from_slice(&[0.0; 4]);
        engine.process(&head_loud);
        assert_eq!(engine.amp(), 0.0);
        assert_eq!(engine.levels().onset, 0.0);

        let mut engine = AudioEngine::new(&config, 60.0);
        let mut tail_loud = vec![0.0_f32; 8];
        tail_loud.extend_from_slice(&[0.5; 4]);
        engine.process(&tail_loud);
        assert_abs_diff_eq!(engine.levels().onset, 0.5, epsilon = 1e-12);
        assert!(engine.amp() > 0.0);
    }

    #[test]
    fn test_onset_at_or_below_floor_leaves_accent() {
        let config = AudioConfig {
            onset_floor: 0.5,
            ..AudioConfig::default()
        };

        // Onset exactly at the floor
        let mut engine = AudioEngine::new(&config, 60.0);
        engine.process(&[0.5; 256]);
        assert_abs_diff_eq!(engine.levels().onset, 0.5, epsilon = 1e-12);
        assert_eq!(engine.accent(), 0.0);

        // Onset below the default floor
        let mut engine = AudioEngine::default();
        engine.process(&[0.01; 256]);
        assert!(engine.levels().onset > 0.0);
        assert_eq!(engine.accent(), 0.0);

        // Just above the floor does raise it
        let mut engine = AudioEngine::new(&config, 60.0);
        engine.process(&[0.6; 256]);
        assert!(engine.accent() > 0.0);
    }

    #[test]
    fn test_malformed_block_idles() {
        let mut engine = AudioEngine::default();
        engine.process(&loud_block());
        let before = engine.amp();

        engine.process(&[0.5, f32::NAN, 0.5]);
        assert!(engine.amp() < before);
        assert_eq!(engine.levels().onset, 0.0);

        let after_nan = engine.amp();
        engine.process(&[]);
        assert!(engine.amp() < after_nan);
    }

    #[test]
    fn test_drain_uses_queue_and_idles_when_empty() {
        let (mut producer, mut consumer) = AudioInput::with_capacity(4096);
        let mut engine = AudioEngine::default();

        assert_eq!(producer.push(&loud_block()), 512);
        assert_eq!(consumer.available(), 512);
        engine.drain(&mut consumer);
        assert_eq!(consumer.available(), 0);
        let amp = engine.amp();
        assert!(amp > 0.0);

        engine.drain(&mut consumer);
        assert!(engine.amp() < amp);
    }

    #[test]
    fn test_drain_keeps_most_recent_samples() {
        let config = AudioConfig {
            max_block_len: 4,
            ..AudioConfig::default()
        };
        let mut engine = AudioEngine::new(&config, 60.0);
        let (mut producer, mut consumer) = AudioInput::with_capacity(64);

        // Old loud samples followed by silence; only the silent tail is read
        producer.push(&[1.0; 8]);
        producer.push(&[0.0; 4]);
        engine.drain(&mut consumer);
        assert_eq!(engine.amp(), 0.0);
        assert_eq!(consumer.available(), 0);
    }

    #[test]
    fn test_full_queue_drops_overflow() {
        let (mut producer, _consumer) = AudioInput::with_capacity(8);
        assert_eq!(producer.push(&[0.1; 6]), 6);
        assert_eq!(producer.vacant(), 2);
        assert_eq!(producer.push(&[0.1; 6]), 2);
    }
}
