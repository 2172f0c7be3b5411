//! Beat Clock
//!
//! Integrates elapsed time and tempo into a monotonically increasing beat
//! count. Phases at any subdivision are derived from that integral, so a tempo
//! change only alters the rate from then on and never makes the phase jump.

use tracing::debug;

/// Lowest accepted tempo. Anything below (including NaN) is clamped here.
pub const MIN_BPM: f64 = 1.0;

/// Highest accepted tempo
pub const MAX_BPM: f64 = 999.0;

/// Tempo of a freshly created clock
pub const DEFAULT_BPM: f64 = 120.0;

/// Shortest subdivision, in beats
pub const MIN_SUBDIVISION: f64 = 1.0 / 64.0;

/// Beat-relative rates, measured in beats per cycle (smaller = faster).
pub mod subdivision {
    pub const SIXTEENTH: f64 = 0.25;
    pub const EIGHTH: f64 = 0.5;
    pub const BEAT: f64 = 1.0;
    pub const HALF_BAR: f64 = 2.0;
    pub const BAR: f64 = 4.0;
    pub const TWO_BARS: f64 = 8.0;
    pub const FOUR_BARS: f64 = 16.0;

    /// The musical set offered for selection, fastest first
    pub const STANDARD: [f64; 7] = [SIXTEENTH, EIGHTH, BEAT, HALF_BAR, BAR, TWO_BARS, FOUR_BARS];

    /// Index of the standard subdivision closest to `value` (log distance)
    pub fn nearest_index(value: f64) -> usize {
        let target = libm::log2(value.max(super::MIN_SUBDIVISION));
        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (i, s) in STANDARD.iter().enumerate() {
            let dist = (libm::log2(*s) - target).abs();
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best
    }

    /// Snap to the closest standard subdivision
    pub fn nearest_standard(value: f64) -> f64 {
        STANDARD[nearest_index(value)]
    }

    /// Move `steps` positions through the standard set, saturating at the ends
    pub fn step_standard(value: f64, steps: i32) -> f64 {
        let idx = nearest_index(value) as i64 + steps as i64;
        STANDARD[idx.clamp(0, STANDARD.len() as i64 - 1) as usize]
    }
}

/// Wrap a phase into [0, 1)
#[inline]
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase - libm::floor(phase);
    // floor rounding can leave exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Tempo-synchronised beat counter
#[derive(Debug, Clone)]
pub struct BeatClock {
    bpm: f64,
    total_beats: f64,
}

impl BeatClock {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: Self::clamp_bpm(bpm),
            total_beats: 0.0,
        }
    }

    fn clamp_bpm(bpm: f64) -> f64 {
        if bpm.is_nan() {
            MIN_BPM
        } else {
            bpm.clamp(MIN_BPM, MAX_BPM)
        }
    }

    /// Current tempo in beats per minute
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set the tempo without touching the accumulated beat count
    pub fn set_tempo(&mut self, bpm: f64) {
        let clamped = Self::clamp_bpm(bpm);
        if clamped != bpm {
            debug!(requested = bpm, applied = clamped, "tempo clamped");
        }
        self.bpm = clamped;
    }

    /// Integrate `delta_seconds` at the current tempo.
    ///
    /// Negative or non-finite deltas are ignored.
    pub fn advance(&mut self, delta_seconds: f64) {
        if delta_seconds.is_finite() && delta_seconds > 0.0 {
            self.total_beats += self.bpm / 60.0 * delta_seconds;
        }
    }

    /// Beats elapsed since creation or the last reset
    pub fn total_beats(&self) -> f64 {
        self.total_beats
    }

    /// Phase in [0, 1) of a cycle lasting `subdivision` beats
    pub fn phase_at_subdivision(&self, subdivision: f64) -> f64 {
        wrap_phase(self.total_beats / clamp_subdivision(subdivision))
    }

    /// Phase within the current beat
    pub fn beat_phase(&self) -> f64 {
        self.phase_at_subdivision(subdivision::BEAT)
    }

    /// Phase within the current 4-beat bar
    pub fn bar_phase(&self) -> f64 {
        self.phase_at_subdivision(subdivision::BAR)
    }

    /// Restart at beat zero, keeping the tempo
    pub fn reset(&mut self) {
        self.total_beats = 0.0;
    }
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

/// Clamp a subdivision to a usable positive length in beats. Called on every
/// evaluation and never logs.
pub(crate) fn clamp_subdivision(subdivision: f64) -> f64 {
    if subdivision.is_finite() && subdivision >= MIN_SUBDIVISION {
        subdivision
    } else if subdivision.is_nan() || subdivision < MIN_SUBDIVISION {
        MIN_SUBDIVISION
    } else {
        // +inf: a cycle that never advances
        f64::MAX
    }
}
