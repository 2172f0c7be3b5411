//! Modulators and Modulatable Parameters
//!
//! A [`ModulatableParameter`] is a base value followed by an ordered chain of
//! [`Modulator`]s. Each modulator taps one named signal, shapes it through a
//! waveform and folds it into a running accumulator. The chain behaves like a
//! signal path: modulators apply in list order, so mixing `Add` and
//! `Multiply` makes the order significant.
//!
//! Both types are immutable value objects. Editing produces a new snapshot,
//! which keeps an editor thread and the control thread from racing.

use crate::clock::{clamp_subdivision, wrap_phase};
use crate::registry::{SignalClass, SignalSource};
use core::f64::consts::TAU;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Shape applied to a phase in [0, 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Square,
}

impl Waveform {
    /// Shape `phase` into [-1, 1].
    ///
    /// Triangle rises from -1 at phase 0 to +1 at phase 0.5; a negative
    /// `slope` selects the descending variant. Sine and square ignore `slope`.
    #[inline]
    pub fn shape(self, phase: f64, slope: f64) -> f64 {
        match self {
            Waveform::Sine => libm::sin(TAU * phase),
            Waveform::Triangle => {
                let tri = 1.0 - 4.0 * (phase - 0.5).abs();
                if slope < 0.0 {
                    -tri
                } else {
                    tri
                }
            }
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// How a modulator folds its contribution into the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `acc + contribution`
    #[default]
    Add,
    /// `acc * (1 + contribution)`
    Multiply,
}

impl Operator {
    #[inline]
    pub fn apply(self, acc: f64, contribution: f64) -> f64 {
        match self {
            Operator::Add => acc + contribution,
            Operator::Multiply => acc * (1.0 + contribution),
        }
    }
}

/// One weighted, waveform-shaped tap on a named signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modulator {
    /// Signal id in the registry
    pub source_id: String,
    #[serde(default)]
    pub waveform: Waveform,
    #[serde(default)]
    pub operator: Operator,
    /// Depth; the sign sets the direction
    pub weight: f64,
    /// Added to the source phase, in [0, 1)
    #[serde(default)]
    pub phase_offset: f64,
    /// Cycle length in beats for beat-derived sources
    #[serde(default = "default_subdivision")]
    pub subdivision: f64,
    /// Sign selects the triangle direction
    #[serde(default)]
    pub slope: f64,
}

fn default_subdivision() -> f64 {
    1.0
}

impl Modulator {
    /// Sine, additive, full weight, one cycle per beat
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            waveform: Waveform::Sine,
            operator: Operator::Add,
            weight: 1.0,
            phase_offset: 0.0,
            subdivision: default_subdivision(),
            slope: 0.0,
        }
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_phase_offset(mut self, phase_offset: f64) -> Self {
        self.phase_offset = wrap_phase(phase_offset);
        self
    }

    /// Cycle length in beats, clamped to at least 1/64 beat
    pub fn with_subdivision(mut self, subdivision: f64) -> Self {
        let clamped = clamp_subdivision(subdivision);
        if clamped != subdivision {
            debug!(
                source = %self.source_id,
                requested = subdivision,
                applied = clamped,
                "subdivision clamped"
            );
        }
        self.subdivision = clamped;
        self
    }

    pub fn with_slope(mut self, slope: f64) -> Self {
        self.slope = slope;
        self
    }

    /// Contribution of this modulator for the current tick.
    ///
    /// Beat sources are shaped at the modulator's subdivision and oscillators
    /// at their own phase. Random sources map their [0, 1] value onto
    /// [-1, 1]; envelopes and raw values pass through. All are scaled by
    /// `weight`. A source that is not registered contributes 0.0.
    pub fn contribution<S: SignalSource + ?Sized>(&self, signals: &S) -> f64 {
        let Some(reading) = signals.reading(&self.source_id) else {
            return 0.0;
        };

        let phase = match reading.class {
            SignalClass::Beat => {
                let beats = signals.total_beats() / clamp_subdivision(self.subdivision);
                wrap_phase(beats + self.phase_offset)
            }
            SignalClass::Oscillator => wrap_phase(reading.phase + self.phase_offset),
            SignalClass::Random => return (2.0 * reading.value - 1.0) * self.weight,
            // Unipolar followers and raw values are used as-is
            SignalClass::Envelope | SignalClass::Raw => return reading.value * self.weight,
        };

        self.waveform.shape(phase, self.slope) * self.weight
    }
}

/// Base value plus an ordered modulator chain
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulatableParameter {
    pub base_value: f64,
    #[serde(default)]
    pub modulators: Vec<Modulator>,
}

impl ModulatableParameter {
    pub fn new(base_value: f64) -> Self {
        Self {
            base_value,
            modulators: Vec::new(),
        }
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    pub fn modulators(&self) -> &[Modulator] {
        &self.modulators
    }

    /// Evaluate the chain against this tick's signals.
    ///
    /// Seeds the accumulator with the base value and applies each modulator in
    /// order. No clamping is applied. Pure: the same inputs give the same
    /// result.
    pub fn evaluate<S: SignalSource + ?Sized>(&self, signals: &S) -> f64 {
        self.modulators.iter().fold(self.base_value, |acc, m| {
            m.operator.apply(acc, m.contribution(signals))
        })
    }

    pub fn with_base_value(&self, base_value: f64) -> Self {
        Self {
            base_value,
            modulators: self.modulators.clone(),
        }
    }

    /// Append a modulator to the end of the chain
    pub fn with_modulator(&self, modulator: Modulator) -> Self {
        let mut next = self.clone();
        next.modulators.push(modulator);
        next
    }

    /// Remove the modulator at `index`; out of range leaves the chain as is
    pub fn without_modulator(&self, index: usize) -> Self {
        let mut next = self.clone();
        if index < next.modulators.len() {
            next.modulators.remove(index);
        }
        next
    }

    /// Replace the modulator at `index`; out of range leaves the chain as is
    pub fn with_modulator_replaced(&self, index: usize, modulator: Modulator) -> Self {
        let mut next = self.clone();
        if let Some(slot) = next.modulators.get_mut(index) {
            *slot = modulator;
        }
        next
    }

    /// Move the modulator at `from` so it ends up at `to`
    pub fn with_modulator_moved(&self, from: usize, to: usize) -> Self {
        let mut next = self.clone();
        let len = next.modulators.len();
        if from < len && to < len && from != to {
            let m = next.modulators.remove(from);
            next.modulators.insert(to, m);
        }
        next
    }
}
