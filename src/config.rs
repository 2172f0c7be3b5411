//! Engine Configuration
//!
//! Plain serde data describing a modulation session: control rate, history
//! length, audio follower timing, and the set of LFOs and random sources to
//! create. Validated once when a registry is built.

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::modulator::Waveform;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Names of the signals every registry publishes
pub mod signal_names {
    pub const BEAT_PHASE: &str = "beatPhase";
    pub const BAR_PHASE: &str = "barPhase";
    pub const BPM: &str = "bpm";
    pub const AMP: &str = "amp";
    pub const BASS_FLUX: &str = "bassFlux";
    pub const ONSET: &str = "onset";
    pub const ACCENT: &str = "accent";

    pub const BUILT_IN: [&str; 7] = [BEAT_PHASE, BAR_PHASE, BPM, AMP, BASS_FLUX, ONSET, ACCENT];
}

/// Error type for configuration problems
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// History capacity of zero
    InvalidCapacity,
    /// Control rate not a positive finite number
    InvalidControlRate(f64),
    /// LFO period not a positive finite number
    InvalidPeriod { name: String },
    /// Random source interval not a positive finite number
    InvalidInterval { name: String },
    /// Random walk step negative or not finite
    InvalidStep { name: String },
    /// Initial tempo not a positive finite number
    InvalidTempo(f64),
    /// Negative or non-finite time constant
    InvalidTime { name: String },
    /// Two signals share a name
    DuplicateSignal(String),
    /// JSON could not be parsed
    Parse(String),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::InvalidCapacity => write!(f, "History capacity must be at least 1"),
            ConfigError::InvalidControlRate(rate) => {
                write!(f, "Invalid control rate: {} Hz", rate)
            }
            ConfigError::InvalidPeriod { name } => write!(f, "Invalid LFO period for '{}'", name),
            ConfigError::InvalidInterval { name } => {
                write!(f, "Invalid random interval for '{}'", name)
            }
            ConfigError::InvalidStep { name } => {
                write!(f, "Invalid random walk step for '{}'", name)
            }
            ConfigError::InvalidTempo(bpm) => write!(f, "Invalid initial tempo: {} bpm", bpm),
            ConfigError::InvalidTime { name } => write!(f, "Invalid time constant '{}'", name),
            ConfigError::DuplicateSignal(name) => write!(f, "Duplicate signal name: {}", name),
            ConfigError::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Timing and detection settings for the audio follower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of incoming blocks (Hz)
    pub sample_rate: f64,
    /// Envelope attack time (ms)
    pub attack_ms: f64,
    /// Envelope release time (ms)
    pub release_ms: f64,
    /// Accent decay time (ms)
    pub accent_decay_ms: f64,
    /// Onset strength needed to trigger an accent
    pub onset_floor: f64,
    /// Scale from onset strength to accent height
    pub accent_gain: f64,
    /// Low-pass cutoff for the bass band (Hz)
    pub bass_cutoff_hz: f64,
    /// Longest block processed per tick; longer blocks keep their tail
    pub max_block_len: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            attack_ms: 10.0,
            release_ms: 250.0,
            accent_decay_ms: 180.0,
            onset_floor: 0.02,
            accent_gain: 4.0,
            bass_cutoff_hz: 150.0,
            max_block_len: 8192,
        }
    }
}

/// One LFO to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LfoConfig {
    pub name: String,
    pub period_seconds: f64,
    #[serde(default)]
    pub waveform: Waveform,
}

impl LfoConfig {
    pub fn new(name: impl Into<String>, period_seconds: f64) -> Self {
        Self {
            name: name.into(),
            period_seconds,
            waveform: Waveform::Sine,
        }
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }
}

/// How a random source picks its next target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RandomMode {
    /// Uniform draw in [0, 1)
    SampleAndHold,
    /// Bounded step of at most `step` from the previous target
    RandomWalk { step: f64 },
}

/// One random source to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomConfig {
    pub name: String,
    pub mode: RandomMode,
    /// Minimum time between draws
    pub interval_seconds: f64,
    /// Time to travel to a new target (0 = jump)
    #[serde(default)]
    pub glide_seconds: f64,
}

impl RandomConfig {
    pub fn sample_and_hold(name: impl Into<String>, interval_seconds: f64) -> Self {
        Self {
            name: name.into(),
            mode: RandomMode::SampleAndHold,
            interval_seconds,
            glide_seconds: 0.0,
        }
    }

    pub fn random_walk(name: impl Into<String>, interval_seconds: f64, step: f64) -> Self {
        Self {
            name: name.into(),
            mode: RandomMode::RandomWalk { step },
            interval_seconds,
            glide_seconds: 0.0,
        }
    }

    pub fn with_glide(mut self, glide_seconds: f64) -> Self {
        self.glide_seconds = glide_seconds;
        self
    }
}

/// Complete description of a modulation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nominal control tick rate (Hz)
    pub control_rate_hz: f64,
    /// Samples of history kept per signal
    pub history_capacity: usize,
    pub initial_bpm: f64,
    /// Fixed seed for random sources; entropy when absent
    pub seed: Option<u64>,
    pub audio: AudioConfig,
    pub lfos: Vec<LfoConfig>,
    pub randoms: Vec<RandomConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control_rate_hz: 60.0,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            initial_bpm: crate::clock::DEFAULT_BPM,
            seed: None,
            audio: AudioConfig::default(),
            lfos: vec![
                LfoConfig::new("lfo1", 4.0),
                LfoConfig::new("lfo2", 8.0).with_waveform(Waveform::Triangle),
            ],
            randoms: vec![
                RandomConfig::sample_and_hold("sampleAndHold", 0.5).with_glide(0.05),
                RandomConfig::random_walk("randomWalk", 0.25, 0.1).with_glide(0.25),
            ],
        }
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl EngineConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_lfo(mut self, lfo: LfoConfig) -> Self {
        self.lfos.push(lfo);
        self
    }

    pub fn with_random(mut self, random: RandomConfig) -> Self {
        self.randoms.push(random);
        self
    }

    /// Check ranges and signal-name uniqueness
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = self.check();
        if let Err(e) = &result {
            warn!(error = %e, "engine config rejected");
        }
        result
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if !positive(self.control_rate_hz) {
            return Err(ConfigError::InvalidControlRate(self.control_rate_hz));
        }
        if !positive(self.initial_bpm) {
            return Err(ConfigError::InvalidTempo(self.initial_bpm));
        }

        let audio = &self.audio;
        for (name, value) in [
            ("attack_ms", audio.attack_ms),
            ("release_ms", audio.release_ms),
            ("accent_decay_ms", audio.accent_decay_ms),
        ] {
            if !non_negative(value) {
                return Err(ConfigError::InvalidTime { name: name.into() });
            }
        }
        if !positive(audio.sample_rate) {
            return Err(ConfigError::InvalidTime {
                name: "sample_rate".into(),
            });
        }

        let mut names: HashSet<&str> = signal_names::BUILT_IN.iter().copied().collect();

        for lfo in &self.lfos {
            if !positive(lfo.period_seconds) {
                return Err(ConfigError::InvalidPeriod {
                    name: lfo.name.clone(),
                });
            }
            if !names.insert(lfo.name.as_str()) {
                return Err(ConfigError::DuplicateSignal(lfo.name.clone()));
            }
        }

        for random in &self.randoms {
            if !positive(random.interval_seconds) {
                return Err(ConfigError::InvalidInterval {
                    name: random.name.clone(),
                });
            }
            if let RandomMode::RandomWalk { step } = random.mode {
                if !non_negative(step) {
                    return Err(ConfigError::InvalidStep {
                        name: random.name.clone(),
                    });
                }
            }
            if !non_negative(random.glide_seconds) {
                return Err(ConfigError::InvalidTime {
                    name: random.name.clone(),
                });
            }
            if !names.insert(random.name.as_str()) {
                return Err(ConfigError::DuplicateSignal(random.name.clone()));
            }
        }

        Ok(())
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
