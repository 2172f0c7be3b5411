//! Signal Registry
//!
//! The per-session context that owns every signal: the beat clock, the audio
//! follower, LFOs, random sources, and externally fed values. Once per control
//! tick the host calls [`SignalRegistry::tick`]. Every generator advances,
//! then all values are published together and appended to their histories.
//! Modulators read the registry only between ticks, so they always see one
//! consistent set of values.
//!
//! Create one registry at session start and drop it at session end. It is not
//! internally synchronised; use [`SignalRegistry::snapshot_into`] to hand
//! values to another thread, and [`SignalRegistry::history`] for scopes.

use crate::audio::{AudioConsumer, AudioEngine, AudioLevels};
use crate::clock::BeatClock;
use crate::config::{signal_names, ConfigError, EngineConfig};
use crate::generators::{Lfo, RandomSource};
use crate::history::HistoryBuffer;
use crate::rng::XorShift;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

new_key_type! {
    /// Stable handle to a registered signal
    pub struct SignalKey;
}

/// How a modulator should derive a phase from a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalClass {
    /// Derived from the beat clock; phase comes from the modulator's subdivision
    Beat,
    /// Periodic signal with its own phase (LFOs, bar phase)
    Oscillator,
    /// Sample-and-hold / random walk; value in [0, 1], phase = progress through the hold
    Random,
    /// Unipolar audio follower output, used without shaping
    Envelope,
    /// Plain value (tempo, external input), used without shaping
    Raw,
}

/// Value and phase of one signal for the current tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalReading {
    pub class: SignalClass,
    pub value: f64,
    pub phase: f64,
}

impl SignalReading {
    pub fn new(class: SignalClass, value: f64, phase: f64) -> Self {
        Self {
            class,
            value,
            phase,
        }
    }
}

/// Read access to one tick's signal values
pub trait SignalSource {
    /// Reading for `id`, or `None` if no such signal exists
    fn reading(&self, id: &str) -> Option<SignalReading>;

    /// Beat count of the tick these readings belong to
    fn total_beats(&self) -> f64;

    /// Current value, 0.0 for an unknown id
    fn value(&self, id: &str) -> f64 {
        self.reading(id).map_or(0.0, |r| r.value)
    }
}

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// A signal with this name already exists
    DuplicateSignal(String),
    /// The engine configuration was rejected
    Config(ConfigError),
}

impl core::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RegistryError::DuplicateSignal(name) => {
                write!(f, "Signal already registered: {}", name)
            }
            RegistryError::Config(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Config(e) => Some(e),
            RegistryError::DuplicateSignal(_) => None,
        }
    }
}

impl From<ConfigError> for RegistryError {
    fn from(e: ConfigError) -> Self {
        RegistryError::Config(e)
    }
}

/// Which generator writes a signal
#[derive(Debug, Clone, Copy)]
enum Driver {
    BeatPhase,
    BarPhase,
    Bpm,
    Amp,
    BassFlux,
    Onset,
    Accent,
    Lfo(usize),
    Random(usize),
    External { staged: f64 },
}

impl Driver {
    fn class(&self) -> SignalClass {
        match self {
            Driver::BeatPhase => SignalClass::Beat,
            Driver::Bpm | Driver::External { .. } => SignalClass::Raw,
            Driver::Amp | Driver::BassFlux | Driver::Onset | Driver::Accent => {
                SignalClass::Envelope
            }
            Driver::BarPhase | Driver::Lfo(_) => SignalClass::Oscillator,
            Driver::Random(_) => SignalClass::Random,
        }
    }
}

struct Signal {
    name: String,
    driver: Driver,
    value: f64,
    phase: f64,
    history: Arc<HistoryBuffer>,
}

/// Generator state a driver reads from
struct Sources<'a> {
    clock: &'a BeatClock,
    levels: AudioLevels,
    lfos: &'a [Lfo],
    randoms: &'a [RandomSource],
}

impl Sources<'_> {
    /// (value, phase) for a driver
    fn drive(&self, driver: Driver) -> (f64, f64) {
        match driver {
            Driver::BeatPhase => {
                let p = self.clock.beat_phase();
                (p, p)
            }
            Driver::BarPhase => {
                let p = self.clock.bar_phase();
                (p, p)
            }
            Driver::Bpm => (self.clock.bpm(), 0.0),
            Driver::Amp => (self.levels.amp, 0.0),
            Driver::BassFlux => (self.levels.bass_flux, 0.0),
            Driver::Onset => (self.levels.onset, 0.0),
            Driver::Accent => (self.levels.accent, 0.0),
            Driver::Lfo(i) => (self.lfos[i].value(), self.lfos[i].phase()),
            Driver::Random(i) => (self.randoms[i].value(), self.randoms[i].phase()),
            Driver::External { staged } => (staged, 0.0),
        }
    }
}

/// Session-wide map of named control signals
pub struct SignalRegistry {
    signals: SlotMap<SignalKey, Signal>,
    by_name: HashMap<String, SignalKey>,
    order: Vec<SignalKey>,

    clock: BeatClock,
    audio: AudioEngine,
    lfos: Vec<Lfo>,
    randoms: Vec<RandomSource>,

    history_capacity: usize,
    total_beats: f64,
    ticks: u64,
}

impl SignalRegistry {
    /// Validate `config` and build a registry with all configured signals
    pub fn new(config: &EngineConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &EngineConfig) -> Self {
        let randoms = config
            .randoms
            .iter()
            .enumerate()
            .map(|(i, rc)| {
                let rng = match config.seed {
                    Some(seed) => XorShift::for_stream(seed, i),
                    None => XorShift::from_entropy(),
                };
                RandomSource::from_config(rc, rng)
            })
            .collect();

        let mut registry = Self {
            signals: SlotMap::with_key(),
            by_name: HashMap::new(),
            order: Vec::new(),
            clock: BeatClock::new(config.initial_bpm),
            audio: AudioEngine::new(&config.audio, config.control_rate_hz),
            lfos: config.lfos.iter().map(Lfo::from_config).collect(),
            randoms,
            history_capacity: config.history_capacity,
            total_beats: 0.0,
            ticks: 0,
        };

        let built_in = [
            (signal_names::BEAT_PHASE, Driver::BeatPhase),
            (signal_names::BAR_PHASE, Driver::BarPhase),
            (signal_names::BPM, Driver::Bpm),
            (signal_names::AMP, Driver::Amp),
            (signal_names::BASS_FLUX, Driver::BassFlux),
            (signal_names::ONSET, Driver::Onset),
            (signal_names::ACCENT, Driver::Accent),
        ];
        for (name, driver) in built_in {
            registry.insert(name.to_string(), driver);
        }
        for (i, lfo) in config.lfos.iter().enumerate() {
            registry.insert(lfo.name.clone(), Driver::Lfo(i));
        }
        for (i, random) in config.randoms.iter().enumerate() {
            registry.insert(random.name.clone(), Driver::Random(i));
        }

        info!(
            signals = registry.order.len(),
            history = registry.history_capacity,
            "signal registry ready"
        );
        registry
    }

    fn sources(&self) -> Sources<'_> {
        Sources {
            clock: &self.clock,
            levels: self.audio.levels(),
            lfos: &self.lfos,
            randoms: &self.randoms,
        }
    }

    fn insert(&mut self, name: String, driver: Driver) -> SignalKey {
        let (value, phase) = self.sources().drive(driver);
        let key = self.signals.insert(Signal {
            name: name.clone(),
            driver,
            value,
            phase,
            history: Arc::new(HistoryBuffer::new(self.history_capacity)),
        });
        self.by_name.insert(name, key);
        self.order.push(key);
        key
    }

    /// Advance every generator by `delta_seconds` and publish the results.
    ///
    /// `audio` is the block captured since the last tick; `None` means no
    /// audio this tick and the follower decays.
    pub fn tick(&mut self, delta_seconds: f64, audio: Option<&[f32]>) {
        self.clock.advance(delta_seconds);
        match audio {
            Some(block) => self.audio.process(block),
            None => self.audio.idle(),
        }
        self.advance_generators(delta_seconds);
    }

    /// Like [`tick`](Self::tick), draining audio from a capture queue
    pub fn tick_from(&mut self, delta_seconds: f64, input: &mut AudioConsumer) {
        self.clock.advance(delta_seconds);
        self.audio.drain(input);
        self.advance_generators(delta_seconds);
    }

    fn advance_generators(&mut self, delta_seconds: f64) {
        for lfo in &mut self.lfos {
            lfo.advance(delta_seconds);
        }
        for random in &mut self.randoms {
            random.advance(delta_seconds);
        }
        self.publish();
    }

    /// Write phase: every generator has already advanced
    fn publish(&mut self) {
        self.write_values(true);
        self.total_beats = self.clock.total_beats();
        self.ticks += 1;
    }

    fn write_values(&mut self, record: bool) {
        let sources = Sources {
            clock: &self.clock,
            levels: self.audio.levels(),
            lfos: &self.lfos,
            randoms: &self.randoms,
        };
        for &key in &self.order {
            let signal = &mut self.signals[key];
            let (value, phase) = sources.drive(signal.driver);
            signal.value = value;
            signal.phase = phase;
            if record {
                signal.history.push(value);
            }
        }
    }

    /// Current value of `id`, 0.0 if unknown
    pub fn get(&self, id: &str) -> f64 {
        self.by_name
            .get(id)
            .map_or(0.0, |&key| self.signals[key].value)
    }

    pub fn get_by_key(&self, key: SignalKey) -> f64 {
        self.signals.get(key).map_or(0.0, |s| s.value)
    }

    pub fn key(&self, id: &str) -> Option<SignalKey> {
        self.by_name.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_name.contains_key(id)
    }

    /// Signal names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(|&key| self.signals[key].name.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Add a signal whose value the host supplies through [`set_external`](Self::set_external)
    pub fn register_external(
        &mut self,
        name: impl Into<String>,
    ) -> Result<SignalKey, RegistryError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateSignal(name));
        }
        debug!(name = %name, "external signal registered");
        Ok(self.insert(name, Driver::External { staged: 0.0 }))
    }

    /// Stage a value for an external signal; it is published at the next tick.
    ///
    /// Returns false for unknown or non-external signals and non-finite values.
    pub fn set_external(&mut self, id: &str, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let Some(&key) = self.by_name.get(id) else {
            return false;
        };
        match &mut self.signals[key].driver {
            Driver::External { staged } => {
                *staged = value;
                true
            }
            _ => false,
        }
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        self.clock.set_tempo(bpm);
    }

    pub fn clock(&self) -> &BeatClock {
        &self.clock
    }

    pub fn audio(&self) -> &AudioEngine {
        &self.audio
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Shared handle to a signal's history for a scope on another thread
    pub fn history(&self, id: &str) -> Option<Arc<HistoryBuffer>> {
        self.by_name
            .get(id)
            .map(|&key| Arc::clone(&self.signals[key].history))
    }

    /// Copy a signal's history oldest-first into `dest`; false if unknown
    pub fn copy_history(&self, id: &str, dest: &mut [f64]) -> bool {
        match self.by_name.get(id) {
            Some(&key) => {
                self.signals[key].history.copy_into(dest);
                true
            }
            None => false,
        }
    }

    /// Owned copy of the current readings
    pub fn snapshot(&self) -> SignalSnapshot {
        let mut snapshot = SignalSnapshot::new(self.total_beats);
        self.snapshot_into(&mut snapshot);
        snapshot
    }

    /// Refresh `snapshot` in place; allocates only for names it has not seen
    pub fn snapshot_into(&self, snapshot: &mut SignalSnapshot) {
        snapshot.total_beats = self.total_beats;
        for &key in &self.order {
            let signal = &self.signals[key];
            let reading = SignalReading::new(signal.driver.class(), signal.value, signal.phase);
            match snapshot.readings.get_mut(signal.name.as_str()) {
                Some(slot) => *slot = reading,
                None => {
                    snapshot.readings.insert(signal.name.clone(), reading);
                }
            }
        }
    }

    /// Restart the session timeline: beat zero, silent audio, empty histories
    pub fn reset(&mut self) {
        self.clock.reset();
        self.audio.reset();
        for lfo in &mut self.lfos {
            lfo.reset();
        }
        for &key in &self.order {
            self.signals[key].history.clear();
        }
        self.total_beats = 0.0;
        self.ticks = 0;
        self.write_values(false);
    }
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::build(&EngineConfig::default())
    }
}

impl SignalSource for SignalRegistry {
    fn reading(&self, id: &str) -> Option<SignalReading> {
        self.by_name.get(id).map(|&key| {
            let signal = &self.signals[key];
            SignalReading::new(signal.driver.class(), signal.value, signal.phase)
        })
    }

    fn total_beats(&self) -> f64 {
        self.total_beats
    }
}

/// Plain-data copy of one tick's readings, safe to send to another thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub total_beats: f64,
    pub readings: HashMap<String, SignalReading>,
}

impl SignalSnapshot {
    pub fn new(total_beats: f64) -> Self {
        Self {
            total_beats,
            readings: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: impl Into<String>, reading: SignalReading) {
        self.readings.insert(id.into(), reading);
    }
}

impl SignalSource for SignalSnapshot {
    fn reading(&self, id: &str) -> Option<SignalReading> {
        self.readings.get(id).copied()
    }

    fn total_beats(&self) -> f64 {
        self.total_beats
    }
}
