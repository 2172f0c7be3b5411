//! # cvmod: Control-Voltage Modulation Engine
//!
//! `cvmod` drives the parameters of real-time visual instruments from
//! musical and audio signals, the way control voltages drive a modular
//! synthesizer. Signals are published once per control tick; parameters are
//! a base value plus an ordered chain of modulators evaluated against them.
//!
//! ## Architecture
//!
//! - **Sources** - [`BeatClock`](clock::BeatClock), the audio follower
//!   ([`AudioEngine`](audio::AudioEngine)), LFOs and random sources
//! - **Registry** - [`SignalRegistry`](registry::SignalRegistry) advances every
//!   source per tick, publishes values together, and records history
//! - **Parameters** - [`ModulatableParameter`](modulator::ModulatableParameter)
//!   folds its modulators over the published values, grouped per
//!   [`Instrument`](instrument::Instrument)
//! - **Gestures** - [`knob`] maps pointer drags onto base values
//!
//! ## Quick Start
//!
//! ```rust
//! use cvmod::prelude::*;
//!
//! let config = EngineConfig::default().with_seed(7);
//! let mut registry = SignalRegistry::new(&config).unwrap();
//!
//! let hue = ModulatableParameter::new(0.5)
//!     .with_modulator(Modulator::new("beatPhase").with_weight(0.2))
//!     .with_modulator(Modulator::new("amp").with_operator(Operator::Multiply));
//!
//! // One control tick with a block of captured audio
//! let block = vec![0.25_f32; 735];
//! registry.tick(1.0 / 60.0, Some(block.as_slice()));
//!
//! let value = hue.evaluate(&registry);
//! assert!(value.is_finite());
//! ```

pub mod audio;
pub mod clock;
pub mod config;
pub mod generators;
pub mod history;
pub mod instrument;
pub mod knob;
pub mod modulator;
pub mod registry;
pub mod rng;

/// Prelude module for convenient imports
pub mod prelude {
    // Signal sources
    pub use crate::audio::{AudioConsumer, AudioEngine, AudioInput, AudioLevels, AudioProducer};
    pub use crate::clock::{subdivision, BeatClock};
    pub use crate::generators::{Lfo, RandomSource};
    pub use crate::rng::XorShift;

    // Registry
    pub use crate::history::HistoryBuffer;
    pub use crate::registry::{
        RegistryError, SignalClass, SignalKey, SignalReading, SignalRegistry, SignalSnapshot,
        SignalSource,
    };

    // Parameters
    pub use crate::instrument::{Instrument, SharedParameter};
    pub use crate::modulator::{ModulatableParameter, Modulator, Operator, Waveform};

    // Gestures
    pub use crate::knob::{compute_new_value, KnobConfig, KnobGesture, KnobStep};

    // Configuration
    pub use crate::config::{
        signal_names, AudioConfig, ConfigError, EngineConfig, LfoConfig, RandomConfig, RandomMode,
    };
}

// Re-export key types at crate root for convenience
pub use prelude::*;
