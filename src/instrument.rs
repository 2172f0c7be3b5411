//! Instruments and Shared Parameter Chains
//!
//! An [`Instrument`] is the set of named parameter slots a renderer reads each
//! frame. It is plain data so a preset store can serialize it.
//!
//! [`SharedParameter`] lets a patch editor on one thread publish new chain
//! snapshots while the control thread keeps evaluating the previous one. Each
//! load is lock-free and sees a complete chain.

use crate::modulator::{ModulatableParameter, Modulator};
use crate::registry::SignalSource;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Atomically replaceable parameter chain
#[derive(Debug)]
pub struct SharedParameter {
    current: ArcSwap<ModulatableParameter>,
}

impl SharedParameter {
    pub fn new(parameter: ModulatableParameter) -> Self {
        Self {
            current: ArcSwap::from_pointee(parameter),
        }
    }

    /// Snapshot for evaluation
    pub fn load(&self) -> Arc<ModulatableParameter> {
        self.current.load_full()
    }

    /// Evaluate the current snapshot without cloning it
    pub fn evaluate<S: SignalSource + ?Sized>(&self, signals: &S) -> f64 {
        self.current.load().evaluate(signals)
    }

    /// Replace the chain
    pub fn store(&self, parameter: ModulatableParameter) {
        self.current.store(Arc::new(parameter));
    }

    /// Derive a new chain from the current one. `edit` may run more than
    /// once if another writer publishes concurrently.
    pub fn update<F>(&self, edit: F)
    where
        F: Fn(&ModulatableParameter) -> ModulatableParameter,
    {
        self.current.rcu(|current| edit(current));
    }

    pub fn set_base_value(&self, base_value: f64) {
        self.update(|p| p.with_base_value(base_value));
    }

    pub fn add_modulator(&self, modulator: Modulator) {
        self.update(|p| p.with_modulator(modulator.clone()));
    }
}

impl Default for SharedParameter {
    fn default() -> Self {
        Self::new(ModulatableParameter::default())
    }
}

impl From<ModulatableParameter> for SharedParameter {
    fn from(parameter: ModulatableParameter) -> Self {
        Self::new(parameter)
    }
}

/// Named parameter slots of one visual instrument
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ModulatableParameter>,
}

impl Instrument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(
        mut self,
        slot: impl Into<String>,
        parameter: ModulatableParameter,
    ) -> Self {
        self.parameters.insert(slot.into(), parameter);
        self
    }

    /// Insert or replace a slot, returning the previous chain
    pub fn set(
        &mut self,
        slot: impl Into<String>,
        parameter: ModulatableParameter,
    ) -> Option<ModulatableParameter> {
        self.parameters.insert(slot.into(), parameter)
    }

    pub fn get(&self, slot: &str) -> Option<&ModulatableParameter> {
        self.parameters.get(slot)
    }

    pub fn remove(&mut self, slot: &str) -> Option<ModulatableParameter> {
        self.parameters.remove(slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = &str> + '_ {
        self.parameters.keys().map(String::as_str)
    }

    /// Evaluate one slot; `None` if the slot does not exist
    pub fn evaluate<S: SignalSource + ?Sized>(&self, slot: &str, signals: &S) -> Option<f64> {
        self.parameters.get(slot).map(|p| p.evaluate(signals))
    }

    /// Evaluate every slot in name order without allocating
    pub fn evaluate_each<S, F>(&self, signals: &S, mut f: F)
    where
        S: SignalSource + ?Sized,
        F: FnMut(&str, f64),
    {
        for (slot, parameter) in &self.parameters {
            f(slot, parameter.evaluate(signals));
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulator::{Operator, Waveform};
    use crate::registry::{SignalClass, SignalReading, SignalSnapshot};
    use approx::assert_abs_diff_eq;

    fn signals() -> SignalSnapshot {
        let mut snap = SignalSnapshot::new(0.0);
        snap.insert("beatPhase", SignalReading::new(SignalClass::Beat, 0.0, 0.0));
        snap.insert("amp", SignalReading::new(SignalClass::Envelope, 0.5, 0.0));
        snap
    }

    fn mandala() -> Instrument {
        Instrument::new("mandala")
            .with_parameter("armLength", ModulatableParameter::new(0.6))
            .with_parameter(
                "hue",
                ModulatableParameter::new(0.2)
                    .with_modulator(Modulator::new("amp").with_weight(0.4)),
            )
            .with_parameter(
                "rotation",
                ModulatableParameter::new(1.0).with_modulator(
                    Modulator::new("amp")
                        .with_operator(Operator::Multiply)
                        .with_weight(1.0),
                ),
            )
    }

    #[test]
    fn test_evaluate_slots() {
        let instrument = mandala();
        let signals = signals();

        assert_eq!(instrument.evaluate("armLength", &signals), Some(0.6));
        let hue = instrument.evaluate("hue", &signals).unwrap();
        let rotation = instrument.evaluate("rotation", &signals).unwrap();
        assert_abs_diff_eq!(hue, 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(rotation, 1.5, epsilon = 1e-12);
        assert_eq!(instrument.evaluate("feedback", &signals), None);
    }

    #[test]
    fn test_evaluate_each_in_name_order() {
        let instrument = mandala();
        let mut seen = Vec::new();
        instrument.evaluate_each(&signals(), |slot, value| seen.push((slot.to_string(), value)));

        let names: Vec<_> = seen.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["armLength", "hue", "rotation"]);
    }

    #[test]
    fn test_slot_editing() {
        let mut instrument = mandala();
        let previous = instrument.set("armLength", ModulatableParameter::new(0.1));
        assert_eq!(previous, Some(ModulatableParameter::new(0.6)));
        assert!(instrument.remove("hue").is_some());
        assert_eq!(instrument.slots().count(), 2);
    }

    #[test]
    fn test_json_roundtrip() {
        let instrument = mandala();
        let json = instrument.to_json().unwrap();
        assert!(json.contains("\"armLength\""));
        assert_eq!(Instrument::from_json(&json).unwrap(), instrument);
    }

    #[test]
    fn test_shared_parameter_publishes_snapshots() {
        let shared = SharedParameter::new(ModulatableParameter::new(0.5));
        let before = shared.load();

        shared.add_modulator(Modulator::new("amp").with_weight(1.0));
        shared.set_base_value(0.25);

        // Earlier snapshot is untouched
        assert_eq!(before.modulators().len(), 0);
        assert_eq!(before.base_value(), 0.5);

        let after = shared.load();
        assert_eq!(after.modulators().len(), 1);
        assert_eq!(after.base_value(), 0.25);
        assert_abs_diff_eq!(shared.evaluate(&signals()), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_shared_parameter_across_threads() {
        let shared = Arc::new(SharedParameter::new(ModulatableParameter::new(0.0)));

        let editor = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                let square = Modulator::new("beatPhase").with_waveform(Waveform::Square);
                for i in 0..200 {
                    shared.store(
                        ModulatableParameter::new(i as f64)
                            .with_modulator(square.clone())
                            .with_modulator(square.clone()),
                    );
                }
            })
        };

        let signals = signals();
        for _ in 0..200 {
            let chain = shared.load();
            // Square at phase 0 adds +1 per modulator; never a half-written chain
            let value = chain.evaluate(&signals);
            assert!(chain.modulators().is_empty() || chain.modulators().len() == 2);
            assert_eq!(value - chain.base_value(), chain.modulators().len() as f64);
        }
        editor.join().unwrap();
    }
}
