//! Rotary Knob Gesture Math
//!
//! Maps vertical pointer drags onto a parameter's base value. Slow drags get
//! fine resolution, fast drags coarse resolution, with a cubic curve between
//! them. Bipolar knobs add a soft detent at zero that slow motion settles into
//! and fast motion passes through.
//!
//! [`compute_new_value`] is a pure function; the caller threads the smoothed
//! velocity from one move to the next. [`KnobGesture`] does that threading for
//! a single press-drag-release session.
//!
//! ```
//! use cvmod::knob::{KnobConfig, KnobGesture};
//!
//! let mut gesture = KnobGesture::new(KnobConfig::unipolar());
//! gesture.begin(0.5);
//! // Dragging upward (negative dy) raises the value
//! let value = gesture.drag(-12.0, 0.016);
//! assert!(value > 0.5);
//! gesture.release();
//! ```

use serde::{Deserialize, Serialize};

/// Smoothing weight kept from the previous velocity
const VELOCITY_RETAIN: f64 = 0.7;

// =============================================================================
// Configuration
// =============================================================================

/// Resolution, speed range and detent settings for one knob
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnobConfig {
    /// Value change per pixel at the slowest drag
    pub r_min: f64,
    /// Value change per pixel at the fastest drag
    pub r_max: f64,
    /// Range is [-1, 1] with a detent at zero instead of [0, 1]
    pub bipolar: bool,
    /// Shortest accepted time between moves (s)
    pub min_dt: f64,
    /// Longest accepted time between moves (s)
    pub max_dt: f64,
    /// Drag speed mapped to `r_min` (px/s)
    pub min_speed: f64,
    /// Drag speed mapped to `r_max` (px/s)
    pub max_speed: f64,
    /// Width of the zero detent
    pub detent_width: f64,
    /// Pull toward zero at rest, in [0, 1]
    pub detent_strength: f64,
}

impl KnobConfig {
    /// Knob over [0, 1]
    pub fn unipolar() -> Self {
        Self {
            r_min: 0.0005,
            r_max: 0.01,
            bipolar: false,
            min_dt: 0.008,
            max_dt: 0.033,
            min_speed: 50.0,
            max_speed: 2500.0,
            detent_width: 0.08,
            detent_strength: 0.35,
        }
    }

    /// Knob over [-1, 1] with a detent at zero
    pub fn bipolar() -> Self {
        Self {
            bipolar: true,
            ..Self::unipolar()
        }
    }

    pub fn with_resolution(mut self, r_min: f64, r_max: f64) -> Self {
        self.r_min = r_min;
        self.r_max = r_max;
        self
    }

    pub fn with_detent(mut self, width: f64, strength: f64) -> Self {
        self.detent_width = width;
        self.detent_strength = strength;
        self
    }

    /// Valid value range for this knob
    pub fn range(&self) -> (f64, f64) {
        if self.bipolar {
            (-1.0, 1.0)
        } else {
            (0.0, 1.0)
        }
    }
}

impl Default for KnobConfig {
    fn default() -> Self {
        Self::unipolar()
    }
}

// =============================================================================
// Value Mapping
// =============================================================================

/// Result of one drag step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnobStep {
    pub value: f64,
    /// Pass back in as `previous_smoothed_velocity` on the next move
    pub smoothed_velocity: f64,
}

/// Normalized drag speed in [0, 1]
fn normalized_speed(velocity: f64, config: &KnobConfig) -> f64 {
    let span = config.max_speed - config.min_speed;
    if !(span > 0.0) {
        return if velocity >= config.max_speed { 1.0 } else { 0.0 };
    }
    ((velocity - config.min_speed) / span).clamp(0.0, 1.0)
}

/// Apply one pointer move to `current_value`.
///
/// `delta_y` is in pixels with screen-down positive, so dragging down lowers
/// the value. Non-finite inputs leave the value where it was.
pub fn compute_new_value(
    delta_y: f64,
    delta_time: f64,
    current_value: f64,
    previous_smoothed_velocity: f64,
    config: &KnobConfig,
) -> KnobStep {
    let (lo, hi) = config.range();
    let current = if current_value.is_finite() {
        current_value.clamp(lo, hi)
    } else {
        lo.max(0.0)
    };
    let previous = if previous_smoothed_velocity.is_finite() {
        previous_smoothed_velocity.max(0.0)
    } else {
        0.0
    };

    if !delta_y.is_finite() {
        return KnobStep {
            value: current,
            smoothed_velocity: previous,
        };
    }

    // NaN dt falls to the upper bound
    let dt = if delta_time.is_nan() {
        config.max_dt
    } else {
        delta_time.clamp(config.min_dt, config.max_dt.max(config.min_dt))
    };
    let instantaneous = delta_y.abs() / dt;
    let smoothed = VELOCITY_RETAIN * previous + (1.0 - VELOCITY_RETAIN) * instantaneous;

    let vn = normalized_speed(smoothed, config);
    let mut resolution = config.r_min + (config.r_max - config.r_min) * vn * vn * vn;
    if config.bipolar {
        resolution *= 2.0;
    }

    let mut value = current - delta_y * resolution;

    if config.bipolar && config.detent_width > 0.0 {
        let strength = (config.detent_strength * (1.0 - vn)).clamp(0.0, 1.0);
        let x = value / config.detent_width;
        value -= value * libm::exp(-x * x) * strength;
    }

    KnobStep {
        value: value.clamp(lo, hi),
        smoothed_velocity: smoothed,
    }
}

// =============================================================================
// Gesture Session
// =============================================================================

/// One press-drag-release interaction on a knob
#[derive(Debug, Clone)]
pub struct KnobGesture {
    config: KnobConfig,
    value: f64,
    smoothed_velocity: f64,
    active: bool,
}

impl KnobGesture {
    pub fn new(config: KnobConfig) -> Self {
        let (lo, _) = config.range();
        Self {
            config,
            value: lo.max(0.0),
            smoothed_velocity: 0.0,
            active: false,
        }
    }

    /// Start dragging from the parameter's current base value
    pub fn begin(&mut self, value: f64) {
        let (lo, hi) = self.config.range();
        if value.is_finite() {
            self.value = value.clamp(lo, hi);
        }
        self.smoothed_velocity = 0.0;
        self.active = true;
    }

    /// Apply a pointer move and return the new value. Ignored when no
    /// gesture is in progress.
    pub fn drag(&mut self, delta_y: f64, delta_time: f64) -> f64 {
        if !self.active {
            return self.value;
        }
        let step = compute_new_value(
            delta_y,
            delta_time,
            self.value,
            self.smoothed_velocity,
            &self.config,
        );
        self.value = step.value;
        self.smoothed_velocity = step.smoothed_velocity;
        self.value
    }

    /// End the gesture; returns the final value
    pub fn release(&mut self) -> f64 {
        self.active = false;
        self.smoothed_velocity = 0.0;
        self.value
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn smoothed_velocity(&self) -> f64 {
        self.smoothed_velocity
    }

    pub fn config(&self) -> &KnobConfig {
        &self.config
    }
}

impl Default for KnobGesture {
    fn default() -> Self {
        Self::new(KnobConfig::default())
    }
}
