//! Ramp-compare time-domain conversion.
//!
//! A linearly rising reference ([`RampGenerator`]) is compared against the
//! held subtractor output ([`Comparator`]); the time at which the ramp first
//! reaches it is quantised by the [`TimeToDigitalConverter`].
//!
//! ```text
//!            enable            ramp >= V
//!   Idle ───────────► Ramping ───────────► Crossed
//!                        │
//!                        │ t > max_time
//!                        ▼
//!                     Saturated
//! ```
//!
//! Time advances by adding a fixed `time_step` each iteration, so resolution
//! is bounded by the step and the search always ends within
//! `max_time / time_step` steps. The rounding of the running sum is part of
//! the model: crossing times (and therefore codes) follow it exactly.

use crate::config::PeConfig;
use crate::engine::metrics::CostModel;

/// Snapshot of the ramp: `(enabled, current_time, current_value)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RampState {
    pub enabled: bool,
    pub current_time: f64,
    pub current_value: f64,
}

#[derive(Debug, Clone)]
pub struct RampGenerator {
    slope: f64,
    time_step: f64,
    state: RampState,
}

impl RampGenerator {
    pub fn new(config: &PeConfig) -> Self {
        Self {
            slope: config.ramp.slope,
            time_step: config.system.time_step,
            state: RampState::default(),
        }
    }

    /// Start a new ramp from zero.
    pub fn enable(&mut self) {
        self.state = RampState {
            enabled: true,
            current_time: 0.0,
            current_value: 0.0,
        };
    }

    pub fn disable(&mut self) {
        self.state.enabled = false;
    }

    /// Ramp output at `time`; a disabled ramp stays at 0.
    pub fn value_at(&mut self, time: f64) -> f64 {
        if !self.state.enabled {
            return 0.0;
        }
        self.state.current_time = time;
        self.state.current_value = self.slope * time;
        self.state.current_value
    }

    pub fn state(&self) -> RampState {
        self.state
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }
}

impl CostModel for RampGenerator {
    fn energy(&self, operation_time: f64) -> f64 {
        if !self.state.enabled {
            return 0.0;
        }
        0.5 * self.slope * operation_time * self.state.current_value
    }

    fn delay(&self) -> f64 {
        self.time_step
    }

    fn power(&self) -> f64 {
        0.2
    }

    fn area(&self) -> f64 {
        0.3e-12
    }
}

#[derive(Debug, Clone, Default)]
pub struct Comparator {
    last_comparison: Option<(f64, f64)>,
}

impl Comparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the ramp has reached the reference.
    pub fn compare(&mut self, ramp_value: f64, reference: f64) -> bool {
        self.last_comparison = Some((ramp_value, reference));
        ramp_value >= reference
    }

    pub fn last_comparison(&self) -> Option<(f64, f64)> {
        self.last_comparison
    }
}

impl CostModel for Comparator {
    fn energy(&self, _operation_time: f64) -> f64 {
        if self.last_comparison.is_some() {
            0.1
        } else {
            0.0
        }
    }

    fn delay(&self) -> f64 {
        0.02
    }

    fn power(&self) -> f64 {
        0.1
    }

    fn area(&self) -> f64 {
        0.1
    }
}

/// Quantises a time interval into a saturating `num_tdc`-bit code.
#[derive(Debug, Clone)]
pub struct TimeToDigitalConverter {
    num_bits: u32,
    time_precision: f64,
    max_code: u32,
    max_time: f64,
}

impl TimeToDigitalConverter {
    pub fn new(config: &PeConfig) -> Self {
        let max_code = config.max_tdc_code();
        Self {
            num_bits: config.tdc.num_tdc,
            time_precision: config.tdc.time_precision,
            max_code,
            max_time: config.tdc.time_precision * f64::from(max_code),
        }
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn max_code(&self) -> u32 {
        self.max_code
    }

    /// Longest interval the converter can represent.
    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    pub fn measure(&self, start_time: f64, stop_time: f64) -> u32 {
        let ticks = ((stop_time - start_time) / self.time_precision).floor();
        if ticks <= 0.0 {
            return 0;
        }
        if ticks >= f64::from(self.max_code) {
            return self.max_code;
        }
        ticks as u32
    }
}

impl CostModel for TimeToDigitalConverter {
    fn energy(&self, operation_time: f64) -> f64 {
        0.2 * operation_time
    }

    fn delay(&self) -> f64 {
        self.time_precision
    }

    fn power(&self) -> f64 {
        0.5 * self.time_precision
    }

    fn area(&self) -> f64 {
        0.1
    }
}

/// Terminal state of one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The ramp reached the held value inside the observation window.
    Crossed,
    /// No crossing before `max_time`; the code is pinned to the maximum.
    Saturated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub code: u32,
    pub outcome: Outcome,
    /// Time the TDC was stopped (`max_time` on saturation).
    pub stop_time: f64,
    /// Last simulated time visited by the search.
    pub elapsed: f64,
}

/// Drives ramp, comparator and TDC through one conversion per held value.
#[derive(Debug, Clone)]
pub struct RampConverter {
    ramp: RampGenerator,
    comparator: Comparator,
    tdc: TimeToDigitalConverter,
    /// Baseline removed from every crossed code, in TDC ticks.
    calibration_offset: f64,
}

impl RampConverter {
    pub fn new(config: &PeConfig) -> Self {
        Self {
            ramp: RampGenerator::new(config),
            comparator: Comparator::new(),
            tdc: TimeToDigitalConverter::new(config),
            calibration_offset: 0.0,
        }
    }

    pub fn with_calibration_offset(mut self, offset: f64) -> Self {
        self.calibration_offset = offset.max(0.0);
        self
    }

    pub fn calibration_offset(&self) -> f64 {
        self.calibration_offset
    }

    pub fn ramp(&self) -> &RampGenerator {
        &self.ramp
    }

    pub fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    pub fn tdc(&self) -> &TimeToDigitalConverter {
        &self.tdc
    }

    /// Convert one held analog value.
    pub fn convert(&mut self, held: f64) -> Conversion {
        let start_time = 0.0;
        let time_step = self.ramp.time_step();
        let max_time = self.tdc.max_time();

        self.ramp.enable();
        let mut steps: u64 = 0;
        let mut current_time = start_time;
        loop {
            let ramp_value = self.ramp.value_at(current_time);
            if self.comparator.compare(ramp_value, held) {
                break;
            }
            steps += 1;
            current_time += time_step;
            if current_time > max_time {
                log::trace!("[Converter] {held} saturated after {steps} steps");
                return Conversion {
                    code: self.tdc.max_code(),
                    outcome: Outcome::Saturated,
                    stop_time: max_time,
                    elapsed: current_time,
                };
            }
        }

        let stop_time = current_time;
        if stop_time >= max_time {
            return Conversion {
                code: self.tdc.max_code(),
                outcome: Outcome::Saturated,
                stop_time: max_time,
                elapsed: current_time,
            };
        }
        let raw = self.tdc.measure(start_time, stop_time);
        let code = (f64::from(raw) - self.calibration_offset).max(0.0).floor() as u32;
        log::trace!("[Converter] {held} crossed at {stop_time}: raw {raw}, code {code}");
        Conversion {
            code,
            outcome: Outcome::Crossed,
            stop_time,
            elapsed: current_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(slope: f64, time_step: f64, num_tdc: u32, time_precision: f64) -> PeConfig {
        let mut config = PeConfig::default();
        config.ramp.slope = slope;
        config.system.time_step = time_step;
        config.tdc.num_tdc = num_tdc;
        config.tdc.time_precision = time_precision;
        config
    }

    #[test]
    fn ramp_is_monotonic_when_enabled() {
        let mut ramp = RampGenerator::new(&config(0.75, 0.1, 8, 0.1));
        assert_eq!(ramp.value_at(5.0), 0.0, "disabled ramp stays at 0");

        ramp.enable();
        let mut previous = ramp.value_at(0.0);
        for step in 1..200 {
            let value = ramp.value_at(step as f64 * 0.13);
            assert!(value > previous);
            previous = value;
        }
        let state = ramp.state();
        assert!(state.enabled);
        assert_eq!(state.current_value, 0.75 * state.current_time);
    }

    #[test]
    fn ramp_enable_resets_state() {
        let mut ramp = RampGenerator::new(&config(1.0, 0.1, 8, 0.1));
        ramp.enable();
        ramp.value_at(3.0);
        ramp.enable();
        assert_eq!(
            ramp.state(),
            RampState {
                enabled: true,
                current_time: 0.0,
                current_value: 0.0
            }
        );
    }

    #[test]
    fn comparator_is_inclusive() {
        let mut comparator = Comparator::new();
        assert!(comparator.compare(1.0, 1.0));
        assert!(!comparator.compare(0.5, 1.0));
        assert_eq!(comparator.last_comparison(), Some((0.5, 1.0)));
    }

    #[test]
    fn tdc_measures_and_clamps() {
        let tdc = TimeToDigitalConverter::new(&config(1.0, 0.1, 4, 0.5));
        assert_eq!(tdc.max_code(), 15);
        assert_eq!(tdc.max_time(), 7.5);
        assert_eq!(tdc.measure(0.0, 0.0), 0);
        assert_eq!(tdc.measure(0.0, 1.2), 2);
        assert_eq!(tdc.measure(0.0, 100.0), 15);
    }

    #[test]
    fn crossing_converts_elapsed_time() {
        let mut converter = RampConverter::new(&config(1.0, 0.1, 8, 0.1));
        let conversion = converter.convert(2.0);
        assert_eq!(conversion.outcome, Outcome::Crossed);
        assert!((conversion.stop_time - 2.0).abs() < 1e-12);
        assert_eq!(conversion.code, 20);
    }

    #[test]
    fn crossing_time_is_a_running_sum_of_steps() {
        let mut converter = RampConverter::new(&config(1.0, 0.1, 8, 0.1));
        // Six additions of 0.1 land on exactly 0.6 (6 * 0.1 would be
        // 0.6000000000000001 and floor to 6 ticks).
        let conversion = converter.convert(0.5069);
        assert_eq!(conversion.stop_time, 0.6);
        assert_eq!(conversion.code, 5);

        // The sum drifts just below 15 ns, so the crossing is one step later.
        let conversion = converter.convert(15.0);
        assert_eq!(conversion.code, 150);
        assert!(conversion.stop_time > 15.0);
        assert!((conversion.stop_time - 15.1).abs() < 1e-9);
    }

    #[test]
    fn non_positive_value_crosses_immediately() {
        let mut converter = RampConverter::new(&config(1.0, 0.1, 8, 0.1));
        for held in [0.0, -3.5] {
            let conversion = converter.convert(held);
            assert_eq!(conversion.outcome, Outcome::Crossed);
            assert_eq!(conversion.stop_time, 0.0);
            assert_eq!(conversion.elapsed, 0.0);
            assert_eq!(conversion.code, 0);
        }
    }

    #[test]
    fn saturates_at_max_code() {
        let mut converter = RampConverter::new(&config(1.0, 0.1, 4, 0.1));
        // max_time = 1.5 ns, ramp needs 10 ns
        let conversion = converter.convert(10.0);
        assert_eq!(conversion.outcome, Outcome::Saturated);
        assert_eq!(conversion.code, 15);
        assert_eq!(conversion.stop_time, 1.5);
        assert!(conversion.elapsed > 1.5);
    }

    #[test]
    fn saturation_ignores_calibration_offset() {
        let mut converter =
            RampConverter::new(&config(1.0, 0.1, 4, 0.1)).with_calibration_offset(3.0);
        assert_eq!(converter.convert(10.0).code, 15);
    }

    #[test]
    fn calibration_offset_clamps_at_zero() {
        let mut converter =
            RampConverter::new(&config(1.0, 0.1, 8, 0.1)).with_calibration_offset(4.5);
        assert_eq!(converter.convert(2.0).code, 15);
        assert_eq!(converter.convert(0.0).code, 0);
        assert_eq!(converter.convert(0.3).code, 0);
    }

    #[test]
    fn cost_models_follow_activity() {
        let mut converter = RampConverter::new(&config(2.0, 0.1, 8, 0.1));
        assert_eq!(converter.ramp().energy(1.0), 0.0);
        assert_eq!(converter.comparator().energy(1.0), 0.0);
        converter.convert(1.0);
        // crossing at t = 0.5, ramp value 1.0
        assert_eq!(converter.ramp().state().current_value, 1.0);
        assert_eq!(converter.ramp().energy(0.5), 0.5 * 2.0 * 0.5 * 1.0);
        assert_eq!(converter.comparator().energy(0.5), 0.1);
        assert_eq!(converter.tdc().energy(0.5), 0.1);
        assert_eq!(converter.tdc().power(), 0.05);
    }
}
