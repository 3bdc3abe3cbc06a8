// Pulse-Width DAC
use crate::config::PeConfig;
use crate::engine::metrics::CostModel;
use crate::error::{PeError, PeResult};

/// Maps a digital code to an analog pulse duration.
#[derive(Debug, Clone)]
pub struct DigitalToAnalogConverter {
    num_bits: u32,
    max_code: u64,
    pulse_period: f64,
    vdd: f64,
}

impl DigitalToAnalogConverter {
    pub fn new(config: &PeConfig) -> Self {
        Self {
            num_bits: config.dac.num_bits,
            max_code: config.max_dac_code(),
            pulse_period: config.dac.pulse_period,
            vdd: config.system.vdd,
        }
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn max_code(&self) -> u64 {
        self.max_code
    }

    pub fn pulse_period(&self) -> f64 {
        self.pulse_period
    }

    /// Pulse duration for `code`; codes wider than the DAC are rejected.
    pub fn convert(&self, code: u64) -> PeResult<f64> {
        if code > self.max_code {
            return Err(PeError::range(
                format!("{}-bit DAC code", self.num_bits),
                code,
                self.max_code,
            ));
        }
        Ok(code as f64 * self.pulse_period)
    }
}

impl CostModel for DigitalToAnalogConverter {
    /// Charged per unit pulse.
    fn energy(&self, _operation_time: f64) -> f64 {
        0.5 * self.vdd * self.pulse_period
    }

    fn delay(&self) -> f64 {
        1e-9
    }

    fn power(&self) -> f64 {
        0.1
    }

    fn area(&self) -> f64 {
        0.1
    }
}
