// Differential Column Subtractor
use crate::config::PeConfig;
use crate::engine::metrics::CostModel;
use crate::error::{PeError, PeResult};

/// Signed difference of a column pair.
///
/// `subtract(a, b) = a * p1 * p2 - b * p3 * p4`. With the default unit gains
/// this is an exact `a - b`.
#[derive(Debug, Clone)]
pub struct DifferentialSubtractor {
    gain_a: f64,
    gain_b: f64,
    last_operation: Option<(f64, f64)>,
}

impl DifferentialSubtractor {
    pub fn new(config: &PeConfig) -> Self {
        let sub = &config.subtractor;
        Self::with_gains(sub.p1 * sub.p2, sub.p3 * sub.p4)
    }

    pub fn with_gains(gain_a: f64, gain_b: f64) -> Self {
        Self {
            gain_a,
            gain_b,
            last_operation: None,
        }
    }

    pub fn subtract(&mut self, a: f64, b: f64) -> f64 {
        self.last_operation = Some((a, b));
        a * self.gain_a - b * self.gain_b
    }

    pub fn last_operation(&self) -> Option<(f64, f64)> {
        self.last_operation
    }

    /// One subtractor per column pair, checked against the physical unit count.
    pub fn bank(config: &PeConfig) -> PeResult<Vec<Self>> {
        let pairs = config.column_pairs();
        let units = config.subtractor.num_units;
        if units < pairs {
            return Err(PeError::Capacity {
                what: "column pairs (subtractor units)",
                required: pairs as u64,
                available: units as u64,
            });
        }
        Ok((0..pairs).map(|_| Self::new(config)).collect())
    }
}

impl CostModel for DifferentialSubtractor {
    fn energy(&self, _operation_time: f64) -> f64 {
        if self.last_operation.is_some() {
            0.3e-12
        } else {
            0.0
        }
    }

    fn delay(&self) -> f64 {
        0.5e-9
    }

    fn power(&self) -> f64 {
        0.1
    }

    fn area(&self) -> f64 {
        0.1
    }
}
