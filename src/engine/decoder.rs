// Input Pre-Processing Stages
use crate::engine::metrics::CostModel;
use crate::error::{PeError, PeResult};

/// Optional stage between the digital inputs and the crossbar rows.
///
/// A processing element is built with exactly one stage; the plain PE uses
/// [`Passthrough`], the address-decoder PE uses [`OneHotDecoder`].
pub trait InputStage: CostModel + Send + Sync {
    fn name(&self) -> &'static str;

    /// Expand one digital input into the value driven onto its row.
    fn decode(&self, input: u64) -> PeResult<u64>;

    /// Note an input as driven, once its whole batch decoded.
    fn record(&mut self, _input: u64) {}
}

impl CostModel for Box<dyn InputStage> {
    fn energy(&self, operation_time: f64) -> f64 {
        (**self).energy(operation_time)
    }
    fn delay(&self) -> f64 {
        (**self).delay()
    }
    fn power(&self) -> f64 {
        (**self).power()
    }
    fn area(&self) -> f64 {
        (**self).area()
    }
}

/// Feeds inputs through unchanged. Costs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl InputStage for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn decode(&self, input: u64) -> PeResult<u64> {
        Ok(input)
    }
}

impl CostModel for Passthrough {
    fn energy(&self, _operation_time: f64) -> f64 {
        0.0
    }
    fn delay(&self) -> f64 {
        0.0
    }
    fn power(&self) -> f64 {
        0.0
    }
    fn area(&self) -> f64 {
        0.0
    }
}

/// Address decoder: input `x` selects line `x`, i.e. drives `2^x`.
#[derive(Debug, Clone, Default)]
pub struct OneHotDecoder {
    last_input: Option<u64>,
}

impl OneHotDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputStage for OneHotDecoder {
    fn name(&self) -> &'static str {
        "one-hot decoder"
    }

    fn decode(&self, input: u64) -> PeResult<u64> {
        1u64.checked_shl(u32::try_from(input).unwrap_or(u32::MAX))
            .ok_or_else(|| PeError::range("decoder input", input, u64::from(u64::BITS - 1)))
    }

    fn record(&mut self, input: u64) {
        self.last_input = Some(input);
    }
}

impl CostModel for OneHotDecoder {
    fn energy(&self, _operation_time: f64) -> f64 {
        0.5 * self.last_input.unwrap_or(0) as f64
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
