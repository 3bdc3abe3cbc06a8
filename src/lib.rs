//! Simulator for an analog compute-in-memory processing element.
//!
//! A memristive crossbar accumulates weighted sums along its columns,
//! differential subtractors pair the columns up, and a ramp-compare
//! time-to-digital converter turns each difference into a digital code.
//! [`QuantizedPipeline`] adds bit-slicing for weights and inputs wider than
//! the cells and the DAC.

pub mod config;
pub mod engine;
pub mod error;

pub use config::PeConfig;
pub use engine::crossbar::WeightMatrix;
pub use engine::metrics::MetricsReport;
pub use engine::pipeline::{PipelineRun, PwmPipeline};
pub use engine::quantization::{reconstruct_bits, split_bits, QuantizedPipeline};
pub use error::{PeError, PeResult};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition
#[cfg(feature = "python")]
#[pymodule]
fn pe_sim_core(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Expose the processing element class to Python
    m.add_class::<engine::controller::ProcessingElement>()?;
    Ok(())
}
