// Controller
use std::collections::HashMap;

use numpy::PyReadonlyArray2;
use pyo3::prelude::*;

use crate::config::PeConfig;
use crate::engine::metrics::MetricsReport;
use crate::engine::pipeline::{PipelineRun, PwmPipeline};
use crate::engine::quantization::QuantizedPipeline;
use crate::error::{PeError, PeResult};

fn to_py_err(err: PeError) -> PyErr {
    match err {
        PeError::ConfigRead { .. } => {
            PyErr::new::<pyo3::exceptions::PyIOError, _>(err.to_string())
        }
        other => PyErr::new::<pyo3::exceptions::PyValueError, _>(other.to_string()),
    }
}

/// Python ints arrive signed; negatives are range errors, not wrap-arounds.
fn to_unsigned(values: &[i64], what: &str) -> PeResult<Vec<u64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            u64::try_from(value)
                .map_err(|_| PeError::range(format!("{what}[{i}]"), value, i64::MAX as u64))
        })
        .collect()
}

fn metrics_dict(metrics: &MetricsReport) -> HashMap<String, f64> {
    HashMap::from([
        ("energy".to_string(), metrics.energy),
        ("delay".to_string(), metrics.delay),
        ("power".to_string(), metrics.power),
        ("area".to_string(), metrics.area),
        ("operation_time".to_string(), metrics.operation_time),
    ])
}

fn run_tuple(run: PipelineRun) -> (Vec<u32>, HashMap<String, f64>) {
    let metrics = metrics_dict(&run.metrics);
    (run.outputs, metrics)
}

enum Element {
    Direct(PwmPipeline),
    Quantized(QuantizedPipeline),
}

#[pyclass]
pub struct ProcessingElement {
    element: Element,
}

impl ProcessingElement {
    fn pipeline_mut(&mut self) -> &mut PwmPipeline {
        match &mut self.element {
            Element::Direct(pipeline) => pipeline,
            Element::Quantized(quantized) => quantized.pipeline_mut(),
        }
    }

    fn quantized_mut(&mut self) -> PyResult<&mut QuantizedPipeline> {
        match &mut self.element {
            Element::Quantized(quantized) => Ok(quantized),
            Element::Direct(_) => Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(
                "configuration has no [Quantization] section",
            )),
        }
    }
}

#[pymethods]
impl ProcessingElement {
    /// Build the element from a TOML configuration file.
    ///
    /// Configs with a `[Quantization]` section get the bit-slicing layer.
    #[new]
    #[pyo3(signature = (config_path, decoder = false))]
    pub fn new(config_path: String, decoder: bool) -> PyResult<Self> {
        let config = PeConfig::load(&config_path).map_err(to_py_err)?;
        let quantized = config.quantization.is_some();
        let pipeline = if decoder {
            PwmPipeline::with_decoder(config)
        } else {
            PwmPipeline::new(config)
        }
        .map_err(to_py_err)?;

        let element = if quantized {
            Element::Quantized(QuantizedPipeline::wrap(pipeline).map_err(to_py_err)?)
        } else {
            Element::Direct(pipeline)
        };
        Ok(Self { element })
    }

    /// Program a full `rows x columns` cell matrix.
    pub fn set_weights(&mut self, weights: PyReadonlyArray2<'_, i64>) -> PyResult<()> {
        let pipeline = self.pipeline_mut();
        let matrix = pipeline
            .crossbar()
            .weights_from_signed(weights.as_array())
            .map_err(to_py_err)?;
        pipeline.set_weights(matrix).map_err(to_py_err)
    }

    /// Program a flat list of wide weights through the bit-slicing layer.
    pub fn set_flat_weights(&mut self, weights: Vec<i64>) -> PyResult<()> {
        let weights = to_unsigned(&weights, "weights").map_err(to_py_err)?;
        self.quantized_mut()?
            .set_weights(&weights)
            .map_err(to_py_err)
    }

    /// Returns `(outputs, metrics)`; one output per column pair.
    pub fn process_inputs(
        &mut self,
        digital_inputs: Vec<i64>,
        selected_rows: Vec<usize>,
    ) -> PyResult<(Vec<u32>, HashMap<String, f64>)> {
        let inputs = to_unsigned(&digital_inputs, "digital_inputs").map_err(to_py_err)?;
        let run = match &mut self.element {
            Element::Direct(pipeline) => pipeline.process_inputs(&inputs, &selected_rows),
            Element::Quantized(quantized) => quantized.process_inputs(&inputs, &selected_rows),
        }
        .map_err(to_py_err)?;
        Ok(run_tuple(run))
    }

    /// One `(outputs, metrics)` tuple per DAC cycle.
    pub fn process_cycles(
        &mut self,
        digital_inputs: Vec<i64>,
        selected_rows: Vec<usize>,
    ) -> PyResult<Vec<(Vec<u32>, HashMap<String, f64>)>> {
        let inputs = to_unsigned(&digital_inputs, "digital_inputs").map_err(to_py_err)?;
        let runs = self
            .quantized_mut()?
            .process_cycles(&inputs, &selected_rows)
            .map_err(to_py_err)?;
        Ok(runs.into_iter().map(run_tuple).collect())
    }
}
