// PWM Processing Element Pipeline
use serde::Serialize;

use crate::config::PeConfig;
use crate::engine::conversion::RampConverter;
use crate::engine::crossbar::{CrossbarArray, WeightMatrix};
use crate::engine::dac::DigitalToAnalogConverter;
use crate::engine::decoder::{InputStage, OneHotDecoder, Passthrough};
use crate::engine::metrics::{CostModel, MetricsAggregator, MetricsReport};
use crate::engine::subtractor::DifferentialSubtractor;
use crate::engine::weights::WeightSource;
use crate::error::{PeError, PeResult};

/// Result of one `process_inputs` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    /// One TDC code per column pair.
    pub outputs: Vec<u32>,
    pub metrics: MetricsReport,
}

/// One processing element: input stage → DAC → crossbar → subtractors →
/// ramp / comparator / TDC.
///
/// Weights are only changed through [`PwmPipeline::set_weights`] between
/// runs; a run reads them without modification.
pub struct PwmPipeline {
    config: PeConfig,
    input_stage: Box<dyn InputStage>,
    dac: DigitalToAnalogConverter,
    crossbar: CrossbarArray,
    subtractors: Vec<DifferentialSubtractor>,
    converter: RampConverter,
}

impl PwmPipeline {
    /// Plain processing element (inputs drive the rows directly).
    pub fn new(config: PeConfig) -> PeResult<Self> {
        Self::with_input_stage(config, Box::new(Passthrough))
    }

    /// Processing element with a one-hot address decoder in front of the rows.
    pub fn with_decoder(config: PeConfig) -> PeResult<Self> {
        Self::with_input_stage(config, Box::new(OneHotDecoder::new()))
    }

    pub fn with_input_stage(config: PeConfig, input_stage: Box<dyn InputStage>) -> PeResult<Self> {
        config.validate()?;
        let subtractors = DifferentialSubtractor::bank(&config)?;
        let crossbar = CrossbarArray::new(&config);
        let calibration_offset = config.subtractor.sub_offset / crossbar.unit_contribution();
        let converter = RampConverter::new(&config).with_calibration_offset(calibration_offset);

        log::debug!(
            "[Pipeline] {}x{} crossbar, {} subtractors, {} input stage, offset {} ticks",
            crossbar.rows(),
            crossbar.columns(),
            subtractors.len(),
            input_stage.name(),
            converter.calibration_offset()
        );

        Ok(Self {
            dac: DigitalToAnalogConverter::new(&config),
            crossbar,
            subtractors,
            converter,
            input_stage,
            config,
        })
    }

    pub fn config(&self) -> &PeConfig {
        &self.config
    }

    pub fn crossbar(&self) -> &CrossbarArray {
        &self.crossbar
    }

    pub fn converter(&self) -> &RampConverter {
        &self.converter
    }

    /// Program the crossbar. A rejected matrix leaves the old weights in place.
    pub fn set_weights(&mut self, matrix: WeightMatrix) -> PeResult<()> {
        self.crossbar.set_weights(matrix)?;
        log::info!(
            "[Pipeline] Programmed {}x{} weights",
            self.crossbar.rows(),
            self.crossbar.columns()
        );
        Ok(())
    }

    /// Generate a matrix from `source` and program it.
    pub fn program_from(&mut self, source: &mut dyn WeightSource) -> PeResult<()> {
        let matrix = source.generate(
            self.crossbar.rows(),
            self.crossbar.columns(),
            self.crossbar.max_weight(),
        );
        self.set_weights(matrix)
    }

    /// Drive `digital_inputs[i]` onto row `selected_rows[i]` and convert every
    /// column pair.
    pub fn process_inputs(
        &mut self,
        digital_inputs: &[u64],
        selected_rows: &[usize],
    ) -> PeResult<PipelineRun> {
        if digital_inputs.len() != selected_rows.len() {
            return Err(PeError::LengthMismatch {
                inputs: digital_inputs.len(),
                rows: selected_rows.len(),
            });
        }
        if digital_inputs.is_empty() {
            return Ok(PipelineRun {
                outputs: Vec::new(),
                metrics: self.metrics(0.0),
            });
        }

        // Validate the whole drive before touching any component state.
        for (&input, &row) in digital_inputs.iter().zip(selected_rows) {
            self.crossbar.check_row(row)?;
            let pulse = self.dac.convert(input)?;
            log::trace!("[DAC] row {row}: code {input} -> {pulse} ns pulse");
        }
        let row_drive = digital_inputs
            .iter()
            .map(|&input| self.input_stage.decode(input))
            .collect::<PeResult<Vec<u64>>>()?;
        for &input in digital_inputs {
            self.input_stage.record(input);
        }

        let mut subtracted = Vec::with_capacity(self.subtractors.len());
        for (pair, subtractor) in self.subtractors.iter_mut().enumerate() {
            let column = pair * 2;
            let first = self.crossbar.column_sum(&row_drive, selected_rows, column)?;
            let second = self.crossbar.column_sum(&row_drive, selected_rows, column + 1)?;
            let value = subtractor.subtract(first, second);
            log::trace!("[Subtractor {pair}] {first} - {second} = {value}");
            subtracted.push(value);
        }

        let mut outputs = Vec::with_capacity(subtracted.len());
        let mut max_operation_time: f64 = 0.0;
        for value in subtracted {
            let conversion = self.converter.convert(value);
            max_operation_time = max_operation_time.max(conversion.elapsed);
            outputs.push(conversion.code);
        }

        log::debug!(
            "[Pipeline] {} rows driven, {} pairs converted, operation time {max_operation_time}",
            selected_rows.len(),
            outputs.len()
        );

        Ok(PipelineRun {
            outputs,
            metrics: self.metrics(max_operation_time),
        })
    }

    /// Energy / delay / power / area of the element for a run of `operation_time`.
    pub fn metrics(&self, operation_time: f64) -> MetricsReport {
        let serial: [&dyn CostModel; 6] = [
            &self.input_stage,
            &self.dac,
            &self.crossbar,
            self.converter.ramp(),
            self.converter.comparator(),
            self.converter.tdc(),
        ];
        let parallel: Vec<&dyn CostModel> = self
            .subtractors
            .iter()
            .map(|s| s as &dyn CostModel)
            .collect();
        MetricsAggregator::aggregate(&serial, &parallel, operation_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn scenario_config() -> PeConfig {
        let mut config = PeConfig::default();
        config.system.time_step = 0.1;
        config.dac.num_bits = 8;
        config.dac.pulse_period = 1.0;
        config.crossbar.array_rows = 2;
        config.crossbar.array_columns = 4;
        config.crossbar.cell_weight_bits = 2;
        config.crossbar.vin = 1.0;
        config.crossbar.r_on = 1.0;
        config.crossbar.capacitance = 1.0;
        config.crossbar.a = 1.0;
        config.crossbar.on_off_ratio = 1.0;
        config.ramp.slope = 1.0;
        config.tdc.num_tdc = 8;
        config.tdc.time_precision = 0.1;
        config.quantization = None;
        config
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut pe = PwmPipeline::new(scenario_config()).unwrap();
        let err = pe.process_inputs(&[1, 2], &[0]).unwrap_err();
        assert!(matches!(err, PeError::LengthMismatch { inputs: 2, rows: 1 }));
    }

    #[test]
    fn empty_drive_is_a_no_op() {
        let mut pe = PwmPipeline::new(scenario_config()).unwrap();
        let run = pe.process_inputs(&[], &[]).unwrap();
        assert!(run.outputs.is_empty());
        assert_eq!(run.metrics.operation_time, 0.0);
    }

    #[test]
    fn one_output_per_column_pair() {
        let mut pe = PwmPipeline::new(scenario_config()).unwrap();
        pe.set_weights(array![[3, 0, 1, 0], [0, 0, 2, 0]]).unwrap();
        let run = pe.process_inputs(&[5, 4], &[0, 1]).unwrap();
        assert_eq!(run.outputs, vec![150, 130]);
        // 151 steps of 0.1 ns to reach 15 V
        assert!((run.metrics.operation_time - 15.1).abs() < 1e-9);
    }

    #[test]
    fn input_wider_than_dac_fails_whole_call() {
        let mut pe = PwmPipeline::new(scenario_config()).unwrap();
        let err = pe.process_inputs(&[1, 256], &[0, 1]).unwrap_err();
        assert!(matches!(err, PeError::Range { value: 256, max: 255, .. }));
        assert!(pe.converter().comparator().last_comparison().is_none());
    }

    #[test]
    fn unknown_row_is_rejected() {
        let mut pe = PwmPipeline::new(scenario_config()).unwrap();
        let err = pe.process_inputs(&[1], &[2]).unwrap_err();
        assert!(matches!(err, PeError::Range { value: 2, max: 1, .. }));
    }

    #[test]
    fn too_few_subtractor_units_fail_construction() {
        let mut config = scenario_config();
        config.subtractor.num_units = 1;
        assert!(matches!(
            PwmPipeline::new(config),
            Err(PeError::Capacity {
                required: 2,
                available: 1,
                ..
            })
        ));
    }

    #[test]
    fn decoder_drives_one_hot_rows() {
        let mut pe = PwmPipeline::with_decoder(scenario_config()).unwrap();
        pe.set_weights(array![[1, 0, 0, 0], [0, 0, 1, 0]]).unwrap();
        // 2^3 = 8 on row 0, 2^2 = 4 on row 1
        let run = pe.process_inputs(&[3, 2], &[0, 1]).unwrap();
        assert_eq!(run.outputs, vec![80, 40]);
    }

    #[test]
    fn failed_decode_leaves_metrics_untouched() {
        let mut pe = PwmPipeline::with_decoder(scenario_config()).unwrap();
        pe.set_weights(array![[1, 0, 0, 0], [0, 0, 1, 0]]).unwrap();
        pe.process_inputs(&[2, 1], &[0, 1]).unwrap();
        let before = pe.metrics(0.0);

        // Second input selects line 64: the whole call fails.
        let err = pe.process_inputs(&[3, 64], &[0, 1]).unwrap_err();
        assert!(matches!(err, PeError::Range { value: 64, .. }));
        assert_eq!(pe.metrics(0.0), before);
    }

    #[test]
    fn sub_offset_is_removed_from_crossed_codes() {
        let mut config = scenario_config();
        config.subtractor.sub_offset = 5.0;
        let mut pe = PwmPipeline::new(config).unwrap();
        assert_eq!(pe.converter().calibration_offset(), 5.0);
        pe.set_weights(array![[1, 0, 0, 0], [0, 0, 0, 0]]).unwrap();
        let run = pe.process_inputs(&[2], &[0]).unwrap();
        // column 0 crosses at 2.0 ns (20 ticks), column 2 at 0
        assert_eq!(run.outputs, vec![15, 0]);
    }

    #[test]
    fn metrics_aggregate_components() {
        let mut pe = PwmPipeline::new(scenario_config()).unwrap();
        pe.set_weights(array![[1, 0, 0, 0], [0, 0, 0, 0]]).unwrap();
        let run = pe.process_inputs(&[1], &[0]).unwrap();
        let metrics = run.metrics;

        // dac + crossbar + max(subtractor) + ramp + comparator + tdc
        let delay = 1e-9 + 1.0 + 0.5e-9 + 0.1 + 0.02 + 0.1;
        assert!((metrics.delay - delay).abs() < 1e-12);
        let power = 0.1 + 0.5 + 0.1 + 0.2 + 0.1 + 0.05;
        assert!((metrics.power - power).abs() < 1e-12);
        // both subtractors count toward area
        let area = 0.1 + 0.5 + 2.0 * 0.1 + 0.3e-12 + 0.1 + 0.1;
        assert!((metrics.area - area).abs() < 1e-12);
        assert!(metrics.energy > 0.0);
        assert!(metrics.energy.is_finite());
    }
}
