// Memristive Crossbar Array
use ndarray::{Array2, ArrayView2};

use crate::config::{ActiveColumns, PeConfig};
use crate::engine::metrics::CostModel;
use crate::error::{PeError, PeResult};

/// Cell values of the crossbar, `rows x columns`.
pub type WeightMatrix = Array2<u32>;

/// Holds the programmed weights and the electrical parameters of the array.
///
/// Columns are read in pairs `(2k, 2k + 1)`. Only the column selected by
/// [`ActiveColumns`] conducts; its partner is tied to zero and is the
/// baseline the differential subtractor compares against.
#[derive(Debug, Clone)]
pub struct CrossbarArray {
    weights: WeightMatrix,
    max_weight: u32,
    active_columns: ActiveColumns,
    vin: f64,
    pulse_period: f64,
    r_on: f64,
    capacitance: f64,
    a: f64,
    on_off_ratio: f64,
    vdd: f64,
}

impl CrossbarArray {
    /// An array of the configured shape with every cell erased.
    pub fn new(config: &PeConfig) -> Self {
        let xbar = &config.crossbar;
        Self {
            weights: Array2::zeros((xbar.array_rows, xbar.array_columns)),
            max_weight: config.max_cell_weight(),
            active_columns: xbar.active_columns,
            vin: xbar.vin,
            pulse_period: config.dac.pulse_period,
            r_on: xbar.r_on,
            capacitance: xbar.capacitance,
            a: xbar.a,
            on_off_ratio: xbar.on_off_ratio,
            vdd: config.system.vdd,
        }
    }

    pub fn rows(&self) -> usize {
        self.weights.nrows()
    }

    pub fn columns(&self) -> usize {
        self.weights.ncols()
    }

    pub fn max_weight(&self) -> u32 {
        self.max_weight
    }

    pub fn weights(&self) -> &WeightMatrix {
        &self.weights
    }

    /// Replace the stored weights. On error the previous weights are kept.
    pub fn set_weights(&mut self, matrix: WeightMatrix) -> PeResult<()> {
        self.check_shape(matrix.nrows(), matrix.ncols())?;
        if let Some(((row, col), &value)) = matrix
            .indexed_iter()
            .find(|&(_, &value)| value > self.max_weight)
        {
            return Err(PeError::range(
                format!("weight[{row}][{col}]"),
                value,
                u64::from(self.max_weight),
            ));
        }
        self.weights = matrix;
        Ok(())
    }

    /// Validate a signed matrix (as handed over from numpy) into cell values.
    pub fn weights_from_signed(&self, matrix: ArrayView2<'_, i64>) -> PeResult<WeightMatrix> {
        self.check_shape(matrix.nrows(), matrix.ncols())?;
        let max = i64::from(self.max_weight);
        if let Some(((row, col), &value)) = matrix
            .indexed_iter()
            .find(|&(_, &value)| !(0..=max).contains(&value))
        {
            return Err(PeError::range(
                format!("weight[{row}][{col}]"),
                value,
                u64::from(self.max_weight),
            ));
        }
        Ok(matrix.mapv(|value| value as u32))
    }

    /// Analog output of one unit input through one unit-weight cell.
    pub fn unit_contribution(&self) -> f64 {
        self.scale() / self.on_off_ratio
    }

    /// Whether `column` is the conducting column of its pair.
    pub fn is_active_column(&self, column: usize) -> bool {
        match self.active_columns {
            ActiveColumns::Even => column % 2 == 0,
            ActiveColumns::Odd => column % 2 == 1,
        }
    }

    /// Accumulated analog value of `column` for the given row drive.
    ///
    /// Each `(inputs[i], rows[i])` pair contributes
    /// `(vin * pulse_period / (Ron * C * A)) * (input * weight) / on_off_ratio`.
    pub fn column_sum(&self, inputs: &[u64], rows: &[usize], column: usize) -> PeResult<f64> {
        if inputs.len() != rows.len() {
            return Err(PeError::LengthMismatch {
                inputs: inputs.len(),
                rows: rows.len(),
            });
        }
        if column >= self.columns() {
            return Err(PeError::range(
                "column index",
                column as u64,
                (self.columns() - 1) as u64,
            ));
        }
        for &row in rows {
            self.check_row(row)?;
        }
        if !self.is_active_column(column) {
            return Ok(0.0);
        }

        let scale = self.scale();
        let column_sum = inputs
            .iter()
            .zip(rows)
            .map(|(&input, &row)| {
                let weighted = input as f64 * f64::from(self.weights[[row, column]]);
                scale * weighted / self.on_off_ratio
            })
            .sum();
        Ok(column_sum)
    }

    pub fn check_row(&self, row: usize) -> PeResult<()> {
        if row >= self.rows() {
            return Err(PeError::range(
                "selected row",
                row as u64,
                (self.rows() - 1) as u64,
            ));
        }
        Ok(())
    }

    fn check_shape(&self, rows: usize, columns: usize) -> PeResult<()> {
        if (rows, columns) != self.weights.dim() {
            return Err(PeError::Shape {
                rows: self.rows(),
                columns: self.columns(),
                actual_rows: rows,
                actual_columns: columns,
            });
        }
        Ok(())
    }

    fn scale(&self) -> f64 {
        (self.vin * self.pulse_period) / (self.r_on * self.capacitance * self.a)
    }
}

impl CostModel for CrossbarArray {
    /// Charging every column capacitor of the array for one active row.
    fn energy(&self, _operation_time: f64) -> f64 {
        0.5 * self.capacitance * self.columns() as f64 * self.vdd.powi(2) * self.rows() as f64
    }

    fn delay(&self) -> f64 {
        self.r_on * self.capacitance
    }

    fn power(&self) -> f64 {
        0.5
    }

    fn area(&self) -> f64 {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn unit_config(rows: usize, columns: usize, cell_bits: u32) -> PeConfig {
        let mut config = PeConfig::default();
        config.crossbar.array_rows = rows;
        config.crossbar.array_columns = columns;
        config.crossbar.cell_weight_bits = cell_bits;
        config.crossbar.vin = 1.0;
        config.crossbar.r_on = 1.0;
        config.crossbar.capacitance = 1.0;
        config.crossbar.a = 1.0;
        config.crossbar.on_off_ratio = 1.0;
        config.dac.pulse_period = 1.0;
        config
    }

    #[test]
    fn column_sum_weights_each_row() {
        let mut xbar = CrossbarArray::new(&unit_config(2, 4, 2));
        xbar.set_weights(array![[3, 0, 1, 0], [0, 0, 2, 0]]).unwrap();

        assert_eq!(xbar.column_sum(&[5, 4], &[0, 1], 0).unwrap(), 15.0);
        assert_eq!(xbar.column_sum(&[5, 4], &[0, 1], 2).unwrap(), 13.0);
        // Order of the row selection does not matter.
        assert_eq!(xbar.column_sum(&[4, 5], &[1, 0], 2).unwrap(), 13.0);
    }

    #[test]
    fn reference_column_is_forced_to_zero() {
        let mut xbar = CrossbarArray::new(&unit_config(1, 2, 3));
        xbar.set_weights(array![[2, 7]]).unwrap();
        assert_eq!(xbar.column_sum(&[3], &[0], 1).unwrap(), 0.0);

        let mut config = unit_config(1, 2, 3);
        config.crossbar.active_columns = ActiveColumns::Odd;
        let mut xbar = CrossbarArray::new(&config);
        xbar.set_weights(array![[2, 7]]).unwrap();
        assert_eq!(xbar.column_sum(&[3], &[0], 0).unwrap(), 0.0);
        assert_eq!(xbar.column_sum(&[3], &[0], 1).unwrap(), 21.0);
    }

    #[test]
    fn electrical_scale_applies() {
        let mut config = unit_config(1, 2, 4);
        config.crossbar.vin = 0.5;
        config.crossbar.r_on = 2.0;
        config.crossbar.on_off_ratio = 10.0;
        let mut xbar = CrossbarArray::new(&config);
        xbar.set_weights(array![[4, 0]]).unwrap();
        // (0.5 * 1 / 2) * (2 * 4) / 10
        assert_eq!(xbar.unit_contribution(), 0.025);
        assert_eq!(xbar.column_sum(&[2], &[0], 0).unwrap(), 0.2);
    }

    #[test]
    fn set_weights_rejects_wrong_shape() {
        let mut xbar = CrossbarArray::new(&unit_config(2, 4, 2));
        let err = xbar.set_weights(Array2::zeros((2, 2))).unwrap_err();
        assert!(matches!(
            err,
            PeError::Shape {
                rows: 2,
                columns: 4,
                actual_rows: 2,
                actual_columns: 2
            }
        ));
    }

    #[test]
    fn set_weights_rejects_value_above_cell_max() {
        let mut xbar = CrossbarArray::new(&unit_config(2, 2, 2));
        xbar.set_weights(array![[1, 0], [2, 0]]).unwrap();

        let err = xbar.set_weights(array![[1, 0], [4, 0]]).unwrap_err();
        assert!(matches!(err, PeError::Range { value: 4, max: 3, .. }));
        assert!(err.to_string().contains("weight[1][0]"));
        // Previous weights survive a rejected update.
        assert_eq!(xbar.weights(), &array![[1, 0], [2, 0]]);
    }

    #[test]
    fn signed_weights_reject_negatives() {
        let xbar = CrossbarArray::new(&unit_config(1, 2, 2));
        let ok = xbar.weights_from_signed(array![[3i64, 0]].view()).unwrap();
        assert_eq!(ok, array![[3u32, 0]]);
        let err = xbar.weights_from_signed(array![[-1i64, 0]].view()).unwrap_err();
        assert!(matches!(err, PeError::Range { value: -1, .. }));
    }

    #[test]
    fn column_sum_validates_arguments() {
        let xbar = CrossbarArray::new(&unit_config(2, 4, 2));
        assert!(matches!(
            xbar.column_sum(&[1, 2], &[0], 0),
            Err(PeError::LengthMismatch { inputs: 2, rows: 1 })
        ));
        assert!(matches!(
            xbar.column_sum(&[1], &[2], 0),
            Err(PeError::Range { value: 2, max: 1, .. })
        ));
        assert!(xbar.column_sum(&[1], &[0], 4).is_err());
    }
}
