//! Bit-slicing of wide weights and inputs onto narrow hardware.
//!
//! Weights wider than a cell are split into `cell_weight_bits` chunks, most
//! significant chunk first, and laid out along the conducting column of
//! consecutive pairs:
//!
//! ```text
//!            pair 0      pair 1      pair 2      pair 3
//!   row r   [c0 | 0]    [c1 | 0]    [c0'| 0]    [c1'| 0]    ...
//!            \___ weight i ___/      \__ weight i+1 _/
//! ```
//!
//! Inputs wider than the DAC are split into `chunk_size` chunks, least
//! significant chunk first, and every chunk is replayed on the same row.
//! The two orders differ on purpose; they follow the cell programming and
//! the DAC cycle schedule respectively.

use bitvec::prelude::*;
use ndarray::Array2;

use crate::config::{low_mask, ActiveColumns, PeConfig, QuantizationConfig};
use crate::engine::crossbar::WeightMatrix;
use crate::engine::pipeline::{PipelineRun, PwmPipeline};
use crate::error::{PeError, PeResult};

/// Split `value` into `total_bits / chunk_size` chunks of `chunk_size` bits.
///
/// With `msb_first`, chunk `i` holds bits
/// `[total_bits - (i + 1) * chunk_size, total_bits - i * chunk_size)`;
/// otherwise the same chunks come in reverse order. Chunks and the total
/// width are limited to 64 bits, and a chunk must hold at least one bit.
pub fn split_bits(
    value: u64,
    total_bits: u32,
    chunk_size: u32,
    msb_first: bool,
) -> PeResult<Vec<u64>> {
    check_chunk_size(chunk_size)?;
    if total_bits > u64::BITS {
        return Err(PeError::range("total bit width", total_bits, u64::from(u64::BITS)));
    }

    let total = total_bits as usize;
    let chunk = chunk_size as usize;
    let width = (total / chunk) * chunk;

    let bits = value.view_bits::<Lsb0>();
    let mut chunks: Vec<u64> = bits[total - width..total]
        .chunks_exact(chunk)
        .map(|slice| slice.load_le::<u64>())
        .collect();
    if msb_first {
        chunks.reverse();
    }
    Ok(chunks)
}

/// Concatenate chunks produced by [`split_bits`] with the same order.
///
/// Fails when the chunks span more than 64 bits or a chunk does not fit in
/// `chunk_size` bits.
pub fn reconstruct_bits(chunks: &[u64], chunk_size: u32, msb_first: bool) -> PeResult<u64> {
    check_chunk_size(chunk_size)?;
    let chunk = chunk_size as usize;
    let span = chunks.len() * chunk;
    if span > u64::BITS as usize {
        return Err(PeError::range("reconstructed bit width", span as u64, u64::from(u64::BITS)));
    }
    let max_chunk = low_mask(chunk_size);
    if let Some((i, &part)) = chunks.iter().enumerate().find(|&(_, &part)| part > max_chunk) {
        return Err(PeError::range(format!("{chunk_size}-bit chunk #{i}"), part, max_chunk));
    }

    let mut value = 0u64;
    let bits = value.view_bits_mut::<Lsb0>();
    let count = chunks.len();
    for (i, &part) in chunks.iter().enumerate() {
        let position = if msb_first { count - 1 - i } else { i };
        bits[position * chunk..(position + 1) * chunk].store_le(part);
    }
    Ok(value)
}

fn check_chunk_size(chunk_size: u32) -> PeResult<()> {
    if chunk_size == 0 {
        return Err(PeError::invalid("chunk_size", "a chunk must hold at least one bit"));
    }
    if chunk_size > u64::BITS {
        return Err(PeError::range("chunk size", chunk_size, u64::from(u64::BITS)));
    }
    Ok(())
}

/// Where the chunks of a wide weight live in the crossbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightLayout {
    pub weight_bits: u32,
    pub cell_weight_bits: u32,
    pub cells_per_weight: usize,
    pub weights_per_row: usize,
    pub rows: usize,
    pub columns: usize,
    /// 0 when even columns conduct, 1 when odd ones do.
    column_phase: usize,
}

impl WeightLayout {
    pub fn new(config: &PeConfig, quant: &QuantizationConfig) -> Self {
        let cell_weight_bits = config.crossbar.cell_weight_bits;
        let cells_per_weight = quant.weight_bits.div_ceil(cell_weight_bits) as usize;
        let columns = config.crossbar.array_columns;
        Self {
            weight_bits: quant.weight_bits,
            cell_weight_bits,
            cells_per_weight,
            weights_per_row: columns / (2 * cells_per_weight),
            rows: config.crossbar.array_rows,
            columns,
            column_phase: match config.crossbar.active_columns {
                ActiveColumns::Even => 0,
                ActiveColumns::Odd => 1,
            },
        }
    }

    /// Total weight bits the array can hold: one cell per column pair.
    pub fn capacity_bits(&self) -> u64 {
        (self.columns / 2) as u64 * u64::from(self.cell_weight_bits) * self.rows as u64
    }

    /// Crossbar cell `(row, column)` holding chunk `chunk` of weight `index`.
    pub fn cell(&self, index: usize, chunk: usize) -> (usize, usize) {
        let row = index / self.weights_per_row;
        let position = index % self.weights_per_row;
        let column_offset = position * self.cells_per_weight * 2;
        (row, column_offset + chunk * 2 + self.column_phase)
    }

    fn padded_bits(&self) -> u32 {
        self.cells_per_weight as u32 * self.cell_weight_bits
    }

    /// Build the full crossbar matrix for a flat weight list.
    pub fn place(&self, weights: &[u64]) -> PeResult<WeightMatrix> {
        let required = weights.len() as u64 * u64::from(self.weight_bits);
        let available = self.capacity_bits();
        if required > available {
            return Err(PeError::Capacity {
                what: "weights (bits)",
                required,
                available,
            });
        }
        if weights.is_empty() {
            return Ok(Array2::zeros((self.rows, self.columns)));
        }
        if self.weights_per_row == 0 {
            return Err(PeError::Capacity {
                what: "cells per weight (columns)",
                required: (2 * self.cells_per_weight) as u64,
                available: self.columns as u64,
            });
        }
        let rows_needed = weights.len().div_ceil(self.weights_per_row);
        if rows_needed > self.rows {
            return Err(PeError::Capacity {
                what: "weights (rows)",
                required: rows_needed as u64,
                available: self.rows as u64,
            });
        }

        let max_weight = low_mask(self.weight_bits);
        let mut matrix = Array2::zeros((self.rows, self.columns));
        for (index, &weight) in weights.iter().enumerate() {
            if weight > max_weight {
                return Err(PeError::range(
                    format!("{}-bit weight #{index}", self.weight_bits),
                    weight,
                    max_weight,
                ));
            }
            let chunks = split_bits(weight, self.padded_bits(), self.cell_weight_bits, true)?;
            for (chunk_index, chunk) in chunks.into_iter().enumerate() {
                matrix[self.cell(index, chunk_index)] = chunk as u32;
            }
        }
        Ok(matrix)
    }

    /// Reassemble weight `index` from its cells.
    pub fn read_back(&self, matrix: &WeightMatrix, index: usize) -> PeResult<u64> {
        let chunks: Vec<u64> = (0..self.cells_per_weight)
            .map(|chunk| u64::from(matrix[self.cell(index, chunk)]))
            .collect();
        reconstruct_bits(&chunks, self.cell_weight_bits, true)
    }
}

/// A processing element fed with wide weights and inputs.
pub struct QuantizedPipeline {
    inner: PwmPipeline,
    layout: WeightLayout,
    chunk_size: u32,
    input_bits: u32,
}

impl QuantizedPipeline {
    pub fn new(config: PeConfig) -> PeResult<Self> {
        Self::wrap(PwmPipeline::new(config)?)
    }

    /// Add the bit-slicing layer around an existing element.
    pub fn wrap(inner: PwmPipeline) -> PeResult<Self> {
        let quant = inner
            .config()
            .quantization
            .clone()
            .ok_or_else(|| {
                PeError::invalid("Quantization", "section is required for bit-sliced operation")
            })?;
        let layout = WeightLayout::new(inner.config(), &quant);
        log::debug!(
            "[Quantizer] {}-bit weights over {} cells, {} per row; {}-bit inputs in {}-bit chunks",
            quant.weight_bits,
            layout.cells_per_weight,
            layout.weights_per_row,
            quant.input_bits,
            quant.chunk_size
        );
        Ok(Self {
            inner,
            layout,
            chunk_size: quant.chunk_size,
            input_bits: quant.input_bits,
        })
    }

    pub fn pipeline(&self) -> &PwmPipeline {
        &self.inner
    }

    pub fn pipeline_mut(&mut self) -> &mut PwmPipeline {
        &mut self.inner
    }

    pub fn layout(&self) -> &WeightLayout {
        &self.layout
    }

    /// Number of DAC cycles a full-width input needs.
    pub fn cycles(&self) -> usize {
        (self.input_bits / self.chunk_size) as usize
    }

    /// Program a flat list of wide weights. Nothing is written on error.
    pub fn set_weights(&mut self, weights: &[u64]) -> PeResult<()> {
        let matrix = self.layout.place(weights)?;
        self.inner.set_weights(matrix)?;
        log::info!(
            "[Quantizer] Placed {} weights ({} bits each)",
            weights.len(),
            self.layout.weight_bits
        );
        Ok(())
    }

    /// Weight `index` as currently stored in the crossbar.
    pub fn stored_weight(&self, index: usize) -> Option<u64> {
        if self.layout.weights_per_row == 0 || index / self.layout.weights_per_row >= self.layout.rows {
            return None;
        }
        self.layout
            .read_back(self.inner.crossbar().weights(), index)
            .ok()
    }

    /// Replay every LSB-first chunk of every input on its row in one run.
    pub fn process_inputs(&mut self, inputs: &[u64], rows: &[usize]) -> PeResult<PipelineRun> {
        let sliced = self.slice_inputs(inputs, rows)?;
        let mut chunk_inputs = Vec::with_capacity(sliced.len() * self.cycles());
        let mut expanded_rows = Vec::with_capacity(chunk_inputs.capacity());
        for (chunks, &row) in sliced.iter().zip(rows) {
            for &chunk in chunks {
                chunk_inputs.push(chunk);
                expanded_rows.push(row);
            }
        }
        self.inner.process_inputs(&chunk_inputs, &expanded_rows)
    }

    /// One run per DAC cycle; cycle `k` drives the `k`-th LSB-first chunk of
    /// every input.
    pub fn process_cycles(&mut self, inputs: &[u64], rows: &[usize]) -> PeResult<Vec<PipelineRun>> {
        let sliced = self.slice_inputs(inputs, rows)?;
        if sliced.is_empty() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::with_capacity(self.cycles());
        for cycle in 0..self.cycles() {
            let cycle_inputs: Vec<u64> = sliced.iter().map(|chunks| chunks[cycle]).collect();
            log::debug!("[Quantizer] cycle {}/{}: {:?}", cycle + 1, self.cycles(), cycle_inputs);
            runs.push(self.inner.process_inputs(&cycle_inputs, rows)?);
        }
        Ok(runs)
    }

    fn slice_inputs(&self, inputs: &[u64], rows: &[usize]) -> PeResult<Vec<Vec<u64>>> {
        if inputs.len() != rows.len() {
            return Err(PeError::LengthMismatch {
                inputs: inputs.len(),
                rows: rows.len(),
            });
        }
        let max_input = low_mask(self.input_bits);
        inputs
            .iter()
            .zip(rows)
            .map(|(&input, &row)| {
                if input > max_input {
                    return Err(PeError::range(
                        format!("{}-bit input for row {row}", self.input_bits),
                        input,
                        max_input,
                    ));
                }
                split_bits(input, self.input_bits, self.chunk_size, false)
            })
            .collect()
    }
}
