//! Configuration for the processing element.
//!
//! A configuration is read once per run and shared read-only by every
//! component. Sections and keys mirror the hardware description files:
//!
//! ```toml
//! [System]
//! Vdd = 1.8
//! time_step = 0.01
//!
//! [DAC]
//! num_bits = 4
//! pulse_period = 1.0
//!
//! [Crossbar]
//! Ron = 5000.0
//! Roff = 50000.0
//! on_off_ratio = 10.0
//! capacitance = 0.0001
//! array_rows = 32
//! array_columns = 32
//! A = 1.0
//! vin = 0.5
//! cell_weight_bits = 4
//!
//! [Subtractor]
//! sub_offset = 0.0
//!
//! [RampGenerator]
//! slope = 1.0
//!
//! [TDC]
//! num_tdc = 8
//! time_precision = 0.1
//!
//! [Quantization]
//! chunk_size = 4
//! weight_bits = 16
//! input_bits = 16
//! ```
//!
//! Only structural checks are made here (see [`PeConfig::validate`]); value
//! checks on weights and inputs happen at the component that consumes them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PeError, PeResult};

/// Which column of every `(2k, 2k + 1)` pair carries analog current.
///
/// The other column of the pair is tied to zero and serves as the baseline
/// for the differential subtractor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveColumns {
    #[default]
    Even,
    Odd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(rename = "Vdd")]
    pub vdd: f64,
    /// Fixed increment of the ramp search, in ns.
    pub time_step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DacConfig {
    pub num_bits: u32,
    pub pulse_period: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossbarConfig {
    #[serde(rename = "Ron")]
    pub r_on: f64,
    #[serde(rename = "Roff")]
    pub r_off: f64,
    pub on_off_ratio: f64,
    pub capacitance: f64,
    pub array_rows: usize,
    pub array_columns: usize,
    #[serde(rename = "A")]
    pub a: f64,
    pub vin: f64,
    /// Bits stored per physical cell. Direct (unquantized) configs spell it `weight_bits`.
    #[serde(alias = "weight_bits")]
    pub cell_weight_bits: u32,
    #[serde(default)]
    pub active_columns: ActiveColumns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtractorConfig {
    /// Analog offset of the subtractor; removed from every crossed code.
    pub sub_offset: f64,
    /// Physical subtractor units available to the column pairs.
    pub num_units: usize,
    pub p1: f64,
    pub p2: f64,
    pub p3: f64,
    pub p4: f64,
}

impl Default for SubtractorConfig {
    fn default() -> Self {
        Self {
            sub_offset: 0.0,
            num_units: 16,
            p1: 1.0,
            p2: 1.0,
            p3: 1.0,
            p4: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampConfig {
    /// V/ns
    pub slope: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdcConfig {
    pub num_tdc: u32,
    pub time_precision: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationConfig {
    /// Bits of input fed through the DAC per cycle.
    pub chunk_size: u32,
    /// Logical width of a weight before it is split over cells.
    pub weight_bits: u32,
    /// Logical width of an input before it is split over cycles.
    pub input_bits: u32,
}

/// Complete processing element configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeConfig {
    #[serde(rename = "System")]
    pub system: SystemConfig,
    #[serde(rename = "DAC")]
    pub dac: DacConfig,
    #[serde(rename = "Crossbar")]
    pub crossbar: CrossbarConfig,
    #[serde(rename = "Subtractor", default)]
    pub subtractor: SubtractorConfig,
    #[serde(rename = "RampGenerator")]
    pub ramp: RampConfig,
    #[serde(rename = "TDC")]
    pub tdc: TdcConfig,
    #[serde(rename = "Quantization", default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<QuantizationConfig>,
}

impl Default for PeConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig {
                vdd: 1.8,
                time_step: 0.01,
            },
            dac: DacConfig {
                num_bits: 4,
                pulse_period: 1.0,
            },
            crossbar: CrossbarConfig {
                r_on: 5e3,
                r_off: 50e3,
                on_off_ratio: 10.0,
                capacitance: 1e-4,
                array_rows: 32,
                array_columns: 32,
                a: 1.0,
                vin: 0.5,
                cell_weight_bits: 4,
                active_columns: ActiveColumns::Even,
            },
            subtractor: SubtractorConfig::default(),
            ramp: RampConfig { slope: 1.0 },
            tdc: TdcConfig {
                num_tdc: 8,
                time_precision: 0.1,
            },
            quantization: Some(QuantizationConfig {
                chunk_size: 4,
                weight_bits: 16,
                input_bits: 16,
            }),
        }
    }
}

impl PeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> PeResult<Self> {
        let config: PeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> PeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!(
            "Loaded PE config from {} ({}x{} crossbar)",
            path.display(),
            config.crossbar.array_rows,
            config.crossbar.array_columns
        );
        Ok(config)
    }

    /// Structural checks that every component relies on.
    pub fn validate(&self) -> PeResult<()> {
        let xbar = &self.crossbar;
        if xbar.array_rows == 0 {
            return Err(PeError::invalid("Crossbar.array_rows", "must be at least 1"));
        }
        if xbar.array_columns == 0 || xbar.array_columns % 2 != 0 {
            return Err(PeError::invalid(
                "Crossbar.array_columns",
                format!("{} is not a positive even count", xbar.array_columns),
            ));
        }
        check_bits("Crossbar.cell_weight_bits", xbar.cell_weight_bits, 32)?;
        check_bits("DAC.num_bits", self.dac.num_bits, 63)?;
        check_bits("TDC.num_tdc", self.tdc.num_tdc, 32)?;

        check_positive("System.time_step", self.system.time_step)?;
        check_positive("TDC.time_precision", self.tdc.time_precision)?;
        check_positive("RampGenerator.slope", self.ramp.slope)?;
        check_positive("Crossbar.Ron", xbar.r_on)?;
        check_positive("Crossbar.capacitance", xbar.capacitance)?;
        check_positive("Crossbar.A", xbar.a)?;
        check_positive("Crossbar.on_off_ratio", xbar.on_off_ratio)?;

        if let Some(quant) = &self.quantization {
            check_bits("Quantization.chunk_size", quant.chunk_size, 64)?;
            check_bits("Quantization.weight_bits", quant.weight_bits, 64)?;
            check_bits("Quantization.input_bits", quant.input_bits, 64)?;
            if quant.input_bits % quant.chunk_size != 0 {
                return Err(PeError::invalid(
                    "Quantization.chunk_size",
                    format!(
                        "{} does not divide input_bits = {}",
                        quant.chunk_size, quant.input_bits
                    ),
                ));
            }
            let cell_bits = xbar.cell_weight_bits;
            let padded_weight_bits = quant.weight_bits.div_ceil(cell_bits) * cell_bits;
            if padded_weight_bits > 64 {
                return Err(PeError::invalid(
                    "Quantization.weight_bits",
                    format!(
                        "{} bits pad to {padded_weight_bits} over {cell_bits}-bit cells, limit is 64",
                        quant.weight_bits
                    ),
                ));
            }
            if quant.chunk_size > self.dac.num_bits {
                return Err(PeError::invalid(
                    "Quantization.chunk_size",
                    format!(
                        "{}-bit chunks do not fit a {}-bit DAC",
                        quant.chunk_size, self.dac.num_bits
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Number of `(even, odd)` column pairs, i.e. subtractors in use.
    pub fn column_pairs(&self) -> usize {
        self.crossbar.array_columns / 2
    }

    /// Largest value a single crossbar cell can hold.
    pub fn max_cell_weight(&self) -> u32 {
        low_mask(self.crossbar.cell_weight_bits) as u32
    }

    /// Largest digital code the DAC accepts in one cycle.
    pub fn max_dac_code(&self) -> u64 {
        low_mask(self.dac.num_bits)
    }

    /// Largest TDC output, reported on saturation.
    pub fn max_tdc_code(&self) -> u32 {
        low_mask(self.tdc.num_tdc) as u32
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# Processing element configuration

[System]
Vdd = 1.8
# Ramp search step (ns)
time_step = 0.01

[DAC]
num_bits = 4
pulse_period = 1.0

[Crossbar]
Ron = 5000.0
Roff = 50000.0
on_off_ratio = 10.0
capacitance = 0.0001
array_rows = 32
array_columns = 32
A = 1.0
vin = 0.5
cell_weight_bits = 4
# active_columns = "even"

[Subtractor]
sub_offset = 0.0
# num_units = 16

[RampGenerator]
slope = 1.0

[TDC]
num_tdc = 8
time_precision = 0.1

# Only needed for bit-sliced weights/inputs
[Quantization]
chunk_size = 4
weight_bits = 16
input_bits = 16
"#
        .to_string()
    }
}

/// `2^bits - 1`, saturating at `u64::MAX` for 64 bits.
pub(crate) fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn check_bits(key: &'static str, bits: u32, max: u32) -> PeResult<()> {
    if bits == 0 || bits > max {
        return Err(PeError::invalid(key, format!("{bits} is not in 1..={max}")));
    }
    Ok(())
}

fn check_positive(key: &'static str, value: f64) -> PeResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(PeError::invalid(key, format!("{value} must be finite and > 0")));
    }
    Ok(())
}
