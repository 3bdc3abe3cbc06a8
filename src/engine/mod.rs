// Module Definition
pub mod conversion; // Ramp generator, comparator and TDC state machine
pub mod crossbar;
pub mod dac;
pub mod decoder; // Optional input pre-processing (address decoder)
pub mod metrics;
pub mod pipeline; // Main logic binding DAC, crossbar, subtractors and conversion
pub mod quantization;
pub mod subtractor;
pub mod weights;

#[cfg(feature = "python")]
pub mod controller;
