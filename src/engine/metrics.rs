// Energy / Delay / Power / Area Accounting
use serde::Serialize;

/// Analytic cost model shared by every hardware component.
///
/// `operation_time` is the longest conversion window of the run (ns); only
/// components whose energy depends on activity time look at it.
pub trait CostModel {
    fn energy(&self, operation_time: f64) -> f64;
    fn delay(&self) -> f64;
    fn power(&self) -> f64;
    fn area(&self) -> f64;
}

/// Aggregate figures for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricsReport {
    pub energy: f64,
    pub delay: f64,
    pub power: f64,
    pub area: f64,
    pub operation_time: f64,
}

/// Folds component cost models into a [`MetricsReport`].
///
/// Units in `serial` form the signal chain and all add up. Units in
/// `parallel` operate side by side (the subtractor bank): their energy and
/// area still add up, but only the slowest / hungriest one contributes to
/// delay and power.
pub struct MetricsAggregator;

impl MetricsAggregator {
    pub fn aggregate(
        serial: &[&dyn CostModel],
        parallel: &[&dyn CostModel],
        operation_time: f64,
    ) -> MetricsReport {
        let all = || serial.iter().chain(parallel.iter());

        let energy = all().map(|c| c.energy(operation_time)).sum();
        let area = all().map(|c| c.area()).sum();

        let delay = serial.iter().map(|c| c.delay()).sum::<f64>()
            + parallel.iter().map(|c| c.delay()).fold(0.0, f64::max);
        let power = serial.iter().map(|c| c.power()).sum::<f64>()
            + parallel.iter().map(|c| c.power()).fold(0.0, f64::max);

        MetricsReport {
            energy,
            delay,
            power,
            area,
            operation_time,
        }
    }
}
