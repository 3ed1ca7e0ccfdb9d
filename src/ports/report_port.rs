//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::costs::CostSummary;
use crate::domain::error::RotatorError;
use crate::domain::metrics::Metrics;
use crate::domain::strategy::Strategy;
use std::path::Path;

/// Everything a report writer may render.
pub struct ReportContext<'a> {
    pub result: &'a BacktestResult,
    pub metrics: &'a Metrics,
    pub costs: &'a CostSummary,
    pub strategy: &'a Strategy,
}

/// Port for writing backtest reports into `output_dir`.
pub trait ReportPort {
    fn write(&self, report: &ReportContext<'_>, output_dir: &Path) -> Result<(), RotatorError>;
}
