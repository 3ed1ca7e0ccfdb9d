//! CSV report adapter: one file per record kind.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::error::RotatorError;
use crate::ports::report_port::{ReportContext, ReportPort};

pub const EQUITY_FILE: &str = "equity.csv";
pub const WEEKLY_FILE: &str = "weekly.csv";
pub const TRADES_FILE: &str = "trades.csv";
pub const DECISIONS_FILE: &str = "decisions.csv";
pub const ORDERS_FILE: &str = "orders.csv";
pub const SKIPPED_FILE: &str = "skipped.csv";

#[derive(Debug, Serialize)]
struct WeeklyRow {
    week_start: NaiveDate,
    signal_date: NaiveDate,
    portfolio_value: f64,
    cash: f64,
    total_return: f64,
    max_drawdown: f64,
    holdings: usize,
    decisions: usize,
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, report: &ReportContext<'_>, output_dir: &Path) -> Result<(), RotatorError> {
        let result = report.result;
        fs::create_dir_all(output_dir)?;

        write_rows(&output_dir.join(EQUITY_FILE), &result.portfolio.equity_curve)?;
        write_rows(
            &output_dir.join(WEEKLY_FILE),
            result.weeks.iter().map(|w| WeeklyRow {
                week_start: w.week_start,
                signal_date: w.signal_date,
                portfolio_value: w.portfolio_value,
                cash: w.cash,
                total_return: w.total_return,
                max_drawdown: w.max_drawdown,
                holdings: w.holdings.len(),
                decisions: w.decisions.len(),
            }),
        )?;
        write_rows(&output_dir.join(TRADES_FILE), &result.trades())?;
        write_rows(
            &output_dir.join(DECISIONS_FILE),
            result.weeks.iter().flat_map(|w| w.decisions.iter()),
        )?;
        write_rows(&output_dir.join(ORDERS_FILE), &result.orders)?;
        write_rows(&output_dir.join(SKIPPED_FILE), &result.skipped)?;

        tracing::info!(dir = %output_dir.display(), "csv reports written");
        Ok(())
    }
}

fn write_rows<I, T>(path: &Path, rows: I) -> Result<(), RotatorError>
where
    I: IntoIterator<Item = T>,
    T: Serialize,
{
    let report_err = |e: csv::Error| RotatorError::Report {
        reason: format!("failed to write {}: {}", path.display(), e),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(report_err)?;
    for row in rows {
        wtr.serialize(row).map_err(report_err)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{BacktestResult, RunStatus, SkippedLookup};
    use crate::domain::costs::{CostSchedule, CostSummary, TaxSchedule};
    use crate::domain::ledger::CapitalLedger;
    use crate::domain::metrics::Metrics;
    use crate::domain::order::Side;
    use crate::domain::portfolio::Portfolio;
    use crate::domain::strategy::Strategy;
    use crate::domain::trade::{Fill, FillKind};
    use tempfile::TempDir;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn fill(side: Side, day: u32, price: f64, kind: FillKind) -> Fill {
        Fill {
            date: date(day),
            symbol: "INFY".into(),
            side,
            units: 10,
            price,
            kind,
        }
    }

    fn sample_result() -> BacktestResult {
        let mut portfolio = Portfolio::new(CapitalLedger::seeded(date(1), 10_000.0));
        portfolio.fills.push(fill(Side::Buy, 8, 100.0, FillKind::Entry));
        portfolio.fills.push(fill(Side::Sell, 10, 94.05, FillKind::HardStop));
        portfolio.record_equity(date(12), 9_940.5);
        BacktestResult {
            portfolio,
            weeks: Vec::new(),
            orders: Vec::new(),
            skipped: vec![SkippedLookup {
                date: date(5),
                symbol: Some("TCS".into()),
                reason: "feed timeout".into(),
            }],
            status: RunStatus::Completed,
            initial_capital: 10_000.0,
        }
    }

    #[test]
    fn writes_all_files() {
        let dir = TempDir::new().unwrap();
        let result = sample_result();
        let metrics = Metrics::from_result(&result, date(1), 0.06);
        let costs = CostSummary::compute(
            &result.portfolio.fills,
            &result.trades(),
            -59.5,
            10_000.0,
            &CostSchedule::default(),
            &TaxSchedule::default(),
        );
        let strategy = Strategy::default();
        let report = ReportContext {
            result: &result,
            metrics: &metrics,
            costs: &costs,
            strategy: &strategy,
        };
        CsvReportAdapter::new().write(&report, dir.path()).unwrap();

        for name in [
            EQUITY_FILE,
            WEEKLY_FILE,
            TRADES_FILE,
            DECISIONS_FILE,
            ORDERS_FILE,
            SKIPPED_FILE,
        ] {
            assert!(dir.path().join(name).is_file(), "{name} missing");
        }

        let equity = fs::read_to_string(dir.path().join(EQUITY_FILE)).unwrap();
        assert!(equity.starts_with("date,portfolio_value\n2024-01-12,9940.5"));

        let trades = fs::read_to_string(dir.path().join(TRADES_FILE)).unwrap();
        let mut lines = trades.lines();
        assert!(lines.next().unwrap().starts_with("symbol,entry_date,exit_date"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("INFY,2024-01-08,2024-01-10,10,100.0,94.05"));
        assert!(row.ends_with(",2,HardStop"));

        let skipped = fs::read_to_string(dir.path().join(SKIPPED_FILE)).unwrap();
        assert!(skipped.contains("2024-01-05,TCS,feed timeout"));
    }
}
