//! Plain-text summary report implementing ReportPort.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::Datelike;

use crate::domain::backtest::RunStatus;
use crate::domain::error::RotatorError;
use crate::domain::metrics::{display_pct, format_ratio};
use crate::domain::portfolio::EquitySample;
use crate::domain::trade::{SymbolResult, Trade};
use crate::ports::report_port::{ReportContext, ReportPort};

pub const REPORT_FILE: &str = "report.txt";

pub struct TextReportAdapter;

impl TextReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for TextReportAdapter {
    fn write(&self, report: &ReportContext<'_>, output_dir: &Path) -> Result<(), RotatorError> {
        fs::create_dir_all(output_dir)?;
        let path = output_dir.join(REPORT_FILE);
        fs::write(&path, render(report)).map_err(|e| RotatorError::Report {
            reason: format!("failed to write {}: {}", path.display(), e),
        })
    }
}

/// Monthly compounded returns keyed by (year, month).
pub fn monthly_returns(equity_curve: &[EquitySample]) -> BTreeMap<(i32, u32), f64> {
    let mut grouped: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for window in equity_curve.windows(2) {
        let (prev, curr) = (&window[0], &window[1]);
        if prev.portfolio_value <= 0.0 {
            continue;
        }
        let growth = curr.portfolio_value / prev.portfolio_value;
        let key = (curr.date.year(), curr.date.month());
        *grouped.entry(key).or_insert(1.0) *= growth;
    }
    grouped.into_iter().map(|(k, g)| (k, g - 1.0)).collect()
}

pub fn render(report: &ReportContext<'_>) -> String {
    let ReportContext {
        result,
        metrics,
        costs,
        strategy,
    } = report;
    let mut out = String::new();

    let _ = writeln!(out, "Backtest report: {}", strategy.name);
    let _ = writeln!(out, "{}", "=".repeat(60));
    match &result.status {
        RunStatus::Completed => {
            let _ = writeln!(out, "Status: completed");
        }
        RunStatus::Aborted { date, reason } => {
            let _ = writeln!(out, "Status: ABORTED on {date}: {reason}");
        }
    }
    if let (Some(first), Some(last)) = (result.weeks.first(), result.weeks.last()) {
        let _ = writeln!(
            out,
            "Weeks: {} ({} to {})",
            result.weeks.len(),
            first.week_start,
            last.week_start
        );
    }

    let _ = writeln!(out, "\nStrategy");
    let _ = writeln!(out, "  max positions:        {}", strategy.max_positions);
    let _ = writeln!(out, "  candidate pool:       {}", strategy.candidate_pool);
    let _ = writeln!(out, "  swap buffer:          {:.2}", strategy.swap_buffer);
    let _ = writeln!(out, "  exit threshold:       {:.1}", strategy.exit_threshold);
    let _ = writeln!(out, "  risk per trade:       {:.2}%", display_pct(strategy.risk_per_trade));
    let _ = writeln!(out, "  pyramiding:           {}", strategy.pyramiding);

    let _ = writeln!(out, "\nPerformance");
    let _ = writeln!(out, "  initial capital:      {:.2}", result.initial_capital);
    let _ = writeln!(out, "  final value:          {:.2}", metrics.final_value);
    let _ = writeln!(out, "  total return:         {:.2}%", display_pct(metrics.total_return));
    let _ = writeln!(out, "  CAGR:                 {:.2}%", display_pct(metrics.cagr));
    let _ = writeln!(out, "  XIRR:                 {:.2}%", display_pct(metrics.xirr));
    let _ = writeln!(out, "  max drawdown:         {:.2}%", display_pct(metrics.max_drawdown));
    let _ = writeln!(out, "  Sharpe:               {}", format_ratio(metrics.sharpe_ratio));
    let _ = writeln!(out, "  Sortino:              {}", format_ratio(metrics.sortino_ratio));
    let _ = writeln!(out, "  Calmar:               {}", format_ratio(metrics.calmar_ratio));

    let _ = writeln!(out, "\nTrades");
    let _ = writeln!(
        out,
        "  total: {}  won: {}  lost: {}",
        metrics.total_trades, metrics.trades_won, metrics.trades_lost
    );
    let _ = writeln!(out, "  win rate:             {:.2}%", display_pct(metrics.win_rate));
    let _ = writeln!(out, "  profit factor:        {}", format_ratio(metrics.profit_factor));
    let _ = writeln!(out, "  expectancy:           {:.2}", metrics.expectancy);
    let _ = writeln!(out, "  avg holding (days):   {:.1}", metrics.avg_holding_days);
    let trades = result.trades();
    let by_return = |a: &&Trade, b: &&Trade| a.return_pct().total_cmp(&b.return_pct());
    if let (Some(best), Some(worst)) = (trades.iter().max_by(by_return), trades.iter().min_by(by_return)) {
        let _ = writeln!(
            out,
            "  best trade:           {} {:+.2}%",
            best.symbol,
            display_pct(best.return_pct())
        );
        let _ = writeln!(
            out,
            "  worst trade:          {} {:+.2}%",
            worst.symbol,
            display_pct(worst.return_pct())
        );
    }

    let _ = writeln!(out, "\nCosts and tax (not deducted from the simulation)");
    let _ = writeln!(out, "  gross PnL:            {:.2}", costs.gross_pnl);
    let _ = writeln!(out, "  charges:              {:.2}", costs.total_charges());
    let _ = writeln!(out, "  STT:                  {:.2}", costs.charges.stt);
    let _ = writeln!(out, "  STCG tax:             {:.2}", costs.tax.stcg_tax);
    let _ = writeln!(out, "  LTCG tax:             {:.2}", costs.tax.ltcg_tax);
    let _ = writeln!(out, "  net post-tax PnL:     {:.2}", costs.net_pnl);
    let _ = writeln!(out, "  net post-tax return:  {:.2}%", display_pct(costs.net_return));

    let per_symbol = SymbolResult::compute_per_symbol(&trades);
    if !per_symbol.is_empty() {
        let _ = writeln!(out, "\nPer symbol");
        let _ = writeln!(
            out,
            "  {:<12} {:>7} {:>7} {:>14}",
            "symbol", "trades", "win %", "pnl"
        );
        for r in &per_symbol {
            let _ = writeln!(
                out,
                "  {:<12} {:>7} {:>7.1} {:>14.2}",
                r.symbol,
                r.total_trades,
                display_pct(r.win_rate),
                r.total_pnl
            );
        }
    }

    let monthly = monthly_returns(&result.portfolio.equity_curve);
    if !monthly.is_empty() {
        let _ = writeln!(out, "\nMonthly returns");
        for ((year, month), ret) in &monthly {
            let _ = writeln!(out, "  {year}-{month:02}  {:+.2}%", display_pct(*ret));
        }
    }

    if !result.skipped.is_empty() {
        let _ = writeln!(out, "\nSkipped lookups ({})", result.skipped.len());
        for s in &result.skipped {
            let _ = writeln!(
                out,
                "  {} {}: {}",
                s.date,
                s.symbol.as_deref().unwrap_or("-"),
                s.reason
            );
        }
    }

    out
}
