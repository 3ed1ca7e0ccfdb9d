//! Backtest configuration and result records.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::decision::{Candidate, DecisionRecord};
use crate::domain::holding::Holding;
use crate::domain::order::PendingOrder;
use crate::domain::portfolio::Portfolio;
use crate::domain::trade::{Trade, match_trades};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Seed used when the data source supplies no capital events.
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub daily_stop_check: bool,
    pub mid_week_backfill: bool,
}

/// State of the portfolio after one simulated week.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyRecord {
    pub week_start: NaiveDate,
    pub signal_date: NaiveDate,
    pub portfolio_value: f64,
    pub cash: f64,
    /// Gain over net contributed capital.
    pub total_return: f64,
    /// Worst peak-to-trough decline seen so far.
    pub max_drawdown: f64,
    pub decisions: Vec<DecisionRecord>,
    pub holdings: Vec<Holding>,
    pub top_candidates: Vec<Candidate>,
}

/// A lookup that failed and was treated as "no data".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLookup {
    pub date: NaiveDate,
    pub symbol: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed,
    Aborted { date: NaiveDate, reason: String },
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub portfolio: Portfolio,
    pub weeks: Vec<WeeklyRecord>,
    pub orders: Vec<PendingOrder>,
    pub skipped: Vec<SkippedLookup>,
    pub status: RunStatus,
    pub initial_capital: f64,
}

impl BacktestResult {
    pub fn trades(&self) -> Vec<Trade> {
        match_trades(&self.portfolio.fills)
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn final_value(&self) -> f64 {
        self.portfolio
            .equity_curve
            .last()
            .map(|s| s.portfolio_value)
            .unwrap_or(self.initial_capital)
    }
}
