//! Market data access port trait.
//!
//! Absent values are `Ok(None)`; `Err` means the lookup itself failed and
//! is treated by the simulator as "no data" for that symbol and date.

use crate::domain::decision::Candidate;
use crate::domain::error::RotatorError;
use crate::domain::ledger::CapitalEvent;
use crate::domain::ohlcv::OhlcvBar;
use chrono::{Duration, NaiveDate};

pub trait DataPort {
    fn fetch_bar(&self, symbol: &str, date: NaiveDate) -> Result<Option<OhlcvBar>, RotatorError>;

    /// Volatility (e.g. ATR) published for `date`.
    fn fetch_volatility(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, RotatorError>;

    /// Medium-term trend level (e.g. EMA-50) published for `date`.
    fn fetch_trend(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, RotatorError>;

    /// Ranked candidates published for `date`, in any order.
    fn fetch_rankings(&self, date: NaiveDate) -> Result<Vec<Candidate>, RotatorError>;

    fn fetch_capital_events(&self) -> Result<Vec<CapitalEvent>, RotatorError>;

    fn list_symbols(&self) -> Result<Vec<String>, RotatorError>;

    /// Latest bar on or before `date`, looking back at most `lookback_days`.
    fn fetch_latest_bar(
        &self,
        symbol: &str,
        date: NaiveDate,
        lookback_days: i64,
    ) -> Result<Option<OhlcvBar>, RotatorError> {
        for back in 0..=lookback_days {
            if let Some(bar) = self.fetch_bar(symbol, date - Duration::days(back))? {
                return Ok(Some(bar));
            }
        }
        Ok(None)
    }
}
