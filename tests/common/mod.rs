#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rotator::domain::backtest::BacktestConfig;
use rotator::domain::decision::Candidate;
use rotator::domain::error::RotatorError;
use rotator::domain::ledger::{CapitalEvent, CapitalEventKind};
pub use rotator::domain::ohlcv::OhlcvBar;
use rotator::domain::strategy::Strategy;
use rotator::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub bars: HashMap<String, Vec<OhlcvBar>>,
    pub volatility: HashMap<String, f64>,
    pub trend: HashMap<String, f64>,
    pub rankings: HashMap<NaiveDate, Vec<Candidate>>,
    pub events: Vec<CapitalEvent>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            volatility: HashMap::new(),
            trend: HashMap::new(),
            rankings: HashMap::new(),
            events: Vec::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    /// Replace (or add) the bar for `bar.date`.
    pub fn with_bar(mut self, bar: OhlcvBar) -> Self {
        let series = self.bars.entry(bar.symbol.clone()).or_default();
        series.retain(|b| b.date != bar.date);
        series.push(bar);
        self
    }

    /// Same volatility on every date.
    pub fn with_volatility(mut self, symbol: &str, value: f64) -> Self {
        self.volatility.insert(symbol.to_string(), value);
        self
    }

    pub fn with_trend(mut self, symbol: &str, value: f64) -> Self {
        self.trend.insert(symbol.to_string(), value);
        self
    }

    pub fn with_ranking(mut self, date: NaiveDate, symbol: &str, score: f64) -> Self {
        self.rankings
            .entry(date)
            .or_default()
            .push(Candidate::new(symbol, score));
        self
    }

    pub fn with_event(mut self, date: NaiveDate, amount: f64, kind: CapitalEventKind) -> Self {
        self.events.push(CapitalEvent { date, amount, kind });
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    fn check(&self, symbol: &str) -> Result<(), RotatorError> {
        match self.errors.get(symbol) {
            Some(reason) => Err(RotatorError::data(reason.clone())),
            None => Ok(()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_bar(&self, symbol: &str, date: NaiveDate) -> Result<Option<OhlcvBar>, RotatorError> {
        self.check(symbol)?;
        Ok(self
            .bars
            .get(symbol)
            .and_then(|bars| bars.iter().find(|b| b.date == date))
            .cloned())
    }

    fn fetch_volatility(&self, symbol: &str, _date: NaiveDate) -> Result<Option<f64>, RotatorError> {
        self.check(symbol)?;
        Ok(self.volatility.get(symbol).copied())
    }

    fn fetch_trend(&self, symbol: &str, _date: NaiveDate) -> Result<Option<f64>, RotatorError> {
        self.check(symbol)?;
        Ok(self.trend.get(symbol).copied())
    }

    fn fetch_rankings(&self, date: NaiveDate) -> Result<Vec<Candidate>, RotatorError> {
        Ok(self.rankings.get(&date).cloned().unwrap_or_default())
    }

    fn fetch_capital_events(&self) -> Result<Vec<CapitalEvent>, RotatorError> {
        Ok(self.events.clone())
    }

    fn list_symbols(&self) -> Result<Vec<String>, RotatorError> {
        let mut symbols: Vec<String> = self.bars.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(symbol: &str, date: NaiveDate, open: f64, low: f64, close: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        date,
        open,
        high: open.max(close),
        low,
        close,
        volume: 1000,
    }
}

/// Flat weekday bars at `price` from `start` for `days` calendar days.
pub fn flat_bars(symbol: &str, start: NaiveDate, days: i64, price: f64) -> Vec<OhlcvBar> {
    (0..days)
        .map(|i| start + Duration::days(i))
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .map(|d| make_bar(symbol, d, price, price, price))
        .collect()
}

/// Weekday bars rising by `step` per calendar day.
pub fn generate_bars(
    symbol: &str,
    start: NaiveDate,
    days: i64,
    start_price: f64,
    step: f64,
) -> Vec<OhlcvBar> {
    (0..days)
        .map(|i| (start + Duration::days(i), start_price + step * i as f64))
        .filter(|(d, _)| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .map(|(d, p)| OhlcvBar {
            symbol: symbol.to_string(),
            date: d,
            open: p,
            high: p + 1.0,
            low: p - 1.0,
            close: p,
            volume: 1000,
        })
        .collect()
}

pub fn config(start: NaiveDate, end: NaiveDate, capital: f64) -> BacktestConfig {
    BacktestConfig {
        start_date: start,
        end_date: end,
        initial_capital: capital,
        risk_free_rate: 0.06,
        daily_stop_check: true,
        mid_week_backfill: true,
    }
}

pub fn strategy(max_positions: usize) -> Strategy {
    Strategy {
        max_positions,
        candidate_pool: max_positions,
        ..Strategy::default()
    }
}
