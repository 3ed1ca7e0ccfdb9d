//! Per-symbol price and indicator series with date lookups.

use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct SymbolSeries {
    pub symbol: String,
    pub ohlcv: Vec<OhlcvBar>,
    pub volatility: BTreeMap<NaiveDate, f64>,
    pub trend: BTreeMap<NaiveDate, f64>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl SymbolSeries {
    pub fn new(symbol: String, mut ohlcv: Vec<OhlcvBar>) -> Self {
        ohlcv.sort_by_key(|b| b.date);
        let date_index = ohlcv
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            symbol,
            ohlcv,
            volatility: BTreeMap::new(),
            trend: BTreeMap::new(),
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.ohlcv.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.ohlcv[i])
    }

    /// Volatility published on `date`, ignoring non-positive readings.
    pub fn volatility_on(&self, date: NaiveDate) -> Option<f64> {
        self.volatility.get(&date).copied().filter(|v| *v > 0.0)
    }

    pub fn trend_on(&self, date: NaiveDate) -> Option<f64> {
        self.trend.get(&date).copied()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.ohlcv.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.ohlcv.last().map(|b| b.date)
    }
}
