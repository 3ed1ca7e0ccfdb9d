//! OHLCV bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// True when the session's low traded at or through `level`.
    pub fn low_breaches(&self, level: f64) -> bool {
        self.low <= level
    }

    /// True when the session settled strictly below `level`.
    pub fn closes_below(&self, level: f64) -> bool {
        self.close < level
    }
}
