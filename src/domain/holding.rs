//! Held positions and their trailing stop state.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub symbol: String,
    pub units: i64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub entry_stop: f64,
    pub current_price: f64,
    pub current_stop: f64,
    pub score: f64,
}

impl Holding {
    pub fn open(
        symbol: &str,
        units: i64,
        entry_price: f64,
        entry_date: NaiveDate,
        entry_stop: f64,
        score: f64,
    ) -> Self {
        Holding {
            symbol: symbol.to_string(),
            units,
            entry_price,
            entry_date,
            entry_stop,
            current_price: entry_price,
            current_stop: entry_stop,
            score,
        }
    }

    pub fn market_value(&self) -> f64 {
        self.units as f64 * self.current_price
    }

    /// Ratchet the stop upward; lower values are ignored.
    pub fn raise_stop(&mut self, stop: f64) -> bool {
        if stop > self.current_stop {
            self.current_stop = stop;
            true
        } else {
            false
        }
    }

    pub fn mark(&mut self, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.current_price = price;
        }
    }

    /// A stop at or above entry leaves no capital at risk.
    pub fn is_risk_free_at(&self, stop: f64) -> bool {
        stop >= self.entry_price
    }

    pub fn should_stop_out(&self, price: f64) -> bool {
        price <= self.current_stop
    }
}
