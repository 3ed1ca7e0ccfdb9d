//! Portfolio state: holdings, capital ledger, fills and equity curve.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::error::RotatorError;
use super::holding::Holding;
use super::ledger::CapitalLedger;
use super::trade::Fill;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquitySample {
    pub date: NaiveDate,
    pub portfolio_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub ledger: CapitalLedger,
    holdings: Vec<Holding>,
    pub fills: Vec<Fill>,
    pub equity_curve: Vec<EquitySample>,
}

impl Portfolio {
    pub fn new(ledger: CapitalLedger) -> Self {
        Portfolio {
            ledger,
            holdings: Vec::new(),
            fills: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.ledger.cash()
    }

    /// Holdings in the order they were opened.
    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn holdings_mut(&mut self) -> &mut [Holding] {
        &mut self.holdings
    }

    pub fn add_holding(&mut self, holding: Holding) {
        self.holdings.push(holding);
    }

    pub fn get_holding(&self, symbol: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.symbol == symbol)
    }

    pub fn get_holding_mut(&mut self, symbol: &str) -> Option<&mut Holding> {
        self.holdings.iter_mut().find(|h| h.symbol == symbol)
    }

    pub fn has_holding(&self, symbol: &str) -> bool {
        self.get_holding(symbol).is_some()
    }

    pub fn remove_holding(&mut self, symbol: &str) -> Option<Holding> {
        let idx = self.holdings.iter().position(|h| h.symbol == symbol)?;
        Some(self.holdings.remove(idx))
    }

    pub fn holding_count(&self) -> usize {
        self.holdings.len()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.holdings.iter().map(|h| h.symbol.clone()).collect()
    }

    pub fn holdings_value(&self) -> f64 {
        self.holdings.iter().map(Holding::market_value).sum()
    }

    /// Holdings marked at their latest price plus cash.
    pub fn total_value(&self) -> f64 {
        self.cash() + self.holdings_value()
    }

    pub fn record_fill(&mut self, fill: Fill) {
        self.fills.push(fill);
    }

    pub fn record_equity(&mut self, date: NaiveDate, portfolio_value: f64) {
        self.equity_curve.push(EquitySample {
            date,
            portfolio_value,
        });
    }

    /// Check ledger totals and holding sizes at end of `date`.
    pub fn reconcile(&self, date: NaiveDate) -> Result<(), RotatorError> {
        self.ledger.reconcile(date)?;
        if let Some(h) = self.holdings.iter().find(|h| h.units < 1) {
            return Err(RotatorError::StateInconsistency {
                date,
                reason: format!("holding {} has {} units", h.symbol, h.units),
            });
        }
        Ok(())
    }

    /// Check a reported `value` against cash plus each holding's units at
    /// `closes`. Holdings missing from `closes` count at their last mark.
    pub fn verify_valuation(
        &self,
        date: NaiveDate,
        value: f64,
        closes: &HashMap<String, f64>,
    ) -> Result<(), RotatorError> {
        let expected = self.cash()
            + self
                .holdings
                .iter()
                .map(|h| h.units as f64 * closes.get(&h.symbol).copied().unwrap_or(h.current_price))
                .sum::<f64>();
        if (value - expected).abs() > super::ledger::RECONCILE_TOLERANCE {
            return Err(RotatorError::StateInconsistency {
                date,
                reason: format!("portfolio value {value:.2} != cash + holdings at close {expected:.2}"),
            });
        }
        Ok(())
    }
}
