//! Decision records produced by a planning cycle.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One entry of an externally ranked candidate list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub score: f64,
}

impl Candidate {
    pub fn new(symbol: &str, score: f64) -> Self {
        Candidate {
            symbol: symbol.to_string(),
            score,
        }
    }
}

/// Sort candidates highest score first, keeping input order among ties.
pub fn rank_descending(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Latest observation for one symbol at planning time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub volatility: Option<f64>,
    /// Medium-term trend level (e.g. a 50-period EMA).
    pub trend: Option<f64>,
}

impl Quote {
    pub fn new(price: f64) -> Self {
        Quote {
            price,
            volatility: None,
            trend: None,
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = Some(volatility);
        self
    }

    pub fn with_trend(mut self, trend: f64) -> Self {
        self.trend = Some(trend);
        self
    }
}

/// Immutable price lookup handed to the decision engine.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    quotes: HashMap<String, Quote>,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, quote: Quote) {
        self.quotes.insert(symbol.to_string(), quote);
    }

    pub fn with(mut self, symbol: &str, quote: Quote) -> Self {
        self.insert(symbol, quote);
        self
    }

    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes
            .get(symbol)
            .filter(|q| q.price.is_finite() && q.price > 0.0)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Sell,
    Buy,
    Swap,
    PyramidAdd,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Sell => "SELL",
            Action::Buy => "BUY",
            Action::Swap => "SWAP",
            Action::PyramidAdd => "PYRAMID_ADD",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SellReason {
    StopLoss { price: f64, stop: f64 },
    ScoreDegradation { score: f64, threshold: f64 },
}

impl fmt::Display for SellReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SellReason::StopLoss { price, stop } => {
                write!(f, "stop-loss: price {price:.2} at or below stop {stop:.2}")
            }
            SellReason::ScoreDegradation { score, threshold } => {
                write!(f, "score degradation: {score:.2} below {threshold:.2}")
            }
        }
    }
}

/// Sized order for a symbol entering or growing in the portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub symbol: String,
    pub units: i64,
    pub score: f64,
    pub reference_price: f64,
    pub volatility: Option<f64>,
    pub risk_per_unit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradingDecision {
    Sell {
        symbol: String,
        units: i64,
        reference_price: f64,
        reason: SellReason,
    },
    Buy(Entry),
    /// Release `outgoing` to make room for `incoming`.
    Swap {
        outgoing: String,
        outgoing_units: i64,
        outgoing_price: f64,
        incumbent_score: f64,
        incoming: Entry,
    },
    PyramidAdd(Entry),
}

impl TradingDecision {
    pub fn action(&self) -> Action {
        match self {
            TradingDecision::Sell { .. } => Action::Sell,
            TradingDecision::Buy(_) => Action::Buy,
            TradingDecision::Swap { .. } => Action::Swap,
            TradingDecision::PyramidAdd(_) => Action::PyramidAdd,
        }
    }

    /// Symbol acted on; for a swap this is the holding being released.
    pub fn symbol(&self) -> &str {
        match self {
            TradingDecision::Sell { symbol, .. } => symbol,
            TradingDecision::Buy(e) | TradingDecision::PyramidAdd(e) => &e.symbol,
            TradingDecision::Swap { outgoing, .. } => outgoing,
        }
    }

    pub fn units(&self) -> i64 {
        match self {
            TradingDecision::Sell { units, .. } => *units,
            TradingDecision::Buy(e) | TradingDecision::PyramidAdd(e) => e.units,
            TradingDecision::Swap { outgoing_units, .. } => *outgoing_units,
        }
    }

    pub fn swap_target(&self) -> Option<&str> {
        match self {
            TradingDecision::Swap { incoming, .. } => Some(&incoming.symbol),
            _ => None,
        }
    }

    pub fn swap_units(&self) -> Option<i64> {
        match self {
            TradingDecision::Swap { incoming, .. } => Some(incoming.units),
            _ => None,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            TradingDecision::Sell { reason, .. } => reason.to_string(),
            TradingDecision::Buy(e) => format!("vacancy fill: score {:.2}", e.score),
            TradingDecision::Swap {
                incumbent_score,
                incoming,
                ..
            } => format!(
                "swap: {} score {:.2} beats incumbent {:.2}",
                incoming.symbol, incoming.score, incumbent_score
            ),
            TradingDecision::PyramidAdd(e) => {
                format!("pyramid add: stop at or above entry, score {:.2}", e.score)
            }
        }
    }

    pub fn to_record(&self, date: NaiveDate) -> DecisionRecord {
        DecisionRecord {
            date,
            action: self.action(),
            symbol: self.symbol().to_string(),
            units: self.units(),
            reason: self.reason(),
            swap_target: self.swap_target().map(str::to_string),
            swap_units: self.swap_units(),
        }
    }
}

/// Flat, storage-friendly form of a decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub date: NaiveDate,
    pub action: Action,
    pub symbol: String,
    pub units: i64,
    pub reason: String,
    pub swap_target: Option<String>,
    pub swap_units: Option<i64>,
}

/// Output of one planning cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionBatch {
    /// Sells first, then buys, swaps and adds in candidate order.
    pub decisions: Vec<TradingDecision>,
    /// Recomputed stops for holdings, including ones being sold.
    pub stop_updates: Vec<(String, f64)>,
    /// Symbols passed over because no usable quote was available.
    pub skipped: Vec<String>,
}

impl DecisionBatch {
    pub fn count(&self, action: Action) -> usize {
        self.decisions.iter().filter(|d| d.action() == action).count()
    }

    pub fn records(&self, date: NaiveDate) -> Vec<DecisionRecord> {
        self.decisions.iter().map(|d| d.to_record(date)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(symbol: &str) -> Entry {
        Entry {
            symbol: symbol.into(),
            units: 40,
            score: 65.0,
            reference_price: 250.0,
            volatility: Some(5.0),
            risk_per_unit: 10.0,
        }
    }

    #[test]
    fn rank_descending_keeps_tie_order() {
        let mut c = vec![
            Candidate::new("A", 50.0),
            Candidate::new("B", 70.0),
            Candidate::new("C", 50.0),
        ];
        rank_descending(&mut c);
        let order: Vec<_> = c.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }

    #[test]
    fn snapshot_hides_unusable_prices() {
        let market = MarketSnapshot::new()
            .with("A", Quote::new(10.0))
            .with("B", Quote::new(0.0));
        assert!(market.get("A").is_some());
        assert!(market.get("B").is_none());
        assert!(market.get("C").is_none());
    }

    #[test]
    fn swap_accessors() {
        let d = TradingDecision::Swap {
            outgoing: "OLD".into(),
            outgoing_units: 25,
            outgoing_price: 80.0,
            incumbent_score: 50.0,
            incoming: sample_entry("NEW"),
        };
        assert_eq!(d.action(), Action::Swap);
        assert_eq!(d.symbol(), "OLD");
        assert_eq!(d.units(), 25);
        assert_eq!(d.swap_target(), Some("NEW"));
        assert_eq!(d.swap_units(), Some(40));
        assert!(d.reason().contains("NEW"));
    }

    #[test]
    fn sell_record_carries_reason() {
        let d = TradingDecision::Sell {
            symbol: "X".into(),
            units: 10,
            reference_price: 94.0,
            reason: SellReason::StopLoss {
                price: 94.0,
                stop: 95.0,
            },
        };
        let rec = d.to_record(NaiveDate::from_ymd_opt(2024, 2, 5).unwrap());
        assert_eq!(rec.action, Action::Sell);
        assert_eq!(rec.units, 10);
        assert!(rec.reason.starts_with("stop-loss"));
        assert!(rec.swap_target.is_none());
    }

    #[test]
    fn action_display_names() {
        assert_eq!(Action::PyramidAdd.to_string(), "PYRAMID_ADD");
        assert_eq!(Action::Sell.to_string(), "SELL");
    }
}
