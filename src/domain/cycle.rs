//! Inputs of one planning cycle: the candidate pool and the market snapshot.
//!
//! Both the weekly backtest loop and the one-shot `plan` command build their
//! engine inputs here, so a lookup failure is treated the same way in both.

use chrono::NaiveDate;

use crate::domain::backtest::SkippedLookup;
use crate::domain::decision::{Candidate, MarketSnapshot, Quote, rank_descending};
use crate::domain::error::RotatorError;
use crate::domain::holding::Holding;
use crate::domain::strategy::Strategy;
use crate::ports::data_port::DataPort;

/// How far back a planning lookup may reach to cross holidays.
pub const PRICE_LOOKBACK_DAYS: i64 = 5;

#[derive(Debug, Clone, Default)]
pub struct CycleInputs {
    /// Top `candidate_pool` rankings, best first.
    pub pool: Vec<Candidate>,
    pub market: MarketSnapshot,
    /// Lookups that failed and were treated as "no data".
    pub skipped: Vec<SkippedLookup>,
}

/// Refresh holding scores from `rankings`, cut the pool, quote every holding
/// and pool symbol as of `date`, and mark holdings to those quotes.
pub fn prepare_cycle(
    data: &dyn DataPort,
    strategy: &Strategy,
    holdings: &mut [Holding],
    rankings: Vec<Candidate>,
    date: NaiveDate,
) -> CycleInputs {
    for h in holdings.iter_mut() {
        if let Some(c) = rankings.iter().find(|c| c.symbol == h.symbol) {
            h.score = c.score;
        }
    }

    let mut pool = rankings;
    rank_descending(&mut pool);
    pool.truncate(strategy.candidate_pool);

    let mut symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
    for c in &pool {
        if !symbols.contains(&c.symbol) {
            symbols.push(c.symbol.clone());
        }
    }

    let mut inputs = CycleInputs {
        pool,
        ..CycleInputs::default()
    };
    for symbol in &symbols {
        if let Some(quote) = quote(data, strategy, symbol, date, &mut inputs.skipped) {
            inputs.market.insert(symbol, quote);
        }
    }

    for h in holdings.iter_mut() {
        if let Some(q) = inputs.market.get(&h.symbol) {
            h.mark(q.price);
        }
    }
    inputs
}

fn quote(
    data: &dyn DataPort,
    strategy: &Strategy,
    symbol: &str,
    date: NaiveDate,
    skipped: &mut Vec<SkippedLookup>,
) -> Option<Quote> {
    let bar = lookup(
        data.fetch_latest_bar(symbol, date, PRICE_LOOKBACK_DAYS),
        date,
        symbol,
        skipped,
    )?;
    let mut quote = Quote::new(bar.close);
    quote.volatility = lookup(data.fetch_volatility(symbol, bar.date), bar.date, symbol, skipped);
    if strategy.pyramiding {
        quote.trend = lookup(data.fetch_trend(symbol, bar.date), bar.date, symbol, skipped);
    }
    Some(quote)
}

fn lookup<T>(
    result: Result<Option<T>, RotatorError>,
    date: NaiveDate,
    symbol: &str,
    skipped: &mut Vec<SkippedLookup>,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(%date, %symbol, error = %e, "lookup failed, treating as no data");
            skipped.push(SkippedLookup {
                date,
                symbol: Some(symbol.to_string()),
                reason: e.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::CapitalEvent;
    use crate::domain::ohlcv::OhlcvBar;
    use std::collections::HashMap;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[derive(Default)]
    struct StubData {
        closes: HashMap<String, f64>,
        volatility_fails: Vec<String>,
        trend: HashMap<String, f64>,
    }

    impl DataPort for StubData {
        fn fetch_bar(&self, symbol: &str, date: NaiveDate) -> Result<Option<OhlcvBar>, RotatorError> {
            Ok(self.closes.get(symbol).map(|&close| OhlcvBar {
                symbol: symbol.to_string(),
                date,
                open: close,
                high: close,
                low: close,
                close,
                volume: 100,
            }))
        }

        fn fetch_volatility(&self, symbol: &str, _date: NaiveDate) -> Result<Option<f64>, RotatorError> {
            if self.volatility_fails.iter().any(|s| s == symbol) {
                return Err(RotatorError::data("volatility store offline"));
            }
            Ok(Some(2.0))
        }

        fn fetch_trend(&self, symbol: &str, _date: NaiveDate) -> Result<Option<f64>, RotatorError> {
            Ok(self.trend.get(symbol).copied())
        }

        fn fetch_rankings(&self, _date: NaiveDate) -> Result<Vec<Candidate>, RotatorError> {
            Ok(Vec::new())
        }

        fn fetch_capital_events(&self) -> Result<Vec<CapitalEvent>, RotatorError> {
            Ok(Vec::new())
        }

        fn list_symbols(&self) -> Result<Vec<String>, RotatorError> {
            Ok(Vec::new())
        }
    }

    fn stub() -> StubData {
        StubData {
            closes: HashMap::from([
                ("AAA".to_string(), 110.0),
                ("BBB".to_string(), 50.0),
                ("CCC".to_string(), 20.0),
            ]),
            ..StubData::default()
        }
    }

    fn rankings() -> Vec<Candidate> {
        vec![
            Candidate::new("CCC", 40.0),
            Candidate::new("AAA", 75.0),
            Candidate::new("BBB", 90.0),
        ]
    }

    #[test]
    fn pool_is_ranked_and_cut() {
        let strategy = Strategy {
            candidate_pool: 2,
            ..Strategy::default()
        };
        let inputs = prepare_cycle(&stub(), &strategy, &mut [], rankings(), d(12));

        let symbols: Vec<&str> = inputs.pool.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BBB", "AAA"]);
        assert!(inputs.market.get("CCC").is_none());
        assert!(inputs.skipped.is_empty());
    }

    #[test]
    fn holdings_are_rescored_and_marked() {
        let mut holdings = vec![Holding::open("AAA", 10, 100.0, d(8), 95.0, 0.0)];
        let inputs = prepare_cycle(&stub(), &Strategy::default(), &mut holdings, rankings(), d(12));

        assert!((holdings[0].score - 75.0).abs() < f64::EPSILON);
        assert!((holdings[0].current_price - 110.0).abs() < f64::EPSILON);
        assert!(inputs.market.get("AAA").is_some());
    }

    #[test]
    fn failed_volatility_is_recorded_and_quote_kept() {
        let data = StubData {
            volatility_fails: vec!["BBB".to_string()],
            ..stub()
        };
        let inputs = prepare_cycle(&data, &Strategy::default(), &mut [], rankings(), d(12));

        let quote = inputs.market.get("BBB").unwrap();
        assert!(quote.volatility.is_none());
        assert_eq!(inputs.skipped.len(), 1);
        assert_eq!(inputs.skipped[0].symbol.as_deref(), Some("BBB"));
        assert!(inputs.skipped[0].reason.contains("volatility store offline"));
    }

    #[test]
    fn trend_read_only_when_pyramiding() {
        let data = StubData {
            trend: HashMap::from([("AAA".to_string(), 105.0)]),
            ..stub()
        };
        let off = prepare_cycle(&data, &Strategy::default(), &mut [], rankings(), d(12));
        assert!(off.market.get("AAA").unwrap().trend.is_none());

        let strategy = Strategy {
            pyramiding: true,
            ..Strategy::default()
        };
        let on = prepare_cycle(&data, &strategy, &mut [], rankings(), d(12));
        assert_eq!(on.market.get("AAA").unwrap().trend, Some(105.0));
    }
}
