//! Fill simulation against the portfolio.
//!
//! Every fill moves cash through the capital ledger and appends to the fill
//! log so trades can be rebuilt later by FIFO matching.

use chrono::NaiveDate;

use super::error::RotatorError;
use super::holding::Holding;
use super::order::Side;
use super::portfolio::Portfolio;
use super::trade::{Fill, FillKind};

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered {
        units: i64,
        execution_price: f64,
        cost: f64,
    },
    InsufficientCapital,
}

/// Result of an exit.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitResult {
    pub units: i64,
    pub exit_price: f64,
    pub proceeds: f64,
    pub pnl: f64,
}

/// Parameters of a purchase fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyOrder<'a> {
    pub symbol: &'a str,
    pub units: i64,
    pub price: f64,
    /// Stop assigned when this opens a new holding.
    pub entry_stop: f64,
    pub score: f64,
    pub kind: FillKind,
}

/// Buy `units` at `price`. Adds to an existing holding (pyramid) or opens a
/// new one. Entry price, entry stop and entry date of an existing holding
/// are left untouched.
pub fn enter_long(
    portfolio: &mut Portfolio,
    order: BuyOrder<'_>,
    date: NaiveDate,
) -> Result<EntryResult, RotatorError> {
    if order.units <= 0 || !(order.price.is_finite() && order.price > 0.0) {
        return Ok(EntryResult::InsufficientCapital);
    }
    let cost = order.units as f64 * order.price;
    if cost > portfolio.cash() {
        return Ok(EntryResult::InsufficientCapital);
    }

    portfolio.ledger.debit(date, cost)?;

    match portfolio.get_holding_mut(order.symbol) {
        Some(existing) => {
            existing.units += order.units;
            existing.score = order.score;
            existing.mark(order.price);
        }
        None => portfolio.add_holding(Holding::open(
            order.symbol,
            order.units,
            order.price,
            date,
            order.entry_stop,
            order.score,
        )),
    }

    portfolio.record_fill(Fill {
        date,
        symbol: order.symbol.to_string(),
        side: Side::Buy,
        units: order.units,
        price: order.price,
        kind: order.kind,
    });

    tracing::info!(
        %date,
        symbol = order.symbol,
        units = order.units,
        price = order.price,
        kind = %order.kind,
        "buy filled"
    );

    Ok(EntryResult::Entered {
        units: order.units,
        execution_price: order.price,
        cost,
    })
}

/// Sell the whole holding in `symbol` at `price`.
pub fn exit_position(
    portfolio: &mut Portfolio,
    symbol: &str,
    price: f64,
    date: NaiveDate,
    kind: FillKind,
) -> Option<ExitResult> {
    let holding = portfolio.remove_holding(symbol)?;
    let proceeds = holding.units as f64 * price;
    let pnl = holding.units as f64 * (price - holding.entry_price);

    portfolio.ledger.credit(proceeds);
    portfolio.record_fill(Fill {
        date,
        symbol: symbol.to_string(),
        side: Side::Sell,
        units: holding.units,
        price,
        kind,
    });

    tracing::info!(
        %date,
        symbol,
        units = holding.units,
        price,
        pnl,
        kind = %kind,
        "sell filled"
    );

    Some(ExitResult {
        units: holding.units,
        exit_price: price,
        proceeds,
        pnl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::CapitalLedger;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn make_portfolio(cash: f64) -> Portfolio {
        Portfolio::new(CapitalLedger::seeded(date(), cash))
    }

    fn buy(symbol: &str, units: i64, price: f64) -> BuyOrder<'_> {
        BuyOrder {
            symbol,
            units,
            price,
            entry_stop: price * 0.9,
            score: 75.0,
            kind: FillKind::Entry,
        }
    }

    #[test]
    fn enter_long_debits_cash_and_opens_holding() {
        let mut portfolio = make_portfolio(100_000.0);
        let result = enter_long(&mut portfolio, buy("TCS", 100, 50.0), date()).unwrap();

        assert_eq!(
            result,
            EntryResult::Entered {
                units: 100,
                execution_price: 50.0,
                cost: 5000.0
            }
        );
        assert!((portfolio.cash() - 95_000.0).abs() < f64::EPSILON);
        let h = portfolio.get_holding("TCS").unwrap();
        assert!((h.entry_stop - 45.0).abs() < 1e-9);
        assert_eq!(portfolio.fills.len(), 1);
        assert_eq!(portfolio.fills[0].side, Side::Buy);
    }

    #[test]
    fn enter_long_insufficient_capital() {
        let mut portfolio = make_portfolio(1_000.0);
        let result = enter_long(&mut portfolio, buy("TCS", 100, 50.0), date()).unwrap();
        assert_eq!(result, EntryResult::InsufficientCapital);
        assert!((portfolio.cash() - 1_000.0).abs() < f64::EPSILON);
        assert!(portfolio.fills.is_empty());
    }

    #[test]
    fn enter_long_zero_units() {
        let mut portfolio = make_portfolio(1_000.0);
        let result = enter_long(&mut portfolio, buy("TCS", 0, 50.0), date()).unwrap();
        assert_eq!(result, EntryResult::InsufficientCapital);
    }

    #[test]
    fn pyramid_adds_units_keeps_entry() {
        let mut portfolio = make_portfolio(100_000.0);
        enter_long(&mut portfolio, buy("TCS", 100, 50.0), date()).unwrap();
        let add = BuyOrder {
            kind: FillKind::Pyramid,
            ..buy("TCS", 40, 60.0)
        };
        enter_long(&mut portfolio, add, date()).unwrap();

        let h = portfolio.get_holding("TCS").unwrap();
        assert_eq!(h.units, 140);
        assert!((h.entry_price - 50.0).abs() < f64::EPSILON);
        assert!((h.current_price - 60.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.holding_count(), 1);
        assert_eq!(portfolio.fills.len(), 2);
    }

    #[test]
    fn exit_position_credits_proceeds() {
        let mut portfolio = make_portfolio(100_000.0);
        enter_long(&mut portfolio, buy("TCS", 100, 50.0), date()).unwrap();

        let exit = exit_position(&mut portfolio, "TCS", 55.0, date(), FillKind::Exit).unwrap();

        assert_eq!(exit.units, 100);
        assert!((exit.proceeds - 5500.0).abs() < f64::EPSILON);
        assert!((exit.pnl - 500.0).abs() < f64::EPSILON);
        assert!((portfolio.cash() - 100_500.0).abs() < 1e-9);
        assert!(!portfolio.has_holding("TCS"));
        assert!(portfolio.reconcile(date()).is_ok());
    }

    #[test]
    fn exit_missing_holding_is_none() {
        let mut portfolio = make_portfolio(100_000.0);
        assert!(exit_position(&mut portfolio, "XYZ", 10.0, date(), FillKind::Exit).is_none());
    }
}
