//! Fill history and FIFO trade matching.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use crate::domain::order::{OrderOrigin, Side};

/// What caused a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FillKind {
    Entry,
    Exit,
    SwapIn,
    SwapOut,
    Pyramid,
    /// Tier 1: intraday low through the buffered stop.
    HardStop,
    /// Tier 2: close below stop, sold at the next open.
    CloseStop,
    Backfill,
}

impl From<OrderOrigin> for FillKind {
    fn from(origin: OrderOrigin) -> Self {
        match origin {
            OrderOrigin::Exit => FillKind::Exit,
            OrderOrigin::Entry => FillKind::Entry,
            OrderOrigin::SwapOut => FillKind::SwapOut,
            OrderOrigin::SwapIn => FillKind::SwapIn,
            OrderOrigin::Pyramid => FillKind::Pyramid,
        }
    }
}

impl fmt::Display for FillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FillKind::Entry => "entry",
            FillKind::Exit => "exit",
            FillKind::SwapIn => "swap-in",
            FillKind::SwapOut => "swap-out",
            FillKind::Pyramid => "pyramid",
            FillKind::HardStop => "hard-stop",
            FillKind::CloseStop => "close-stop",
            FillKind::Backfill => "backfill",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub date: NaiveDate,
    pub symbol: String,
    pub side: Side,
    pub units: i64,
    pub price: f64,
    pub kind: FillKind,
}

impl Fill {
    pub fn value(&self) -> f64 {
        self.units as f64 * self.price
    }
}

/// A buy lot matched against a sell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub symbol: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub units: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub holding_days: i64,
    pub exit_kind: FillKind,
}

impl Trade {
    pub fn return_pct(&self) -> f64 {
        if self.entry_price > 0.0 {
            (self.exit_price - self.entry_price) / self.entry_price
        } else {
            0.0
        }
    }
}

struct Lot {
    date: NaiveDate,
    price: f64,
    remaining: i64,
}

/// Match sells against the earliest open buys of the same symbol.
pub fn match_trades(fills: &[Fill]) -> Vec<Trade> {
    let mut lots: HashMap<&str, VecDeque<Lot>> = HashMap::new();
    let mut trades = Vec::new();

    for fill in fills {
        match fill.side {
            Side::Buy => lots.entry(&fill.symbol).or_default().push_back(Lot {
                date: fill.date,
                price: fill.price,
                remaining: fill.units,
            }),
            Side::Sell => {
                let queue = lots.entry(&fill.symbol).or_default();
                let mut to_match = fill.units;
                while to_match > 0 {
                    let Some(lot) = queue.front_mut() else {
                        tracing::warn!(
                            symbol = %fill.symbol,
                            date = %fill.date,
                            unmatched = to_match,
                            "sell without an open buy lot"
                        );
                        break;
                    };
                    let units = to_match.min(lot.remaining);
                    trades.push(Trade {
                        symbol: fill.symbol.clone(),
                        entry_date: lot.date,
                        exit_date: fill.date,
                        units,
                        entry_price: lot.price,
                        exit_price: fill.price,
                        pnl: units as f64 * (fill.price - lot.price),
                        holding_days: (fill.date - lot.date).num_days(),
                        exit_kind: fill.kind,
                    });
                    lot.remaining -= units;
                    to_match -= units;
                    if lot.remaining == 0 {
                        queue.pop_front();
                    }
                }
            }
        }
    }

    trades
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolResult {
    pub symbol: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
}

impl SymbolResult {
    pub fn compute_per_symbol(trades: &[Trade]) -> Vec<SymbolResult> {
        let mut by_symbol: BTreeMap<&str, Vec<&Trade>> = BTreeMap::new();
        for trade in trades {
            by_symbol.entry(&trade.symbol).or_default().push(trade);
        }
        by_symbol
            .into_iter()
            .map(|(symbol, trades)| {
                let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
                let losing_trades = trades.iter().filter(|t| t.pnl < 0.0).count();
                SymbolResult {
                    symbol: symbol.to_string(),
                    total_trades: trades.len(),
                    winning_trades,
                    losing_trades,
                    total_pnl: trades.iter().map(|t| t.pnl).sum(),
                    win_rate: winning_trades as f64 / trades.len() as f64,
                }
            })
            .collect()
    }
}
