//! Pending orders and their lifecycle within one weekly period.
//!
//! Legal transitions: Pending -> Approved | Rejected, Approved -> Executed |
//! Rejected, and Rejected -> Approved for a mid-week backfill promotion.
//! Anything else is a state inconsistency.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::decision::{DecisionBatch, Entry, TradingDecision};
use crate::domain::error::RotatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl OrderStatus {
    fn can_become(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Executed)
                | (Approved, Rejected)
                | (Rejected, Approved)
        )
    }

    pub fn is_open(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderOrigin {
    Exit,
    Entry,
    SwapOut,
    SwapIn,
    Pyramid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingOrder {
    pub id: u64,
    pub symbol: String,
    pub side: Side,
    pub origin: OrderOrigin,
    pub units: i64,
    pub reference_price: f64,
    pub score: f64,
    pub volatility: Option<f64>,
    pub planned_on: NaiveDate,
    pub target_execution_date: NaiveDate,
    pub status: OrderStatus,
    pub note: String,
    pub fill_price: Option<f64>,
    pub fill_date: Option<NaiveDate>,
}

#[derive(Debug, Default)]
pub struct OrderBook {
    orders: Vec<PendingOrder>,
    archive: Vec<PendingOrder>,
    next_id: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn a decision batch into pending orders targeting `target`.
    /// A swap yields a sell leg followed by a buy leg.
    pub fn submit(&mut self, batch: &DecisionBatch, planned_on: NaiveDate, target: NaiveDate) -> Vec<u64> {
        let mut ids = Vec::new();
        for decision in &batch.decisions {
            let reason = decision.reason();
            match decision {
                TradingDecision::Sell {
                    symbol,
                    units,
                    reference_price,
                    ..
                } => ids.push(self.push_sell(
                    symbol,
                    *units,
                    *reference_price,
                    OrderOrigin::Exit,
                    planned_on,
                    target,
                    reason,
                )),
                TradingDecision::Buy(entry) => {
                    ids.push(self.push_buy(entry, OrderOrigin::Entry, planned_on, target, reason))
                }
                TradingDecision::PyramidAdd(entry) => {
                    ids.push(self.push_buy(entry, OrderOrigin::Pyramid, planned_on, target, reason))
                }
                TradingDecision::Swap {
                    outgoing,
                    outgoing_units,
                    outgoing_price,
                    incoming,
                    ..
                } => {
                    ids.push(self.push_sell(
                        outgoing,
                        *outgoing_units,
                        *outgoing_price,
                        OrderOrigin::SwapOut,
                        planned_on,
                        target,
                        reason.clone(),
                    ));
                    ids.push(self.push_buy(incoming, OrderOrigin::SwapIn, planned_on, target, reason));
                }
            }
        }
        ids
    }

    #[allow(clippy::too_many_arguments)]
    fn push_sell(
        &mut self,
        symbol: &str,
        units: i64,
        reference_price: f64,
        origin: OrderOrigin,
        planned_on: NaiveDate,
        target: NaiveDate,
        note: String,
    ) -> u64 {
        self.push(PendingOrder {
            id: 0,
            symbol: symbol.to_string(),
            side: Side::Sell,
            origin,
            units,
            reference_price,
            score: 0.0,
            volatility: None,
            planned_on,
            target_execution_date: target,
            status: OrderStatus::Pending,
            note,
            fill_price: None,
            fill_date: None,
        })
    }

    fn push_buy(
        &mut self,
        entry: &Entry,
        origin: OrderOrigin,
        planned_on: NaiveDate,
        target: NaiveDate,
        note: String,
    ) -> u64 {
        self.push(PendingOrder {
            id: 0,
            symbol: entry.symbol.clone(),
            side: Side::Buy,
            origin,
            units: entry.units,
            reference_price: entry.reference_price,
            score: entry.score,
            volatility: entry.volatility,
            planned_on,
            target_execution_date: target,
            status: OrderStatus::Pending,
            note,
            fill_price: None,
            fill_date: None,
        })
    }

    fn push(&mut self, mut order: PendingOrder) -> u64 {
        self.next_id += 1;
        order.id = self.next_id;
        let id = order.id;
        self.orders.push(order);
        id
    }

    pub fn get(&self, id: u64) -> Option<&PendingOrder> {
        self.orders.iter().find(|o| o.id == id)
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut PendingOrder> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    fn transition(
        &mut self,
        id: u64,
        next: OrderStatus,
        date: NaiveDate,
    ) -> Result<&mut PendingOrder, RotatorError> {
        let order = self
            .get_mut(id)
            .ok_or_else(|| RotatorError::StateInconsistency {
                date,
                reason: format!("unknown order id {id}"),
            })?;
        if !order.status.can_become(next) {
            return Err(RotatorError::StateInconsistency {
                date,
                reason: format!(
                    "order {id} for {} cannot move from {:?} to {:?}",
                    order.symbol, order.status, next
                ),
            });
        }
        order.status = next;
        Ok(order)
    }

    pub fn approve(&mut self, id: u64, units: i64, date: NaiveDate) -> Result<(), RotatorError> {
        let order = self.transition(id, OrderStatus::Approved, date)?;
        order.units = units;
        Ok(())
    }

    pub fn reject(&mut self, id: u64, reason: &str, date: NaiveDate) -> Result<(), RotatorError> {
        let order = self.transition(id, OrderStatus::Rejected, date)?;
        order.note = reason.to_string();
        Ok(())
    }

    pub fn mark_executed(
        &mut self,
        id: u64,
        units: i64,
        price: f64,
        date: NaiveDate,
    ) -> Result<(), RotatorError> {
        let order = self.transition(id, OrderStatus::Executed, date)?;
        order.units = units;
        order.fill_price = Some(price);
        order.fill_date = Some(date);
        Ok(())
    }

    /// Reject every order still open from before `period_start` and archive
    /// the previous period. Returns how many open orders were rejected.
    pub fn reject_stale(&mut self, period_start: NaiveDate) -> usize {
        let mut rejected = 0;
        for order in self
            .orders
            .iter_mut()
            .filter(|o| o.target_execution_date < period_start)
        {
            if order.status.is_open() {
                order.status = OrderStatus::Rejected;
                order.note = format!("stale: unresolved at period start {period_start}");
                rejected += 1;
            }
        }
        let (old, current): (Vec<_>, Vec<_>) = std::mem::take(&mut self.orders)
            .into_iter()
            .partition(|o| o.target_execution_date < period_start);
        self.archive.extend(old);
        self.orders = current;
        rejected
    }

    /// Fail if anything from an earlier period is still open.
    pub fn ensure_no_carryover(&self, period_start: NaiveDate) -> Result<(), RotatorError> {
        match self
            .orders
            .iter()
            .find(|o| o.target_execution_date < period_start)
        {
            Some(order) => Err(RotatorError::StateInconsistency {
                date: period_start,
                reason: format!(
                    "order {} for {} from {} survived into a new period",
                    order.id, order.symbol, order.planned_on
                ),
            }),
            None => Ok(()),
        }
    }

    pub fn ids_with(&self, side: Side, status: OrderStatus) -> Vec<u64> {
        self.orders
            .iter()
            .filter(|o| o.side == side && o.status == status)
            .map(|o| o.id)
            .collect()
    }

    /// Buy orders with `status`, highest score first.
    pub fn buys_by_score(&self, status: OrderStatus) -> Vec<u64> {
        let mut buys: Vec<&PendingOrder> = self
            .orders
            .iter()
            .filter(|o| o.side == Side::Buy && o.status == status)
            .collect();
        buys.sort_by(|a, b| b.score.total_cmp(&a.score));
        buys.into_iter().map(|o| o.id).collect()
    }

    /// Every order ever submitted, oldest first.
    pub fn audit_trail(&self) -> Vec<PendingOrder> {
        self.archive.iter().chain(self.orders.iter()).cloned().collect()
    }
}
