//! Weekly planning loop with a daily stop-loss loop inside each week.
//!
//! Each week: reject leftover orders, plan from the previous Friday's
//! rankings, approve against the cash each order's fill date will have,
//! then walk Monday to Friday filling approved orders at their symbol's
//! first open of the week, checking two stop tiers and backfilling freed
//! slots. Stops only move at the weekly planning step.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::domain::backtest::{BacktestConfig, BacktestResult, RunStatus, SkippedLookup, WeeklyRecord};
use crate::domain::calendar;
use crate::domain::cycle::prepare_cycle;
use crate::domain::decision::{Candidate, DecisionRecord};
use crate::domain::engine::TradingDecisionEngine;
use crate::domain::error::RotatorError;
use crate::domain::execution::{BuyOrder, EntryResult, enter_long, exit_position};
use crate::domain::ledger::{CapitalEvent, CapitalEventKind, CapitalLedger};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::order::{OrderBook, OrderOrigin, OrderStatus, Side};
use crate::domain::portfolio::Portfolio;
use crate::domain::sizing::{self, apply_affordability_cap, apply_concentration_cap};
use crate::domain::stop_loss::initial_stop;
use crate::domain::strategy::Strategy;
use crate::domain::trade::FillKind;
use crate::ports::data_port::DataPort;

/// Run one backtest over its own, unshared workspace.
pub fn run_backtest(
    data: &dyn DataPort,
    config: &BacktestConfig,
    strategy: &Strategy,
) -> BacktestResult {
    let mut sim = Simulator::new(data, config, strategy);
    let status = match sim.run() {
        Ok(()) => RunStatus::Completed,
        Err(e) => {
            tracing::error!(date = %sim.current_date, error = %e, "backtest aborted");
            RunStatus::Aborted {
                date: sim.current_date,
                reason: e.to_string(),
            }
        }
    };
    sim.into_result(status)
}

struct Simulator<'a> {
    data: &'a dyn DataPort,
    config: &'a BacktestConfig,
    strategy: &'a Strategy,
    portfolio: Portfolio,
    orders: OrderBook,
    events: Vec<CapitalEvent>,
    next_event: usize,
    initial_capital: f64,
    weeks: Vec<WeeklyRecord>,
    skipped: Vec<SkippedLookup>,
    current_date: NaiveDate,
    peak_value: f64,
    max_drawdown: f64,
    week_opens: HashMap<String, Option<(NaiveDate, f64)>>,
    close_stop_queue: Vec<String>,
    sold_this_week: HashSet<String>,
}

impl<'a> Simulator<'a> {
    fn new(data: &'a dyn DataPort, config: &'a BacktestConfig, strategy: &'a Strategy) -> Self {
        let mut skipped = Vec::new();
        let mut events = match data.fetch_capital_events() {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "capital events unavailable, seeding from config");
                skipped.push(SkippedLookup {
                    date: config.start_date,
                    symbol: None,
                    reason: format!("capital events: {e}"),
                });
                Vec::new()
            }
        };
        if events.is_empty() {
            events.push(CapitalEvent {
                date: config.start_date,
                amount: config.initial_capital,
                kind: CapitalEventKind::Initial,
            });
        }
        events.sort_by_key(|e| e.date);

        let initial_capital = match events
            .iter()
            .filter(|e| e.kind == CapitalEventKind::Initial)
            .map(|e| e.amount.abs())
            .sum::<f64>()
        {
            seed if seed > 0.0 => seed,
            _ => events[0].amount.abs(),
        };

        Simulator {
            data,
            config,
            strategy,
            portfolio: Portfolio::new(CapitalLedger::new()),
            orders: OrderBook::new(),
            events,
            next_event: 0,
            initial_capital,
            weeks: Vec::new(),
            skipped,
            current_date: config.start_date,
            peak_value: 0.0,
            max_drawdown: 0.0,
            week_opens: HashMap::new(),
            close_stop_queue: Vec::new(),
            sold_this_week: HashSet::new(),
        }
    }

    fn into_result(self, status: RunStatus) -> BacktestResult {
        BacktestResult {
            portfolio: self.portfolio,
            weeks: self.weeks,
            orders: self.orders.audit_trail(),
            skipped: self.skipped,
            status,
            initial_capital: self.initial_capital,
        }
    }

    fn run(&mut self) -> Result<(), RotatorError> {
        let weeks = calendar::week_starts(self.config.start_date, self.config.end_date);
        tracing::info!(
            weeks = weeks.len(),
            start = %self.config.start_date,
            end = %self.config.end_date,
            "starting backtest"
        );
        for week_start in weeks {
            self.run_week(week_start)?;
        }
        Ok(())
    }

    fn run_week(&mut self, week_start: NaiveDate) -> Result<(), RotatorError> {
        self.current_date = week_start;
        self.apply_due_events(week_start);
        self.week_opens.clear();
        self.sold_this_week.clear();
        if !self.close_stop_queue.is_empty() {
            tracing::debug!(
                symbols = ?self.close_stop_queue,
                "dropping close-stop queue at week boundary"
            );
            self.close_stop_queue.clear();
        }

        let stale = self.orders.reject_stale(week_start);
        if stale > 0 {
            tracing::warn!(%week_start, stale, "rejected orders left over from previous week");
        }
        self.orders.ensure_no_carryover(week_start)?;

        let days = calendar::trading_days(week_start, self.config.end_date);
        let signal_date = calendar::signal_date(week_start);

        let (decisions, top_candidates) = self.plan_week(week_start, signal_date);
        self.approve_orders(week_start, &days)?;

        let last = days.len().saturating_sub(1);
        for (i, day) in days.iter().enumerate() {
            self.run_day(*day, i == last)?;
        }

        let week_end = days.last().copied().unwrap_or(week_start);
        self.portfolio.reconcile(week_end)?;
        let value = self.portfolio.total_value();
        let closes = self.closes_on(week_end);
        self.portfolio.verify_valuation(week_end, value, &closes)?;
        self.portfolio.record_equity(week_end, value);

        self.peak_value = self.peak_value.max(value);
        if self.peak_value > 0.0 {
            self.max_drawdown = self
                .max_drawdown
                .max((self.peak_value - value) / self.peak_value);
        }
        let contributed = self.portfolio.ledger.capital_in() - self.portfolio.ledger.capital_out();
        let total_return = if contributed > 0.0 {
            value / contributed - 1.0
        } else {
            0.0
        };

        tracing::info!(
            %week_start,
            value,
            cash = self.portfolio.cash(),
            holdings = self.portfolio.holding_count(),
            "week complete"
        );

        self.weeks.push(WeeklyRecord {
            week_start,
            signal_date,
            portfolio_value: value,
            cash: self.portfolio.cash(),
            total_return,
            max_drawdown: self.max_drawdown,
            decisions,
            holdings: self.portfolio.holdings().to_vec(),
            top_candidates,
        });
        Ok(())
    }

    fn plan_week(
        &mut self,
        week_start: NaiveDate,
        signal_date: NaiveDate,
    ) -> (Vec<DecisionRecord>, Vec<Candidate>) {
        let rankings = match self.data.fetch_rankings(signal_date) {
            Ok(r) => r,
            Err(e) => {
                self.record_skip(signal_date, None, format!("rankings: {e}"));
                Vec::new()
            }
        };
        if rankings.is_empty() {
            tracing::warn!(%signal_date, "no rankings for signal date");
        }

        let inputs = prepare_cycle(
            self.data,
            self.strategy,
            self.portfolio.holdings_mut(),
            rankings,
            signal_date,
        );
        self.skipped.extend(inputs.skipped);
        let (pool, market) = (inputs.pool, inputs.market);

        let engine = TradingDecisionEngine::new(self.strategy);
        let batch = engine.plan(
            self.portfolio.holdings(),
            &pool,
            &market,
            self.portfolio.total_value(),
        );

        for (symbol, stop) in &batch.stop_updates {
            if let Some(h) = self.portfolio.get_holding_mut(symbol) {
                h.raise_stop(*stop);
            }
        }

        self.orders.submit(&batch, signal_date, week_start);
        tracing::info!(
            %week_start,
            decisions = batch.decisions.len(),
            skipped = batch.skipped.len(),
            "planned week"
        );
        (batch.records(week_start), pool)
    }

    /// Sells are always approved. A buy is approved while the cash and
    /// slots it can count on by its own fill date cover it: sale proceeds
    /// only count from the day the sale fills.
    fn approve_orders(&mut self, week_start: NaiveDate, days: &[NaiveDate]) -> Result<(), RotatorError> {
        let mut releases: Vec<(NaiveDate, f64)> = Vec::new();

        for id in self.orders.ids_with(Side::Sell, OrderStatus::Pending) {
            let Some(order) = self.orders.get(id) else { continue };
            let (symbol, units) = (order.symbol.clone(), order.units);
            if !self.portfolio.has_holding(&symbol) {
                self.orders.reject(id, "holding no longer open", week_start)?;
                continue;
            }
            match self.week_open(&symbol, days) {
                Some((date, price)) => {
                    self.orders.approve(id, units, week_start)?;
                    releases.push((date, units as f64 * price));
                }
                None => self.orders.reject(id, "no price data this week", week_start)?,
            }
        }

        let cash = self.portfolio.cash();
        let open_slots = self
            .strategy
            .max_positions
            .saturating_sub(self.portfolio.holding_count());
        let mut committed_cash = 0.0;
        let mut committed_slots = 0usize;

        for id in self.orders.buys_by_score(OrderStatus::Pending) {
            let Some(order) = self.orders.get(id) else { continue };
            let (symbol, units, origin) = (order.symbol.clone(), order.units, order.origin);
            let pyramid = origin == OrderOrigin::Pyramid;

            if pyramid != self.portfolio.has_holding(&symbol) {
                let reason = if pyramid {
                    "holding no longer open"
                } else {
                    "already held"
                };
                self.orders.reject(id, reason, week_start)?;
                continue;
            }
            let Some((date, price)) = self.week_open(&symbol, days) else {
                self.orders.reject(id, "no price data this week", week_start)?;
                continue;
            };

            let settled: Vec<f64> = releases
                .iter()
                .filter(|(sold_on, _)| *sold_on <= date)
                .map(|(_, amount)| *amount)
                .collect();
            let freed_slots = settled.len();
            let proceeds: f64 = settled.iter().sum();

            if !pyramid && (open_slots + freed_slots).saturating_sub(committed_slots) == 0 {
                self.orders.reject(id, "no free slot", week_start)?;
                continue;
            }
            let available = (cash + proceeds - committed_cash).max(0.0);
            let funded = apply_affordability_cap(units, price, available);
            if funded == 0 {
                tracing::info!(%symbol, units, price, available, %date, "buy rejected: insufficient cash");
                self.orders.reject(id, "insufficient cash", week_start)?;
                continue;
            }
            if funded < units {
                tracing::info!(%symbol, requested = units, funded, "buy partially funded");
            }
            self.orders.approve(id, funded, week_start)?;
            committed_cash += funded as f64 * price;
            if !pyramid {
                committed_slots += 1;
            }
        }
        Ok(())
    }

    /// Fill the approved orders whose first open this week is `day`: sells
    /// first, then buys by score. Returns whether anything was sold.
    fn execute_due(&mut self, day: NaiveDate) -> Result<bool, RotatorError> {
        let mut sold = false;

        for id in self.orders.ids_with(Side::Sell, OrderStatus::Approved) {
            let Some(order) = self.orders.get(id) else { continue };
            let (symbol, origin) = (order.symbol.clone(), order.origin);
            let Some(price) = self.open_due(&symbol, day) else { continue };
            match exit_position(&mut self.portfolio, &symbol, price, day, origin.into()) {
                Some(exit) => {
                    self.orders.mark_executed(id, exit.units, price, day)?;
                    self.sold_this_week.insert(symbol);
                    sold = true;
                }
                None => self.orders.reject(id, "holding no longer open", day)?,
            }
        }

        for id in self.orders.buys_by_score(OrderStatus::Approved) {
            let Some(order) = self.orders.get(id) else { continue };
            let (symbol, units, score, volatility, origin) = (
                order.symbol.clone(),
                order.units,
                order.score,
                order.volatility,
                order.origin,
            );
            let Some(price) = self.open_due(&symbol, day) else { continue };
            let pyramid = origin == OrderOrigin::Pyramid;
            if pyramid != self.portfolio.has_holding(&symbol) {
                let reason = if pyramid {
                    "holding no longer open"
                } else {
                    "already held"
                };
                self.orders.reject(id, reason, day)?;
                continue;
            }
            let buy = BuyOrder {
                symbol: &symbol,
                units,
                price,
                entry_stop: initial_stop(price, volatility, &self.strategy.stop_params()),
                score,
                kind: origin.into(),
            };
            match enter_long(&mut self.portfolio, buy, day)? {
                EntryResult::Entered { units, .. } => {
                    self.orders.mark_executed(id, units, price, day)?
                }
                EntryResult::InsufficientCapital => {
                    self.orders.reject(id, "insufficient cash at execution", day)?
                }
            }
        }
        Ok(sold)
    }

    fn run_day(&mut self, day: NaiveDate, last_of_week: bool) -> Result<(), RotatorError> {
        self.current_date = day;
        self.apply_due_events(day);

        let sold_weekly = self.execute_due(day)?;
        if self.config.daily_stop_check {
            let sold_today = self.check_stops(day, last_of_week)? || sold_weekly;
            if sold_today
                && self.config.mid_week_backfill
                && self.portfolio.holding_count() + self.reserved().0 < self.strategy.max_positions
            {
                self.backfill(day)?;
            }
        }

        for symbol in self.portfolio.symbols() {
            if let Some(bar) = self.bar(&symbol, day) {
                if let Some(h) = self.portfolio.get_holding_mut(&symbol) {
                    h.mark(bar.close);
                }
            }
        }

        self.portfolio.reconcile(day)
    }

    /// Tier 2 sells queued yesterday fill at today's open; then today's bar
    /// is checked for Tier 1 (low through buffered stop) and Tier 2 (close
    /// below stop). Returns whether anything was sold.
    fn check_stops(&mut self, day: NaiveDate, last_of_week: bool) -> Result<bool, RotatorError> {
        let mut sold_today = false;

        let queued = std::mem::take(&mut self.close_stop_queue);
        for symbol in queued {
            match self.bar(&symbol, day) {
                Some(bar) => {
                    if exit_position(&mut self.portfolio, &symbol, bar.open, day, FillKind::CloseStop)
                        .is_some()
                    {
                        sold_today = true;
                        self.sold_this_week.insert(symbol);
                    }
                }
                None => self.close_stop_queue.push(symbol),
            }
        }

        for symbol in self.portfolio.symbols() {
            if self.close_stop_queue.contains(&symbol) {
                continue;
            }
            let Some(bar) = self.bar(&symbol, day) else { continue };
            let Some(stop) = self.portfolio.get_holding(&symbol).map(|h| h.current_stop) else {
                continue;
            };
            let hard_price = self.strategy.hard_stop_price(stop);

            if bar.low_breaches(hard_price) {
                // a gap below the buffered stop fills at the open
                let fill = hard_price.min(bar.open);
                tracing::info!(%day, %symbol, stop, hard_price, fill, low = bar.low, "tier 1 stop breached");
                if exit_position(&mut self.portfolio, &symbol, fill, day, FillKind::HardStop)
                    .is_some()
                {
                    sold_today = true;
                    self.sold_this_week.insert(symbol);
                }
            } else if !last_of_week && bar.closes_below(stop) {
                tracing::info!(%day, %symbol, stop, close = bar.close, "tier 2 stop queued");
                self.close_stop_queue.push(symbol);
            }
        }

        Ok(sold_today)
    }

    /// Promote this week's rejected buys into freed slots at today's close.
    /// Approved buys still waiting for their fill date keep their slots and
    /// cash.
    fn backfill(&mut self, day: NaiveDate) -> Result<(), RotatorError> {
        let (reserved_slots, reserved_cash) = self.reserved();
        for id in self.orders.buys_by_score(OrderStatus::Rejected) {
            if self.portfolio.holding_count() + reserved_slots >= self.strategy.max_positions {
                break;
            }
            let Some(order) = self.orders.get(id) else { continue };
            if order.origin == OrderOrigin::Pyramid {
                continue;
            }
            let (symbol, units, reference, score, volatility) = (
                order.symbol.clone(),
                order.units,
                order.reference_price,
                order.score,
                order.volatility,
            );
            if self.portfolio.has_holding(&symbol) || self.sold_this_week.contains(&symbol) {
                continue;
            }
            let Some(bar) = self.bar(&symbol, day) else { continue };
            let price = bar.close;
            if price > reference * (1.0 + self.strategy.stale_tolerance) {
                tracing::debug!(%day, %symbol, price, reference, "backfill skipped: signal is stale");
                continue;
            }

            let total_value = self.portfolio.total_value();
            let units = if units > 0 {
                units
            } else {
                match sizing::size(
                    volatility,
                    price,
                    total_value * self.strategy.risk_per_trade,
                    &self.strategy.sizing_params(),
                ) {
                    Some(s) => s.units,
                    None => continue,
                }
            };
            let units = apply_concentration_cap(
                units,
                price,
                total_value,
                self.strategy.max_position_fraction,
            );
            let spendable = (self.portfolio.cash() - reserved_cash).max(0.0);
            let units = apply_affordability_cap(units, price, spendable);
            if units == 0 {
                continue;
            }

            self.orders.approve(id, units, day)?;
            let buy = BuyOrder {
                symbol: &symbol,
                units,
                price,
                entry_stop: initial_stop(price, volatility, &self.strategy.stop_params()),
                score,
                kind: FillKind::Backfill,
            };
            match enter_long(&mut self.portfolio, buy, day)? {
                EntryResult::Entered { units, .. } => {
                    tracing::info!(%day, %symbol, units, price, "backfilled rejected buy");
                    self.orders.mark_executed(id, units, price, day)?;
                }
                EntryResult::InsufficientCapital => {
                    self.orders.reject(id, "insufficient cash at backfill", day)?;
                }
            }
        }
        Ok(())
    }

    /// Slots and cash promised to approved buys that have not filled yet.
    fn reserved(&self) -> (usize, f64) {
        let mut slots = 0;
        let mut cash = 0.0;
        for id in self.orders.buys_by_score(OrderStatus::Approved) {
            let Some(order) = self.orders.get(id) else { continue };
            if let Some(Some((_, price))) = self.week_opens.get(&order.symbol) {
                cash += order.units as f64 * price;
            }
            if order.origin != OrderOrigin::Pyramid {
                slots += 1;
            }
        }
        (slots, cash)
    }

    fn apply_due_events(&mut self, date: NaiveDate) {
        while let Some(event) = self.events.get(self.next_event) {
            if event.date > date {
                break;
            }
            let moved = self.portfolio.ledger.apply_event(event);
            tracing::info!(date = %event.date, kind = ?event.kind, amount = moved, "capital event applied");
            self.next_event += 1;
        }
    }

    /// Open of the first session this week with a bar for `symbol`.
    fn week_open(&mut self, symbol: &str, days: &[NaiveDate]) -> Option<(NaiveDate, f64)> {
        if let Some(cached) = self.week_opens.get(symbol) {
            return *cached;
        }
        let found = days
            .iter()
            .find_map(|day| self.bar(symbol, *day).map(|bar| (bar.date, bar.open)));
        self.week_opens.insert(symbol.to_string(), found);
        found
    }

    /// Open price of `symbol` when `day` is its first session this week.
    fn open_due(&self, symbol: &str, day: NaiveDate) -> Option<f64> {
        match self.week_opens.get(symbol) {
            Some(Some((date, price))) if *date == day => Some(*price),
            _ => None,
        }
    }

    /// Closes on `day` for every holding that traded that day.
    fn closes_on(&mut self, day: NaiveDate) -> HashMap<String, f64> {
        let mut closes = HashMap::new();
        for symbol in self.portfolio.symbols() {
            if let Some(bar) = self.bar(&symbol, day) {
                closes.insert(symbol, bar.close);
            }
        }
        closes
    }

    fn bar(&mut self, symbol: &str, day: NaiveDate) -> Option<OhlcvBar> {
        self.lookup(day, symbol, self.data.fetch_bar(symbol, day))
    }

    fn lookup<T>(
        &mut self,
        date: NaiveDate,
        symbol: &str,
        result: Result<Option<T>, RotatorError>,
    ) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(e) => {
                self.record_skip(date, Some(symbol), e.to_string());
                None
            }
        }
    }

    fn record_skip(&mut self, date: NaiveDate, symbol: Option<&str>, reason: String) {
        tracing::warn!(%date, symbol = symbol.unwrap_or("-"), %reason, "lookup failed, treating as no data");
        self.skipped.push(SkippedLookup {
            date,
            symbol: symbol.map(str::to_string),
            reason,
        });
    }
}
