//! Admission-control engine for one planning cycle.
//!
//! Phase 1 walks every holding, refreshes its stop and exits those that hit
//! the stop or whose score fell below the exit threshold. Phase 2 walks the
//! ranked candidates: held names may be pyramided, vacancies are filled with
//! BUYs, and once capacity is exhausted a candidate may displace the weakest
//! incumbent that is no longer ranked, provided it clears the swap buffer.
//! The first candidate that fails the buffer ends the cycle.

use std::collections::HashSet;

use crate::domain::decision::{
    Candidate, DecisionBatch, Entry, MarketSnapshot, Quote, SellReason, TradingDecision,
    rank_descending,
};
use crate::domain::holding::Holding;
use crate::domain::sizing::{self, apply_concentration_cap};
use crate::domain::stop_loss::effective_stop;
use crate::domain::strategy::Strategy;

/// Holding that survived Phase 1, with its refreshed stop.
#[derive(Debug)]
struct Incumbent<'a> {
    holding: &'a Holding,
    stop: f64,
    released: bool,
}

pub struct TradingDecisionEngine<'a> {
    strategy: &'a Strategy,
}

impl<'a> TradingDecisionEngine<'a> {
    pub fn new(strategy: &'a Strategy) -> Self {
        Self { strategy }
    }

    /// Plan one cycle. `portfolio_value` sets the risk budget and the
    /// concentration cap for new entries.
    pub fn plan(
        &self,
        holdings: &[Holding],
        candidates: &[Candidate],
        market: &MarketSnapshot,
        portfolio_value: f64,
    ) -> DecisionBatch {
        let mut batch = DecisionBatch::default();
        let mut exited: HashSet<&str> = HashSet::new();
        let mut incumbents: Vec<Incumbent<'_>> = Vec::with_capacity(holdings.len());

        for holding in holdings {
            let Some(quote) = market.get(&holding.symbol) else {
                tracing::debug!(symbol = %holding.symbol, "no quote for holding, skipping this cycle");
                batch.skipped.push(holding.symbol.clone());
                incumbents.push(Incumbent {
                    holding,
                    stop: holding.current_stop,
                    released: false,
                });
                continue;
            };

            let levels = effective_stop(
                holding.entry_price,
                quote.price,
                quote.volatility,
                holding.entry_stop,
                Some(holding.current_stop),
                &self.strategy.stop_params(),
            );
            let stop = levels.effective.max(holding.current_stop);
            if stop > holding.current_stop {
                batch.stop_updates.push((holding.symbol.clone(), stop));
            }

            let reason = if quote.price <= stop {
                Some(SellReason::StopLoss {
                    price: quote.price,
                    stop,
                })
            } else if holding.score < self.strategy.exit_threshold {
                Some(SellReason::ScoreDegradation {
                    score: holding.score,
                    threshold: self.strategy.exit_threshold,
                })
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    exited.insert(&holding.symbol);
                    batch.decisions.push(TradingDecision::Sell {
                        symbol: holding.symbol.clone(),
                        units: holding.units,
                        reference_price: quote.price,
                        reason,
                    });
                }
                None => incumbents.push(Incumbent {
                    holding,
                    stop,
                    released: false,
                }),
            }
        }

        let mut ranked = candidates.to_vec();
        rank_descending(&mut ranked);
        let ranked_symbols: HashSet<&str> = ranked.iter().map(|c| c.symbol.as_str()).collect();
        let mut vacancies = self.strategy.max_positions.saturating_sub(incumbents.len());
        let mut entered: HashSet<&str> = HashSet::new();
        let risk_budget = portfolio_value * self.strategy.risk_per_trade;

        for candidate in &ranked {
            let symbol = candidate.symbol.as_str();
            if exited.contains(symbol) || entered.contains(symbol) {
                continue;
            }

            if let Some(incumbent) = incumbents.iter().find(|i| i.holding.symbol == symbol) {
                if self.strategy.pyramiding {
                    if let Some(entry) =
                        self.pyramid_entry(incumbent, candidate, market, risk_budget, portfolio_value)
                    {
                        entered.insert(symbol);
                        batch.decisions.push(TradingDecision::PyramidAdd(entry));
                    }
                }
                continue;
            }

            let Some(quote) = market.get(symbol) else {
                tracing::debug!(symbol, "no quote for candidate, skipping this cycle");
                batch.skipped.push(candidate.symbol.clone());
                continue;
            };
            let Some(entry) = self.new_entry(candidate, quote, risk_budget, portfolio_value, 1.0)
            else {
                continue;
            };

            if vacancies > 0 {
                vacancies -= 1;
                entered.insert(symbol);
                batch.decisions.push(TradingDecision::Buy(entry));
                continue;
            }

            let weakest = incumbents
                .iter_mut()
                .filter(|i| !i.released && !ranked_symbols.contains(i.holding.symbol.as_str()))
                .fold(None::<&mut Incumbent<'_>>, |low, i| match low {
                    Some(l) if l.holding.score <= i.holding.score => Some(l),
                    _ => Some(i),
                });
            let Some(weakest) = weakest else {
                break;
            };

            if candidate.score > self.strategy.swap_buffer * weakest.holding.score {
                weakest.released = true;
                entered.insert(symbol);
                let outgoing_price = market
                    .get(&weakest.holding.symbol)
                    .map(|q| q.price)
                    .unwrap_or(weakest.holding.current_price);
                batch.decisions.push(TradingDecision::Swap {
                    outgoing: weakest.holding.symbol.clone(),
                    outgoing_units: weakest.holding.units,
                    outgoing_price,
                    incumbent_score: weakest.holding.score,
                    incoming: entry,
                });
            } else {
                break;
            }
        }

        batch
    }

    fn new_entry(
        &self,
        candidate: &Candidate,
        quote: &Quote,
        risk_budget: f64,
        portfolio_value: f64,
        fraction: f64,
    ) -> Option<Entry> {
        let sized = sizing::size(
            quote.volatility,
            quote.price,
            risk_budget,
            &self.strategy.sizing_params(),
        )?;
        let scaled = ((sized.units as f64) * fraction).floor() as i64;
        let units = apply_concentration_cap(
            scaled.max(1),
            quote.price,
            portfolio_value,
            self.strategy.max_position_fraction,
        );
        (units > 0).then(|| Entry {
            symbol: candidate.symbol.clone(),
            units,
            score: candidate.score,
            reference_price: quote.price,
            volatility: quote.volatility,
            risk_per_unit: sized.risk_per_unit,
        })
    }

    /// Add to a winner whose stop has reached entry and whose trend sits above entry.
    fn pyramid_entry(
        &self,
        incumbent: &Incumbent<'_>,
        candidate: &Candidate,
        market: &MarketSnapshot,
        risk_budget: f64,
        portfolio_value: f64,
    ) -> Option<Entry> {
        let holding = incumbent.holding;
        let quote = market.get(&holding.symbol)?;
        if !holding.is_risk_free_at(incumbent.stop) {
            return None;
        }
        if quote.trend.is_none_or(|t| t <= holding.entry_price) {
            return None;
        }
        let mut entry = self.new_entry(
            candidate,
            quote,
            risk_budget,
            portfolio_value,
            self.strategy.pyramid_fraction,
        )?;
        // the concentration cap covers the combined position
        let room = apply_concentration_cap(
            i64::MAX,
            quote.price,
            portfolio_value,
            self.strategy.max_position_fraction,
        ) - holding.units;
        entry.units = entry.units.min(room);
        (entry.units > 0).then_some(entry)
    }
}
