//! Core domain types and logic.

pub mod backtest;
pub mod calendar;
pub mod config_validation;
pub mod costs;
pub mod cycle;
pub mod decision;
pub mod engine;
pub mod error;
pub mod execution;
pub mod holding;
pub mod ledger;
pub mod market_data;
pub mod metrics;
pub mod ohlcv;
pub mod order;
pub mod portfolio;
pub mod simulator;
pub mod sizing;
pub mod stop_loss;
pub mod strategy;
pub mod trade;
