//! Performance metrics over the weekly equity curve and the trade log.

use chrono::NaiveDate;

use super::backtest::BacktestResult;
use super::ledger::CashFlow;
use super::portfolio::EquitySample;
use super::trade::Trade;

const PERIODS_PER_YEAR: f64 = 52.0;
const DAYS_PER_YEAR: f64 = 365.25;
const MIN_YEARS: f64 = 0.01;

const XIRR_MAX_ITERATIONS: usize = 100;
const XIRR_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub final_value: f64,
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    pub xirr: f64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub expectancy: f64,
    pub avg_holding_days: f64,
}

impl Metrics {
    /// `flows` are investor-side cash flows (contributions negative); the
    /// terminal portfolio value is added as the final positive flow for XIRR.
    pub fn compute(
        equity_curve: &[EquitySample],
        trades: &[Trade],
        initial_capital: f64,
        start_date: NaiveDate,
        risk_free_rate: f64,
        flows: &[CashFlow],
    ) -> Self {
        let final_value = equity_curve
            .last()
            .map(|p| p.portfolio_value)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            final_value / initial_capital - 1.0
        } else {
            0.0
        };

        let end_date = equity_curve.last().map(|p| p.date).unwrap_or(start_date);
        let years = ((end_date - start_date).num_days() as f64 / DAYS_PER_YEAR).max(MIN_YEARS);
        let cagr = if initial_capital > 0.0 && final_value > 0.0 {
            (final_value / initial_capital).powf(1.0 / years) - 1.0
        } else if initial_capital > 0.0 {
            -1.0
        } else {
            0.0
        };

        let returns = match seed_sample(equity_curve, initial_capital, start_date, flows) {
            Some(seed) => {
                let seeded: Vec<EquitySample> =
                    std::iter::once(seed).chain(equity_curve.iter().copied()).collect();
                period_returns(&seeded, flows)
            }
            None => period_returns(equity_curve, flows),
        };
        let weekly_rf = risk_free_rate / PERIODS_PER_YEAR;
        let sharpe_ratio = sharpe(&returns, weekly_rf);
        let sortino_ratio = sortino(&returns, weekly_rf);

        let max_drawdown = max_drawdown(equity_curve);
        let calmar_ratio = if max_drawdown > 0.0 {
            cagr / max_drawdown
        } else if cagr > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let mut cash_flows = flows.to_vec();
        if let Some(last) = equity_curve.last() {
            cash_flows.push(CashFlow {
                date: last.date,
                amount: last.portfolio_value,
            });
        }
        let xirr = xirr(&cash_flows).unwrap_or(0.0);

        let stats = TradeStats::from_trades(trades);

        Metrics {
            final_value,
            total_return,
            cagr,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            calmar_ratio,
            xirr,
            total_trades: stats.total,
            trades_won: stats.won,
            trades_lost: stats.lost,
            win_rate: stats.win_rate(),
            profit_factor: stats.profit_factor(),
            avg_win: stats.avg_win(),
            avg_loss: stats.avg_loss(),
            largest_win: stats.largest_win,
            largest_loss: stats.largest_loss,
            expectancy: stats.expectancy(),
            avg_holding_days: stats.avg_holding_days(),
        }
    }

    pub fn from_result(result: &BacktestResult, start_date: NaiveDate, risk_free_rate: f64) -> Self {
        Self::compute(
            &result.portfolio.equity_curve,
            &result.trades(),
            result.initial_capital,
            start_date,
            risk_free_rate,
            result.portfolio.ledger.flows(),
        )
    }
}

/// Fraction as a percentage rounded to two decimals, for display only.
pub fn display_pct(value: f64) -> f64 {
    round2(value * 100.0)
}

pub fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        value
    }
}

/// Ratio formatted for reports; infinite sentinels print as `inf`.
pub fn format_ratio(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "inf".into() } else { "-inf".into() }
    } else {
        format!("{:.2}", value)
    }
}

#[derive(Debug, Default)]
struct TradeStats {
    total: usize,
    won: usize,
    lost: usize,
    gross_profit: f64,
    gross_loss: f64,
    largest_win: f64,
    largest_loss: f64,
    holding_days: i64,
}

impl TradeStats {
    fn from_trades(trades: &[Trade]) -> Self {
        let mut stats = TradeStats::default();
        for trade in trades {
            stats.total += 1;
            stats.holding_days += trade.holding_days;
            if trade.pnl > 0.0 {
                stats.won += 1;
                stats.gross_profit += trade.pnl;
                stats.largest_win = stats.largest_win.max(trade.pnl);
            } else if trade.pnl < 0.0 {
                stats.lost += 1;
                stats.gross_loss += trade.pnl.abs();
                stats.largest_loss = stats.largest_loss.max(trade.pnl.abs());
            }
        }
        stats
    }

    fn win_rate(&self) -> f64 {
        if self.total > 0 {
            self.won as f64 / self.total as f64
        } else {
            0.0
        }
    }

    fn profit_factor(&self) -> f64 {
        if self.gross_loss > 0.0 {
            self.gross_profit / self.gross_loss
        } else if self.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn avg_win(&self) -> f64 {
        if self.won > 0 {
            self.gross_profit / self.won as f64
        } else {
            0.0
        }
    }

    fn avg_loss(&self) -> f64 {
        if self.lost > 0 {
            self.gross_loss / self.lost as f64
        } else {
            0.0
        }
    }

    /// Average PnL per trade: `win_rate * avg_win - loss_rate * avg_loss`.
    fn expectancy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let loss_rate = self.lost as f64 / self.total as f64;
        self.win_rate() * self.avg_win() - loss_rate * self.avg_loss()
    }

    fn avg_holding_days(&self) -> f64 {
        if self.total > 0 {
            self.holding_days as f64 / self.total as f64
        } else {
            0.0
        }
    }
}

/// Starting capital as a sample at the funding date, so the first period's
/// return counts. None when the curve already starts there.
fn seed_sample(
    curve: &[EquitySample],
    initial_capital: f64,
    start_date: NaiveDate,
    flows: &[CashFlow],
) -> Option<EquitySample> {
    let first = curve.first()?;
    let date = flows.first().map_or(start_date, |f| f.date.max(start_date));
    (initial_capital > 0.0 && date < first.date).then_some(EquitySample {
        date,
        portfolio_value: initial_capital,
    })
}

/// Period-over-period returns with external contributions and withdrawals
/// between two samples taken out of the gain.
fn period_returns(curve: &[EquitySample], flows: &[CashFlow]) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| {
            let (prev, curr) = (&w[0], &w[1]);
            let contributed: f64 = flows
                .iter()
                .filter(|f| f.date > prev.date && f.date <= curr.date)
                .map(|f| -f.amount)
                .sum();
            if prev.portfolio_value > 0.0 {
                (curr.portfolio_value - contributed) / prev.portfolio_value - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sharpe(returns: &[f64], period_rf: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let m = mean(returns);
    let variance =
        returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let stddev = variance.sqrt();
    if stddev > 0.0 {
        (m - period_rf) / stddev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

fn sortino(returns: &[f64], period_rf: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let excess = mean(returns) - period_rf;
    let downside = returns
        .iter()
        .map(|r| (r - period_rf).min(0.0).powi(2))
        .sum::<f64>()
        / returns.len() as f64;
    let downside_dev = downside.sqrt();
    if downside_dev > 0.0 {
        excess / downside_dev * PERIODS_PER_YEAR.sqrt()
    } else if excess > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

fn max_drawdown(curve: &[EquitySample]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for point in curve {
        peak = peak.max(point.portfolio_value);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - point.portfolio_value) / peak);
        }
    }
    max_dd
}

fn npv(flows: &[CashFlow], origin: NaiveDate, rate: f64) -> f64 {
    flows
        .iter()
        .map(|f| {
            let t = (f.date - origin).num_days() as f64 / 365.0;
            f.amount / (1.0 + rate).powf(t)
        })
        .sum()
}

fn npv_derivative(flows: &[CashFlow], origin: NaiveDate, rate: f64) -> f64 {
    flows
        .iter()
        .map(|f| {
            let t = (f.date - origin).num_days() as f64 / 365.0;
            -t * f.amount / (1.0 + rate).powf(t + 1.0)
        })
        .sum()
}

/// Money-weighted annual return of dated cash flows.
///
/// Newton's method from 10%, falling back to bisection when Newton leaves
/// the valid range or fails to converge. `None` when the flows do not
/// change sign or no root is bracketed.
pub fn xirr(flows: &[CashFlow]) -> Option<f64> {
    let has_negative = flows.iter().any(|f| f.amount < 0.0);
    let has_positive = flows.iter().any(|f| f.amount > 0.0);
    if !(has_negative && has_positive) {
        return None;
    }
    let origin = flows.iter().map(|f| f.date).min()?;

    let mut rate = 0.1;
    for _ in 0..XIRR_MAX_ITERATIONS {
        let value = npv(flows, origin, rate);
        if value.abs() < XIRR_TOLERANCE {
            return Some(rate);
        }
        let slope = npv_derivative(flows, origin, rate);
        if slope == 0.0 || !slope.is_finite() {
            break;
        }
        let next = rate - value / slope;
        if !next.is_finite() || next <= -1.0 {
            break;
        }
        if (next - rate).abs() < XIRR_TOLERANCE {
            return Some(next);
        }
        rate = next;
    }

    bisect(flows, origin)
}

fn bisect(flows: &[CashFlow], origin: NaiveDate) -> Option<f64> {
    let (mut lo, mut hi) = (-0.9999, 10.0);
    let mut f_lo = npv(flows, origin, lo);
    if f_lo * npv(flows, origin, hi) > 0.0 {
        return None;
    }
    for _ in 0..200 {
        let mid = (lo + hi) / 2.0;
        let f_mid = npv(flows, origin, mid);
        if f_mid.abs() < XIRR_TOLERANCE || (hi - lo) / 2.0 < XIRR_TOLERANCE {
            return Some(mid);
        }
        if f_mid * f_lo < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
    }
    Some((lo + hi) / 2.0)
}
