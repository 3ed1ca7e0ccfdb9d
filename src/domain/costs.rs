//! Indian equity delivery charges and capital-gains tax.
//!
//! Reporting only: nothing here touches the capital ledger.

use serde::Serialize;

use super::order::Side;
use super::trade::{Fill, Trade};

const CRORE: f64 = 1e7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostSchedule {
    pub brokerage_rate: f64,
    pub brokerage_cap: f64,
    pub stt_rate: f64,
    pub exchange_rate: f64,
    pub sebi_per_crore: f64,
    /// Buy side only.
    pub stamp_rate: f64,
    /// Levied on brokerage + exchange + SEBI.
    pub gst_rate: f64,
    pub ipf_per_crore: f64,
    /// Flat depository charge per sell.
    pub dp_charge: f64,
}

impl Default for CostSchedule {
    fn default() -> Self {
        CostSchedule {
            brokerage_rate: 0.0,
            brokerage_cap: 0.0,
            stt_rate: 0.001,
            exchange_rate: 0.0000345,
            sebi_per_crore: 10.0,
            stamp_rate: 0.00015,
            gst_rate: 0.18,
            ipf_per_crore: 10.0,
            dp_charge: 13.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChargeBreakdown {
    pub brokerage: f64,
    pub stt: f64,
    pub exchange: f64,
    pub sebi: f64,
    pub stamp: f64,
    pub gst: f64,
    pub ipf: f64,
    pub dp: f64,
}

impl ChargeBreakdown {
    pub fn total(&self) -> f64 {
        self.brokerage + self.stt + self.exchange + self.sebi + self.stamp + self.gst + self.ipf + self.dp
    }

    fn add(&mut self, other: &ChargeBreakdown) {
        self.brokerage += other.brokerage;
        self.stt += other.stt;
        self.exchange += other.exchange;
        self.sebi += other.sebi;
        self.stamp += other.stamp;
        self.gst += other.gst;
        self.ipf += other.ipf;
        self.dp += other.dp;
    }
}

impl CostSchedule {
    pub fn charges(&self, side: Side, value: f64) -> ChargeBreakdown {
        let value = value.max(0.0);
        let brokerage = if self.brokerage_cap > 0.0 {
            (value * self.brokerage_rate).min(self.brokerage_cap)
        } else {
            value * self.brokerage_rate
        };
        let exchange = value * self.exchange_rate;
        let sebi = value * self.sebi_per_crore / CRORE;
        ChargeBreakdown {
            brokerage,
            stt: value * self.stt_rate,
            exchange,
            sebi,
            stamp: match side {
                Side::Buy => value * self.stamp_rate,
                Side::Sell => 0.0,
            },
            gst: (brokerage + exchange + sebi) * self.gst_rate,
            ipf: value * self.ipf_per_crore / CRORE,
            dp: match side {
                Side::Buy => 0.0,
                Side::Sell => self.dp_charge,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxSchedule {
    pub stcg_rate: f64,
    pub ltcg_rate: f64,
    /// Long-term gains below this are untaxed, once per run.
    pub ltcg_exemption: f64,
    pub long_term_days: i64,
}

impl Default for TaxSchedule {
    fn default() -> Self {
        TaxSchedule {
            stcg_rate: 0.20,
            ltcg_rate: 0.125,
            ltcg_exemption: 125_000.0,
            long_term_days: 365,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TaxBreakdown {
    pub short_term_gains: f64,
    pub long_term_gains: f64,
    pub stcg_tax: f64,
    pub ltcg_tax: f64,
}

impl TaxBreakdown {
    pub fn total(&self) -> f64 {
        self.stcg_tax + self.ltcg_tax
    }
}

impl TaxSchedule {
    /// Tax on winning trades; losing trades earn no refund.
    pub fn assess(&self, trades: &[Trade]) -> TaxBreakdown {
        let mut out = TaxBreakdown::default();
        for trade in trades.iter().filter(|t| t.pnl > 0.0) {
            if trade.holding_days < self.long_term_days {
                out.short_term_gains += trade.pnl;
            } else {
                out.long_term_gains += trade.pnl;
            }
        }
        out.stcg_tax = out.short_term_gains * self.stcg_rate;
        out.ltcg_tax = (out.long_term_gains - self.ltcg_exemption).max(0.0) * self.ltcg_rate;
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostSummary {
    pub gross_pnl: f64,
    pub buy_charges: f64,
    pub sell_charges: f64,
    pub charges: ChargeBreakdown,
    pub tax: TaxBreakdown,
    pub net_pnl: f64,
    pub net_return: f64,
}

impl CostSummary {
    /// `gross_pnl` is final value less net contributed capital.
    pub fn compute(
        fills: &[Fill],
        trades: &[Trade],
        gross_pnl: f64,
        contributed: f64,
        costs: &CostSchedule,
        tax: &TaxSchedule,
    ) -> Self {
        let mut charges = ChargeBreakdown::default();
        let (mut buy_charges, mut sell_charges) = (0.0, 0.0);
        for fill in fills {
            let c = costs.charges(fill.side, fill.value());
            match fill.side {
                Side::Buy => buy_charges += c.total(),
                Side::Sell => sell_charges += c.total(),
            }
            charges.add(&c);
        }
        let tax = tax.assess(trades);
        let net_pnl = gross_pnl - charges.total() - tax.total();
        CostSummary {
            gross_pnl,
            buy_charges,
            sell_charges,
            charges,
            tax,
            net_pnl,
            net_return: if contributed > 0.0 { net_pnl / contributed } else { 0.0 },
        }
    }

    pub fn total_charges(&self) -> f64 {
        self.charges.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::FillKind;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn make_trade(pnl: f64, holding_days: i64) -> Trade {
        Trade {
            symbol: "INFY".into(),
            entry_date: date(1),
            exit_date: date(1) + chrono::Duration::days(holding_days),
            units: 100,
            entry_price: 1000.0,
            exit_price: 1000.0 + pnl / 100.0,
            pnl,
            holding_days,
            exit_kind: FillKind::Exit,
        }
    }

    fn make_fill(side: Side, value: f64) -> Fill {
        Fill {
            date: date(2),
            symbol: "INFY".into(),
            side,
            units: 100,
            price: value / 100.0,
            kind: FillKind::Entry,
        }
    }

    #[test]
    fn buy_charges_on_one_lakh() {
        let c = CostSchedule::default().charges(Side::Buy, 100_000.0);
        assert_relative_eq!(c.stt, 100.0, epsilon = 1e-9);
        assert_relative_eq!(c.exchange, 3.45, epsilon = 1e-9);
        assert_relative_eq!(c.sebi, 0.1, epsilon = 1e-9);
        assert_relative_eq!(c.stamp, 15.0, epsilon = 1e-9);
        assert_relative_eq!(c.gst, (3.45 + 0.1) * 0.18, epsilon = 1e-9);
        assert_relative_eq!(c.ipf, 0.1, epsilon = 1e-9);
        assert!(c.dp.abs() < f64::EPSILON);
        assert_relative_eq!(c.total(), 119.289, epsilon = 1e-9);
    }

    #[test]
    fn sell_charges_skip_stamp_add_dp() {
        let c = CostSchedule::default().charges(Side::Sell, 100_000.0);
        assert!(c.stamp.abs() < f64::EPSILON);
        assert!((c.dp - 13.0).abs() < f64::EPSILON);
        assert_relative_eq!(c.total(), 100.0 + 3.45 + 0.1 + 0.639 + 0.1 + 13.0, epsilon = 1e-9);
    }

    #[test]
    fn brokerage_is_capped() {
        let schedule = CostSchedule {
            brokerage_rate: 0.001,
            brokerage_cap: 20.0,
            ..CostSchedule::default()
        };
        let c = schedule.charges(Side::Buy, 100_000.0);
        assert!((c.brokerage - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn short_term_gains_taxed_at_twenty_percent() {
        let tax = TaxSchedule::default().assess(&[make_trade(10_000.0, 30), make_trade(-5_000.0, 30)]);
        assert_relative_eq!(tax.stcg_tax, 2_000.0, epsilon = 1e-9);
        assert!(tax.ltcg_tax.abs() < f64::EPSILON);
    }

    #[test]
    fn long_term_gains_above_exemption() {
        let tax = TaxSchedule::default().assess(&[make_trade(100_000.0, 400), make_trade(75_000.0, 365)]);
        assert_relative_eq!(tax.long_term_gains, 175_000.0, epsilon = 1e-9);
        assert_relative_eq!(tax.ltcg_tax, 50_000.0 * 0.125, epsilon = 1e-9);
    }

    #[test]
    fn long_term_below_exemption_is_free() {
        let tax = TaxSchedule::default().assess(&[make_trade(100_000.0, 500)]);
        assert!(tax.total().abs() < f64::EPSILON);
    }

    #[test]
    fn summary_nets_out_costs_and_tax() {
        let fills = vec![make_fill(Side::Buy, 100_000.0), make_fill(Side::Sell, 110_000.0)];
        let trades = vec![make_trade(10_000.0, 10)];
        let s = CostSummary::compute(
            &fills,
            &trades,
            10_000.0,
            100_000.0,
            &CostSchedule::default(),
            &TaxSchedule::default(),
        );
        let expected_charges = s.buy_charges + s.sell_charges;
        assert_relative_eq!(s.total_charges(), expected_charges, epsilon = 1e-9);
        assert_relative_eq!(s.net_pnl, 10_000.0 - expected_charges - 2_000.0, epsilon = 1e-9);
        assert_relative_eq!(s.net_return, s.net_pnl / 100_000.0, epsilon = 1e-12);
    }
}
