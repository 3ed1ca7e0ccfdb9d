//! Capital ledger: cash plus running totals of everything that moved it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::error::RotatorError;

/// Cash may drift from its reconstruction by at most half a cent.
pub const RECONCILE_TOLERANCE: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapitalEventKind {
    Initial,
    Infusion,
    Withdrawal,
}

impl std::str::FromStr for CapitalEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "initial" => Ok(CapitalEventKind::Initial),
            "infusion" | "deposit" => Ok(CapitalEventKind::Infusion),
            "withdrawal" | "withdraw" => Ok(CapitalEventKind::Withdrawal),
            other => Err(format!("unknown capital event kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalEvent {
    pub date: NaiveDate,
    pub amount: f64,
    pub kind: CapitalEventKind,
}

/// Investor-side cash flow: contributions negative, withdrawals positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapitalLedger {
    cash: f64,
    capital_in: f64,
    capital_out: f64,
    bought: f64,
    sold: f64,
    flows: Vec<CashFlow>,
}

impl CapitalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(date: NaiveDate, amount: f64) -> Self {
        let mut ledger = Self::new();
        ledger.apply_event(&CapitalEvent {
            date,
            amount,
            kind: CapitalEventKind::Initial,
        });
        ledger
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn capital_in(&self) -> f64 {
        self.capital_in
    }

    pub fn capital_out(&self) -> f64 {
        self.capital_out
    }

    pub fn bought(&self) -> f64 {
        self.bought
    }

    pub fn sold(&self) -> f64 {
        self.sold
    }

    pub fn flows(&self) -> &[CashFlow] {
        &self.flows
    }

    /// Apply a capital event and return the amount actually moved.
    /// Withdrawals are clipped to available cash.
    pub fn apply_event(&mut self, event: &CapitalEvent) -> f64 {
        let amount = event.amount.abs();
        match event.kind {
            CapitalEventKind::Initial | CapitalEventKind::Infusion => {
                self.cash += amount;
                self.capital_in += amount;
                self.flows.push(CashFlow {
                    date: event.date,
                    amount: -amount,
                });
                amount
            }
            CapitalEventKind::Withdrawal => {
                let taken = amount.min(self.cash.max(0.0));
                if taken < amount {
                    tracing::warn!(
                        date = %event.date,
                        requested = amount,
                        taken,
                        "withdrawal clipped to available cash"
                    );
                }
                self.cash -= taken;
                self.capital_out += taken;
                if taken > 0.0 {
                    self.flows.push(CashFlow {
                        date: event.date,
                        amount: taken,
                    });
                }
                taken
            }
        }
    }

    /// Pay for a purchase. Fails rather than let cash go negative.
    pub fn debit(&mut self, date: NaiveDate, amount: f64) -> Result<(), RotatorError> {
        if amount > self.cash + RECONCILE_TOLERANCE {
            return Err(RotatorError::StateInconsistency {
                date,
                reason: format!(
                    "purchase of {amount:.2} exceeds available cash {:.2}",
                    self.cash
                ),
            });
        }
        self.cash -= amount;
        self.bought += amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: f64) {
        self.cash += amount;
        self.sold += amount;
    }

    /// Cash rebuilt from the running totals.
    pub fn expected_cash(&self) -> f64 {
        self.capital_in - self.capital_out - self.bought + self.sold
    }

    pub fn reconcile(&self, date: NaiveDate) -> Result<(), RotatorError> {
        let expected = self.expected_cash();
        if (self.cash - expected).abs() > RECONCILE_TOLERANCE {
            return Err(RotatorError::StateInconsistency {
                date,
                reason: format!(
                    "cash {:.2} does not reconcile with capital in {:.2} - out {:.2} - bought {:.2} + sold {:.2}",
                    self.cash, self.capital_in, self.capital_out, self.bought, self.sold
                ),
            });
        }
        if self.cash < -RECONCILE_TOLERANCE {
            return Err(RotatorError::StateInconsistency {
                date,
                reason: format!("negative cash {:.2}", self.cash),
            });
        }
        Ok(())
    }
}
