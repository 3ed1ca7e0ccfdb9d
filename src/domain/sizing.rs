//! Risk-budgeted position sizing.

/// Sizing inputs fixed for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingParams {
    pub volatility_multiplier: f64,
    /// Per-unit risk as a fraction of price when volatility is unavailable.
    pub fallback_fraction: f64,
    /// Largest order value allowed, as a fraction of portfolio value.
    pub max_position_fraction: f64,
}

impl Default for SizingParams {
    fn default() -> Self {
        SizingParams {
            volatility_multiplier: 2.0,
            fallback_fraction: 0.03,
            max_position_fraction: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeResult {
    pub units: i64,
    pub value: f64,
    pub risk_per_unit: f64,
}

/// Units such that `units * risk_per_unit` stays within `risk_budget`.
///
/// Returns `None` for a non-positive price. The unit count is floored at 1;
/// concentration and affordability caps are the caller's job.
pub fn size(
    volatility: Option<f64>,
    price: f64,
    risk_budget: f64,
    params: &SizingParams,
) -> Option<SizeResult> {
    if !(price.is_finite() && price > 0.0) {
        return None;
    }
    let risk_per_unit = match volatility.filter(|v| v.is_finite() && *v > 0.0) {
        Some(v) => v * params.volatility_multiplier,
        None => price * params.fallback_fraction,
    };
    if risk_per_unit <= 0.0 {
        return None;
    }
    let units = ((risk_budget.max(0.0) / risk_per_unit).floor() as i64).max(1);
    Some(SizeResult {
        units,
        value: units as f64 * price,
        risk_per_unit,
    })
}

/// Shrink `units` so the order value stays within `max_fraction` of the portfolio.
pub fn apply_concentration_cap(units: i64, price: f64, portfolio_value: f64, max_fraction: f64) -> i64 {
    if price <= 0.0 || max_fraction <= 0.0 {
        return units;
    }
    let cap = ((portfolio_value * max_fraction) / price).floor() as i64;
    units.min(cap.max(0))
}

/// Shrink `units` to what `available_cash` can pay for. Zero means skip.
pub fn apply_affordability_cap(units: i64, price: f64, available_cash: f64) -> i64 {
    if price <= 0.0 {
        return 0;
    }
    let cap = (available_cash.max(0.0) / price).floor() as i64;
    units.min(cap)
}
