//! Trailing stop-loss calculation.
//!
//! Two trails are combined: a volatility trail that ratchets up behind
//! price, and a stepped hard trail that lifts the entry stop by one
//! `step_percent` tier for every full tier of gain, never above entry.
//! The effective stop is the higher of the two.

/// Parameters shared by every stop computation in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopLossParams {
    pub volatility_multiplier: f64,
    pub step_percent: f64,
    /// Distance below entry used when no volatility reading exists.
    pub fallback_fraction: f64,
}

impl Default for StopLossParams {
    fn default() -> Self {
        StopLossParams {
            volatility_multiplier: 2.0,
            step_percent: 0.10,
            fallback_fraction: 0.06,
        }
    }
}

/// Components of a stop evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopLevels {
    pub volatility_stop: f64,
    pub hard_stop: f64,
    pub effective: f64,
}

// Guards floor() against 0.3 / 0.1 = 2.9999999999999996.
const TIER_EPSILON: f64 = 1e-9;

fn usable(volatility: Option<f64>) -> Option<f64> {
    volatility.filter(|v| v.is_finite() && *v > 0.0)
}

/// Stop set at entry: `entry - multiplier * volatility`, or a fixed
/// fraction below entry when volatility is unavailable.
pub fn initial_stop(entry_price: f64, volatility: Option<f64>, params: &StopLossParams) -> f64 {
    match usable(volatility) {
        Some(v) => entry_price - params.volatility_multiplier * v,
        None => entry_price * (1.0 - params.fallback_fraction),
    }
}

/// Volatility trail, ratcheted against `previous_stop`.
pub fn volatility_trail(
    entry_price: f64,
    current_price: f64,
    volatility: Option<f64>,
    previous_stop: Option<f64>,
    params: &StopLossParams,
) -> f64 {
    match (usable(volatility), previous_stop) {
        (Some(v), Some(prev)) => (current_price - params.volatility_multiplier * v).max(prev),
        (Some(v), None) => current_price - params.volatility_multiplier * v,
        (None, Some(prev)) => prev,
        (None, None) => entry_price * (1.0 - params.fallback_fraction),
    }
}

/// Stepped hard trail, capped at the entry price.
pub fn hard_trail(entry_price: f64, current_price: f64, entry_stop: f64, step_percent: f64) -> f64 {
    if current_price <= entry_price || entry_price <= 0.0 || step_percent <= 0.0 {
        return entry_stop;
    }
    let gain = (current_price - entry_price) / entry_price;
    let tiers = (gain / step_percent + TIER_EPSILON).floor();
    let stepped = entry_stop * (1.0 + step_percent * tiers);
    stepped.min(entry_price).max(entry_stop)
}

/// Effective stop for a holding given the latest price and volatility.
///
/// The result is never below `previous_stop` when one is supplied.
pub fn effective_stop(
    entry_price: f64,
    current_price: f64,
    current_volatility: Option<f64>,
    entry_stop: f64,
    previous_stop: Option<f64>,
    params: &StopLossParams,
) -> StopLevels {
    let volatility_stop = volatility_trail(
        entry_price,
        current_price,
        current_volatility,
        previous_stop,
        params,
    );
    let hard_stop = hard_trail(entry_price, current_price, entry_stop, params.step_percent);
    StopLevels {
        volatility_stop,
        hard_stop,
        effective: volatility_stop.max(hard_stop),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn sample_params() -> StopLossParams {
        StopLossParams::default()
    }

    #[test]
    fn initial_stop_uses_volatility() {
        let stop = initial_stop(100.0, Some(5.0), &sample_params());
        assert_relative_eq!(stop, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn initial_stop_falls_back_without_volatility() {
        let stop = initial_stop(100.0, None, &sample_params());
        assert_relative_eq!(stop, 94.0, epsilon = 1e-9);
        let stop = initial_stop(100.0, Some(0.0), &sample_params());
        assert_relative_eq!(stop, 94.0, epsilon = 1e-9);
    }

    #[test]
    fn hard_trail_holds_entry_stop_below_entry() {
        assert_relative_eq!(hard_trail(100.0, 95.0, 90.0, 0.10), 90.0, epsilon = 1e-9);
        assert_relative_eq!(hard_trail(100.0, 100.0, 90.0, 0.10), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn hard_trail_steps_per_full_tier() {
        // 15% gain crosses one tier only
        assert_relative_eq!(hard_trail(100.0, 115.0, 80.0, 0.10), 88.0, epsilon = 1e-9);
        assert_relative_eq!(hard_trail(100.0, 109.9, 80.0, 0.10), 80.0, epsilon = 1e-9);
    }

    #[test]
    fn hard_trail_capped_at_entry() {
        // two tiers: 90 * 1.2 = 108 > entry
        assert_relative_eq!(hard_trail(100.0, 120.0, 90.0, 0.10), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn hard_trail_exact_tier_boundary() {
        assert_relative_eq!(hard_trail(100.0, 130.0, 70.0, 0.10), 91.0, epsilon = 1e-9);
    }

    #[test]
    fn volatility_trail_never_decreases() {
        let params = sample_params();
        let stop = volatility_trail(100.0, 105.0, Some(5.0), Some(97.0), &params);
        assert_relative_eq!(stop, 97.0, epsilon = 1e-9);
        let stop = volatility_trail(100.0, 120.0, Some(5.0), Some(97.0), &params);
        assert_relative_eq!(stop, 110.0, epsilon = 1e-9);
    }

    #[test]
    fn volatility_trail_degenerate_uses_previous() {
        let params = sample_params();
        assert_relative_eq!(
            volatility_trail(100.0, 120.0, Some(-1.0), Some(93.0), &params),
            93.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(volatility_trail(100.0, 120.0, None, None, &params), 94.0, epsilon = 1e-9);
    }

    #[test]
    fn effective_stop_takes_higher_trail() {
        let params = sample_params();
        let levels = effective_stop(100.0, 120.0, Some(10.0), 90.0, Some(90.0), &params);
        assert_relative_eq!(levels.volatility_stop, 100.0, epsilon = 1e-9);
        assert_relative_eq!(levels.hard_stop, 100.0, epsilon = 1e-9);
        assert_relative_eq!(levels.effective, 100.0, epsilon = 1e-9);

        let levels = effective_stop(100.0, 125.0, Some(2.0), 90.0, Some(95.0), &params);
        assert_relative_eq!(levels.volatility_stop, 121.0, epsilon = 1e-9);
        assert_relative_eq!(levels.effective, 121.0, epsilon = 1e-9);
    }

    #[test]
    fn effective_stop_hard_trail_wins_on_wide_volatility() {
        let params = sample_params();
        let levels = effective_stop(100.0, 112.0, Some(20.0), 90.0, Some(90.0), &params);
        assert_relative_eq!(levels.volatility_stop, 90.0, epsilon = 1e-9);
        assert_relative_eq!(levels.hard_stop, 99.0, epsilon = 1e-9);
        assert_relative_eq!(levels.effective, 99.0, epsilon = 1e-9);
    }

    proptest! {
        #[test]
        fn stop_is_non_decreasing(
            prices in prop::collection::vec(50.0f64..200.0, 1..40),
            vols in prop::collection::vec(prop::option::of(0.0f64..15.0), 40),
        ) {
            let params = sample_params();
            let entry = 100.0;
            let entry_stop = initial_stop(entry, Some(5.0), &params);
            let mut stop = entry_stop;
            for (price, vol) in prices.iter().zip(vols.iter()) {
                let next = effective_stop(entry, *price, *vol, entry_stop, Some(stop), &params).effective;
                prop_assert!(next >= stop);
                stop = next;
            }
        }
    }
}
