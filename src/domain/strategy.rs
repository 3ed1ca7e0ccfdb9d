//! Rotation strategy parameters.

use crate::domain::sizing::SizingParams;
use crate::domain::stop_loss::StopLossParams;

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub max_positions: usize,
    /// Number of top-ranked symbols offered to the admission loop.
    pub candidate_pool: usize,
    /// Challenger must score above `swap_buffer * incumbent` to swap in.
    pub swap_buffer: f64,
    pub exit_threshold: f64,
    /// Risk budget per entry as a fraction of portfolio value.
    pub risk_per_trade: f64,
    pub max_position_fraction: f64,
    pub volatility_multiplier: f64,
    pub step_percent: f64,
    pub stop_fallback_fraction: f64,
    pub sizing_fallback_fraction: f64,
    pub hard_buffer_fraction: f64,
    pub stale_tolerance: f64,
    pub pyramiding: bool,
    pub pyramid_fraction: f64,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy {
            name: "Momentum rotation".to_string(),
            max_positions: 15,
            candidate_pool: 15,
            swap_buffer: 1.25,
            exit_threshold: 40.0,
            risk_per_trade: 0.01,
            max_position_fraction: 0.10,
            volatility_multiplier: 2.0,
            step_percent: 0.10,
            stop_fallback_fraction: 0.06,
            sizing_fallback_fraction: 0.03,
            hard_buffer_fraction: 0.05,
            stale_tolerance: 0.03,
            pyramiding: false,
            pyramid_fraction: 0.5,
        }
    }
}

impl Strategy {
    pub fn stop_params(&self) -> StopLossParams {
        StopLossParams {
            volatility_multiplier: self.volatility_multiplier,
            step_percent: self.step_percent,
            fallback_fraction: self.stop_fallback_fraction,
        }
    }

    pub fn sizing_params(&self) -> SizingParams {
        SizingParams {
            volatility_multiplier: self.volatility_multiplier,
            fallback_fraction: self.sizing_fallback_fraction,
            max_position_fraction: self.max_position_fraction,
        }
    }

    /// Price at which a Tier-1 intraday breach sells.
    pub fn hard_stop_price(&self, stop: f64) -> f64 {
        stop * (1.0 - self.hard_buffer_fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rotation_profile() {
        let s = Strategy::default();
        assert_eq!(s.max_positions, 15);
        assert!((s.swap_buffer - 1.25).abs() < f64::EPSILON);
        assert!((s.exit_threshold - 40.0).abs() < f64::EPSILON);
        assert!(!s.pyramiding);
    }

    #[test]
    fn derived_params_share_multiplier() {
        let s = Strategy {
            volatility_multiplier: 3.0,
            ..Strategy::default()
        };
        assert!((s.stop_params().volatility_multiplier - 3.0).abs() < f64::EPSILON);
        assert!((s.sizing_params().volatility_multiplier - 3.0).abs() < f64::EPSILON);
        assert!((s.stop_params().fallback_fraction - 0.06).abs() < f64::EPSILON);
        assert!((s.sizing_params().fallback_fraction - 0.03).abs() < f64::EPSILON);
    }

    #[test]
    fn hard_stop_price_applies_buffer() {
        let s = Strategy {
            hard_buffer_fraction: 0.05,
            ..Strategy::default()
        };
        assert!((s.hard_stop_price(100.0) - 95.0).abs() < 1e-9);
    }
}
