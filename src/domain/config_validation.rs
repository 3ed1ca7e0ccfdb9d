//! Configuration validation.
//!
//! Validates every config field before a backtest runs.

use crate::domain::error::RotatorError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    validate_max_positions(config)?;
    validate_candidate_pool(config)?;
    validate_swap_buffer(config)?;
    validate_exit_threshold(config)?;
    validate_positive(config, "volatility_multiplier", 2.0)?;
    for (key, default) in [
        ("risk_per_trade", 0.01),
        ("max_position_fraction", 0.10),
        ("step_percent", 0.10),
        ("stop_fallback_fraction", 0.06),
        ("sizing_fallback_fraction", 0.03),
        ("pyramid_fraction", 0.5),
    ] {
        validate_fraction(config, key, default, false)?;
    }
    for (key, default) in [("hard_buffer_fraction", 0.05), ("stale_tolerance", 0.03)] {
        validate_fraction(config, key, default, true)?;
    }
    Ok(())
}

pub fn validate_cost_config(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    for key in [
        "brokerage_rate",
        "brokerage_cap",
        "stt_rate",
        "exchange_rate",
        "sebi_per_crore",
        "stamp_rate",
        "gst_rate",
        "ipf_per_crore",
        "dp_charge",
    ] {
        non_negative(config, "costs", key)?;
    }
    for key in ["stcg_rate", "ltcg_rate", "ltcg_exemption"] {
        non_negative(config, "tax", key)?;
    }
    if config.get_int("tax", "long_term_days", 365) < 1 {
        return Err(RotatorError::invalid(
            "tax",
            "long_term_days",
            "long_term_days must be at least 1",
        ));
    }
    Ok(())
}

fn non_negative(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), RotatorError> {
    if config.get_double(section, key, 0.0) < 0.0 {
        return Err(RotatorError::invalid(
            section,
            key,
            format!("{key} must be non-negative"),
        ));
    }
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let value = config.get_double("backtest", "initial_capital", 100_000.0);
    if value <= 0.0 {
        return Err(RotatorError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.06);
    if !(0.0..1.0).contains(&value) {
        return Err(RotatorError::invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let start_date = parse_date(config, "backtest", "start_date")?;
    let end_date = parse_date(config, "backtest", "end_date")?;

    if start_date >= end_date {
        return Err(RotatorError::invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

/// Required `YYYY-MM-DD` value.
pub fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, RotatorError> {
    match config.get_string(section, key) {
        None => Err(RotatorError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            RotatorError::invalid(
                section,
                key,
                format!("invalid {key} format, expected YYYY-MM-DD"),
            )
        }),
    }
}

fn validate_max_positions(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let value = config.get_int("strategy", "max_positions", 15);
    if value < 1 {
        return Err(RotatorError::invalid(
            "strategy",
            "max_positions",
            "max_positions must be at least 1",
        ));
    }
    Ok(())
}

fn validate_candidate_pool(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    if config.get_string("strategy", "candidate_pool").is_none() {
        return Ok(());
    }
    if config.get_int("strategy", "candidate_pool", 0) < 1 {
        return Err(RotatorError::invalid(
            "strategy",
            "candidate_pool",
            "candidate_pool must be at least 1",
        ));
    }
    Ok(())
}

fn validate_swap_buffer(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let value = config.get_double("strategy", "swap_buffer", 1.25);
    if value < 1.0 {
        return Err(RotatorError::invalid(
            "strategy",
            "swap_buffer",
            "swap_buffer must be at least 1.0",
        ));
    }
    Ok(())
}

fn validate_exit_threshold(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let value = config.get_double("strategy", "exit_threshold", 40.0);
    if value < 0.0 {
        return Err(RotatorError::invalid(
            "strategy",
            "exit_threshold",
            "exit_threshold must be non-negative",
        ));
    }
    Ok(())
}

fn validate_positive(config: &dyn ConfigPort, key: &str, default: f64) -> Result<(), RotatorError> {
    if config.get_double("strategy", key, default) <= 0.0 {
        return Err(RotatorError::invalid(
            "strategy",
            key,
            format!("{key} must be positive"),
        ));
    }
    Ok(())
}

/// `(0, 1]`, or `[0, 1)` when `allow_zero`.
fn validate_fraction(
    config: &dyn ConfigPort,
    key: &str,
    default: f64,
    allow_zero: bool,
) -> Result<(), RotatorError> {
    let value = config.get_double("strategy", key, default);
    let ok = if allow_zero {
        (0.0..1.0).contains(&value)
    } else {
        value > 0.0 && value <= 1.0
    };
    if !ok {
        let range = if allow_zero { "[0, 1)" } else { "(0, 1]" };
        return Err(RotatorError::invalid(
            "strategy",
            key,
            format!("{key} must be in {range}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const DATES: &str = "start_date = 2020-01-01\nend_date = 2024-12-31\n";

    fn backtest_with(line: &str) -> FileConfigAdapter {
        make_config(&format!("[backtest]\n{DATES}{line}\n"))
    }

    fn strategy_with(line: &str) -> FileConfigAdapter {
        make_config(&format!("[strategy]\n{line}\n"))
    }

    fn invalid_key(err: RotatorError) -> String {
        match err {
            RotatorError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
initial_capital = 100000.0
risk_free_rate = 0.06
start_date = 2020-01-01
end_date = 2024-12-31
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn defaults_pass_with_dates_only() {
        assert!(validate_backtest_config(&backtest_with("")).is_ok());
        assert!(validate_strategy_config(&strategy_with("")).is_ok());
        assert!(validate_cost_config(&make_config("[costs]\n")).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let err = validate_backtest_config(&backtest_with("initial_capital = -100")).unwrap_err();
        assert_eq!(invalid_key(err), "initial_capital");
        let err = validate_backtest_config(&backtest_with("initial_capital = 0")).unwrap_err();
        assert_eq!(invalid_key(err), "initial_capital");
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        let err = validate_backtest_config(&backtest_with("risk_free_rate = 1.5")).unwrap_err();
        assert_eq!(invalid_key(err), "risk_free_rate");
        let err = validate_backtest_config(&backtest_with("risk_free_rate = -0.05")).unwrap_err();
        assert_eq!(invalid_key(err), "risk_free_rate");
    }

    #[test]
    fn invalid_start_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 2020/01/01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "start_date");
    }

    #[test]
    fn missing_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, RotatorError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "start_date");
    }

    #[test]
    fn max_positions_zero_fails() {
        let err = validate_strategy_config(&strategy_with("max_positions = 0")).unwrap_err();
        assert_eq!(invalid_key(err), "max_positions");
    }

    #[test]
    fn candidate_pool_zero_fails() {
        let err = validate_strategy_config(&strategy_with("candidate_pool = 0")).unwrap_err();
        assert_eq!(invalid_key(err), "candidate_pool");
    }

    #[test]
    fn swap_buffer_below_one_fails() {
        let err = validate_strategy_config(&strategy_with("swap_buffer = 0.9")).unwrap_err();
        assert_eq!(invalid_key(err), "swap_buffer");
        assert!(validate_strategy_config(&strategy_with("swap_buffer = 1.0")).is_ok());
    }

    #[test]
    fn fractions_out_of_range_fail() {
        let err = validate_strategy_config(&strategy_with("risk_per_trade = 0")).unwrap_err();
        assert_eq!(invalid_key(err), "risk_per_trade");
        let err = validate_strategy_config(&strategy_with("max_position_fraction = 1.5")).unwrap_err();
        assert_eq!(invalid_key(err), "max_position_fraction");
        let err = validate_strategy_config(&strategy_with("hard_buffer_fraction = 1.0")).unwrap_err();
        assert_eq!(invalid_key(err), "hard_buffer_fraction");
        assert!(validate_strategy_config(&strategy_with("hard_buffer_fraction = 0")).is_ok());
    }

    #[test]
    fn volatility_multiplier_must_be_positive() {
        let err = validate_strategy_config(&strategy_with("volatility_multiplier = 0")).unwrap_err();
        assert_eq!(invalid_key(err), "volatility_multiplier");
    }

    #[test]
    fn negative_cost_rate_fails() {
        let err = validate_cost_config(&make_config("[costs]\nstt_rate = -0.001\n")).unwrap_err();
        assert_eq!(invalid_key(err), "stt_rate");
        let err = validate_cost_config(&make_config("[tax]\nlong_term_days = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "long_term_days");
    }
}
