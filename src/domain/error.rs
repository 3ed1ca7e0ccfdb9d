//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for rotator.
#[derive(Debug, thiserror::Error)]
pub enum RotatorError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {symbol} on {date}")]
    NoData { symbol: String, date: NaiveDate },

    #[error("state inconsistency on {date}: {reason}")]
    StateInconsistency { date: NaiveDate, reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RotatorError {
    pub fn data(reason: impl Into<String>) -> Self {
        RotatorError::Data {
            reason: reason.into(),
        }
    }

    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        RotatorError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&RotatorError> for std::process::ExitCode {
    fn from(err: &RotatorError) -> Self {
        let code: u8 = match err {
            RotatorError::Io(_) | RotatorError::Report { .. } => 1,
            RotatorError::ConfigParse { .. }
            | RotatorError::ConfigMissing { .. }
            | RotatorError::ConfigInvalid { .. } => 2,
            RotatorError::Data { .. } | RotatorError::NoData { .. } => 3,
            RotatorError::StateInconsistency { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_section_and_key() {
        let err = RotatorError::invalid("strategy", "swap_buffer", "must be at least 1.0");
        assert_eq!(
            err.to_string(),
            "invalid config value [strategy] swap_buffer: must be at least 1.0"
        );
    }

    #[test]
    fn state_inconsistency_mentions_date() {
        let err = RotatorError::StateInconsistency {
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            reason: "cash does not reconcile".into(),
        };
        assert!(err.to_string().contains("2024-03-04"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RotatorError = io.into();
        assert!(matches!(err, RotatorError::Io(_)));
    }
}
