use std::env;

use thiserror::Error;

use crate::attendance::MAX_TOLERANCE_MINUTES;
use crate::test_return::DEFAULT_RETURN_FLEXIBILITY_DAYS;

pub const DEFAULT_LATE_TOLERANCE_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringSettings {
    pub return_flexibility_days: i64,
    /// Used only for teachers whose employee record has no late flexibility.
    pub late_tolerance_minutes: i64,
    pub max_concurrency: usize,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            return_flexibility_days: DEFAULT_RETURN_FLEXIBILITY_DAYS,
            late_tolerance_minutes: DEFAULT_LATE_TOLERANCE_MINUTES,
            max_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_level: String,
    pub scoring: ScoringSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = ScoringSettings::default();
        let scoring = ScoringSettings {
            return_flexibility_days: parse_var(
                "SCORING_RETURN_FLEXIBILITY_DAYS",
                defaults.return_flexibility_days,
            )?,
            late_tolerance_minutes: parse_var(
                "SCORING_LATE_TOLERANCE_MINUTES",
                defaults.late_tolerance_minutes,
            )?,
            max_concurrency: parse_var("SCORING_MAX_CONCURRENCY", defaults.max_concurrency)?,
        };

        if scoring.return_flexibility_days < 0 {
            return Err(ConfigError::OutOfRange("SCORING_RETURN_FLEXIBILITY_DAYS"));
        }
        if !(0..=MAX_TOLERANCE_MINUTES).contains(&scoring.late_tolerance_minutes) {
            return Err(ConfigError::OutOfRange("SCORING_LATE_TOLERANCE_MINUTES"));
        }
        if scoring.max_concurrency == 0 {
            return Err(ConfigError::OutOfRange("SCORING_MAX_CONCURRENCY"));
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            db_max_connections: parse_var("SCORING_DB_MAX_CONNECTIONS", 5)?,
            log_level: env::var("SCORING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            scoring,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("SCORING_RETURN_FLEXIBILITY_DAYS");
        env::remove_var("SCORING_LATE_TOLERANCE_MINUTES");
        env::remove_var("SCORING_MAX_CONCURRENCY");
        env::remove_var("SCORING_DB_MAX_CONNECTIONS");
        env::remove_var("SCORING_LOG_LEVEL");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.scoring, ScoringSettings::default());
        assert_eq!(config.scoring.return_flexibility_days, 3);
        assert_eq!(config.scoring.late_tolerance_minutes, 15);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn rejects_unparseable_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCORING_RETURN_FLEXIBILITY_DAYS", "three");
        let err = AppConfig::load().expect_err("invalid flexibility");
        assert!(matches!(err, ConfigError::Invalid { name: "SCORING_RETURN_FLEXIBILITY_DAYS", .. }));
        reset_env();
    }

    #[test]
    fn rejects_tolerance_beyond_one_day() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCORING_LATE_TOLERANCE_MINUTES", "200000000000000000");
        let err = AppConfig::load().expect_err("tolerance too large");
        assert!(matches!(err, ConfigError::OutOfRange("SCORING_LATE_TOLERANCE_MINUTES")));

        env::set_var("SCORING_LATE_TOLERANCE_MINUTES", "1440");
        let config = AppConfig::load().expect("one day is accepted");
        assert_eq!(config.scoring.late_tolerance_minutes, 1440);
        reset_env();
    }

    #[test]
    fn rejects_zero_concurrency() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCORING_MAX_CONCURRENCY", "0");
        let err = AppConfig::load().expect_err("zero concurrency");
        assert!(matches!(err, ConfigError::OutOfRange("SCORING_MAX_CONCURRENCY")));
        reset_env();
    }
}
