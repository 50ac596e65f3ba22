//! Application configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use engine::LendingPolicy;
use engine::policy::MAX_LOAN_PERIOD_DAYS;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: PostgreSQL connection string (unset: in-memory store)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `DATABASE_ACQUIRE_TIMEOUT_SECS`: connection wait limit (default: `5`)
/// - `MAX_BORROWS`: active plus pending borrows per user, at least 1 (default: `3`)
/// - `LOAN_PERIOD_DAYS`: days until an issued loan is due, 1 to 3650 (default: `14`)
/// - `METRICS_ADDR`: Prometheus listener (default: `"0.0.0.0:9000"`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `NOTIFIER_BUFFER`: capacity of the event channel (default: `1024`)
///
/// Unparseable or out-of-range values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub database_acquire_timeout: Duration,
    pub max_borrows: u32,
    pub loan_period_days: i64,
    pub metrics_addr: SocketAddr,
    pub log_level: String,
    pub log_format: LogFormat,
    pub notifier_buffer: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            database_acquire_timeout: parse_var(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.database_acquire_timeout),
            max_borrows: parse_var(&lookup, "MAX_BORROWS")
                .filter(|n: &u32| *n >= 1)
                .unwrap_or(defaults.max_borrows),
            loan_period_days: parse_var(&lookup, "LOAN_PERIOD_DAYS")
                .filter(|days: &i64| (1..=MAX_LOAN_PERIOD_DAYS).contains(days))
                .unwrap_or(defaults.loan_period_days),
            metrics_addr: parse_var(&lookup, "METRICS_ADDR").unwrap_or(defaults.metrics_addr),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_var(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
            notifier_buffer: parse_var(&lookup, "NOTIFIER_BUFFER")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.notifier_buffer),
        }
    }

    /// Returns the lending rules derived from this configuration.
    pub fn policy(&self) -> LendingPolicy {
        LendingPolicy::new(self.max_borrows, self.loan_period_days)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            database_acquire_timeout: Duration::from_secs(5),
            max_borrows: engine::policy::DEFAULT_MAX_BORROWS,
            loan_period_days: engine::policy::DEFAULT_LOAN_PERIOD_DAYS,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            notifier_buffer: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.database_url, None);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.database_acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.max_borrows, 3);
        assert_eq!(config.loan_period_days, 14);
        assert_eq!(config.metrics_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.notifier_buffer, 1024);
    }

    #[test]
    fn test_reads_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://lib@localhost/lending"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("MAX_BORROWS", "5"),
            ("LOAN_PERIOD_DAYS", "21"),
            ("METRICS_ADDR", "127.0.0.1:9100"),
            ("LOG_FORMAT", "JSON"),
            ("NOTIFIER_BUFFER", "16"),
        ]);

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://lib@localhost/lending")
        );
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.metrics_addr.port(), 9100);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.notifier_buffer, 16);
        assert_eq!(config.policy(), LendingPolicy::new(5, 21));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[
            ("DATABASE_URL", "  "),
            ("MAX_BORROWS", "many"),
            ("LOG_FORMAT", "xml"),
            ("NOTIFIER_BUFFER", "0"),
        ]);

        assert_eq!(config.database_url, None);
        assert_eq!(config.max_borrows, 3);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.notifier_buffer, 1024);
    }

    #[test]
    fn test_out_of_range_policy_falls_back() {
        for (borrows, days) in [("0", "0"), ("0", "-3"), ("0", "9223372036854775807")] {
            let config = config_from(&[("MAX_BORROWS", borrows), ("LOAN_PERIOD_DAYS", days)]);
            assert_eq!(config.policy(), LendingPolicy::default());
            assert!(config.policy().is_valid());
        }

        let config = config_from(&[("LOAN_PERIOD_DAYS", "3650")]);
        assert_eq!(config.loan_period_days, 3650);
        let config = config_from(&[("LOAN_PERIOD_DAYS", "3651")]);
        assert_eq!(config.loan_period_days, 14);
    }
}
