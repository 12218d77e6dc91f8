//! Application configuration loaded from environment variables.

use domain::TransitionPolicy;
use domain::identity::DEFAULT_ITERATIONS;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL connection string (unset: in-memory store)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `STATUS_TRANSITIONS`: `strict` or `unrestricted` (default: `strict`)
/// - `PASSWORD_HASH_ITERATIONS`: SHA-256 rounds for new hashes (default: `100000`)
///
/// Unparseable values fall back to the default and are recorded in
/// `warnings`, to be logged once tracing is initialized.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub status_transitions: TransitionPolicy,
    pub password_hash_iterations: u32,
    pub warnings: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut warnings = Vec::new();

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                warnings.push(invalid("LOG_FORMAT", other));
                defaults.log_format
            }
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, &mut warnings, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_or(
                &lookup,
                &mut warnings,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            status_transitions: parse_or(
                &lookup,
                &mut warnings,
                "STATUS_TRANSITIONS",
                defaults.status_transitions,
            ),
            password_hash_iterations: parse_or(
                &lookup,
                &mut warnings,
                "PASSWORD_HASH_ITERATIONS",
                defaults.password_hash_iterations,
            ),
            warnings,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    warnings: &mut Vec<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warnings.push(invalid(key, &raw));
            default
        }),
        None => default,
    }
}

fn invalid(key: &str, value: &str) -> String {
    format!("ignoring invalid {key}={value:?}, using default")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 5,
            status_transitions: TransitionPolicy::Strict,
            password_hash_iterations: DEFAULT_ITERATIONS,
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.status_transitions, TransitionPolicy::Strict);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_variables() {
        let config = config_from(&[
            ("PORT", "8000"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/food"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("STATUS_TRANSITIONS", "unrestricted"),
            ("PASSWORD_HASH_ITERATIONS", "1000"),
        ]);
        assert_eq!(config.addr(), "0.0.0.0:8000");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/food")
        );
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.status_transitions, TransitionPolicy::Unrestricted);
        assert_eq!(config.password_hash_iterations, 1000);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "eighty"),
            ("LOG_FORMAT", "xml"),
            ("DATABASE_URL", "  "),
            ("STATUS_TRANSITIONS", "sideways"),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.status_transitions, TransitionPolicy::Strict);
        assert_eq!(config.warnings.len(), 3);
    }
}
