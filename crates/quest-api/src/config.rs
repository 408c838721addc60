//! Environment-driven configuration.
//!
//! Every knob has a development default so `AppConfig::default()` is a working
//! local setup; production deployments are expected to override the secrets.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Placeholder JWT secrets that MUST NOT be used in production.
pub const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me-to-a-random-string"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{0} is unset or still a placeholder; refusing to start in production")]
    PlaceholderSecret(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub environment: Environment,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub jwt_refresh_secret: String,
    pub jwt_refresh_expires_in: Duration,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub frontend_url: String,
    pub trust_proxy: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            db_path: PathBuf::from("skillquest.db"),
            environment: Environment::Development,
            jwt_secret: "dev-secret-change-me".into(),
            jwt_expires_in: Duration::from_secs(24 * 3600),
            jwt_refresh_secret: "dev-secret-change-me".into(),
            jwt_refresh_expires_in: Duration::from_secs(7 * 24 * 3600),
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(15 * 60),
            frontend_url: "*".into(),
            trust_proxy: false,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("QUEST_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("QUEST_PORT") {
            config.port = port.parse().map_err(|_| ConfigError::Invalid {
                var: "QUEST_PORT",
                value: port.clone(),
                reason: "expected a port number",
            })?;
        }
        if let Some(path) = lookup("QUEST_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(env) = lookup("QUEST_ENV") {
            config.environment = match env.as_str() {
                "production" => Environment::Production,
                "development" | "test" => Environment::Development,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "QUEST_ENV",
                        value: env,
                        reason: "expected development, test or production",
                    });
                }
            };
        }

        if let Some(secret) = lookup("JWT_SECRET") {
            config.jwt_secret = secret;
        }
        config.jwt_refresh_secret = lookup("JWT_REFRESH_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| config.jwt_secret.clone());
        if let Some(raw) = lookup("JWT_EXPIRES_IN") {
            config.jwt_expires_in = duration_var("JWT_EXPIRES_IN", &raw)?;
        }
        if let Some(raw) = lookup("JWT_REFRESH_EXPIRES_IN") {
            config.jwt_refresh_expires_in = duration_var("JWT_REFRESH_EXPIRES_IN", &raw)?;
        }

        if let Some(raw) = lookup("RATE_LIMIT_MAX") {
            config.rate_limit_max = raw.parse().map_err(|_| ConfigError::Invalid {
                var: "RATE_LIMIT_MAX",
                value: raw.clone(),
                reason: "expected a positive integer",
            })?;
        }
        if let Some(raw) = lookup("RATE_LIMIT_WINDOW") {
            config.rate_limit_window = duration_var("RATE_LIMIT_WINDOW", &raw)?;
        }

        if let Some(origin) = lookup("FRONTEND_URL").filter(|s| !s.is_empty()) {
            config.frontend_url = origin;
        }
        if let Some(raw) = lookup("TRUST_PROXY") {
            config.trust_proxy = matches!(raw.as_str(), "1" | "true" | "yes");
        }

        config.check()?;
        Ok(config)
    }

    /// Refuse placeholder secrets in production.
    pub fn check(&self) -> Result<(), ConfigError> {
        if !self.environment.is_production() {
            return Ok(());
        }
        if self.jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str()) {
            return Err(ConfigError::PlaceholderSecret("JWT_SECRET"));
        }
        if PLACEHOLDER_SECRETS.contains(&self.jwt_refresh_secret.as_str()) {
            return Err(ConfigError::PlaceholderSecret("JWT_REFRESH_SECRET"));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }
}

fn duration_var(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    parse_duration(raw).ok_or_else(|| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: "expected a duration like 30s, 15m, 12h or 7d",
    })
}

/// Parse `<n>s|m|h|d`. A bare number is seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let n: u64 = digits.parse().ok()?;
    let secs = match unit {
        "s" => n,
        "m" => n.checked_mul(60)?,
        "h" => n.checked_mul(3600)?,
        "d" => n.checked_mul(86_400)?,
        _ => return None,
    };
    if secs == 0 {
        return None;
    }
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("7d"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_duration("2w"), None);
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("abc"), None);
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.rate_limit_max, 100);
        assert_eq!(config.jwt_expires_in, Duration::from_secs(86_400));
        assert_eq!(config.frontend_url, "*");
        assert!(!config.is_production());
    }

    #[test]
    fn refresh_secret_falls_back_to_access_secret() {
        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.jwt_refresh_secret, "s3cret");

        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("JWT_REFRESH_SECRET", "other"),
            ("JWT_REFRESH_EXPIRES_IN", "30d"),
        ]))
        .unwrap();
        assert_eq!(config.jwt_refresh_secret, "other");
        assert_eq!(config.jwt_refresh_expires_in, Duration::from_secs(30 * 86_400));
    }

    #[test]
    fn production_rejects_placeholder_secret() {
        let err = AppConfig::from_lookup(lookup(&[("QUEST_ENV", "production")])).unwrap_err();
        assert!(matches!(err, ConfigError::PlaceholderSecret("JWT_SECRET")));

        let config = AppConfig::from_lookup(lookup(&[
            ("QUEST_ENV", "production"),
            ("JWT_SECRET", "a-real-secret"),
        ]))
        .unwrap();
        assert!(config.is_production());
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = AppConfig::from_lookup(lookup(&[("QUEST_PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("QUEST_PORT"));
        assert!(AppConfig::from_lookup(lookup(&[("RATE_LIMIT_WINDOW", "soon")])).is_err());
    }
}
