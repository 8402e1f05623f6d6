use std::{str::FromStr, time::Duration};

use anyhow::Context;

/// When data-access calls are logged.
#[derive(Debug, Clone)]
pub struct SqlLogConfig {
    pub slow: Duration,
    pub debug: bool,
}

/// Argon2 cost parameters.
#[derive(Debug, Clone)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub sql_log: SqlLogConfig,
    pub hash: HashConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let hash_defaults = HashConfig::default();
        Ok(Self {
            database_url,
            max_connections: parsed(&var, "DB_MAX_CONNECTIONS").unwrap_or(10),
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&var, "APP_PORT").unwrap_or(16888),
            request_timeout: Duration::from_millis(parsed(&var, "REQUEST_TIMEOUT_MS").unwrap_or(5_000)),
            sql_log: SqlLogConfig {
                slow: Duration::from_millis(parsed(&var, "SQL_SLOW_MS").unwrap_or(200)),
                debug: var("SQL_DEBUG").is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
            },
            hash: HashConfig {
                memory_kib: parsed(&var, "HASH_MEMORY_KIB").unwrap_or(hash_defaults.memory_kib),
                iterations: parsed(&var, "HASH_ITERATIONS").unwrap_or(hash_defaults.iterations),
                parallelism: parsed(&var, "HASH_PARALLELISM").unwrap_or(hash_defaults.parallelism),
            },
        })
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key).and_then(|v| v.parse::<T>().ok())
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
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();
        assert_eq!(cfg.port, 16888);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.max_connections, 10);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.sql_log.slow, Duration::from_millis(200));
        assert!(!cfg.sql_log.debug);
        assert_eq!(cfg.hash.memory_kib, argon2::Params::DEFAULT_M_COST);
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/game"),
            ("APP_PORT", "9000"),
            ("SQL_SLOW_MS", "not-a-number"),
            ("SQL_DEBUG", "true"),
            ("HASH_ITERATIONS", "4"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.sql_log.slow, Duration::from_millis(200));
        assert!(cfg.sql_log.debug);
        assert_eq!(cfg.hash.iterations, 4);
    }

    #[test]
    fn database_url_is_required() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
