use crate::infrastructure::cache_service::CacheConfig;
use crate::infrastructure::database::PoolConfig;
use crate::infrastructure::logging::LoggingConfig;
use crate::infrastructure::notifier::NotifierConfig;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    /// Absolute TTL for account records and the account collection.
    pub account_ttl: Duration,
    pub notifier: NotifierConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads the process environment (after `.env` has been loaded by the caller),
    /// falling back to defaults for anything missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cache = CacheConfig {
            default_ttl: secs(&lookup, "CACHE_DEFAULT_TTL_SECS", defaults.cache.default_ttl),
            sliding_window: secs(&lookup, "CACHE_SLIDING_SECS", defaults.cache.sliding_window),
            cleanup_interval: secs(
                &lookup,
                "CACHE_CLEANUP_INTERVAL_SECS",
                defaults.cache.cleanup_interval,
            ),
        };

        let pool = PoolConfig {
            max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.pool.max_connections,
            ),
            ..defaults.pool
        };

        let notifier = NotifierConfig {
            area_delay: Duration::from_millis(parse_or(
                &lookup,
                "NOTIFIER_AREA_DELAY_MS",
                defaults.notifier.area_delay.as_millis() as u64,
            )),
        };

        let logging = LoggingConfig {
            log_dir: lookup("LOG_DIR").unwrap_or(defaults.logging.log_dir),
            log_level: parse_or(&lookup, "LOG_LEVEL", defaults.logging.log_level),
            enable_file: parse_or(&lookup, "LOG_TO_FILE", defaults.logging.enable_file),
            ..defaults.logging
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            pool,
            cache,
            account_ttl: secs(&lookup, "CACHE_ACCOUNT_TTL_SECS", defaults.account_ttl),
            notifier,
            logging,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                // logging is not initialised yet when config is read
                eprintln!("Ignoring unparsable {}={:?}, using default", key, raw);
                default
            }
        },
        None => default,
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default.as_secs()) {
        0 => {
            // tokio::time::interval panics on a zero period
            eprintln!("Ignoring {}=0, durations must be positive; using default", key);
            default
        }
        value => Duration::from_secs(value),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: "sqlite://data/accounts.db".to_string(),
            pool: PoolConfig::default(),
            cache: CacheConfig::default(),
            account_ttl: Duration::from_secs(3 * 60 * 60),
            notifier: NotifierConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
