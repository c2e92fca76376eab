pub mod account_store;
pub mod cache_service;
pub mod config;
pub mod database;
pub mod logging;
pub mod notifier;

pub use account_store::{AccountStore, SqliteAccountStore, StoreError};
pub use cache_service::{AccountCache, CacheConfig, CacheMetrics};
pub use config::AppConfig;
pub use database::{create_pool, create_test_pool, ensure_schema, ConnectionError, PoolConfig};
pub use logging::{init_logging, LoggingConfig};
pub use notifier::{LoggingNotifier, NotificationDispatcher, Notifier, NotifierConfig};
