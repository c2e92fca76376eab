pub mod account_service;

pub use account_service::{
    account_key, AccountService, ServiceMetrics, ACCOUNT_KEY_PREFIX, ALL_ACCOUNTS_KEY,
};
