pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod web;

// Re-export commonly used types
pub use application::{AccountService, AccountView};
pub use domain::{Account, AccountError, AccountStatus, Cpf};
pub use infrastructure::{AccountCache, AccountStore, AppConfig, SqliteAccountStore};
