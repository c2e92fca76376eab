pub mod cpf_normalizer;
pub mod dto;
pub mod services;

pub use dto::{AccountView, CreateAccountRequest, UpdateAccountRequest};
pub use services::AccountService;
