pub mod account;
pub mod cpf;
pub mod events;

pub use account::*;
pub use cpf::Cpf;
pub use events::*;
