use crate::domain::cpf::{format_digits, has_valid_length, strip_formatting};
use crate::domain::AccountError;

/// Converts any accepted spelling of a CPF into `DDD.DDD.DDD-DD`.
///
/// Only the shape is checked here. Check digits are left to [`crate::domain::Cpf::parse`]
/// or [`crate::domain::cpf::is_valid`].
pub fn normalize<'a>(raw: impl Into<Option<&'a str>>) -> Result<String, AccountError> {
    let raw = match raw.into() {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => {
            return Err(AccountError::InvalidFormat(
                "CPF must not be empty".to_string(),
            ))
        }
    };

    let digits = strip_formatting(raw);
    if !has_valid_length(&digits) {
        return Err(AccountError::InvalidFormat(format!(
            "CPF must have 11 digits, got {}",
            digits.len()
        )));
    }

    Ok(format_digits(&digits))
}
