use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::domain::AccountError;

pub const CPF_LENGTH: usize = 11;

/// Removes every character that is not an ASCII digit.
pub fn strip_formatting(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn has_valid_length(digits: &str) -> bool {
    digits.chars().count() == CPF_LENGTH
}

/// True when every character equals the first one (`"00000000000"`, `"11111111111"`, ...).
pub fn is_degenerate(digits: &str) -> bool {
    let mut chars = digits.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => false,
    }
}

/// Verifies both modulo-11 check digits of an 11-digit string.
///
/// Input that is not exactly 11 ASCII digits is rejected rather than panicking.
pub fn check_digits_valid(digits: &str) -> bool {
    if !has_valid_length(digits) {
        return false;
    }
    let values: Vec<u32> = match digits.chars().map(|c| c.to_digit(10)).collect() {
        Some(values) => values,
        None => return false,
    };

    let first = check_digit(&values[..9], 10);
    if values[9] != first {
        return false;
    }

    let second = check_digit(&values[..10], 11);
    values[10] == second
}

fn check_digit(digits: &[u32], first_weight: u32) -> u32 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (first_weight - i as u32))
        .sum();

    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        11 - remainder
    }
}

/// Full validation: accepts any formatting around the digits, rejects blank input.
pub fn is_valid<'a>(raw: impl Into<Option<&'a str>>) -> bool {
    let raw = match raw.into() {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return false,
    };

    let digits = strip_formatting(raw);
    has_valid_length(&digits) && !is_degenerate(&digits) && check_digits_valid(&digits)
}

/// Renders 11 digits as `DDD.DDD.DDD-DD`. Callers guarantee the length.
pub(crate) fn format_digits(digits: &str) -> String {
    format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    )
}

/// Brazilian individual taxpayer id. Holds the bare digits; always displayed punctuated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cpf {
    digits: String,
}

impl Cpf {
    pub fn parse(raw: &str) -> Result<Self, AccountError> {
        if raw.trim().is_empty() {
            return Err(AccountError::InvalidFormat(
                "CPF must not be blank".to_string(),
            ));
        }

        let digits = strip_formatting(raw);
        if !has_valid_length(&digits) {
            return Err(AccountError::InvalidFormat(format!(
                "CPF must have {} digits, got {}",
                CPF_LENGTH,
                digits.len()
            )));
        }

        if is_degenerate(&digits) || !check_digits_valid(&digits) {
            return Err(AccountError::InvalidCpf(format_digits(&digits)));
        }

        Ok(Self { digits })
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn formatted(&self) -> String {
        format_digits(&self.digits)
    }
}

impl fmt::Display for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl std::str::FromStr for Cpf {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cpf::parse(s)
    }
}

impl Serialize for Cpf {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.formatted())
    }
}

impl<'de> Deserialize<'de> for Cpf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Cpf::parse(&raw).map_err(serde::de::Error::custom)
    }
}
