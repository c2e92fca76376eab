use crate::domain::Cpf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MAX_HOLDER_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "Active",
            AccountStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(AccountStatus::Active),
            "Inactive" => Ok(AccountStatus::Inactive),
            other => Err(AccountError::InternalFailure(format!(
                "Unknown account status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub holder_name: String,
    pub cpf: Cpf,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum AccountError {
    #[error("Invalid CPF format: {0}")]
    InvalidFormat(String),
    #[error("Invalid CPF: {0}")]
    InvalidCpf(String),
    #[error("An account with CPF {0} already exists")]
    DuplicateCpf(String),
    #[error("Account not found: {0}")]
    NotFound(Uuid),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Internal failure: {0}")]
    InternalFailure(String),
}

impl AccountError {
    /// Business outcomes the caller can act on, as opposed to infrastructure faults.
    pub fn is_business_error(&self) -> bool {
        !matches!(self, AccountError::InternalFailure(_))
    }
}

/// Trims the name and enforces the non-blank / max length rules.
pub fn validate_holder_name(holder_name: &str) -> Result<String, AccountError> {
    let trimmed = holder_name.trim();
    if trimmed.is_empty() {
        return Err(AccountError::InvalidArgument(
            "Holder name must not be blank".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_HOLDER_NAME_LENGTH {
        return Err(AccountError::InvalidArgument(format!(
            "Holder name must be at most {} characters",
            MAX_HOLDER_NAME_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

impl Account {
    pub fn new(holder_name: &str, cpf: Cpf) -> Result<Self, AccountError> {
        let holder_name = validate_holder_name(holder_name)?;

        Ok(Account {
            id: Uuid::new_v4(),
            holder_name,
            cpf,
            status: AccountStatus::Active,
            created_at: Utc::now(),
            updated_at: None,
        })
    }

    pub fn rename(&mut self, holder_name: &str) -> Result<(), AccountError> {
        self.holder_name = validate_holder_name(holder_name)?;
        self.touch();
        Ok(())
    }

    pub fn activate(&mut self) {
        self.status = AccountStatus::Active;
        self.touch();
    }

    pub fn deactivate(&mut self) {
        self.status = AccountStatus::Inactive;
        self.touch();
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
