use crate::domain::{Account, AccountStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain events fanned out to the rest of the bank after a committed mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AccountEvent {
    AccountCreated {
        account_id: Uuid,
        holder_name: String,
        cpf: String,
        created_at: DateTime<Utc>,
    },
    AccountUpdated {
        account_id: Uuid,
        holder_name: String,
        cpf: String,
        status: AccountStatus,
        updated_at: DateTime<Utc>,
    },
    AccountRemoved {
        account_id: Uuid,
        removed_at: DateTime<Utc>,
    },
}

impl AccountEvent {
    pub fn created(account: &Account) -> Self {
        AccountEvent::AccountCreated {
            account_id: account.id,
            holder_name: account.holder_name.clone(),
            cpf: account.cpf.to_string(),
            created_at: account.created_at,
        }
    }

    pub fn updated(account: &Account) -> Self {
        AccountEvent::AccountUpdated {
            account_id: account.id,
            holder_name: account.holder_name.clone(),
            cpf: account.cpf.to_string(),
            status: account.status,
            updated_at: account.updated_at.unwrap_or_else(Utc::now),
        }
    }

    pub fn removed(account_id: Uuid) -> Self {
        AccountEvent::AccountRemoved {
            account_id,
            removed_at: Utc::now(),
        }
    }

    pub fn aggregate_id(&self) -> Uuid {
        match self {
            AccountEvent::AccountCreated { account_id, .. } => *account_id,
            AccountEvent::AccountUpdated { account_id, .. } => *account_id,
            AccountEvent::AccountRemoved { account_id, .. } => *account_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountCreated { .. } => "AccountCreated",
            AccountEvent::AccountUpdated { .. } => "AccountUpdated",
            AccountEvent::AccountRemoved { .. } => "AccountRemoved",
        }
    }
}
