use crate::domain::{Account, AccountError, AccountStatus, Cpf};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("CPF {0} is already registered")]
    DuplicateCpf(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Corrupt account row: {0}")]
    CorruptRow(String),
    #[error("Account not found: {0}")]
    NotFound(Uuid),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateCpf(cpf) => AccountError::DuplicateCpf(cpf),
            StoreError::NotFound(id) => AccountError::NotFound(id),
            other => AccountError::InternalFailure(other.to_string()),
        }
    }
}

/// Durable account persistence. The store is the system of record and must
/// reject a second account with the same CPF on its own, independently of
/// any check the caller made beforehand.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn get_all(&self) -> Result<Vec<Account>, StoreError>;
    async fn exists_by_cpf(&self, cpf: &Cpf) -> Result<bool, StoreError>;
    async fn add(&self, account: &Account) -> Result<Account, StoreError>;
    /// Fails with `StoreError::NotFound` when the row is gone.
    async fn update(&self, account: &Account) -> Result<(), StoreError>;
    async fn remove(&self, id: Uuid) -> Result<(), StoreError>;
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: String,
    holder_name: String,
    cpf: String,
    status: String,
    created_at: String,
    updated_at: Option<String>,
}

/// Fixed-width so that text ordering matches chronological ordering.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(e.to_string()))
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id).map_err(|e| StoreError::CorruptRow(e.to_string()))?;
        let cpf = Cpf::parse(&row.cpf).map_err(|e| StoreError::CorruptRow(e.to_string()))?;
        let status = row
            .status
            .parse::<AccountStatus>()
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
        let created_at = parse_datetime(&row.created_at)?;
        let updated_at = row.updated_at.as_deref().map(parse_datetime).transpose()?;

        Ok(Account {
            id,
            holder_name: row.holder_name,
            cpf,
            status,
            created_at,
            updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        debug!(%id, "store: loading account");
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT id, holder_name, cpf, status, created_at, updated_at FROM accounts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(%id, error = %e, "store: failed to load account");
            StoreError::DatabaseError(e)
        })?;

        row.map(Account::try_from).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            "SELECT id, holder_name, cpf, status, created_at, updated_at FROM accounts ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn exists_by_cpf(&self, cpf: &Cpf) -> Result<bool, StoreError> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM accounts WHERE cpf = ?")
            .bind(cpf.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn add(&self, account: &Account) -> Result<Account, StoreError> {
        sqlx::query(
            r#"INSERT INTO accounts (id, holder_name, cpf, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(account.id.to_string())
        .bind(&account.holder_name)
        .bind(account.cpf.to_string())
        .bind(account.status.as_str())
        .bind(format_datetime(account.created_at))
        .bind(account.updated_at.map(format_datetime))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                // SQLite reports "UNIQUE constraint failed: accounts.cpf"
                if db_err.is_unique_violation() && db_err.message().contains("cpf") {
                    return StoreError::DuplicateCpf(account.cpf.to_string());
                }
            }
            error!(id = %account.id, error = %e, "store: failed to insert account");
            StoreError::DatabaseError(e)
        })?;

        debug!(id = %account.id, "store: account inserted");
        Ok(account.clone())
    }

    async fn update(&self, account: &Account) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET holder_name = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&account.holder_name)
        .bind(account.status.as_str())
        .bind(account.updated_at.map(format_datetime))
        .bind(account.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(id = %account.id, "store: no row to update");
            return Err(StoreError::NotFound(account.id));
        }

        debug!(id = %account.id, "store: account updated");
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(%id, "store: account removed");
        Ok(())
    }
}
