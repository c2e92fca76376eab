use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::application::cpf_normalizer::normalize;
use crate::application::dto::AccountView;
use crate::domain::{Account, AccountError, AccountEvent, Cpf};
use crate::infrastructure::account_store::{AccountStore, StoreError};
use crate::infrastructure::cache_service::AccountCache;
use crate::infrastructure::notifier::NotificationDispatcher;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Prefix of the per-account cache entries (`account:{id}`).
pub const ACCOUNT_KEY_PREFIX: &str = "account:";
/// Key of the complete account collection. Only ever written whole.
pub const ALL_ACCOUNTS_KEY: &str = "accounts:all";

pub fn account_key(id: Uuid) -> String {
    format!("{}{}", ACCOUNT_KEY_PREFIX, id)
}

fn view_id(view: &AccountView) -> Uuid {
    view.id
}

#[derive(Debug, Default)]
pub struct ServiceMetrics {
    pub operations_processed: AtomicU64,
    pub operations_failed: AtomicU64,
    pub store_reads: AtomicU64,
}

/// Account use cases. Owns the cache-consistency policy: the store is always
/// written first, then the resident cache entries are patched, then the
/// notification is handed to the background dispatcher.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    cache: AccountCache,
    notifications: NotificationDispatcher,
    account_ttl: Duration,
    metrics: Arc<ServiceMetrics>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        cache: AccountCache,
        notifications: NotificationDispatcher,
        account_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            notifications,
            account_ttl,
            metrics: Arc::new(ServiceMetrics::default()),
        }
    }

    pub fn cache(&self) -> &AccountCache {
        &self.cache
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountView>, AccountError> {
        if let Some(accounts) = self.cache.get::<Vec<AccountView>>(ALL_ACCOUNTS_KEY) {
            debug!(count = accounts.len(), "serving account list from cache");
            return Ok(accounts);
        }

        self.metrics.store_reads.fetch_add(1, Ordering::Relaxed);
        let result = self
            .store
            .get_all()
            .await
            .map_err(store_failure("get_all"))
            .map(|accounts| accounts.iter().map(AccountView::from).collect::<Vec<_>>());

        if let Ok(views) = &result {
            self.cache
                .set(ALL_ACCOUNTS_KEY, views, Some(self.account_ttl));
            info!(count = views.len(), "account list loaded from store");
        }
        self.record(result)
    }

    /// `Ok(None)` when the account does not exist. Absence is never cached.
    pub async fn get_account(&self, id: Uuid) -> Result<Option<AccountView>, AccountError> {
        let key = account_key(id);
        if let Some(view) = self.cache.get::<AccountView>(&key) {
            return Ok(Some(view));
        }

        if let Some(accounts) = self.cache.get::<Vec<AccountView>>(ALL_ACCOUNTS_KEY) {
            if let Some(view) = accounts.into_iter().find(|view| view.id == id) {
                debug!(%id, "account found in cached collection");
                return Ok(Some(view));
            }
        }

        self.metrics.store_reads.fetch_add(1, Ordering::Relaxed);
        let found = self
            .store
            .get_by_id(id)
            .await
            .map_err(store_failure("get_by_id"));

        let result = found.map(|account| {
            account.map(|account| {
                let view = AccountView::from(&account);
                self.cache.set(&key, &view, Some(self.account_ttl));
                self.cache
                    .push_list_item(ALL_ACCOUNTS_KEY, view.clone(), view_id);
                view
            })
        });
        self.record(result)
    }

    pub async fn create_account(
        &self,
        holder_name: &str,
        raw_cpf: Option<&str>,
    ) -> Result<AccountView, AccountError> {
        let result = self.try_create(holder_name, raw_cpf).await;
        self.record(result)
    }

    async fn try_create(
        &self,
        holder_name: &str,
        raw_cpf: Option<&str>,
    ) -> Result<AccountView, AccountError> {
        let normalized = normalize(raw_cpf)?;
        let cpf = Cpf::parse(&normalized)?;
        let account = Account::new(holder_name, cpf)?;

        let exists = self
            .store
            .exists_by_cpf(&account.cpf)
            .await
            .map_err(store_failure("exists_by_cpf"))?;
        if exists {
            warn!(cpf = %normalized, "rejecting account with duplicate CPF");
            return Err(AccountError::DuplicateCpf(normalized));
        }

        let saved = self.store.add(&account).await.map_err(|e| match e {
            StoreError::DuplicateCpf(cpf) => {
                warn!(%cpf, "store rejected duplicate CPF");
                AccountError::DuplicateCpf(cpf)
            }
            other => store_failure("add")(other),
        })?;

        let view = AccountView::from(&saved);
        self.cache
            .set(&account_key(saved.id), &view, Some(self.account_ttl));
        self.cache
            .push_list_item(ALL_ACCOUNTS_KEY, view.clone(), view_id);
        self.notifications.publish(AccountEvent::created(&saved));

        info!(id = %saved.id, cpf = %view.cpf, "account created");
        Ok(view)
    }

    pub async fn update_account(
        &self,
        id: Uuid,
        holder_name: &str,
    ) -> Result<AccountView, AccountError> {
        let result = self
            .apply_change(id, "update", |account| account.rename(holder_name))
            .await;
        self.record(result)
    }

    /// Idempotent; always bumps `updated_at`.
    pub async fn activate_account(&self, id: Uuid) -> Result<AccountView, AccountError> {
        let result = self
            .apply_change(id, "activate", |account| {
                account.activate();
                Ok(())
            })
            .await;
        self.record(result)
    }

    /// Idempotent; always bumps `updated_at`.
    pub async fn deactivate_account(&self, id: Uuid) -> Result<AccountView, AccountError> {
        let result = self
            .apply_change(id, "deactivate", |account| {
                account.deactivate();
                Ok(())
            })
            .await;
        self.record(result)
    }

    /// Returns `Ok(false)` without touching the store when the id is unknown.
    pub async fn remove_account(&self, id: Uuid) -> Result<bool, AccountError> {
        let result = self.try_remove(id).await;
        self.record(result)
    }

    async fn try_remove(&self, id: Uuid) -> Result<bool, AccountError> {
        self.metrics.store_reads.fetch_add(1, Ordering::Relaxed);
        let existing = self
            .store
            .get_by_id(id)
            .await
            .map_err(store_failure("get_by_id"))?;
        if existing.is_none() {
            debug!(%id, "remove requested for unknown account");
            return Ok(false);
        }

        self.store
            .remove(id)
            .await
            .map_err(store_failure("remove"))?;

        self.cache.remove(&account_key(id));
        self.cache
            .remove_list_item::<AccountView, _, _>(ALL_ACCOUNTS_KEY, &id, view_id);
        self.notifications.publish(AccountEvent::removed(id));

        info!(%id, "account removed");
        Ok(true)
    }

    /// Load, mutate, persist, then patch whatever is resident in the cache.
    async fn apply_change<F>(
        &self,
        id: Uuid,
        operation: &'static str,
        change: F,
    ) -> Result<AccountView, AccountError>
    where
        F: FnOnce(&mut Account) -> Result<(), AccountError>,
    {
        self.metrics.store_reads.fetch_add(1, Ordering::Relaxed);
        let mut account = self
            .store
            .get_by_id(id)
            .await
            .map_err(store_failure("get_by_id"))?
            .ok_or(AccountError::NotFound(id))?;

        change(&mut account)?;

        self.store.update(&account).await.map_err(|e| match e {
            StoreError::NotFound(id) => {
                // removed after it was loaded; drop anything still cached for it
                warn!(%id, "account disappeared before update");
                self.cache.remove(&account_key(id));
                self.cache
                    .remove_list_item::<AccountView, _, _>(ALL_ACCOUNTS_KEY, &id, view_id);
                AccountError::NotFound(id)
            }
            other => store_failure("update")(other),
        })?;

        let view = AccountView::from(&account);
        self.cache
            .patch_list_item(ALL_ACCOUNTS_KEY, &id, view.clone(), view_id);
        self.cache
            .set(&account_key(id), &view, Some(self.account_ttl));
        self.notifications.publish(AccountEvent::updated(&account));

        info!(%id, operation, status = %account.status, "account changed");
        Ok(view)
    }

    fn record<T>(&self, result: Result<T, AccountError>) -> Result<T, AccountError> {
        self.metrics
            .operations_processed
            .fetch_add(1, Ordering::Relaxed);
        if let Err(e) = &result {
            self.metrics.operations_failed.fetch_add(1, Ordering::Relaxed);
            if e.is_business_error() {
                debug!(error = %e, "operation rejected");
            }
        }
        result
    }
}

fn store_failure(operation: &'static str) -> impl Fn(StoreError) -> AccountError {
    move |e| {
        error!(operation, error = %e, "account store failure");
        AccountError::from(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountStatus;
    use crate::infrastructure::notifier::{LoggingNotifier, NotifierConfig};
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        pub Store {}

        #[async_trait]
        impl AccountStore for Store {
            async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
            async fn get_all(&self) -> Result<Vec<Account>, StoreError>;
            async fn exists_by_cpf(&self, cpf: &Cpf) -> Result<bool, StoreError>;
            async fn add(&self, account: &Account) -> Result<Account, StoreError>;
            async fn update(&self, account: &Account) -> Result<(), StoreError>;
            async fn remove(&self, id: Uuid) -> Result<(), StoreError>;
        }
    }

    fn service_with(store: MockStore) -> AccountService {
        let (dispatcher, _) = NotificationDispatcher::spawn(Arc::new(LoggingNotifier::new(
            NotifierConfig {
                area_delay: Duration::ZERO,
            },
        )));
        AccountService::new(
            Arc::new(store),
            AccountCache::default(),
            dispatcher,
            Duration::from_secs(3 * 60 * 60),
        )
    }

    fn sample_account() -> Account {
        Account::new("Ana Souza", Cpf::parse("529.982.247-25").unwrap()).unwrap()
    }

    #[test]
    fn test_account_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            account_key(id),
            "account:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn test_invalid_format_never_reaches_store() {
        let mut store = MockStore::new();
        store.expect_exists_by_cpf().times(0);
        store.expect_add().times(0);
        let service = service_with(store);

        let err = service.create_account("Ana", Some("123")).await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidFormat(_)));

        let err = service.create_account("Ana", None).await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn test_bad_check_digits_are_invalid_cpf() {
        let mut store = MockStore::new();
        store.expect_exists_by_cpf().times(0);
        let service = service_with(store);

        let err = service
            .create_account("Ana", Some("111.444.777-00"))
            .await
            .unwrap_err();
        assert_eq!(err, AccountError::InvalidCpf("111.444.777-00".to_string()));
    }

    #[tokio::test]
    async fn test_update_unknown_account_is_not_found() {
        let id = Uuid::new_v4();
        let mut store = MockStore::new();
        store
            .expect_get_by_id()
            .with(eq(id))
            .times(1)
            .returning(|_| Ok(None));
        store.expect_update().times(0);
        let service = service_with(store);

        let err = service.update_account(id, "Bia").await.unwrap_err();
        assert_eq!(err, AccountError::NotFound(id));
    }

    #[tokio::test]
    async fn test_blank_name_on_update_is_invalid_argument() {
        let account = sample_account();
        let id = account.id;
        let mut store = MockStore::new();
        store
            .expect_get_by_id()
            .returning(move |_| Ok(Some(account.clone())));
        store.expect_update().times(0);
        let service = service_with(store);

        let err = service.update_account(id, "   ").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_deactivate_patches_cached_entry() {
        let account = sample_account();
        let id = account.id;
        let mut store = MockStore::new();
        store
            .expect_get_by_id()
            .times(1)
            .returning(move |_| Ok(Some(account.clone())));
        store.expect_update().times(1).returning(|_| Ok(()));
        let service = service_with(store);

        let view = service.deactivate_account(id).await.unwrap();
        assert_eq!(view.status, AccountStatus::Inactive);
        assert!(view.updated_at.is_some());

        // served from the per-id entry, the mock allows a single store read
        let cached = service.get_account(id).await.unwrap().unwrap();
        assert_eq!(cached.status, AccountStatus::Inactive);
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let mut store = MockStore::new();
        store
            .expect_get_all()
            .returning(|| Err(StoreError::CorruptRow("bad".to_string())));
        let service = service_with(store);

        let err = service.list_accounts().await.unwrap_err();
        assert!(matches!(err, AccountError::InternalFailure(_)));
        assert!(!service.cache().contains_key(ALL_ACCOUNTS_KEY));
        assert_eq!(service.metrics().operations_failed.load(Ordering::Relaxed), 1);
    }
}
