#![allow(dead_code)]

use async_trait::async_trait;
use banking_accounts::application::AccountService;
use banking_accounts::domain::{Account, AccountStatus, Cpf};
use banking_accounts::infrastructure::{
    AccountCache, AccountStore, CacheConfig, NotificationDispatcher, Notifier, StoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const ACCOUNT_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// In-memory store that counts every call, so tests can assert which
/// operations were served from the cache.
#[derive(Default)]
pub struct CountingStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
    pub get_by_id_calls: AtomicUsize,
    pub get_all_calls: AtomicUsize,
    pub exists_calls: AtomicUsize,
    pub add_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
}

impl CountingStore {
    pub fn reads(&self) -> usize {
        self.get_by_id_calls.load(Ordering::SeqCst) + self.get_all_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }
}

#[async_trait]
impl AccountStore for CountingStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        self.get_by_id_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().unwrap().get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Account>, StoreError> {
        self.get_all_calls.fetch_add(1, Ordering::SeqCst);
        let mut all: Vec<Account> = self.accounts.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|account| account.created_at);
        Ok(all)
    }

    async fn exists_by_cpf(&self, cpf: &Cpf) -> Result<bool, StoreError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .any(|account| &account.cpf == cpf))
    }

    async fn add(&self, account: &Account) -> Result<Account, StoreError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.values().any(|existing| existing.cpf == account.cpf) {
            return Err(StoreError::DuplicateCpf(account.cpf.to_string()));
        }
        accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn update(&self, account: &Account) -> Result<(), StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        match self.accounts.lock().unwrap().get_mut(&account.id) {
            Some(existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(account.id)),
        }
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.accounts.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notified {
    Created(Uuid, String),
    Updated(Uuid, String, AccountStatus),
    Removed(Uuid),
}

/// Forwards every notification to a channel.
pub struct RecordingNotifier {
    sender: mpsc::UnboundedSender<Notified>,
}

impl RecordingNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notified>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn account_created(&self, id: Uuid, _holder_name: &str, cpf: &str) -> anyhow::Result<()> {
        self.sender.send(Notified::Created(id, cpf.to_string()))?;
        Ok(())
    }

    async fn account_updated(
        &self,
        id: Uuid,
        holder_name: &str,
        _cpf: &str,
        status: AccountStatus,
    ) -> anyhow::Result<()> {
        self.sender
            .send(Notified::Updated(id, holder_name.to_string(), status))?;
        Ok(())
    }

    async fn account_removed(&self, id: Uuid) -> anyhow::Result<()> {
        self.sender.send(Notified::Removed(id))?;
        Ok(())
    }
}

pub fn service_with_store(
    store: Arc<dyn AccountStore>,
) -> (AccountService, mpsc::UnboundedReceiver<Notified>) {
    let (notifier, events) = RecordingNotifier::new();
    let (dispatcher, _) = NotificationDispatcher::spawn(Arc::new(notifier));
    let service = AccountService::new(
        store,
        AccountCache::new(CacheConfig::default()),
        dispatcher,
        ACCOUNT_TTL,
    );
    (service, events)
}

pub fn counting_service() -> (
    AccountService,
    Arc<CountingStore>,
    mpsc::UnboundedReceiver<Notified>,
) {
    let store = Arc::new(CountingStore::default());
    let (service, events) = service_with_store(store.clone());
    (service, store, events)
}
