use crate::domain::{AccountEvent, AccountStatus};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Receives account lifecycle notifications. Implementations may be slow or
/// fail; callers never wait on them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn account_created(&self, id: Uuid, holder_name: &str, cpf: &str) -> Result<()>;
    async fn account_updated(
        &self,
        id: Uuid,
        holder_name: &str,
        cpf: &str,
        status: AccountStatus,
    ) -> Result<()>;
    async fn account_removed(&self, id: Uuid) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankArea {
    Fraud,
    Cards,
    Credit,
}

impl BankArea {
    pub const ALL: [BankArea; 3] = [BankArea::Fraud, BankArea::Cards, BankArea::Credit];
}

impl fmt::Display for BankArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankArea::Fraud => f.write_str("fraud"),
            BankArea::Cards => f.write_str("cards"),
            BankArea::Credit => f.write_str("credit"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Simulated delivery latency per area.
    pub area_delay: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            area_delay: Duration::from_millis(100),
        }
    }
}

/// Notifies the fraud, cards and credit areas of every account change.
/// Delivery is a structured log line per area.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier {
    config: NotifierConfig,
}

impl LoggingNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self { config }
    }

    async fn notify_area(
        &self,
        area: BankArea,
        action: &'static str,
        id: Uuid,
        holder_name: &str,
        cpf: &str,
    ) {
        info!(%area, action, account_id = %id, holder_name, cpf, "area notified");
        if !self.config.area_delay.is_zero() {
            tokio::time::sleep(self.config.area_delay).await;
        }
    }

    async fn fan_out(&self, action: &'static str, id: Uuid, holder_name: &str, cpf: &str) {
        info!(action, account_id = %id, "notifying bank areas");
        join_all(
            BankArea::ALL
                .iter()
                .map(|area| self.notify_area(*area, action, id, holder_name, cpf)),
        )
        .await;
        info!(action, account_id = %id, "all bank areas notified");
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn account_created(&self, id: Uuid, holder_name: &str, cpf: &str) -> Result<()> {
        self.fan_out("CREATED", id, holder_name, cpf).await;
        Ok(())
    }

    async fn account_updated(
        &self,
        id: Uuid,
        holder_name: &str,
        cpf: &str,
        _status: AccountStatus,
    ) -> Result<()> {
        self.fan_out("UPDATED", id, holder_name, cpf).await;
        Ok(())
    }

    async fn account_removed(&self, id: Uuid) -> Result<()> {
        self.fan_out("REMOVED", id, "", "").await;
        Ok(())
    }
}

/// Hands events to a background worker so the request path never waits on
/// the notifier. Failures are logged by the worker and go no further.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::UnboundedSender<AccountEvent>,
}

impl NotificationDispatcher {
    /// Must be called from within a tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AccountEvent>();

        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = deliver(notifier.as_ref(), &event).await {
                    error!(
                        event_type = event.event_type(),
                        account_id = %event.aggregate_id(),
                        error = %e,
                        "notification failed"
                    );
                }
            }
            info!("notification dispatcher stopped");
        });

        (Self { sender }, handle)
    }

    pub fn publish(&self, event: AccountEvent) {
        let event_type = event.event_type();
        let account_id = event.aggregate_id();
        if self.sender.send(event).is_err() {
            warn!(event_type, %account_id, "notification dispatcher is gone, dropping event");
        }
    }
}

async fn deliver(notifier: &dyn Notifier, event: &AccountEvent) -> Result<()> {
    match event {
        AccountEvent::AccountCreated {
            account_id,
            holder_name,
            cpf,
            ..
        } => notifier.account_created(*account_id, holder_name, cpf).await,
        AccountEvent::AccountUpdated {
            account_id,
            holder_name,
            cpf,
            status,
            ..
        } => {
            notifier
                .account_updated(*account_id, holder_name, cpf, *status)
                .await
        }
        AccountEvent::AccountRemoved { account_id, .. } => {
            notifier.account_removed(*account_id).await
        }
    }
}
