use anyhow::{Context, Result};
use banking_accounts::application::AccountService;
use banking_accounts::infrastructure::{
    create_pool, ensure_schema, init_logging, AccountCache, AppConfig, LoggingNotifier,
    NotificationDispatcher, SqliteAccountStore,
};
use banking_accounts::web::create_router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = AppConfig::from_env();

    let _log_guard = init_logging(config.logging.clone())
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    info!("Starting banking accounts service");

    let pool = create_pool(&config.database_url, Some(config.pool.clone()))
        .await
        .context("failed to connect to the database")?;
    ensure_schema(&pool)
        .await
        .context("failed to create the accounts schema")?;

    let cache = AccountCache::new(config.cache.clone());
    let cleanup = cache.spawn_cleanup_task();

    let notifier = Arc::new(LoggingNotifier::new(config.notifier.clone()));
    let (notifications, dispatcher) = NotificationDispatcher::spawn(notifier);

    let service = Arc::new(AccountService::new(
        Arc::new(SqliteAccountStore::new(pool.clone())),
        cache,
        notifications,
        config.account_ttl,
    ));
    let app = create_router(service);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cleanup.abort();
    // the router held the last sender; let queued notifications drain
    if tokio::time::timeout(Duration::from_secs(5), dispatcher)
        .await
        .is_err()
    {
        info!("Notification dispatcher did not drain in time");
    }
    pool.close().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
