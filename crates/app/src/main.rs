mod intake;
mod notify;
mod problem;
mod router;
mod telemetry;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use intake_core::RecipientDirectory;
use intake_mail::{Notifier, SmtpRelay, SmtpSettings};
use intake_objectstore::{ObjectStoreClient, ObjectStoreConfig};
use intake_storage::Database;
use intake_util::{load_env_file, AppConfig};
use tracing::{info, warn};

use crate::notify::NotificationQueue;

const NOTIFY_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_SENDER: &str = "noreply@localhost";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database =
        Database::connect(&config.database.url, config.database.max_connections).await?;
    database.run_migrations().await?;

    let store = &config.object_store;
    let object_store = ObjectStoreClient::new(ObjectStoreConfig {
        endpoint: store.endpoint.clone(),
        access_key: store.access_key.clone(),
        secret_key: store.secret_key.clone(),
        bucket: store.bucket.clone(),
        region: store.region.clone(),
        secure: store.secure,
        connect_timeout: store.connect_timeout,
        timeout: store.timeout,
    })?;
    info!(
        stage = "app",
        endpoint = %store.endpoint,
        bucket = object_store.bucket(),
        "object store configured"
    );

    let recipients = Arc::new(
        RecipientDirectory::new(config.recipients.iter().cloned())
            .with_builtin_domains()
            .with_fallbacks(
                config.default_receiver.clone(),
                config.smtp.username.clone(),
            ),
    );
    info!(
        stage = "app",
        recipients = recipients.primary_len(),
        "recipient directory loaded"
    );

    let sender = match config.smtp.from.clone() {
        Some(sender) => sender,
        None => {
            warn!(
                stage = "app",
                sender = FALLBACK_SENDER,
                "SMTP_FROM and SMTP_USER are unset; using placeholder sender"
            );
            FALLBACK_SENDER.to_string()
        }
    };
    let relay = SmtpRelay::new(SmtpSettings {
        host: config.smtp.host.clone(),
        port: config.smtp.port,
        username: config.smtp.username.clone(),
        password: config.smtp.password.clone(),
        timeout: config.smtp.timeout,
    });
    let notifier = Notifier::new(relay, recipients.clone(), sender);
    let (notifications, worker) = NotificationQueue::new(notifier, config.notify_queue_capacity);
    let worker = worker.spawn();

    let state = router::AppState::new(
        metrics,
        database,
        object_store,
        recipients,
        notifications,
        config.max_upload_bytes,
    );

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(stage = "app", "HTTP server stopped; draining notifications");
    match tokio::time::timeout(NOTIFY_DRAIN_TIMEOUT, worker).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(stage = "app", error = %err, "notification worker failed"),
        Err(_) => warn!(stage = "app", "notification drain timed out"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(stage = "app", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
