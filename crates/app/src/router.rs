use std::{any::Any, sync::Arc};

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use intake_core::RecipientDirectory;
use intake_objectstore::ObjectStoreClient;
use intake_storage::Database;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyCors, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use crate::notify::NotificationQueue;
use crate::problem::ProblemResponse;
use crate::{intake, telemetry};

/// Room left above the resume cap for the text fields and multipart framing.
const FORM_OVERHEAD_BYTES: usize = 256 * 1024;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    object_store: ObjectStoreClient,
    recipients: Arc<RecipientDirectory>,
    notifications: NotificationQueue,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        object_store: ObjectStoreClient,
        recipients: Arc<RecipientDirectory>,
        notifications: NotificationQueue,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            metrics,
            storage,
            object_store,
            recipients,
            notifications,
            clock: Arc::new(Utc::now),
            max_upload_bytes,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn object_store(&self) -> &ObjectStoreClient {
        &self.object_store
    }

    pub fn recipients(&self) -> &RecipientDirectory {
        &self.recipients
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes().saturating_add(FORM_OVERHEAD_BYTES);
    let cors = CorsLayer::new()
        .allow_origin(AnyCors)
        .allow_methods(AnyCors)
        .allow_headers(AnyCors);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/submit", post(intake::submit))
        .route("/contact", post(intake::contact))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(stage = "app", panic = %message, "handler panicked");
    ProblemResponse::internal().into_response()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    use httpmock::{prelude::*, Method};
    use intake_mail::{MemoryRelay, Notifier};
    use intake_objectstore::ObjectStoreConfig;

    use crate::notify::NotificationQueue;

    pub const BUCKET: &str = "resumes";

    pub struct TestApp {
        pub state: AppState,
        pub relay: MemoryRelay,
        pub server: MockServer,
    }

    pub fn directory() -> Arc<RecipientDirectory> {
        Arc::new(
            RecipientDirectory::new([("acme.com", "hr@acme.com")])
                .with_builtin_domains()
                .with_fallbacks(Some("contact@example.com".to_string()), None),
        )
    }

    /// Object store mock that accepts bucket probes and uploads.
    pub async fn object_store_mock() -> MockServer {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::HEAD).path(format!("/{BUCKET}"));
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(Method::PUT).path_contains(format!("/{BUCKET}/resumes/"));
                then.status(200);
            })
            .await;
        server
    }

    pub async fn setup(server: MockServer, relay: MemoryRelay, max_upload_bytes: usize) -> TestApp {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let database = Database::connect("sqlite::memory:", 1)
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");

        let object_store = ObjectStoreClient::new(ObjectStoreConfig {
            endpoint: server.address().to_string(),
            access_key: "minio".to_string(),
            secret_key: "minio123".to_string(),
            bucket: BUCKET.to_string(),
            region: "us-east-1".to_string(),
            secure: false,
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
        })
        .expect("object store client");

        let recipients = directory();
        let notifier = Notifier::new(relay.clone(), recipients.clone(), "service@example.com");
        let (queue, worker) = NotificationQueue::new(notifier, 16);
        worker.spawn();

        let state = AppState::new(
            metrics,
            database,
            object_store,
            recipients,
            queue,
            max_upload_bytes,
        );
        TestApp {
            state,
            relay,
            server,
        }
    }

    /// Waits until the relay has captured `count` messages.
    pub async fn wait_for_mail(relay: &MemoryRelay, count: usize) -> Vec<intake_mail::SentMail> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let sent = relay.sent();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
