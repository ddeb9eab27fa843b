//! RVMS is the identity and vital-signs core of a remote patient
//! monitoring service.

#![forbid(unsafe_code)]
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod relationship;
mod router;
pub mod store;
pub mod telemetry;
pub mod user;
pub mod vitals;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::store::{DocumentStore, MemoryStore, PgStore};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

#[cfg(test)]
pub(crate) fn test_email(email: &str) -> user::EmailAddress {
    user::EmailAddress::parse(email).unwrap()
}

/// Account manager over a fresh in-memory store.
#[cfg(test)]
pub(crate) fn test_users() -> (Arc<MemoryStore>, user::UserStore) {
    let memory = Arc::new(MemoryStore::new());
    let users = user::UserStore::new(
        Arc::clone(&memory) as Arc<dyn DocumentStore>,
        Arc::new(crypto::test_manager()),
    );
    (memory, users)
}

/// Account manager over a store that can lose a write race on demand.
#[cfg(test)]
pub(crate) fn test_racing_users() -> (Arc<store::RacingStore>, user::UserStore) {
    let racing = Arc::new(store::RacingStore::default());
    let users = user::UserStore::new(
        Arc::clone(&racing) as Arc<dyn DocumentStore>,
        Arc::new(crypto::test_manager()),
    );
    (racing, users)
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    let (_, users) = test_users();
    AppState::new(Arc::new(config::Configuration::default()), users, None)
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: user::UserStore,
    pub auth: auth::AuthenticationService,
    pub vitals: vitals::VitalsLedger,
    pub relationships: relationship::RelationshipManager,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire every service on top of one account manager.
    pub fn new(
        config: Arc<config::Configuration>,
        users: user::UserStore,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config,
            auth: auth::AuthenticationService::new(users.clone()),
            vitals: vitals::VitalsLedger::new(users.clone()),
            relationships: relationship::RelationshipManager::new(users.clone()),
            users,
            metrics,
        }
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(render_metrics))
        .nest("/api/user", router::user::router())
        .nest("/api/vitals", router::vitals::router())
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Prometheus exposition, empty when no recorder is installed.
async fn render_metrics(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Initialize the application state.
///
/// Documents go to PostgreSQL when configured, in memory otherwise.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let crypto = Arc::new(crypto::PasswordManager::new(config.pbkdf2.clone())?);

    let store: Arc<dyn DocumentStore> = match config.postgres {
        Some(ref config) => Arc::new(
            PgStore::connect(
                &config.address,
                config
                    .username
                    .as_deref()
                    .unwrap_or(store::DEFAULT_CREDENTIALS),
                config
                    .password
                    .as_deref()
                    .unwrap_or(store::DEFAULT_CREDENTIALS),
                config
                    .database
                    .as_deref()
                    .unwrap_or(store::DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(store::DEFAULT_POOL_SIZE),
            )
            .await?,
        ),
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, documents are kept in memory"
            );
            Arc::new(MemoryStore::new())
        },
    };

    let users = user::UserStore::new(store, crypto);
    Ok(AppState::new(config, users, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let response = make_request(
            app(test_state()),
            Method::GET,
            "/metrics",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = make_request(
            app(test_state()),
            Method::GET,
            "/api/unknown",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_initialize_memory_state() {
        let mut config = config::Configuration::default();
        config.pbkdf2 = Some(config::Pbkdf2 {
            iterations: 1_000,
            ..Default::default()
        });

        let state = initialize_state(Arc::new(config), None).await.unwrap();
        let email = test_email("a@x.com");

        state
            .users
            .register_patient("Alice", &email, "correct1")
            .await
            .unwrap();
        assert!(state.vitals.vitals(&email).await.unwrap().is_empty());
    }
}
