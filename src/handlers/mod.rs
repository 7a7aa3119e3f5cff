//! Request handlers for the server endpoints

pub mod auth;
pub mod websocket;

use serde::Serialize;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth::provider::SharedAuthenticator;
use crate::config::ServerConfig;
use crate::constants::WS_PATH;
use crate::core::hub::HubHandle;
use crate::core::rate_limiter::TokenBucketConfig;
use crate::core::session::SessionSettings;
use crate::metrics::SharedMetrics;

// Re-export the websocket handler
pub use websocket::handle_ws_client;

/// Everything a request handler needs, cheap to clone per request
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub authenticator: SharedAuthenticator,
    pub metrics: SharedMetrics,
    pub session: SessionSettings,
    /// Per-connection inbound limit
    pub connection_limit: TokenBucketConfig,
    pub max_message_size: usize,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        hub: HubHandle,
        authenticator: SharedAuthenticator,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            hub,
            authenticator,
            metrics,
            session: config.session_settings(),
            connection_limit: config.rate_limit_settings().connection,
            max_message_size: config.max_message_size,
        }
    }
}

/// Request refused before the WebSocket upgrade
#[derive(Debug)]
pub struct ApiRejection {
    pub status: StatusCode,
    pub message: String,
}

impl ApiRejection {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl warp::reject::Reject for ApiRejection {}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

// Helper function to include the shared state in a request
fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// All HTTP routes: the WebSocket endpoint plus health, version and metrics
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let metrics = state.metrics.clone();

    let ws_route = warp::path(WS_PATH)
        .and(warp::path::end())
        .and(warp::ws())
        // A missing or malformed query must not preempt the 401
        .and(
            warp::query::<websocket::WsQuery>()
                .or(warp::any().map(websocket::WsQuery::default))
                .unify(),
        )
        .and(warp::header::headers_cloned())
        .and(with_state(state))
        .and_then(websocket::upgrade);

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "OK");

    let version_route = warp::path("version")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| env!("CARGO_PKG_VERSION"));

    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            warp::reply::with_header(
                metrics.export_prometheus(),
                "content-type",
                "text/plain; version=0.0.4",
            )
        });

    ws_route
        .or(health_route)
        .or(version_route)
        .or(metrics_route)
        .recover(handle_rejection)
}

/// Turn rejections into JSON error responses
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(rejection) = err.find::<ApiRejection>() {
        (rejection.status, rejection.message.clone())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        log::debug!("Unhandled rejection: {:?}", err);
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}
