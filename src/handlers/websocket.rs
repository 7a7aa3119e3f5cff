use log::{error, info, warn};
use serde::Deserialize;
use warp::http::{HeaderMap, StatusCode};
use warp::reply::Response;
use warp::ws::{WebSocket, Ws};
use warp::{Rejection, Reply};

use crate::auth::user::User;
use crate::core::connection::Connection;
use crate::core::session::run_session;
use crate::handlers::auth::{extract_token, extract_token_from_subprotocol, parse_rooms};
use crate::handlers::{ApiRejection, AppState};

/// Query string of the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub rooms: String,
}

/// Authenticate and validate an upgrade request before switching protocols
pub async fn upgrade(
    ws: Ws,
    query: WsQuery,
    headers: HeaderMap,
    state: AppState,
) -> Result<Response, Rejection> {
    let Some(token) = extract_token(&headers) else {
        warn!("WebSocket connection rejected: no token presented");
        return Err(warp::reject::custom(ApiRejection::new(
            StatusCode::UNAUTHORIZED,
            "Authentication required",
        )));
    };

    let user = match state.authenticator.authenticate_connection(&token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("WebSocket connection rejected: {}", e);
            return Err(warp::reject::custom(ApiRejection::new(
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token",
            )));
        }
    };

    let rooms = parse_rooms(&query.rooms).map_err(|e| {
        warn!("WebSocket connection rejected for {}: {}", user.username, e);
        warp::reject::custom(ApiRejection::new(StatusCode::BAD_REQUEST, e.to_string()))
    })?;

    let max_message_size = state.max_message_size;
    let reply = ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_ws_client(socket, user, rooms, state));

    // Browsers require the selected subprotocol to be echoed back
    match extract_token_from_subprotocol(&headers) {
        Some((_, protocol)) => {
            Ok(warp::reply::with_header(reply, "sec-websocket-protocol", protocol).into_response())
        }
        None => Ok(reply.into_response()),
    }
}

/// Serve an authenticated WebSocket connection
pub async fn handle_ws_client(ws: WebSocket, user: User, rooms: Vec<String>, state: AppState) {
    let (connection, outbound) = Connection::new(
        user,
        rooms,
        state.session.outbound_queue_capacity,
        state.connection_limit,
    );

    info!(
        "New websocket connection {} for user {}",
        connection.id, connection.user.username
    );

    if let Err(e) = state.hub.register(connection.clone()).await {
        error!("Failed to register connection {}: {}", connection.id, e);
        return;
    }

    run_session(
        ws,
        connection,
        outbound,
        state.hub.clone(),
        state.session,
        state.metrics.clone(),
    )
    .await;
}
