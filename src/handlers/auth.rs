//! Credential and room extraction for the WebSocket upgrade

use warp::http::HeaderMap;

use crate::auth::token::extract_bearer_token;
use crate::constants::{MAX_ROOMS_PER_CONNECTION, MAX_ROOM_ID_LENGTH};
use crate::error::{HubError, Result};

/// Subprotocol prefixes that carry a token
const SUBPROTOCOL_PREFIXES: [&str; 2] = ["bearer.", "token."];

/// Extract JWT token from the WebSocket subprotocol header.
/// Returns the token together with the full protocol entry so it can be echoed.
pub fn extract_token_from_subprotocol(headers: &HeaderMap) -> Option<(String, String)> {
    let protocol_str = headers.get("sec-websocket-protocol")?.to_str().ok()?;

    for protocol in protocol_str.split(',') {
        let protocol = protocol.trim();
        for prefix in SUBPROTOCOL_PREFIXES {
            if let Some(token) = protocol.strip_prefix(prefix) {
                if !token.is_empty() {
                    return Some((token.to_string(), protocol.to_string()));
                }
            }
        }
    }
    None
}

/// Token presented with the upgrade request.
///
/// Authorization header first, then the subprotocol, then `X-Auth-Token`.
/// Tokens in the URL are never accepted.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_str) = headers.get("authorization").and_then(|h| h.to_str().ok()) {
        if let Some(token) = extract_bearer_token(auth_str) {
            log::debug!("Token extracted from Authorization header");
            return Some(token);
        }
    }

    if let Some((token, _)) = extract_token_from_subprotocol(headers) {
        log::debug!("Token extracted from WebSocket subprotocol");
        return Some(token);
    }

    if let Some(token_str) = headers.get("x-auth-token").and_then(|h| h.to_str().ok()) {
        let token = token_str.trim();
        if !token.is_empty() {
            log::debug!("Token extracted from X-Auth-Token header");
            return Some(token.to_string());
        }
    }

    log::debug!("No token found in request headers");
    None
}

fn is_valid_room_id(room: &str) -> bool {
    !room.is_empty()
        && room.len() <= MAX_ROOM_ID_LENGTH
        && room
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse the comma separated `rooms` query value into the admission set
pub fn parse_rooms(raw: &str) -> Result<Vec<String>> {
    let mut rooms: Vec<String> = Vec::new();

    for room in raw.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        if !is_valid_room_id(room) {
            return Err(HubError::InvalidRoom(room.to_string()));
        }
        if !rooms.iter().any(|r| r == room) {
            rooms.push(room.to_string());
        }
    }

    if rooms.is_empty() {
        return Err(HubError::InvalidRoom("at least one room is required".to_string()));
    }
    if rooms.len() > MAX_ROOMS_PER_CONNECTION {
        return Err(HubError::InvalidRoom(format!(
            "at most {} rooms per connection",
            MAX_ROOMS_PER_CONNECTION
        )));
    }

    Ok(rooms)
}
