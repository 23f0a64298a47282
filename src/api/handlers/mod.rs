pub mod admin;
pub mod bricks;
pub mod health;
pub mod place;
pub mod time;

// common functions for the handlers
use crate::service::Rejection;
use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

pub const FAILURE_BODY: &str = "please be nice";

/// Identify the caller: the proxy header if present, else the peer address.
///
/// Forwarding headers may carry a list; the first entry is the client.
pub fn client_id(
    headers: &HeaderMap,
    header: &HeaderName,
    peer: Option<&ConnectInfo<SocketAddr>>,
) -> String {
    let forwarded = headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (forwarded, peer) {
        (Some(value), _) => value.to_string(),
        (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Every refusal looks the same to the caller.
pub fn failure() -> Response {
    (StatusCode::BAD_REQUEST, FAILURE_BODY).into_response()
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        failure()
    }
}
