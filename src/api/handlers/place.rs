use crate::{
    api::{
        handlers::{client_id, failure},
        ApiConfig,
    },
    service::BrickService,
};
use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Extension, Query},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, instrument};
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PlaceParams {
    /// One-time code for the current (or previous) window.
    code: Option<String>,
    /// Bricks to place, 1 to 3. Defaults to 1.
    count: Option<String>,
}

#[utoipa::path(
    get,
    path= "/place",
    params(PlaceParams),
    responses (
        (status = 200, description = "Bricks placed, body is the new count", body = String, content_type = "text/plain"),
        (status = 400, description = "Rejected", body = String, content_type = "text/plain"),
    ),
    tag = "bricks",
)]
// axum handler for placing bricks
#[instrument(skip_all)]
pub async fn place(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    service: Extension<Arc<BrickService>>,
    config: Extension<Arc<ApiConfig>>,
    params: Result<Query<PlaceParams>, QueryRejection>,
) -> Response {
    let client = client_id(&headers, config.client_ip_header(), peer.as_ref());

    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            debug!(client, "malformed query: {rejection}");
            return failure();
        }
    };

    let delta = match params.count.as_deref().map(str::trim) {
        None | Some("") => 1,
        Some(raw) => {
            let Ok(delta) = raw.parse::<i64>() else {
                debug!(client, raw, "unparsable count");
                return failure();
            };
            delta
        }
    };

    let code = params.code.unwrap_or_default();

    match service.place_bricks(&client, delta, &code).await {
        Ok(count) => count.to_string().into_response(),
        Err(rejection) => {
            debug!(client, "placement rejected: {rejection}");
            rejection.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path= "/place",
    params(PlaceParams),
    responses (
        (status = 200, description = "Bricks placed, body is the new count", body = String, content_type = "text/plain"),
        (status = 400, description = "Rejected", body = String, content_type = "text/plain"),
    ),
    tag = "bricks",
)]
// same as GET, parameters stay in the query string
pub async fn place_post(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    service: Extension<Arc<BrickService>>,
    config: Extension<Arc<ApiConfig>>,
    params: Result<Query<PlaceParams>, QueryRejection>,
) -> Response {
    place(headers, peer, service, config, params).await
}
