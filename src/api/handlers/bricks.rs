use crate::service::BrickService;
use axum::{extract::Extension, response::IntoResponse};
use std::sync::Arc;

#[utoipa::path(
    get,
    path= "/bricks",
    responses (
        (status = 200, description = "Current brick count", body = String, content_type = "text/plain"),
    ),
    tag = "bricks",
)]
// axum handler for the counter
pub async fn bricks(service: Extension<Arc<BrickService>>) -> impl IntoResponse {
    service.get_counter().await.to_string()
}

#[utoipa::path(
    get,
    path= "/",
    responses (
        (status = 200, description = "Current brick count", body = String, content_type = "text/plain"),
    ),
    tag = "bricks",
)]
pub async fn root(service: Extension<Arc<BrickService>>) -> impl IntoResponse {
    bricks(service).await
}
