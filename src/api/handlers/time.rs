use crate::service::BrickService;
use axum::{extract::Extension, response::IntoResponse};
use std::sync::Arc;

#[utoipa::path(
    get,
    path= "/time",
    responses (
        (status = 200, description = "Server time in milliseconds since the Unix epoch", body = String, content_type = "text/plain"),
    ),
    tag = "bricks",
)]
pub async fn time(service: Extension<Arc<BrickService>>) -> impl IntoResponse {
    service.server_time_millis().to_string()
}
