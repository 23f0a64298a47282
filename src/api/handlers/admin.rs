//! Operator endpoints under `/admin`.
//!
//! Mounted only when an admin token is configured; every request must carry
//! `Authorization: Bearer <token>`.

use crate::{
    api::ApiConfig,
    counter::PersistenceError,
    guard::{BlockedClient, PendingFailures},
    service::BrickService,
};
use axum::{
    body::Body,
    extract::{Extension, Path},
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetCounter {
    pub value: i64,
}

/// Reject requests without the configured bearer token.
pub async fn require_token(
    config: Extension<Arc<ApiConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = match (config.admin_token(), bearer_token(request.headers())) {
        (Some(expected), Some(presented)) => bool::from(
            expected
                .expose_secret()
                .as_bytes()
                .ct_eq(presented.as_bytes()),
        ),
        _ => false,
    };

    if authorized {
        next.run(request).await
    } else {
        warn!(path = request.uri().path(), "admin request without valid token");
        StatusCode::UNAUTHORIZED.into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();

    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
}

#[utoipa::path(
    get,
    path= "/admin/blocks",
    responses (
        (status = 200, description = "Currently blocked clients", body = [BlockedClient]),
        (status = 401, description = "Missing or invalid admin token"),
    ),
    tag = "admin",
)]
pub async fn blocks(service: Extension<Arc<BrickService>>) -> Json<Vec<BlockedClient>> {
    Json(service.guard().blocked_clients())
}

#[utoipa::path(
    get,
    path= "/admin/failures",
    responses (
        (status = 200, description = "Clients with recent failed attempts", body = [PendingFailures]),
        (status = 401, description = "Missing or invalid admin token"),
    ),
    tag = "admin",
)]
pub async fn failures(service: Extension<Arc<BrickService>>) -> Json<Vec<PendingFailures>> {
    Json(service.guard().pending_failures())
}

#[utoipa::path(
    delete,
    path= "/admin/blocks/{client_id}",
    params(("client_id" = String, Path, description = "Client identifier")),
    responses (
        (status = 204, description = "Block lifted"),
        (status = 404, description = "Client was not blocked"),
        (status = 401, description = "Missing or invalid admin token"),
    ),
    tag = "admin",
)]
pub async fn clear_block(
    service: Extension<Arc<BrickService>>,
    Path(client_id): Path<String>,
) -> StatusCode {
    if service.guard().clear_block(&client_id) {
        info!(client_id, "block cleared by admin");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[utoipa::path(
    delete,
    path= "/admin/failures/{client_id}",
    params(("client_id" = String, Path, description = "Client identifier")),
    responses (
        (status = 204, description = "Failures forgotten"),
        (status = 404, description = "Client had no failures on record"),
        (status = 401, description = "Missing or invalid admin token"),
    ),
    tag = "admin",
)]
pub async fn clear_failures(
    service: Extension<Arc<BrickService>>,
    Path(client_id): Path<String>,
) -> StatusCode {
    if service.guard().clear_failures(&client_id) {
        info!(client_id, "failures cleared by admin");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[utoipa::path(
    put,
    path= "/admin/counter",
    request_body = SetCounter,
    responses (
        (status = 200, description = "Counter overwritten, body is the new value", body = String, content_type = "text/plain"),
        (status = 400, description = "Negative value"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 503, description = "Counter backend unavailable"),
    ),
    tag = "admin",
)]
pub async fn set_counter(
    service: Extension<Arc<BrickService>>,
    Json(payload): Json<SetCounter>,
) -> Response {
    match service.counter().set(payload.value).await {
        Ok(value) => {
            info!(value, "counter set by admin");
            value.to_string().into_response()
        }
        Err(PersistenceError::InvalidValue(value)) => (
            StatusCode::BAD_REQUEST,
            format!("invalid counter value: {value}"),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to set counter: {err}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{router as app_router, test_support};
    use anyhow::Result;
    use axum::{
        body::to_bytes,
        http::{header::CONTENT_TYPE, HeaderValue, Method},
        Router,
    };
    use secrecy::SecretString;
    use tower::ServiceExt;

    const TOKEN: &str = "s3cret";

    fn app() -> (Router, Arc<BrickService>) {
        let (service, _clock) = test_support::service(7);
        let config = ApiConfig::new().with_admin_token(Some(SecretString::from(TOKEN)));
        (app_router(service.clone(), Arc::new(config)), service)
    }

    fn admin_request(method: Method, uri: &str, body: Body) -> Result<Request<Body>> {
        Ok(Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(CONTENT_TYPE, "application/json")
            .body(body)?)
    }

    fn block(service: &BrickService, client: &str) {
        for _ in 0..3 {
            let _ = service.guard().record_failure(client);
        }
    }

    #[test]
    fn bearer_token_parsing() {
        let with = |value: &'static str| {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
            headers
        };

        assert_eq!(bearer_token(&with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&with("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&with("  Bearer  abc  ")), Some("abc"));
        assert_eq!(bearer_token(&with("Basic abc")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn lowercase_scheme_is_accepted() -> Result<()> {
        let (app, _service) = app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/blocks")
                    .header(AUTHORIZATION, format!("bearer {TOKEN}"))
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn missing_or_wrong_token_is_unauthorized() -> Result<()> {
        let (app, _service) = app();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/admin/blocks").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/blocks")
                    .header(AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn lists_and_clears_blocks() -> Result<()> {
        let (app, service) = app();
        block(&service, "9.9.9.9");

        let response = app
            .clone()
            .oneshot(admin_request(Method::GET, "/admin/blocks", Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let listed: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(listed[0]["client_id"], "9.9.9.9");
        assert_eq!(listed[0]["remaining_seconds"], 60);

        let response = app
            .clone()
            .oneshot(admin_request(
                Method::DELETE,
                "/admin/blocks/9.9.9.9",
                Body::empty(),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!service.guard().is_blocked("9.9.9.9"));

        let response = app
            .oneshot(admin_request(
                Method::DELETE,
                "/admin/blocks/9.9.9.9",
                Body::empty(),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn lists_and_clears_failures() -> Result<()> {
        let (app, service) = app();
        let _ = service.guard().record_failure("8.8.8.8");
        let _ = service.guard().record_failure("8.8.8.8");

        let response = app
            .clone()
            .oneshot(admin_request(Method::GET, "/admin/failures", Body::empty())?)
            .await?;
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let listed: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(listed[0]["client_id"], "8.8.8.8");
        assert_eq!(listed[0]["attempts"], 2);

        let response = app
            .oneshot(admin_request(
                Method::DELETE,
                "/admin/failures/8.8.8.8",
                Body::empty(),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(service.guard().pending_failures().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn sets_counter() -> Result<()> {
        let (app, service) = app();

        let response = app
            .clone()
            .oneshot(admin_request(
                Method::PUT,
                "/admin/counter",
                Body::from(r#"{"value": 500}"#),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"500");
        assert_eq!(service.get_counter().await, 500);

        let response = app
            .oneshot(admin_request(
                Method::PUT,
                "/admin/counter",
                Body::from(r#"{"value": -1}"#),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(service.get_counter().await, 500);
        Ok(())
    }
}
