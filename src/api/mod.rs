use crate::{
    api::handlers::{admin, health},
    service::BrickService,
};
use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::options,
    Extension, Router,
};
use secrecy::SecretString;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

pub mod handlers;
pub mod maintenance;
pub mod openapi;

pub const DEFAULT_CLIENT_IP_HEADER: &str = "CF-Connecting-IP";

/// Request-facing settings shared by the handlers.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    client_ip_header: HeaderName,
    admin_token: Option<SecretString>,
}

impl ApiConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client_ip_header: HeaderName::from_static("cf-connecting-ip"),
            admin_token: None,
        }
    }

    /// Header carrying the client address when running behind a proxy.
    ///
    /// # Errors
    /// Returns an error if `name` is not a valid header name.
    pub fn with_client_ip_header(mut self, name: &str) -> Result<Self> {
        self.client_ip_header = HeaderName::try_from(name)?;
        Ok(self)
    }

    /// Mount the `/admin` routes, guarded by this bearer token.
    #[must_use]
    pub fn with_admin_token(mut self, token: Option<SecretString>) -> Self {
        self.admin_token = token;
        self
    }

    #[must_use]
    pub fn client_ip_header(&self) -> &HeaderName {
        &self.client_ip_header
    }

    #[must_use]
    pub fn admin_token(&self) -> Option<&SecretString> {
        self.admin_token.as_ref()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the application router.
pub fn router(service: Arc<BrickService>, config: Arc<ApiConfig>) -> Router {
    let (router, _) = openapi::public_router().split_for_parts();
    let mut router = router.route("/health", options(health::health));

    if config.admin_token().is_some() {
        let (admin_routes, _) = openapi::admin_router().split_for_parts();
        let admin_routes = admin_routes.route_layer(middleware::from_fn(admin::require_token));
        router = router.merge(admin_routes);
    }

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(service))
            .layer(Extension(config)),
    )
}

/// Serve the API on `port` until Ctrl-C or SIGTERM.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails
pub async fn new(port: u16, service: Arc<BrickService>, config: ApiConfig) -> Result<()> {
    let app = router(service, Arc::new(config));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        shutdown_signal().await;
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let method = request.method().as_str();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", method, path, request_id)
}
