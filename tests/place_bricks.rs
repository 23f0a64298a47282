#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end checks of the HTTP surface with an in-memory counter and a
//! manually driven clock.

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use bricks::{
    api::{router, ApiConfig},
    clock::{Clock, ManualClock},
    counter::{CounterBackend, CounterConfig, CounterStore, MemoryCounterBackend},
    guard::{AttemptGuard, GuardConfig},
    otp::{OtpConfig, OtpEngine},
    service::BrickService,
};
use chrono::Duration;
use secrecy::SecretString;
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "t0ken";

struct TestApp {
    app: Router,
    service: Arc<BrickService>,
    clock: Arc<ManualClock>,
    backend: Arc<MemoryCounterBackend>,
}

impl TestApp {
    fn new() -> Result<Self> {
        let clock = Arc::new(ManualClock::at_unix(10_000));
        let backend = Arc::new(MemoryCounterBackend::new(0));

        let otp = OtpEngine::new(SecretString::from("abc"), OtpConfig::new())?;
        let guard = AttemptGuard::new(GuardConfig::new(), clock.clone());
        let counter = CounterStore::spawn(backend.clone(), CounterConfig::new(), clock.clone());
        let service = Arc::new(BrickService::new(otp, guard, counter, clock.clone()));

        let config = ApiConfig::new().with_admin_token(Some(SecretString::from(ADMIN_TOKEN)));
        let app = router(service.clone(), Arc::new(config));

        Ok(Self {
            app,
            service,
            clock,
            backend,
        })
    }

    fn code(&self) -> String {
        self.service.otp().current_code(self.clock.now()).to_string()
    }

    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, String)> {
        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, String::from_utf8(body.to_vec())?))
    }

    async fn place(&self, client: &str, query: &str) -> Result<(StatusCode, String)> {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(format!("/place?{query}"))
                .header("CF-Connecting-IP", client)
                .body(Body::empty())?,
        )
        .await
    }

    async fn get(&self, uri: &str) -> Result<(StatusCode, String)> {
        self.send(Request::builder().uri(uri).body(Body::empty())?).await
    }
}

#[tokio::test]
async fn placing_bricks_updates_the_counter() -> Result<()> {
    let app = TestApp::new()?;
    assert_eq!(app.code(), "379");

    assert_eq!(app.get("/bricks").await?, (StatusCode::OK, "0".to_string()));

    let (status, body) = app.place("198.51.100.1", "code=379&count=2").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "2");

    let (status, body) = app.place("198.51.100.1", "code=379").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "3");

    assert_eq!(app.get("/bricks").await?, (StatusCode::OK, "3".to_string()));
    assert_eq!(app.get("/").await?, (StatusCode::OK, "3".to_string()));
    assert_eq!(app.backend.read().await?, 3);
    Ok(())
}

#[tokio::test]
async fn previous_window_code_is_still_accepted() -> Result<()> {
    let app = TestApp::new()?;

    app.clock.advance(Duration::seconds(10));
    assert_eq!(app.code(), "445");

    let (status, body) = app.place("198.51.100.2", "code=379").await?;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "1"));

    app.clock.advance(Duration::seconds(10));
    let (status, _) = app.place("198.51.100.2", "code=379").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn repeated_wrong_codes_block_the_client() -> Result<()> {
    let app = TestApp::new()?;
    let client = "203.0.113.7";

    for _ in 0..3 {
        let (status, body) = app.place(client, "code=1&count=1").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "please be nice");
    }

    // correct code, but the client is blocked
    let (status, body) = app.place(client, "code=379").await?;
    assert_eq!((status, body.as_str()), (StatusCode::BAD_REQUEST, "please be nice"));

    // other clients are unaffected
    let (status, _) = app.place("203.0.113.8", "code=379").await?;
    assert_eq!(status, StatusCode::OK);

    app.clock.advance(Duration::seconds(61));
    let query = format!("code={}", app.code());
    let (status, body) = app.place(client, &query).await?;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "2"));
    Ok(())
}

#[tokio::test]
async fn out_of_range_count_is_rejected() -> Result<()> {
    let app = TestApp::new()?;

    for count in ["0", "4", "-1", "many"] {
        let (status, body) = app
            .place("198.51.100.3", &format!("code=379&count={count}"))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "please be nice");
    }

    assert_eq!(app.get("/bricks").await?, (StatusCode::OK, "0".to_string()));
    assert!(!app.service.guard().is_blocked("198.51.100.3"));
    Ok(())
}

#[tokio::test]
async fn time_reports_server_millis() -> Result<()> {
    let app = TestApp::new()?;
    app.clock.advance(Duration::milliseconds(1_234));

    assert_eq!(
        app.get("/time").await?,
        (StatusCode::OK, "10001234".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn admin_can_inspect_and_clear_blocks() -> Result<()> {
    let app = TestApp::new()?;
    let client = "192.0.2.10";

    for _ in 0..3 {
        app.place(client, "code=0").await?;
    }

    let (status, _) = app.get("/admin/blocks").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            Request::builder()
                .uri("/admin/blocks")
                .header("Authorization", format!("Bearer {ADMIN_TOKEN}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(client));

    let (status, _) = app
        .send(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/admin/blocks/{client}"))
                .header("Authorization", format!("Bearer {ADMIN_TOKEN}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.place(client, "code=379").await?;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "1"));
    Ok(())
}
