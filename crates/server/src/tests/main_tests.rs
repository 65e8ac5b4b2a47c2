use super::*;
use axum::{body, body::Body, http::Request, http::StatusCode};
use tower::ServiceExt;

fn memory_settings() -> Settings {
    Settings {
        database_url: "sqlite::memory:".into(),
        jwt_secret: "main-test-secret".into(),
        ..Settings::default()
    }
}

#[tokio::test]
async fn built_state_serves_health_check() {
    let state = build_state(&memory_settings()).await.expect("state");
    let app = api::build_router(Arc::new(state));

    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn built_state_carries_configured_token_settings() {
    let settings = Settings {
        token_ttl_seconds: 90,
        ..memory_settings()
    };
    let state = build_state(&settings).await.expect("state");
    assert_eq!(state.api.auth.jwt_secret, "main-test-secret");
    assert_eq!(state.api.auth.token_ttl_seconds, 90);
}

#[tokio::test]
async fn built_state_creates_database_directory() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("data").join("barberconnect.db");
    let settings = Settings {
        database_url: db_path.to_string_lossy().into_owned(),
        ..memory_settings()
    };

    build_state(&settings).await.expect("state");
    assert!(db_path.exists());
}
