#![allow(dead_code)]

use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use tablekeeper::auth::Credentials;
use tablekeeper::config::AppConfig;
use tablekeeper::server::{app, AppState, ServerControl};

pub const ADMIN_USER: &str = "test_admin";
pub const ADMIN_PASS: &str = "test_pass";
pub const TOKEN: &str = "test-token-7f3a";

/// Router over a private in-memory SQLite database with a bootstrapped admin and one token
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    token_file: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.token_file);
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(adjust: impl FnOnce(&mut AppConfig)) -> TestApp {
    let token_file = std::env::temp_dir().join(format!("tablekeeper-tokens-{}", uuid::Uuid::new_v4()));
    std::fs::write(&token_file, format!("\n  {}  \nother-token\n", TOKEN)).expect("write token file");

    let mut config = AppConfig::default();
    config.server.redirect_url = "https://example.org/docs".to_string();
    config.database.storage = ":memory:".to_string();
    config.auth.tokens_enabled = true;
    config.auth.tokens_path = Some(token_file.clone());
    config.auth.admin_username = ADMIN_USER.to_string();
    config.auth.admin_password = Some(ADMIN_PASS.to_string());
    adjust(&mut config);

    let state = AppState::build(config, ServerControl::new())
        .await
        .expect("build app state");

    TestApp {
        router: app(state.clone()),
        state,
        token_file,
    }
}

pub fn basic(user: &str, pass: &str) -> String {
    Credentials {
        principal: user.to_string(),
        secret: pass.to_string(),
    }
    .to_header_value()
}

pub fn admin_auth() -> String {
    basic(ADMIN_USER, ADMIN_PASS)
}

pub fn token_auth() -> String {
    basic("token", TOKEN)
}

impl TestApp {
    pub async fn post(&self, uri: &str, auth: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let request = builder
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        self.send(request).await.0
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, HeaderMap) {
        let request = Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap();
        let ((status, _), headers) = self.send(request).await;
        (status, headers)
    }

    pub async fn send(&self, request: Request<Body>) -> ((StatusCode, Value), HeaderMap) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        ((status, body), headers)
    }

    /// POST as the bootstrapped admin
    pub async fn admin(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post(uri, Some(&admin_auth()), body).await
    }

    pub async fn create_user(&self, user: &str, pass: &str, admin: bool) {
        let (status, body) = self
            .admin("/user/create", json!({ "user": user, "pass": pass, "admin": admin }))
            .await;
        assert_eq!(status, StatusCode::OK, "create user {user}: {body}");
    }
}
