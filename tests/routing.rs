mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{admin_auth, basic, spawn_app, ADMIN_USER};
use serde_json::json;

#[tokio::test]
async fn get_anywhere_redirects() {
    let app = spawn_app().await;

    for uri in ["/", "/some/page", "/cmd", "/user/read"] {
        let (status, headers) = app.get(uri).await;
        assert_eq!(status, StatusCode::FOUND, "{uri}");
        assert_eq!(headers[header::LOCATION], "https://example.org/docs");
    }
}

#[tokio::test]
async fn unknown_routes_and_actions_are_404() {
    let app = spawn_app().await;

    let (status, body) = app.admin("/nope", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = app.admin("/user/explode", json!({ "user": "x" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.admin("/table/truncate", json!({ "table": "x" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_or_bad_credentials_are_401() {
    let app = spawn_app().await;
    let body = json!({ "data": "users" });

    let (status, response) = app.post("/cmd", None, body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], "Missing Authorization header");

    let (status, _) = app.post("/cmd", Some("Bearer abc"), body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.post("/cmd", Some(&basic(ADMIN_USER, "wrong")), body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.post("/cmd", Some(&basic("nobody", "pw")), body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.post("/query", Some(&basic("token", "not-a-token")), body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = spawn_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/user/create")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, admin_auth())
        .body(Body::from("{not json"))
        .unwrap();
    let ((status, body), _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}
