mod common;

use axum::http::StatusCode;
use common::{basic, spawn_app, spawn_app_with, token_auth, ADMIN_USER};
use serde_json::json;

#[tokio::test]
async fn admin_manages_a_user_end_to_end() {
    let app = spawn_app().await;

    let (status, body) = app
        .admin("/user/create", json!({ "user": "test_user", "pass": "test_pw" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"], "test_user");

    let (_, body) = app.admin("/user/read", json!({ "user": "test_user" })).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["username"], "test_user");
    assert!(body["data"]["deletedAt"].is_null());
    assert!(body["data"].get("password").is_none());

    let (_, body) = app
        .admin("/user/update", json!({ "user": "test_user", "pass": "new_pw" }))
        .await;
    assert_eq!(body["success"], true, "{body}");

    let (_, body) = app.admin("/user/delete", json!({ "user": "test_user" })).await;
    assert_eq!(body["success"], true, "{body}");

    let (_, body) = app.admin("/user/restore", json!({ "user": "test_user" })).await;
    assert_eq!(body["success"], true, "{body}");

    let (_, body) = app.admin("/user/drop", json!({ "user": "test_user" })).await;
    assert_eq!(body["success"], true, "{body}");

    let (status, body) = app.admin("/user/read", json!({ "user": "test_user" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn updated_password_is_the_one_that_authenticates() {
    let app = spawn_app().await;
    app.create_user("reader", "first", false).await;

    app.admin("/user/update", json!({ "user": "reader", "pass": "second" }))
        .await;

    // Any authenticated principal may read tables; a missing table is a 400, not a 401
    let probe = json!({ "table": "nothing_here" });
    let (status, _) = app.post("/table/read", Some(&basic("reader", "first")), probe.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.post("/table/read", Some(&basic("reader", "second")), probe).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn soft_delete_state_machine() {
    let app = spawn_app().await;
    app.create_user("bob", "pw", false).await;

    let (_, body) = app.admin("/user/delete", json!({ "user": "bob" })).await;
    assert_eq!(body["success"], true);
    assert!(body["data"]["deletedAt"].is_string());

    let (status, body) = app.admin("/user/delete", json!({ "user": "bob" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already deleted"), "{body}");

    let (_, body) = app.admin("/cmd", json!({ "data": "deleted" })).await;
    assert_eq!(body["data"], json!(["bob"]));

    let (_, body) = app.admin("/user/restore", json!({ "user": "bob" })).await;
    assert_eq!(body["success"], true);

    let (_, body) = app.admin("/cmd", json!({ "data": "users" })).await;
    assert_eq!(body["data"], json!(["bob", ADMIN_USER]));

    let (status, body) = app.admin("/user/restore", json!({ "user": "bob" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn deleted_user_cannot_authenticate() {
    let app = spawn_app().await;
    app.create_user("carol", "pw", false).await;
    let probe = json!({ "table": "nothing_here" });

    let (status, _) = app.post("/table/read", Some(&basic("carol", "pw")), probe.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.admin("/user/delete", json!({ "user": "carol" })).await;
    let (status, body) = app.post("/table/read", Some(&basic("carol", "pw")), probe).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn duplicate_usernames_conflict() {
    let app = spawn_app().await;
    app.create_user("dave", "pw", false).await;

    let (status, body) = app.admin("/user/create", json!({ "user": "dave", "pass": "pw" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already exists"));

    app.admin("/user/delete", json!({ "user": "dave" })).await;
    let (status, _) = app.admin("/user/create", json!({ "user": "dave", "pass": "pw" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn self_delete_and_drop_are_refused() {
    let app = spawn_app().await;

    for action in ["delete", "drop"] {
        let (status, body) = app
            .admin(&format!("/user/{action}"), json!({ "user": ADMIN_USER }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("your own account"), "{body}");
    }

    let (_, body) = app.admin("/cmd", json!({ "data": "admins" })).await;
    assert_eq!(body["data"], json!([ADMIN_USER]));
}

#[tokio::test]
async fn admin_accounts_are_protected_when_configured() {
    let app = spawn_app_with(|config| config.policy.protect_admins = true).await;
    app.create_user("second_admin", "pw", true).await;

    let (status, body) = app.admin("/user/delete", json!({ "user": "second_admin" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("admin account"));

    app.create_user("plain", "pw", false).await;
    let (status, _) = app.admin("/user/drop", json!({ "user": "plain" })).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admins_can_remove_other_admins_by_default() {
    let app = spawn_app().await;
    app.create_user("second_admin", "pw", true).await;

    let (status, body) = app.admin("/user/delete", json!({ "user": "second_admin" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn token_can_manage_users_but_never_grants_admin() {
    let app = spawn_app().await;

    let (status, body) = app
        .post(
            "/user/create",
            Some(&token_auth()),
            json!({ "user": "via_token", "pass": "pw", "admin": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["admin"], false);

    let (status, _) = app
        .post("/user/update", Some(&token_auth()), json!({ "user": "via_token", "admin": true }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.admin("/cmd", json!({ "data": "admins" })).await;
    assert_eq!(body["data"], json!([ADMIN_USER]));
}

#[tokio::test]
async fn admin_can_promote_and_user_endpoints_need_privilege() {
    let app = spawn_app().await;
    app.create_user("erin", "pw", false).await;

    let (status, _) = app
        .post("/user/read", Some(&basic("erin", "pw")), json!({ "user": "erin" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.admin("/user/update", json!({ "user": "erin", "admin": true })).await;
    assert_eq!(body["data"]["admin"], true);

    let (status, body) = app
        .post("/user/read", Some(&basic("erin", "pw")), json!({ "user": "erin" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn user_requests_validate_fields() {
    let app = spawn_app().await;

    let (status, _) = app.admin("/user/create", json!({ "pass": "pw" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.admin("/user/create", json!({ "user": "nopass" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.create_user("frank", "pw", false).await;
    let (status, body) = app.admin("/user/update", json!({ "user": "frank" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Nothing to update"));

    let (status, _) = app.admin("/user/update", json!({ "user": "ghost", "pass": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
