use actix_web::{http::StatusCode, test::TestRequest};
use gateway_auth::{db_types::AuthEventType, AuditLog};
use serde_json::{json, Value};

use super::helpers::*;

const ADMIN_ROLE: i64 = 1;
const SERVICE_ROLE: i64 = 2;
const GENERIC_401: &str = r#"{"error":"Authentication failed"}"#;

#[actix_web::test]
async fn health_is_open() {
    let state = test_state().await;
    let (status, body) = send(&state, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn token_request_needs_an_api_key() {
    let state = test_state().await;
    let req = TestRequest::post().uri("/auth/tokens").set_json(json!({ "command": 1, "actor": "svc" }));
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, GENERIC_401);

    let req = with_bearer(TestRequest::post().uri("/auth/tokens"), "made-up-key")
        .set_json(json!({ "command": 1, "actor": "svc" }));
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, GENERIC_401);
}

#[actix_web::test]
async fn malformed_token_requests() {
    let state = test_state().await;
    let key = api_key_for_role(&state, ADMIN_ROLE).await;
    let req = with_bearer(TestRequest::post().uri("/auth/tokens"), &key)
        .set_json(json!({ "command": "1", "actor": "svc" }));
    let (status, _) = send(&state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = with_bearer(TestRequest::post().uri("/auth/tokens"), &key)
        .set_json(json!({ "command": 1, "actor": "svc", "expirationTime": 60 * 24 * 31 }));
    let (status, _) = send(&state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = with_bearer(TestRequest::post().uri("/auth/tokens"), &key)
        .set_json(json!({ "command": 1, "actor": "" }));
    let (status, _) = send(&state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn token_is_single_use() {
    let state = test_state().await;
    let key = api_key_for_role(&state, SERVICE_ROLE).await;
    let token = issue_token(&state, &key, "svc-admin", 1).await;

    let (status, body) = send(&state, with_bearer(TestRequest::get().uri("/ping"), &token)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["actor"], "svc-admin");

    let (status, body) = send(&state, with_bearer(TestRequest::get().uri("/ping"), &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, GENERIC_401);
}

#[actix_web::test]
async fn query_strings_are_ignored_for_permissions() {
    let state = test_state().await;
    let key = api_key_for_role(&state, SERVICE_ROLE).await;
    let token = issue_token(&state, &key, "svc-admin", 1).await;
    let (status, body) = send(&state, with_bearer(TestRequest::get().uri("/ping?x=1"), &token)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[actix_web::test]
async fn wrong_permission_burns_the_token() {
    let state = test_state().await;
    let key = api_key_for_role(&state, ADMIN_ROLE).await;
    let token = issue_token(&state, &key, "ops@example.com", 10).await;

    let (status, body) = send(&state, with_bearer(TestRequest::get().uri("/ping"), &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, GENERIC_401);

    let req = with_bearer(TestRequest::post().uri("/admin/keys/revoke"), &token).set_json(json!({ "keyID": "x" }));
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, GENERIC_401);

    let events = state.db.fetch_recent_auth_events(2).await.unwrap();
    assert_eq!(events[0].reason, "token unknown or already redeemed");
    assert_eq!(events[1].reason, "permission mismatch");
    assert_eq!(events[1].masked_subject.as_deref(), Some("o*****s@example.com"));
}

#[actix_web::test]
async fn missing_and_garbage_credentials() {
    let state = test_state().await;
    let (status, body) = send(&state, TestRequest::get().uri("/ping")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, GENERIC_401);
    let events = state.db.fetch_recent_auth_events(1).await.unwrap();
    assert_eq!(events[0].event_type, AuthEventType::MissingCredential);

    let (status, body) = send(&state, with_bearer(TestRequest::get().uri("/ping"), "a.b.c.d.e")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, GENERIC_401);
    let events = state.db.fetch_recent_auth_events(1).await.unwrap();
    assert_eq!(events[0].reason, "decrypt/signature failure");
}

#[actix_web::test]
async fn unknown_endpoints_are_not_found() {
    let state = test_state().await;
    let key = api_key_for_role(&state, SERVICE_ROLE).await;
    let token = issue_token(&state, &key, "svc-admin", 1).await;
    let (status, body) = send(&state, with_bearer(TestRequest::get().uri("/nothing-here"), &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Not found"}"#);
    // The token was not consumed
    let (status, _) = send(&state, with_bearer(TestRequest::get().uri("/ping"), &token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn api_key_administration() {
    let state = test_state().await;
    let admin_key = api_key_for_role(&state, ADMIN_ROLE).await;

    let token = issue_token(&state, &admin_key, "ops", 8).await;
    let req = with_bearer(TestRequest::post().uri("/admin/keys"), &token)
        .set_json(json!({ "name": "payments", "roleID": SERVICE_ROLE, "expirationTime": 60 }));
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let body: Value = serde_json::from_str(&body).unwrap();
    let new_key = body["apiKey"].as_str().unwrap().to_string();
    let key_id = body["keyID"].as_str().unwrap().to_string();
    assert!(body["expiresAt"].is_string());

    // The service role can request payment tokens, but not admin tokens
    issue_token(&state, &new_key, "svc", 7).await;
    let req = with_bearer(TestRequest::post().uri("/auth/tokens"), &new_key)
        .set_json(json!({ "command": 8, "actor": "svc" }));
    let (status, _) = send(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = issue_token(&state, &admin_key, "ops", 9).await;
    let req = with_bearer(TestRequest::post().uri("/admin/keys/role"), &token)
        .set_json(json!({ "keyID": key_id, "roleID": ADMIN_ROLE }));
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    issue_token(&state, &new_key, "svc", 8).await;

    let token = issue_token(&state, &admin_key, "ops", 10).await;
    let req = with_bearer(TestRequest::post().uri("/admin/keys/revoke"), &token).set_json(json!({ "keyID": key_id }));
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let req = with_bearer(TestRequest::post().uri("/auth/tokens"), &new_key)
        .set_json(json!({ "command": 7, "actor": "svc" }));
    let (status, _) = send(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn admin_errors_map_to_client_errors() {
    let state = test_state().await;
    let admin_key = api_key_for_role(&state, ADMIN_ROLE).await;

    let token = issue_token(&state, &admin_key, "ops", 10).await;
    let req = with_bearer(TestRequest::post().uri("/admin/keys/revoke"), &token).set_json(json!({ "keyID": "nope" }));
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Not found"}"#);

    let token = issue_token(&state, &admin_key, "ops", 8).await;
    let req = with_bearer(TestRequest::post().uri("/admin/keys"), &token)
        .set_json(json!({ "name": "payments", "roleID": 42 }));
    let (status, _) = send(&state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn out_of_range_lifetimes_are_bad_requests() {
    let state = test_state().await;
    let admin_key = api_key_for_role(&state, ADMIN_ROLE).await;

    for minutes in [i64::MAX, i64::MIN, 1_000_000_000_000] {
        let req = with_bearer(TestRequest::post().uri("/auth/tokens"), &admin_key)
            .set_json(json!({ "command": 1, "actor": "svc", "expirationTime": minutes }));
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{minutes}: {body}");
    }

    for minutes in [i64::MAX, 1_000_000_000_000, -5] {
        let token = issue_token(&state, &admin_key, "ops", 8).await;
        let req = with_bearer(TestRequest::post().uri("/admin/keys"), &token)
            .set_json(json!({ "name": "p", "roleID": SERVICE_ROLE, "expirationTime": minutes }));
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{minutes}: {body}");
    }
}

#[actix_web::test]
async fn audit_ip_follows_the_proxy_options() {
    let mut state = test_state().await;
    let req = TestRequest::get().uri("/ping").insert_header(("X-Forwarded-For", "203.0.113.7, 10.0.0.1"));
    send(&state, req).await;
    let events = state.db.fetch_recent_auth_events(1).await.unwrap();
    assert_ne!(events[0].ip.as_deref(), Some("203.0.113.7"));

    state.options.use_x_forwarded_for = true;
    let req = TestRequest::get().uri("/ping").insert_header(("X-Forwarded-For", "203.0.113.7, 10.0.0.1"));
    let (status, _) = send(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let events = state.db.fetch_recent_auth_events(1).await.unwrap();
    assert_eq!(events[0].event_type, AuthEventType::MissingCredential);
    assert_eq!(events[0].ip.as_deref(), Some("203.0.113.7"));
}
