use std::sync::Arc;

use actix_web::{http::StatusCode, test, test::TestRequest, App};
use gateway_auth::{
    db_types::RoleId,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    ApiKeyManager,
    PermissionRegistry,
    SqliteDatabase,
    TokenCodec,
};
use log::debug;
use serde_json::json;

use crate::{config::ServerOptions, middleware::BearerAuthFactory, server::configure_app};

pub struct TestState {
    pub db: SqliteDatabase,
    pub codec: Arc<TokenCodec>,
    pub registry: Arc<PermissionRegistry>,
    pub options: ServerOptions,
}

/// A fresh, migrated database with random token keys.
pub async fn test_state() -> TestState {
    let db = prepare_test_env(&random_db_path()).await;
    let registry = PermissionRegistry::load(&db).await.expect("Error loading permissions");
    TestState {
        db,
        codec: Arc::new(TokenCodec::random()),
        registry: Arc::new(registry),
        options: ServerOptions::default(),
    }
}

/// Creates an API key directly in the store and returns the raw key.
pub async fn api_key_for_role(state: &TestState, role_id: i64) -> String {
    let key = ApiKeyManager::new(state.db.clone())
        .generate("test key", RoleId(role_id), None)
        .await
        .expect("Error creating API key");
    key.raw_key.reveal().clone()
}

pub async fn send(state: &TestState, req: TestRequest) -> (StatusCode, String) {
    let app = App::new().wrap(BearerAuthFactory::<SqliteDatabase>::new()).configure(|cfg| {
        configure_app(cfg, state.db.clone(), state.codec.clone(), state.registry.clone(), state.options)
    });
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&test::read_body(res).await).into_owned();
    (status, body)
}

/// Requests a token through `/auth/tokens` and returns it. Panics unless the server issues one.
pub async fn issue_token(state: &TestState, api_key: &str, actor: &str, command: i64) -> String {
    let req = TestRequest::post()
        .uri("/auth/tokens")
        .insert_header(("Authorization", format!("Bearer {api_key}")))
        .set_json(json!({ "command": command, "actor": actor }));
    let (status, body) = send(state, req).await;
    assert_eq!(status, StatusCode::CREATED, "token request failed: {body}");
    let body: serde_json::Value = serde_json::from_str(&body).expect("Response was not JSON");
    body["encryptedJWT"].as_str().expect("No token in response").to_string()
}

pub fn with_bearer(req: TestRequest, token: &str) -> TestRequest {
    req.insert_header(("Authorization", format!("Bearer {token}")))
}
