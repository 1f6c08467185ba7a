use std::sync::Arc;

use chrono::{Duration, Utc};
use gateway_auth::{
    db_types::{AuthEventType, ClientContext, PermissionId, RoleId},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    ApiKeyManager,
    AuditLog,
    AuthApiError,
    AuthGatewayDatabase,
    IssueRequest,
    NonceStore,
    PermissionRegistry,
    SqliteDatabase,
    TokenCodec,
    TokenIssuer,
    TokenVerifier,
};
use log::*;

struct Harness {
    db: SqliteDatabase,
    codec: Arc<TokenCodec>,
    issuer: TokenIssuer<SqliteDatabase>,
    verifier: TokenVerifier<SqliteDatabase>,
}

async fn harness() -> Harness {
    let db = prepare_test_env(&random_db_path()).await;
    let codec = Arc::new(TokenCodec::random());
    let registry = Arc::new(PermissionRegistry::load(&db).await.expect("Error loading permissions"));
    let issuer = TokenIssuer::new(db.clone(), codec.clone());
    let verifier = TokenVerifier::new(db.clone(), codec.clone(), registry);
    Harness { db, codec, issuer, verifier }
}

fn perm(id: i64) -> PermissionId {
    PermissionId::new(id).unwrap()
}

fn client() -> ClientContext {
    ClientContext::new("192.168.1.10".parse().ok(), "a1b2c3".to_string())
}

#[tokio::test]
async fn issued_token_verifies_exactly_once() {
    let h = harness().await;
    let token = h.issuer.issue(IssueRequest::new("svc-admin", perm(2)).with_ttl(Duration::minutes(5))).await.unwrap();
    let subject = h.verifier.verify(&token, "POST", "/payment-methods/card", &client()).await.unwrap();
    assert_eq!(subject.actor, "svc-admin");
    assert_eq!(subject.command, perm(2));

    let err = h.verifier.verify(&token, "POST", "/payment-methods/card", &client()).await.unwrap_err();
    assert!(matches!(err, AuthApiError::TokenReplayed));

    let events = h.db.fetch_auth_events_for_jti(&subject.jti).await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].success);
    assert_eq!(events[0].reason, "success");
    assert_eq!(events[0].ip.as_deref(), Some("192.168.1.10"));
    assert_eq!(events[0].actor_id.as_deref(), Some("svc-admin"));
    assert_eq!(events[0].command, Some(perm(2)));
    assert!(!events[1].success);
    assert_eq!(events[1].reason, "token unknown or already redeemed");
}

#[tokio::test]
async fn permission_mismatch_consumes_the_token() {
    let h = harness().await;
    let token = h.issuer.issue(IssueRequest::new("svc-admin", perm(2))).await.unwrap();
    let err = h.verifier.verify(&token, "GET", "/customers/", &client()).await.unwrap_err();
    match err {
        AuthApiError::PermissionMismatch { resolved, presented } => {
            assert_eq!(resolved, perm(5));
            assert_eq!(presented, perm(2));
        },
        e => panic!("Expected PermissionMismatch, got {e:?}"),
    }
    // The token cannot be retried against the endpoint it was issued for
    let err = h.verifier.verify(&token, "POST", "/payment-methods/card", &client()).await.unwrap_err();
    assert!(matches!(err, AuthApiError::TokenReplayed));
}

#[tokio::test]
async fn path_normalization() {
    let h = harness().await;
    for path in ["/customers", "/customers/", "/customers/?x=1"] {
        let token = h.issuer.issue(IssueRequest::new("svc-admin", perm(5))).await.unwrap();
        let subject = h.verifier.verify(&token, "GET", path, &client()).await;
        assert!(subject.is_ok(), "{path} should have verified: {subject:?}");
    }
}

#[tokio::test]
async fn unknown_endpoint_does_not_consume() {
    let h = harness().await;
    let token = h.issuer.issue(IssueRequest::new("svc-admin", perm(5))).await.unwrap();
    let err = h.verifier.verify(&token, "GET", "/customers/42", &client()).await.unwrap_err();
    assert!(matches!(err, AuthApiError::UnknownEndpoint { .. }));
    assert!(h.verifier.verify(&token, "GET", "/customers", &client()).await.is_ok());
}

#[tokio::test]
async fn expired_token_is_invalid_while_nonce_lives() {
    let h = harness().await;
    let token = h.issuer.issue(IssueRequest::new("svc-admin", perm(5)).with_ttl(Duration::minutes(1))).await.unwrap();
    let claims = h.codec.decode(&token).unwrap();
    let later = Utc::now() + Duration::minutes(2);
    let err = h.verifier.verify_at(&token, "GET", "/customers", &client(), later).await.unwrap_err();
    assert!(matches!(err, AuthApiError::TokenInvalid(_)));
    assert!(h.db.nonce_exists(&claims.jti).await.unwrap());

    let purged = h.db.purge_expired_nonces(later).await.unwrap();
    assert_eq!(purged, 1);
    assert!(!h.db.nonce_exists(&claims.jti).await.unwrap());
}

#[tokio::test]
async fn purge_keeps_live_nonces() {
    let h = harness().await;
    let short = h.issuer.issue(IssueRequest::new("a", perm(1)).with_ttl(Duration::minutes(1))).await.unwrap();
    let long = h.issuer.issue(IssueRequest::new("b", perm(1)).with_ttl(Duration::days(1))).await.unwrap();
    let purged = h.db.purge_expired_nonces(Utc::now() + Duration::hours(1)).await.unwrap();
    assert_eq!(purged, 1);
    let short = h.codec.decode(&short).unwrap();
    let long = h.codec.decode(&long).unwrap();
    assert!(!h.db.nonce_exists(&short.jti).await.unwrap());
    assert!(h.db.nonce_exists(&long.jti).await.unwrap());
}

#[tokio::test]
async fn tampered_token_is_invalid_and_audited() {
    let h = harness().await;
    let token = h.issuer.issue(IssueRequest::new("svc-admin", perm(5))).await.unwrap();
    let mut bytes = token.into_bytes();
    let i = bytes.len() - 3;
    bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(bytes).unwrap();
    let err = h.verifier.verify(&tampered, "GET", "/customers", &client()).await.unwrap_err();
    assert!(matches!(err, AuthApiError::TokenInvalid(_)));

    let events = h.db.fetch_recent_auth_events(1).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
    assert_eq!(events[0].reason, "decrypt/signature failure");
    assert!(events[0].jti.is_none());
}

#[tokio::test]
async fn concurrent_redemption() {
    let h = harness().await;
    for _ in 0..10 {
        let token = h.issuer.issue(IssueRequest::new("svc-admin", perm(7))).await.unwrap();
        let ctx = client();
        let (a, b) = tokio::join!(
            h.verifier.verify(&token, "POST", "/transactions/charge", &ctx),
            h.verifier.verify(&token, "POST", "/transactions/charge", &ctx),
        );
        let replays = [&a, &b].iter().filter(|r| matches!(r, Err(AuthApiError::TokenReplayed))).count();
        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(replays, 1, "{a:?} {b:?}");
        assert_eq!(successes, 1, "{a:?} {b:?}");
    }
}

#[tokio::test]
async fn concurrent_redemption_across_tasks() {
    let h = harness().await;
    let token = h.issuer.issue(IssueRequest::new("svc-admin", perm(7))).await.unwrap();
    let verifier = Arc::new(h.verifier);
    let handles = (0..8)
        .map(|_| {
            let verifier = verifier.clone();
            let token = token.clone();
            tokio::spawn(async move { verifier.verify(&token, "POST", "/transactions/charge", &client()).await })
        })
        .collect::<Vec<_>>();
    let results = futures_util::future::join_all(handles).await;
    let successes = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
    let replays = results.iter().filter(|r| matches!(r, Ok(Err(AuthApiError::TokenReplayed)))).count();
    info!("🚀️ {successes} successes, {replays} replays");
    assert_eq!(successes, 1);
    assert_eq!(replays, 7);
}

#[tokio::test]
async fn issuance_with_api_key() {
    let h = harness().await;
    let manager = ApiKeyManager::new(h.db.clone());
    let key = manager.generate("payments-service", RoleId(2), Some(Duration::days(1))).await.unwrap();
    let raw = key.raw_key.reveal().clone();

    let token = h.issuer.issue(IssueRequest::new("svc", perm(7)).with_api_key(raw.as_str())).await.unwrap();
    assert!(h.verifier.verify(&token, "POST", "/transactions/charge", &client()).await.is_ok());

    // The service role does not hold the admin permissions
    let err = h.issuer.issue(IssueRequest::new("svc", perm(8)).with_api_key(raw.as_str())).await.unwrap_err();
    assert!(matches!(err, AuthApiError::ApiKeyInvalid));

    manager.revoke(&key.record.id).await.unwrap();
    let err = h.issuer.issue(IssueRequest::new("svc", perm(7)).with_api_key(raw.as_str())).await.unwrap_err();
    assert!(matches!(err, AuthApiError::ApiKeyInvalid));
}

#[tokio::test]
async fn missing_credential_is_recorded() {
    let h = harness().await;
    let err = h.verifier.reject_missing_credential(&client()).await;
    assert!(matches!(err, AuthApiError::MissingCredential));
    let events = h.db.fetch_recent_auth_events(5).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, AuthEventType::MissingCredential);
    assert_eq!(events[0].fingerprint, "a1b2c3");
}

#[tokio::test]
async fn closed_store_refuses_work() {
    let h = harness().await;
    let token = h.issuer.issue(IssueRequest::new("svc-admin", perm(5))).await.unwrap();
    let mut db = h.db.clone();
    assert!(db.url().starts_with("sqlite://"));
    db.close().await;

    let err = h.issuer.issue(IssueRequest::new("svc-admin", perm(5))).await.unwrap_err();
    assert!(matches!(err, AuthApiError::PersistenceError(_)));
    let err = h.verifier.verify(&token, "GET", "/customers", &client()).await.unwrap_err();
    assert!(matches!(err, AuthApiError::PersistenceError(_)));
}
