use std::{fmt::Debug, sync::Arc};

use chrono::{Duration, Utc};
use log::{debug, error, info};
use uuid::Uuid;

use super::{
    api_key_manager::ApiKeyManager,
    token_codec::{AccessClaims, TokenCodec},
};
use crate::{
    db::traits::{ApiKeyStore, NonceStore},
    db_types::{NonceRecord, PermissionId},
    AuthApiError,
};

/// Interactive action tokens are short-lived.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::minutes(5);
/// No token outlives a provisioning credential.
pub const MAX_TOKEN_TTL: Duration = Duration::days(30);

/// A request for a new single-use token.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub actor: String,
    pub command: PermissionId,
    pub ttl: Option<Duration>,
    /// The raw API key of the caller, if the caller presented one.
    pub api_key: Option<String>,
}

impl IssueRequest {
    pub fn new<S: Into<String>>(actor: S, command: PermissionId) -> Self {
        Self { actor: actor.into(), command, ttl: None, api_key: None }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// Issues encrypted, single-use tokens.
///
/// Every successful call persists exactly one nonce record. If that write fails, no token is returned: a token
/// without a nonce record could never be redeemed.
pub struct TokenIssuer<B> {
    db: B,
    codec: Arc<TokenCodec>,
}

impl<B: Debug> Debug for TokenIssuer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenIssuer ({:?})", self.db)
    }
}

impl<B> TokenIssuer<B> {
    pub fn new(db: B, codec: Arc<TokenCodec>) -> Self {
        Self { db, codec }
    }
}

impl<B> TokenIssuer<B>
where B: NonceStore + ApiKeyStore + Clone
{
    pub async fn issue(&self, request: IssueRequest) -> Result<String, AuthApiError> {
        let IssueRequest { actor, command, ttl, api_key } = request;
        if actor.trim().is_empty() {
            return Err(AuthApiError::InvalidRequest("'actor' must be provided".to_string()));
        }
        let ttl = ttl.unwrap_or(DEFAULT_TOKEN_TTL);
        if ttl <= Duration::zero() || ttl > MAX_TOKEN_TTL {
            return Err(AuthApiError::InvalidRequest(format!(
                "Token lifetime must be between 1 second and {} days",
                MAX_TOKEN_TTL.num_days()
            )));
        }
        if let Some(key) = api_key {
            ApiKeyManager::new(self.db.clone()).verify(&key, command).await?;
        }

        let jti = Uuid::new_v4().to_string();
        let claims = AccessClaims::new(command, actor, jti, Utc::now(), ttl);
        let record = NonceRecord::new(claims.jti.clone(), claims.expires_at());
        self.db.insert_nonce(&record).await.map_err(|e| {
            error!("🔐️ Could not persist nonce {}. No token will be issued. {e}", claims.jti);
            match e {
                AuthApiError::PersistenceError(_) => e,
                other => AuthApiError::PersistenceError(other.to_string()),
            }
        })?;
        debug!("🔐️ Nonce {} persisted, expires at {:?}", claims.jti, record.expires_at);
        let token = self.codec.encode(&claims)?;
        info!("🔐️ Issued token {} for permission {} to {}", claims.jti, claims.command, claims.actor);
        Ok(token)
    }
}

#[cfg(test)]
mod test {
    use chrono::{DateTime, Utc};
    use mockall::mock;

    use super::*;
    use crate::db_types::{ApiKey, NewApiKey, RoleId};

    mock! {
        pub Stores {}
        impl Clone for Stores {
            fn clone(&self) -> Self;
        }
        impl NonceStore for Stores {
            async fn insert_nonce(&self, record: &NonceRecord) -> Result<(), AuthApiError>;
            async fn consume_nonce(&self, jti: &str) -> Result<bool, AuthApiError>;
            async fn purge_expired_nonces(&self, now: DateTime<Utc>) -> Result<u64, AuthApiError>;
        }
        impl ApiKeyStore for Stores {
            async fn insert_api_key(&self, key: NewApiKey) -> Result<ApiKey, AuthApiError>;
            async fn fetch_api_key(&self, id: &str) -> Result<Option<ApiKey>, AuthApiError>;
            async fn api_key_grants_permission(&self, key_hash: &str, permission: PermissionId, now: DateTime<Utc>) -> Result<bool, AuthApiError>;
            async fn update_api_key_role(&self, id: &str, role_id: RoleId) -> Result<(), AuthApiError>;
            async fn revoke_api_key(&self, id: &str) -> Result<(), AuthApiError>;
        }
    }

    fn perm(id: i64) -> PermissionId {
        PermissionId::new(id).unwrap()
    }

    fn issuer(stores: MockStores) -> TokenIssuer<MockStores> {
        TokenIssuer::new(stores, Arc::new(TokenCodec::random()))
    }

    #[tokio::test]
    async fn issues_and_persists_one_nonce() {
        let mut stores = MockStores::new();
        stores.expect_insert_nonce().times(1).returning(|r| {
            assert!(r.expires_at.is_some());
            Ok(())
        });
        let issuer = issuer(stores);
        let token = issuer.issue(IssueRequest::new("svc-admin", perm(2))).await.unwrap();
        let claims = issuer.codec.decode(&token).unwrap();
        assert_eq!(claims.actor, "svc-admin");
        assert_eq!(claims.command, perm(2));
        assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_TTL.num_seconds());
    }

    #[tokio::test]
    async fn persistence_failure_returns_no_token() {
        let mut stores = MockStores::new();
        stores.expect_insert_nonce().times(1).returning(|_| Err(AuthApiError::PersistenceError("disk full".into())));
        let err = issuer(stores).issue(IssueRequest::new("svc-admin", perm(2))).await.unwrap_err();
        assert!(matches!(err, AuthApiError::PersistenceError(_)));
    }

    #[tokio::test]
    async fn rejects_empty_actor_and_bad_ttl() {
        let mut stores = MockStores::new();
        stores.expect_insert_nonce().never();
        let issuer = issuer(stores);
        let err = issuer.issue(IssueRequest::new("  ", perm(2))).await.unwrap_err();
        assert!(matches!(err, AuthApiError::InvalidRequest(_)));
        let err = issuer.issue(IssueRequest::new("a", perm(2)).with_ttl(Duration::zero())).await.unwrap_err();
        assert!(matches!(err, AuthApiError::InvalidRequest(_)));
        let err = issuer.issue(IssueRequest::new("a", perm(2)).with_ttl(Duration::days(31))).await.unwrap_err();
        assert!(matches!(err, AuthApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn api_key_must_grant_command() {
        let mut stores = MockStores::new();
        stores.expect_clone().returning(|| {
            let mut clone = MockStores::new();
            clone.expect_api_key_grants_permission().returning(|_, p, _| Ok(p.value() == 2));
            clone
        });
        stores.expect_insert_nonce().times(1).returning(|_| Ok(()));
        let issuer = issuer(stores);
        let ok = issuer.issue(IssueRequest::new("svc", perm(2)).with_api_key("raw-key")).await;
        assert!(ok.is_ok());
        let err = issuer.issue(IssueRequest::new("svc", perm(8)).with_api_key("raw-key")).await.unwrap_err();
        assert!(matches!(err, AuthApiError::ApiKeyInvalid));
    }
}
