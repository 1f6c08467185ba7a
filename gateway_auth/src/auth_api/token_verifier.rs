use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;

use super::{
    permission_registry::{normalize_path, PermissionRegistry},
    token_codec::{AccessClaims, TokenCodec},
};
use crate::{
    db::traits::{AuditLog, NonceStore},
    db_types::{AuthEventType, ClientContext, NewAuthDetail, NewAuthEvent, PermissionId},
    helpers::mask_subject,
    AuthApiError,
};

/// The identity a successfully redeemed token was issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSubject {
    pub actor: String,
    pub jti: String,
    pub command: PermissionId,
}

/// Redeems single-use tokens presented on protected requests.
///
/// A token is checked in a fixed order: decode, resolve the requested action, consume the nonce, compare the
/// permission. Once the nonce has been consumed the token is spent, whatever the outcome of the remaining steps.
///
/// Every outcome is written to the audit log before `verify` returns. Audit failures are logged and otherwise ignored;
/// they never change the result.
pub struct TokenVerifier<B> {
    db: B,
    codec: Arc<TokenCodec>,
    registry: Arc<PermissionRegistry>,
}

impl<B: Debug> Debug for TokenVerifier<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenVerifier ({:?}, {} permissions)", self.db, self.registry.len())
    }
}

impl<B> TokenVerifier<B> {
    pub fn new(db: B, codec: Arc<TokenCodec>, registry: Arc<PermissionRegistry>) -> Self {
        Self { db, codec, registry }
    }
}

impl<B> TokenVerifier<B>
where B: NonceStore + AuditLog
{
    pub async fn verify(
        &self,
        ciphertext: &str,
        method: &str,
        path: &str,
        context: &ClientContext,
    ) -> Result<VerifiedSubject, AuthApiError> {
        self.verify_at(ciphertext, method, path, context, Utc::now()).await
    }

    /// As [`Self::verify`], with the temporal checks evaluated at `now`.
    pub async fn verify_at(
        &self,
        ciphertext: &str,
        method: &str,
        path: &str,
        context: &ClientContext,
        now: DateTime<Utc>,
    ) -> Result<VerifiedSubject, AuthApiError> {
        let claims = match self.codec.decode_at(ciphertext, now) {
            Ok(claims) => claims,
            Err(e) => {
                warn!("🔐️ Rejected token for {method} {path}. {e}");
                let event = NewAuthEvent::new(AuthEventType::Verification, false, e.audit_reason(), context);
                self.audit(event, None).await;
                return Err(e);
            },
        };
        match self.redeem(&claims, method, path).await {
            Ok(subject) => {
                info!("🔐️ Token {} redeemed by {} for {method} {path}", claims.jti, claims.actor);
                let event = NewAuthEvent::new(AuthEventType::Verification, true, "success", context)
                    .with_actor(claims.actor.as_str());
                self.audit(event, Some(detail_for(&claims))).await;
                Ok(subject)
            },
            Err(e) => {
                warn!("🔐️ Rejected token {} for {method} {path}. {e}", claims.jti);
                let event = NewAuthEvent::new(AuthEventType::Verification, false, e.audit_reason(), context)
                    .with_actor(claims.actor.as_str());
                self.audit(event, Some(detail_for(&claims))).await;
                Err(e)
            },
        }
    }

    /// Records a request that reached a protected route without any bearer credential.
    pub async fn reject_missing_credential(&self, context: &ClientContext) -> AuthApiError {
        let e = AuthApiError::MissingCredential;
        let event = NewAuthEvent::new(AuthEventType::MissingCredential, false, e.audit_reason(), context);
        self.audit(event, None).await;
        e
    }

    async fn redeem(&self, claims: &AccessClaims, method: &str, path: &str) -> Result<VerifiedSubject, AuthApiError> {
        let resolved = self.registry.resolve(method, path).ok_or_else(|| AuthApiError::UnknownEndpoint {
            method: method.to_ascii_uppercase(),
            path: normalize_path(path).to_string(),
        })?;
        if !self.db.consume_nonce(&claims.jti).await? {
            return Err(AuthApiError::TokenReplayed);
        }
        trace!("🔐️ Nonce {} consumed", claims.jti);
        if resolved != claims.command {
            return Err(AuthApiError::PermissionMismatch { resolved, presented: claims.command });
        }
        Ok(VerifiedSubject { actor: claims.actor.clone(), jti: claims.jti.clone(), command: claims.command })
    }

    async fn audit(&self, event: NewAuthEvent, detail: Option<NewAuthDetail>) {
        match self.db.record_auth_event(event, detail).await {
            Ok(id) => trace!("🔐️ Auth event {id} recorded"),
            Err(e) => error!("🔐️ Could not write auth event to the audit log. {e}"),
        }
    }
}

fn detail_for(claims: &AccessClaims) -> NewAuthDetail {
    NewAuthDetail {
        jti: claims.jti.clone(),
        command: claims.command,
        masked_subject: mask_subject(&claims.actor),
    }
}
