use std::{fmt::Display, net::IpAddr, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------     PermissionId      ---------------------------------------------------------
/// The canonical identifier for a single `(method, path)` action. Tokens carry exactly one of these in their `command`
/// claim, and API key roles are granted sets of them.
///
/// Permission ids are always integers on the wire. A claim set carrying a string `command` fails to deserialize, which
/// the token codec reports as an invalid token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[serde(try_from = "i64", into = "i64")]
#[sqlx(transparent)]
pub struct PermissionId(i64);

impl PermissionId {
    pub fn new(id: i64) -> Result<Self, ConversionError> {
        if id > 0 {
            Ok(Self(id))
        } else {
            Err(ConversionError(format!("Permission ids must be positive. Got {id}")))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for PermissionId {
    type Error = ConversionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PermissionId> for i64 {
    fn from(id: PermissionId) -> Self {
        id.0
    }
}

impl FromStr for PermissionId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.parse::<i64>().map_err(|e| ConversionError(format!("Invalid permission id '{s}': {e}")))?;
        Self::new(id)
    }
}

impl Display for PermissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------      Permission       ---------------------------------------------------------
/// A row of the static permission table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub method: String,
    pub path: String,
}

impl Permission {
    pub fn new<M: Into<String>, P: Into<String>>(id: PermissionId, method: M, path: P) -> Self {
        Self { id, method: method.into(), path: path.into() }
    }
}

//--------------------------------------         Nonce         ---------------------------------------------------------
/// "A token with this jti has been issued and not yet redeemed."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceRecord {
    pub jti: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NonceRecord {
    pub fn new<S: Into<String>>(jti: S, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { jti: jti.into(), created_at: Utc::now(), expires_at }
    }
}

//--------------------------------------        ApiKey         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct RoleId(pub i64);

impl Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored API key. Only the one-way hash of the key material is ever kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub name: String,
    pub role_id: RoleId,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApiKey {
    pub id: String,
    pub key_hash: String,
    pub name: String,
    pub role_id: RoleId,
    pub expires_at: Option<DateTime<Utc>>,
}

//--------------------------------------       Audit log       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthEventType {
    /// A bearer token was presented on a protected request.
    Verification,
    /// A protected request arrived without a usable bearer credential.
    MissingCredential,
}

impl AuthEventType {
    pub fn code(&self) -> i64 {
        match self {
            Self::Verification => 1,
            Self::MissingCredential => 2,
        }
    }
}

impl TryFrom<i64> for AuthEventType {
    type Error = ConversionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Verification),
            2 => Ok(Self::MissingCredential),
            v => Err(ConversionError(format!("Invalid auth event type: {v}"))),
        }
    }
}

/// Request metadata captured for the audit trail. Not used for authorization decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub ip: Option<IpAddr>,
    pub fingerprint: String,
}

impl ClientContext {
    pub fn new(ip: Option<IpAddr>, fingerprint: String) -> Self {
        Self { ip, fingerprint }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthEvent {
    pub event_type: AuthEventType,
    pub success: bool,
    pub reason: String,
    pub ip: Option<IpAddr>,
    pub fingerprint: String,
    pub actor_id: Option<String>,
}

impl NewAuthEvent {
    pub fn new<S: Into<String>>(event_type: AuthEventType, success: bool, reason: S, context: &ClientContext) -> Self {
        Self {
            event_type,
            success,
            reason: reason.into(),
            ip: context.ip,
            fingerprint: context.fingerprint.clone(),
            actor_id: None,
        }
    }

    pub fn with_actor<S: Into<String>>(mut self, actor: S) -> Self {
        self.actor_id = Some(actor.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthDetail {
    pub jti: String,
    pub command: PermissionId,
    pub masked_subject: String,
}

/// An audit event as read back from the store, joined with its detail record if one was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthEvent {
    pub id: String,
    pub event_type: AuthEventType,
    pub success: bool,
    pub reason: String,
    pub ip: Option<String>,
    pub fingerprint: String,
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub jti: Option<String>,
    pub command: Option<PermissionId>,
    pub masked_subject: Option<String>,
}
