use std::fmt::Display;

use chrono::{DateTime, Utc};
use gateway_auth::db_types::{PermissionId, RoleId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

/// Body of `POST /auth/tokens`. `expirationTime` is in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTokenRequest {
    pub command: PermissionId,
    pub actor: String,
    #[serde(rename = "expirationTime", default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTokenResponse {
    pub message: String,
    #[serde(rename = "encryptedJWT")]
    pub encrypted_jwt: String,
}

/// Body of `POST /admin/keys`. `expirationTime` is in minutes; zero creates a key that never expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(rename = "roleID")]
    pub role_id: RoleId,
    #[serde(rename = "expirationTime", default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiKeyResponse {
    pub message: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "keyID")]
    pub key_id: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateKeyRoleRequest {
    #[serde(rename = "keyID")]
    pub key_id: String,
    #[serde(rename = "roleID")]
    pub role_id: RoleId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeKeyRequest {
    #[serde(rename = "keyID")]
    pub key_id: String,
}
