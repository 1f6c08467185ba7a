//! Sign-then-encrypt token codec.
//!
//! A claim set is first signed as a compact HS256 JWS. The JWS is then sealed inside a compact JWE using direct key
//! agreement (`alg: dir`) and AES-256-GCM (`enc: A256GCM`):
//!
//! ```text
//! BASE64URL(protected header) . "" . BASE64URL(iv) . BASE64URL(ciphertext) . BASE64URL(tag)
//! ```
//!
//! The encrypted-key segment is always empty for `dir`. The ASCII of the encoded protected header is the AEAD
//! associated data, so tampering with any segment fails decryption.
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm,
    Nonce,
};
use chrono::{DateTime, Duration, Utc};
use gateway_common::Secret;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, trace};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{db_types::PermissionId, AuthApiError};

pub const MIN_SIGNING_SECRET_LEN: usize = 32;
pub const ENCRYPTION_KEY_LEN: usize = 32;
/// How far in the future an `iat` claim may be before the token is rejected.
pub const MAX_CLOCK_SKEW: Duration = Duration::seconds(60);

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const JWE_ALG: &str = "dir";
const JWE_ENC: &str = "A256GCM";

/// The claim set carried inside every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// The single permission this token may be redeemed for.
    pub command: PermissionId,
    /// The subject the token was issued to.
    pub actor: String,
    /// Unique token id, and the key of its nonce record.
    pub jti: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

impl AccessClaims {
    pub fn new(command: PermissionId, actor: String, jti: String, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self { command, actor, jti, iat: issued_at.timestamp(), exp: (issued_at + ttl).timestamp() }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid token key material. {0}")]
pub struct KeyMaterialError(pub String);

#[derive(Serialize, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cty: Option<String>,
}

/// Encodes and decodes tokens. Holds the two secrets; everything else is pure.
#[derive(Clone)]
pub struct TokenCodec {
    signing_secret: Secret<Vec<u8>>,
    encryption_key: Secret<[u8; ENCRYPTION_KEY_LEN]>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenCodec (HS256 + dir/A256GCM)")
    }
}

impl TokenCodec {
    pub fn new(
        signing_secret: Secret<Vec<u8>>,
        encryption_key: Secret<[u8; ENCRYPTION_KEY_LEN]>,
    ) -> Result<Self, KeyMaterialError> {
        if signing_secret.reveal().len() < MIN_SIGNING_SECRET_LEN {
            return Err(KeyMaterialError(format!(
                "The signing secret must be at least {MIN_SIGNING_SECRET_LEN} bytes long"
            )));
        }
        if encryption_key.reveal().iter().all(|b| *b == 0) {
            return Err(KeyMaterialError("The encryption key is all zeroes".to_string()));
        }
        Ok(Self { signing_secret, encryption_key })
    }

    /// Generates a codec with fresh random keys. Tokens issued with it die with the process.
    pub fn random() -> Self {
        let mut secret = vec![0u8; 64];
        OsRng.fill_bytes(&mut secret);
        let mut key = [0u8; ENCRYPTION_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self { signing_secret: Secret::new(secret), encryption_key: Secret::new(key) }
    }

    /// Signs `claims` with HS256, then encrypts the signed token with AES-256-GCM.
    pub fn encode(&self, claims: &AccessClaims) -> Result<String, AuthApiError> {
        let key = EncodingKey::from_secret(self.signing_secret.reveal());
        let jws = jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &key)
            .map_err(|e| AuthApiError::TokenInvalid(format!("Could not sign claims. {e}")))?;
        let header = JweHeader { alg: JWE_ALG.into(), enc: JWE_ENC.into(), cty: Some("JWT".into()) };
        let header = serde_json::to_vec(&header)
            .map_err(|e| AuthApiError::TokenInvalid(format!("Could not serialize JWE header. {e}")))?;
        let protected = b64_encode(&header);
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let sealed = self
            .cipher()?
            .encrypt(Nonce::from_slice(&iv), Payload { msg: jws.as_bytes(), aad: protected.as_bytes() })
            .map_err(|e| AuthApiError::TokenInvalid(format!("Encryption failed. {e}")))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        trace!("🔐️ Encoded token {}", claims.jti);
        Ok(format!("{protected}..{}.{}.{}", b64_encode(&iv), b64_encode(ciphertext), b64_encode(tag)))
    }

    /// Decrypts and verifies a token against the current time.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, AuthApiError> {
        self.decode_at(token, Utc::now())
    }

    /// Decrypts `token`, verifies its signature, and checks the temporal claims against `now`. Nothing from the token
    /// is returned unless every check passes.
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, AuthApiError> {
        let jws = self.decrypt(token)?;
        let key = DecodingKey::from_secret(self.signing_secret.reveal());
        let mut validation = Validation::new(Algorithm::HS256);
        // Temporal claims are checked below against the caller's clock
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        let claims = jsonwebtoken::decode::<AccessClaims>(&jws, &key, &validation)
            .map_err(|e| AuthApiError::TokenInvalid(format!("Signature verification failed. {e}")))?
            .claims;
        check_temporal_claims(&claims, now)?;
        Ok(claims)
    }

    fn decrypt(&self, token: &str) -> Result<String, AuthApiError> {
        let invalid = |msg: &str| AuthApiError::TokenInvalid(msg.to_string());
        let parts = token.split('.').collect::<Vec<&str>>();
        let [protected, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
            return Err(invalid("Token is not a compact JWE"));
        };
        if !encrypted_key.is_empty() {
            return Err(invalid("Direct encryption tokens must not carry an encrypted key"));
        }
        let header = b64_decode(protected).ok_or_else(|| invalid("Malformed JWE header"))?;
        let header: JweHeader = serde_json::from_slice(&header).map_err(|_| invalid("Malformed JWE header"))?;
        if header.alg != JWE_ALG || header.enc != JWE_ENC {
            debug!("🔐️ Rejecting token with alg={} enc={}", header.alg, header.enc);
            return Err(invalid("Unsupported JWE algorithm"));
        }
        let iv = b64_decode(iv).filter(|v| v.len() == IV_LEN).ok_or_else(|| invalid("Malformed IV"))?;
        let tag = b64_decode(tag).filter(|v| v.len() == TAG_LEN).ok_or_else(|| invalid("Malformed tag"))?;
        let mut sealed = b64_decode(ciphertext).ok_or_else(|| invalid("Malformed ciphertext"))?;
        sealed.extend_from_slice(&tag);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&iv), Payload { msg: &sealed, aad: protected.as_bytes() })
            .map_err(|_| invalid("Decryption failed"))?;
        String::from_utf8(plaintext).map_err(|_| invalid("Decrypted payload is not UTF-8"))
    }

    fn cipher(&self) -> Result<Aes256Gcm, AuthApiError> {
        Aes256Gcm::new_from_slice(self.encryption_key.reveal())
            .map_err(|e| AuthApiError::TokenInvalid(format!("Invalid encryption key. {e}")))
    }
}

fn check_temporal_claims(claims: &AccessClaims, now: DateTime<Utc>) -> Result<(), AuthApiError> {
    let now_ts = now.timestamp();
    if claims.exp <= now_ts {
        return Err(AuthApiError::TokenInvalid(format!("Token {} expired at {}", claims.jti, claims.exp)));
    }
    if claims.iat > now_ts + MAX_CLOCK_SKEW.num_seconds() {
        return Err(AuthApiError::TokenInvalid(format!("Token {} was issued in the future", claims.jti)));
    }
    if claims.iat > claims.exp {
        return Err(AuthApiError::TokenInvalid(format!("Token {} expires before it was issued", claims.jti)));
    }
    Ok(())
}

fn b64_encode(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

fn b64_decode(data: &str) -> Option<Vec<u8>> {
    base64::decode_config(data, base64::URL_SAFE_NO_PAD).ok()
}
