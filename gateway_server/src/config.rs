use std::{env, io::Write, time::Duration};

use gateway_auth::{TokenCodec, ENCRYPTION_KEY_LEN, MIN_SIGNING_SECRET_LEN};
use gateway_common::{parse_boolean_flag, parse_number_or_default, Secret};
use log::*;
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use serde_json::json;
use tempfile::NamedTempFile;

use crate::errors::ServerError;

const DEFAULT_PGW_HOST: &str = "127.0.0.1";
const DEFAULT_PGW_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/pgw_store.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_NONCE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub auth: AuthConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// If true, callers of `/auth/tokens` must present an API key whose role grants the requested command.
    /// **DANGER** when false, anyone who can reach the server can mint tokens.
    pub require_api_key: bool,
    /// How often expired, never-redeemed nonces are purged.
    pub nonce_purge_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PGW_HOST.to_string(),
            port: DEFAULT_PGW_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            auth: AuthConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            require_api_key: true,
            nonce_purge_interval: DEFAULT_NONCE_PURGE_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env::var("PGW_HOST").ok().unwrap_or_else(|| DEFAULT_PGW_HOST.into());
        let port = env::var("PGW_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for PGW_PORT. {e} Using the default, {DEFAULT_PGW_PORT}, instead."
                    );
                    DEFAULT_PGW_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PGW_PORT);
        let database_url = env::var("PGW_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ PGW_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = parse_number_or_default(env::var("PGW_DB_MAX_CONNECTIONS").ok(), DEFAULT_MAX_CONNECTIONS);
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the token keys from environment variables. {e}. Reverting to random keys for this \
                 session."
            );
            AuthConfig::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("PGW_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("PGW_USE_FORWARDED").ok(), false);
        let require_api_key = parse_boolean_flag(env::var("PGW_REQUIRE_API_KEY").ok(), true);
        if !require_api_key {
            warn!("🚨️ PGW_REQUIRE_API_KEY is disabled. Anyone who can reach /auth/tokens can mint tokens.");
        }
        let purge_secs = parse_number_or_default(
            env::var("PGW_NONCE_PURGE_INTERVAL").ok(),
            DEFAULT_NONCE_PURGE_INTERVAL.as_secs(),
        );
        let nonce_purge_interval = Duration::from_secs(purge_secs.max(1));
        Self {
            host,
            port,
            database_url,
            max_connections,
            auth,
            use_x_forwarded_for,
            use_forwarded,
            require_api_key,
            nonce_purge_interval,
        }
    }
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The HS256 secret used to sign the inner token. At least 32 bytes.
    pub jwt_secret: Secret<Vec<u8>>,
    /// The AES-256-GCM key used to encrypt the signed token.
    pub encryption_key: Secret<[u8; ENCRYPTION_KEY_LEN]>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut tmpfile = NamedTempFile::new().ok().and_then(|f| f.keep().ok());
        warn!(
            "🚨️🚨️🚨️ The token keys have not been set. I'm using random values for this session. DO NOT operate on \
             production like this, since every outstanding token will be lost on restart. 🚨️🚨️🚨️"
        );
        let mut secret = vec![0u8; 64];
        OsRng.fill_bytes(&mut secret);
        let mut key = [0u8; ENCRYPTION_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        let jwt_secret = Secret::new(base64::encode_config(&secret, base64::URL_SAFE_NO_PAD).into_bytes());
        match &mut tmpfile {
            Some((f, p)) => {
                let key_data = json!({
                    "jwt_secret": String::from_utf8_lossy(jwt_secret.reveal()),
                    "jwt_encryption_key": { "kty": "oct", "k": base64::encode_config(key, base64::URL_SAFE_NO_PAD) },
                })
                .to_string();
                match writeln!(f, "{key_data}") {
                    Ok(()) => warn!(
                        "🚨️🚨️🚨️ The token keys for this session were written to {}. If this is a production \
                         instance, you are doing it wrong! Set the PGW_JWT_SECRET and PGW_JWT_ENCRYPTION_KEY \
                         environment variables instead. 🚨️🚨️🚨️",
                        p.to_str().unwrap_or("???")
                    ),
                    Err(e) => warn!("🪛️ Could not write the token keys to the temporary file. {e}"),
                }
            },
            None => {
                warn!("🪛️ Could not create a temporary file to store the token keys.");
            },
        }
        Self { jwt_secret, encryption_key: Secret::new(key) }
    }
}

#[derive(Deserialize)]
struct OctetJwk {
    kty: String,
    k: String,
}

/// Parses an AES-256 key given either as a JWK (`{"kty":"oct","k":"..."}`) or as bare base64url.
pub fn parse_encryption_key(value: &str) -> Result<[u8; ENCRYPTION_KEY_LEN], ServerError> {
    let value = value.trim();
    let encoded = if value.starts_with('{') {
        let jwk = serde_json::from_str::<OctetJwk>(value)
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid JWK in PGW_JWT_ENCRYPTION_KEY. {e}")))?;
        if jwk.kty != "oct" {
            return Err(ServerError::ConfigurationError(format!(
                "PGW_JWT_ENCRYPTION_KEY must be a symmetric ('oct') key, not '{}'",
                jwk.kty
            )));
        }
        jwk.k
    } else {
        value.to_string()
    };
    let bytes = base64::decode_config(encoded.trim_end_matches('='), base64::URL_SAFE_NO_PAD).map_err(|e| {
        ServerError::ConfigurationError(format!("PGW_JWT_ENCRYPTION_KEY is not valid base64url. {e}"))
    })?;
    <[u8; ENCRYPTION_KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        ServerError::ConfigurationError(format!(
            "PGW_JWT_ENCRYPTION_KEY must be {ENCRYPTION_KEY_LEN} bytes long, but it is {} bytes",
            bytes.len()
        ))
    })
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret = env::var("PGW_JWT_SECRET")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [PGW_JWT_SECRET]")))?;
        let key = env::var("PGW_JWT_ENCRYPTION_KEY")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [PGW_JWT_ENCRYPTION_KEY]")))?;
        Self::from_values(&secret, &key)
    }

    pub fn from_values(secret: &str, encryption_key: &str) -> Result<Self, ServerError> {
        if secret.len() < MIN_SIGNING_SECRET_LEN {
            return Err(ServerError::ConfigurationError(format!(
                "PGW_JWT_SECRET must be at least {MIN_SIGNING_SECRET_LEN} bytes long"
            )));
        }
        let encryption_key = parse_encryption_key(encryption_key)?;
        Ok(Self { jwt_secret: Secret::new(secret.as_bytes().to_vec()), encryption_key: Secret::new(encryption_key) })
    }

    pub fn codec(&self) -> Result<TokenCodec, ServerError> {
        TokenCodec::new(self.jwt_secret.clone(), self.encryption_key.clone())
            .map_err(|e| ServerError::ConfigurationError(e.to_string()))
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
    pub require_api_key: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { use_x_forwarded_for: false, use_forwarded: false, require_api_key: true }
    }
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
            require_api_key: config.require_api_key,
        }
    }
}
