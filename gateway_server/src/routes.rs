//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every route except `/health` and `/auth/tokens` sits behind the bearer middleware, which has already redeemed a
//! token for the exact method and path by the time the handler runs. Handlers that need to know who called them take
//! an [`AuthenticatedSubject`].
//!
//! Handlers must not block the worker thread. Anything that touches the database is async.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use chrono::Duration;
use gateway_auth::{
    ApiKeyManager,
    ApiKeyStore,
    AuthApiError,
    IssueRequest,
    NonceStore,
    TokenIssuer,
    DEFAULT_API_KEY_TTL,
};
use log::*;
use serde_json::json;

use crate::{
    config::ServerOptions,
    data_objects::{
        CreateApiKeyRequest,
        CreateApiKeyResponse,
        IssueTokenRequest,
        IssueTokenResponse,
        JsonResponse,
        RevokeKeyRequest,
        UpdateKeyRoleRequest,
    },
    errors::ServerError,
    helpers::bearer_credential,
    middleware::AuthenticatedSubject,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:path),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Tokens  ----------------------------------------------------
route!(issue_token => Post "/auth/tokens" impl NonceStore, ApiKeyStore, Clone);
/// Route handler for token issuance
///
/// The body names the `command` (permission id) the token will be good for, and the `actor` it is issued to. An
/// optional `expirationTime` sets the token lifetime in minutes.
///
/// Callers authenticate with an API key in the `Authorization: Bearer` header. The key's role must hold `command`.
/// When `PGW_REQUIRE_API_KEY` is disabled, the key is optional, but is still checked if one is supplied.
///
/// The token can be redeemed exactly once, against the route `command` maps to.
pub async fn issue_token<B>(
    req: HttpRequest,
    body: web::Json<IssueTokenRequest>,
    issuer: web::Data<TokenIssuer<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: NonceStore + ApiKeyStore + Clone,
{
    let IssueTokenRequest { command, actor, expiration_time } = body.into_inner();
    debug!("💻️ Token requested for permission {command}");
    let api_key = bearer_credential(&req);
    if api_key.is_none() && options.require_api_key {
        debug!("💻️ Token request without an API key rejected");
        return Err(AuthApiError::ApiKeyInvalid.into());
    }
    let mut request = IssueRequest::new(actor, command);
    if let Some(minutes) = expiration_time {
        request = request.with_ttl(lifetime_in_minutes(minutes)?);
    }
    if let Some(key) = api_key {
        request = request.with_api_key(key);
    }
    let token = issuer.issue(request).await?;
    let response = IssueTokenResponse { message: "Token issued".to_string(), encrypted_jwt: token };
    Ok(HttpResponse::Created().json(response))
}

//----------------------------------------------   Ping  ----------------------------------------------------
/// A protected no-op. Useful for checking that a token and its permission mapping work end to end.
#[get("/ping")]
pub async fn ping(subject: AuthenticatedSubject) -> impl Responder {
    trace!("💻️ Ping from {}", subject.actor());
    HttpResponse::Ok().json(json!({ "message": "pong", "actor": subject.actor() }))
}

//----------------------------------------------   API keys  ----------------------------------------------------
route!(create_api_key => Post "/admin/keys" impl ApiKeyStore);
/// Route handler for creating an API key
///
/// The raw key is in the response body, and this is the only time it is ever available. Only its hash is stored.
pub async fn create_api_key<B: ApiKeyStore>(
    subject: AuthenticatedSubject,
    body: web::Json<CreateApiKeyRequest>,
    api: web::Data<ApiKeyManager<B>>,
) -> Result<HttpResponse, ServerError> {
    let CreateApiKeyRequest { name, role_id, expiration_time } = body.into_inner();
    if name.trim().is_empty() {
        return Err(AuthApiError::InvalidRequest("'name' must be provided".to_string()).into());
    }
    let ttl = match expiration_time {
        None => Some(DEFAULT_API_KEY_TTL),
        Some(0) => None,
        Some(minutes) => Some(lifetime_in_minutes(minutes)?),
    };
    info!("💻️ {} is creating API key '{name}' for role {role_id}", subject.actor());
    let key = api.generate(&name, role_id, ttl).await?;
    let response = CreateApiKeyResponse {
        message: "API key created. Store it now; it cannot be retrieved again.".to_string(),
        api_key: key.raw_key.reveal().clone(),
        key_id: key.record.id.clone(),
        expires_at: key.record.expires_at,
    };
    Ok(HttpResponse::Created().json(response))
}

route!(update_key_role => Post "/admin/keys/role" impl ApiKeyStore);
/// Route handler for moving an API key to a different role. The new role applies to the key's next token request.
pub async fn update_key_role<B: ApiKeyStore>(
    subject: AuthenticatedSubject,
    body: web::Json<UpdateKeyRoleRequest>,
    api: web::Data<ApiKeyManager<B>>,
) -> Result<HttpResponse, ServerError> {
    let UpdateKeyRoleRequest { key_id, role_id } = body.into_inner();
    info!("💻️ {} is moving API key {key_id} to role {role_id}", subject.actor());
    api.update_role(&key_id, role_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("API key {key_id} now has role {role_id}"))))
}

route!(revoke_key => Post "/admin/keys/revoke" impl ApiKeyStore);
/// Route handler for revoking an API key. The record is kept, but the key can no longer request tokens.
pub async fn revoke_key<B: ApiKeyStore>(
    subject: AuthenticatedSubject,
    body: web::Json<RevokeKeyRequest>,
    api: web::Data<ApiKeyManager<B>>,
) -> Result<HttpResponse, ServerError> {
    let RevokeKeyRequest { key_id } = body.into_inner();
    info!("💻️ {} is revoking API key {key_id}", subject.actor());
    api.revoke(&key_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("API key {key_id} revoked"))))
}

/// `expirationTime` is caller-supplied, so anything `Duration` cannot represent is a bad request.
fn lifetime_in_minutes(minutes: i64) -> Result<Duration, ServerError> {
    Duration::try_minutes(minutes).ok_or_else(|| {
        AuthApiError::InvalidRequest(format!("'expirationTime' of {minutes} minutes is out of range")).into()
    })
}
