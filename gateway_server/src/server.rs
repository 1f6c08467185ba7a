use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, error::JsonPayloadError, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use gateway_auth::{
    ApiKeyManager,
    AuthGatewayDatabase,
    PermissionRegistry,
    SqliteDatabase,
    TokenCodec,
    TokenIssuer,
    TokenVerifier,
};
use log::*;

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    middleware::BearerAuthFactory,
    nonce_purge_worker::start_nonce_purge_worker,
    routes::{health, ping, CreateApiKeyRoute, IssueTokenRoute, RevokeKeyRoute, UpdateKeyRoleRoute},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let mut db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🗃️ Connected to {}", db.url());
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let registry = PermissionRegistry::load(&db).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if registry.is_empty() {
        warn!("💻️ The permission table is empty. Every protected request will be rejected.");
    }
    let codec = config.auth.codec()?;
    let purge_worker = start_nonce_purge_worker(db.clone(), config.nonce_purge_interval);
    let srv = create_server_instance(config, db.clone(), codec, registry)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    purge_worker.abort();
    db.close().await;
    info!("🗃️ Database connections closed");
    result
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    codec: TokenCodec,
    registry: PermissionRegistry,
) -> Result<Server, ServerError> {
    let codec = Arc::new(codec);
    let registry = Arc::new(registry);
    let options = ServerOptions::from_config(&config);
    let srv = HttpServer::new(move || {
        let app = App::new()
            .wrap(BearerAuthFactory::<SqliteDatabase>::new())
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("pgw::access_log"));
        app.configure(|cfg| configure_app(cfg, db.clone(), codec.clone(), registry.clone(), options))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers app data and routes. The bearer middleware, with the same backend type, must be wrapped around the app
/// separately.
pub fn configure_app<B: AuthGatewayDatabase + 'static>(
    cfg: &mut web::ServiceConfig,
    db: B,
    codec: Arc<TokenCodec>,
    registry: Arc<PermissionRegistry>,
    options: ServerOptions,
) {
    let issuer = TokenIssuer::new(db.clone(), codec.clone());
    let verifier = TokenVerifier::new(db.clone(), codec, registry);
    let keys = ApiKeyManager::new(db);
    let json_config = web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req| {
        debug!("💻️ Rejected request body. {err}");
        ServerError::InvalidRequestBody(err.to_string()).into()
    });
    cfg.app_data(json_config)
        .app_data(web::Data::new(options))
        .app_data(web::Data::new(issuer))
        .app_data(web::Data::new(verifier))
        .app_data(web::Data::new(keys))
        .service(health)
        .service(ping)
        .service(IssueTokenRoute::<B>::new())
        .service(CreateApiKeyRoute::<B>::new())
        .service(UpdateKeyRoleRoute::<B>::new())
        .service(RevokeKeyRoute::<B>::new());
}
