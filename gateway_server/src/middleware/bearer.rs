//! Bearer token middleware.
//!
//! Every request whose path is not in [`UNPROTECTED_PATHS`] must carry an `Authorization: Bearer <token>` header with
//! a single-use token for exactly the method and path being requested. The token is redeemed by the
//! [`TokenVerifier`] registered as app data, and the redeemed subject is stored in the request extensions, where
//! handlers can pick it up with the [`AuthenticatedSubject`] extractor.
//!
//! Rejections never say why. The reason is in the server log and the audit trail.

use std::{
    future::{ready, Ready},
    marker::PhantomData,
    rc::Rc,
};

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web,
    Error,
    FromRequest,
    HttpMessage,
    HttpRequest,
    ResponseError,
};
use futures::future::LocalBoxFuture;
use gateway_auth::{normalize_path, AuditLog, AuthApiError, NonceStore, TokenVerifier, VerifiedSubject};
use log::{error, trace};

use crate::{
    config::ServerOptions,
    errors::ServerError,
    helpers::{bearer_credential, client_context},
};

/// Paths that are reachable without a token.
pub const UNPROTECTED_PATHS: [&str; 2] = ["/health", "/auth/tokens"];

/// The subject of the token that authorized the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject(pub VerifiedSubject);

impl AuthenticatedSubject {
    pub fn actor(&self) -> &str {
        self.0.actor.as_str()
    }
}

impl FromRequest for AuthenticatedSubject {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let subject = req.extensions().get::<AuthenticatedSubject>().cloned();
        ready(subject.ok_or_else(|| {
            error!("💻️ No authenticated subject on a protected request. Is the bearer middleware installed?");
            ServerError::AuthenticationError(AuthApiError::MissingCredential)
        }))
    }
}

pub struct BearerAuthFactory<B> {
    _store: PhantomData<fn() -> B>,
}

impl<B> BearerAuthFactory<B> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self { _store: PhantomData }
    }
}

impl<S, Body, B> Transform<S, ServiceRequest> for BearerAuthFactory<B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<Body>, Error = Error> + 'static,
    S::Future: 'static,
    Body: 'static,
    B: NonceStore + AuditLog + 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<EitherBody<Body>>;
    type Transform = BearerAuthService<S, B>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BearerAuthService { service: Rc::new(service), _store: PhantomData }))
    }
}

pub struct BearerAuthService<S, B> {
    service: Rc<S>,
    _store: PhantomData<fn() -> B>,
}

impl<S, Body, B> Service<ServiceRequest> for BearerAuthService<S, B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<Body>, Error = Error> + 'static,
    S::Future: 'static,
    Body: 'static,
    B: NonceStore + AuditLog + 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<EitherBody<Body>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            if UNPROTECTED_PATHS.contains(&normalize_path(req.path())) {
                trace!("🔐️ {} is unprotected", req.path());
                return service.call(req).await.map(ServiceResponse::map_into_left_body);
            }
            let Some(verifier) = req.app_data::<web::Data<TokenVerifier<B>>>().cloned() else {
                error!("🔐️ No token verifier has been configured. Denying access.");
                let err = ServerError::InitializeError("Token verifier is not configured".to_string());
                return Ok(reject(req, &err));
            };
            let options = req.app_data::<web::Data<ServerOptions>>().map(|o| *o.get_ref()).unwrap_or_default();
            let context = client_context(req.request(), &options);
            let Some(token) = bearer_credential(req.request()) else {
                let err = ServerError::from(verifier.reject_missing_credential(&context).await);
                return Ok(reject(req, &err));
            };
            let method = req.method().as_str().to_string();
            let path = req.uri().path_and_query().map_or_else(|| req.path().to_string(), |pq| pq.as_str().to_string());
            match verifier.verify(&token, &method, &path, &context).await {
                Ok(subject) => {
                    trace!("🔐️ {method} {path} authorized for {}", subject.actor);
                    req.extensions_mut().insert(AuthenticatedSubject(subject));
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                },
                Err(e) => Ok(reject(req, &ServerError::from(e))),
            }
        })
    }
}

fn reject<Body>(req: ServiceRequest, err: &ServerError) -> ServiceResponse<EitherBody<Body>> {
    req.into_response(err.error_response()).map_into_right_body()
}
