use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use gateway_auth::{AuthApiError, Severity};
use log::error;
use thiserror::Error;

/// Message returned to callers for every rejected credential.
pub const AUTHENTICATION_FAILED: &str = "Authentication failed";
pub const NOT_FOUND: &str = "Not found";
const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthApiError),
}

impl ServerError {
    /// The message the caller gets to see. Auth failures and internal errors never reveal their cause.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequestBody(_) => self.to_string(),
            Self::AuthenticationError(e) => match e.severity() {
                Severity::Unauthorized => AUTHENTICATION_FAILED.to_string(),
                Severity::NotFound => NOT_FOUND.to_string(),
                Severity::BadRequest => e.to_string(),
                Severity::Internal => INTERNAL_ERROR.to_string(),
            },
            _ => INTERNAL_ERROR.to_string(),
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e.severity() {
                Severity::BadRequest => StatusCode::BAD_REQUEST,
                Severity::Unauthorized => StatusCode::UNAUTHORIZED,
                Severity::NotFound => StatusCode::NOT_FOUND,
                Severity::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("💻️ {self}");
        }
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.public_message() }).to_string())
    }
}
