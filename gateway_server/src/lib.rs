//! # Payment Gateway auth server
//! This crate hosts the HTTP surface of the payment gateway's auth subsystem. It is responsible for:
//! Issuing single-use tokens to callers holding a valid API key.
//! Redeeming those tokens on every protected request, via the bearer middleware.
//! Administering API keys.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/auth/tokens`: Issues a token for one permission.
//! * `/ping`: Protected. Echoes the token's subject.
//! * `/admin/keys`, `/admin/keys/role`, `/admin/keys/revoke`: Protected. API key administration.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod nonce_purge_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
