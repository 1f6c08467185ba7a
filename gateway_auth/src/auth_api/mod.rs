//! # The public auth API
//!
//! Tokens are issued by [`crate::TokenIssuer`] and redeemed by [`crate::TokenVerifier`]. Both are generic over the
//! storage traits in `db::traits`, and share one [`crate::TokenCodec`] behind an `Arc`.
//!
//! A token is an HS256-signed claim set, encrypted with AES-256-GCM as a compact JWE. It names exactly one permission
//! and can be redeemed exactly once: the issuer writes a nonce record for the token's `jti`, and the verifier deletes it.
//! The delete is the proof of redemption, so two requests racing with the same token can never both succeed.
//!
//! API keys are managed by [`crate::ApiKeyManager`]. A key is bound to a role, and may be used to request tokens for
//! any permission that role holds.
pub mod api_key_manager;
pub mod errors;
pub mod permission_registry;
pub mod token_codec;
pub mod token_issuer;
pub mod token_verifier;
