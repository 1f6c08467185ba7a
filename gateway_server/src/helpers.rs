use std::{net::IpAddr, str::FromStr};

use actix_web::{http::header, HttpRequest};
use gateway_auth::{db_types::ClientContext, helpers::sha256_hex};
use log::{debug, trace};
use regex::Regex;

use crate::config::ServerOptions;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        // The left-most entry is the original client
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(forwarded_for);
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

fn forwarded_for(value: &str) -> Option<IpAddr> {
    let re = Regex::new(r#"for="?\[?(?P<ip>[^;,"\]]+)"#).ok()?;
    re.captures(value).and_then(|caps| caps.name("ip")).and_then(|m| IpAddr::from_str(m.as_str()).ok())
}

/// A stable hash over the client's `User-Agent`, `Accept-Language` and `Accept-Encoding` headers. Missing headers
/// count as empty. Only used to correlate audit records.
pub fn client_fingerprint(req: &HttpRequest) -> String {
    let value = |name: header::HeaderName| {
        req.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string()
    };
    let material = [value(header::USER_AGENT), value(header::ACCEPT_LANGUAGE), value(header::ACCEPT_ENCODING)].concat();
    sha256_hex(material)
}

pub fn client_context(req: &HttpRequest, options: &ServerOptions) -> ClientContext {
    let ip = get_remote_ip(req, options.use_x_forwarded_for, options.use_forwarded);
    ClientContext::new(ip, client_fingerprint(req))
}

/// The credential from an `Authorization: Bearer <credential>` header, if there is one.
pub fn bearer_credential(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, credential) = value.trim().split_once(' ')?;
    let credential = credential.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !credential.is_empty()).then(|| credential.to_string())
}
