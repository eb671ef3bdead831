//! The opening handshake (RFC 6455 section 4.2).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderValue, header};
use sha1::{Digest, Sha1};

use crate::config::ServerConfig;
use crate::protocol::http::{HttpRequest, HttpResponse};

/// Appended to the client key before hashing.
pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `Sec-WebSocket-Accept` for a client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(client_key.as_bytes());
    sha1.update(GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

/// True when `Connection` lists the `upgrade` token and a client key is present.
pub fn is_upgrade_request(request: &HttpRequest) -> bool {
    let upgrade = request
        .headers()
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    upgrade && request.headers().contains_key(header::SEC_WEBSOCKET_KEY)
}

/// The `101` answer to an upgrade request carrying `client_key`.
pub fn upgrade_response(client_key: &str, config: &ServerConfig) -> HttpResponse {
    let mut response = HttpResponse::switching_protocols(config.get_server_name());
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    // base64 output is always a valid header value
    if let Ok(accept) = HeaderValue::from_str(&accept_key(client_key)) {
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    }
    response
}
