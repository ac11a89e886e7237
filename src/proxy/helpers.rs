//! Header filtering and URL rewriting for forwarded calls

use axum::http::{HeaderName, Uri};

/// Headers that describe one connection and must not be forwarded
///
/// `host` and `content-length` are recomputed by the outgoing client.
pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

/// Response headers that are dropped on the way back to the agent
///
/// Unlike requests, `content-length` is kept: the body is relayed byte for
/// byte, so the upstream length still holds.
pub(crate) fn is_hop_by_hop_response(name: &HeaderName) -> bool {
    name.as_str() != "content-length" && name.as_str() != "host" && is_hop_by_hop(name)
}

/// Upstream URL for an incoming request: base + path + query
pub(crate) fn forward_url(upstream: &str, uri: &Uri) -> String {
    let base = upstream.trim_end_matches('/');
    match uri.path_and_query() {
        Some(pq) => format!("{}{}", base, pq.as_str()),
        None => format!("{}/", base),
    }
}
