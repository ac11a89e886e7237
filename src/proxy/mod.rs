// Proxy module - HTTP server that forwards agent traffic upstream
//
// Agents point their Gemini base URL at this server. Every request is
// forwarded unchanged through an `InspectingClient`, so matching calls show
// up in the inspector while the agent reads the upstream response as it
// streams.

mod error;
mod helpers;

use crate::capture::InspectingClient;
use crate::config::Config;
use crate::pipeline::Inspector;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::Response,
    routing::any,
    Router,
};
use error::ProxyError;
use helpers::{forward_url, is_hop_by_hop, is_hop_by_hop_response};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Generous ceiling for long generations
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared state for the proxy server
#[derive(Clone)]
pub struct ProxyState {
    client: InspectingClient,
    /// Upstream base URL, without trailing slash
    upstream: Arc<str>,
}

impl ProxyState {
    /// Build the forwarding client around an inspector
    ///
    /// Automatic decompression is off: the agent gets the upstream bytes
    /// untouched and the inspector decodes its own copy.
    pub fn new(upstream: &str, inspector: Inspector) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .pool_max_idle_per_host(10)
            .no_gzip()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client: InspectingClient::new(inner, inspector),
            upstream: Arc::from(upstream.trim_end_matches('/')),
        })
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/", any(proxy_handler))
        .route("/*path", any(proxy_handler))
        .with_state(state)
}

/// Start the proxy server and run until `shutdown_rx` fires
pub async fn start_proxy(
    config: &Config,
    inspector: Inspector,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    let bind_addr = config.bind_addr;
    let state = ProxyState::new(&config.upstream_url, inspector)?;

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind proxy to {}", bind_addr))?;

    tracing::info!("Proxy listening on {} -> {}", bind_addr, config.upstream_url);

    // Stops accepting on shutdown and lets in-flight calls finish
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_rx.await.ok();
        })
        .await
        .context("Proxy server error")?;

    tracing::info!("Proxy server shut down gracefully");
    Ok(())
}

/// Forward one request and relay the upstream response
async fn proxy_handler(
    State(state): State<ProxyState>,
    req: Request,
) -> Result<Response<Body>, ProxyError> {
    let (parts, body) = req.into_parts();
    let url = forward_url(&state.upstream, &parts.uri);

    tracing::debug!("Proxying {} {}", parts.method, url);

    // Buffered so the inspector sees the whole request body
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ProxyError::BodyRead(e.to_string()))?;

    let mut forward = state.client.request(parts.method, &url).body(body_bytes);
    for (name, value) in parts.headers.iter() {
        if is_hop_by_hop(name) {
            continue;
        }
        forward = forward.header(name, value);
    }

    let upstream = state
        .client
        .send(forward)
        .await
        .map_err(ProxyError::from_upstream)?;

    tracing::debug!(status = upstream.status().as_u16(), "Upstream responded");

    let mut response = Response::builder().status(upstream.status());
    for (name, value) in upstream.headers().iter() {
        if is_hop_by_hop_response(name) {
            continue;
        }
        response = response.header(name, value);
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ProxyError::Upstream(e.to_string()))
}
