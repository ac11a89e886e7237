//! Inspector port discovery
//!
//! Several agent processes may run at once. The first one to bind the
//! inspector port serves the UI; later ones find it via `/ping` and forward
//! their events to it instead of opening a second UI.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Inspector servers only ever listen on loopback
pub const INSPECTOR_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Outcome of probing for the inspector port
#[derive(Debug)]
pub enum Binding {
    /// We own the port and serve the UI from it
    Primary { listener: TcpListener, port: u16 },
    /// A peer inspector already serves the UI at this origin
    Secondary { peer: String },
}

/// Bind the first free port starting at `start_port`, or join a peer
///
/// For each port: bind it if free; if taken, ask the owner whether it is an
/// inspector and attach to it if so; otherwise move on to the next port.
pub async fn bind_or_attach(start_port: u16, attempts: u16, client: &reqwest::Client) -> Result<Binding> {
    for offset in 0..attempts.max(1) {
        let Some(port) = start_port.checked_add(offset) else {
            break;
        };

        match TcpListener::bind(SocketAddr::new(INSPECTOR_HOST, port)).await {
            Ok(listener) => {
                // Port 0 asks the OS for any free port
                let port = listener
                    .local_addr()
                    .map(|addr| addr.port())
                    .unwrap_or(port);
                return Ok(Binding::Primary { listener, port });
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                let origin = format!("http://{}:{}", INSPECTOR_HOST, port);
                if is_inspector(client, &origin).await {
                    tracing::info!("Inspector already running on port {}, forwarding events to it", port);
                    return Ok(Binding::Secondary { peer: origin });
                }
                tracing::info!("Port {} in use by another program, trying {}", port, port.saturating_add(1));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to bind inspector port {}", port));
            }
        }
    }

    bail!(
        "No usable inspector port in {}..{} (all taken by other programs)",
        start_port,
        start_port.saturating_add(attempts)
    )
}

/// Whether `origin` answers `/ping` like an inspector
pub async fn is_inspector(client: &reqwest::Client, origin: &str) -> bool {
    let response = match client
        .get(format!("{}/ping", origin))
        .timeout(PING_TIMEOUT)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => response,
        Ok(_) | Err(_) => return false,
    };

    response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("gemini_inspector").and_then(Value::as_bool))
        .unwrap_or(false)
}
