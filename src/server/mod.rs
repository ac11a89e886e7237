//! Inspector server setup and initialization
//!
//! Claims the inspector port (or joins a peer that holds it), serves the UI
//! endpoints from a detached task and hands back the [`Inspector`] that
//! capture points report to.

pub mod api;
pub mod discovery;

use crate::config::Config;
use crate::emitter::Emitter;
use crate::events::TokenTotals;
use crate::pipeline::{Inspector, InspectorSettings};
use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use discovery::Binding;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

pub type SharedTotals = Arc<Mutex<TokenTotals>>;

/// State shared by the inspector endpoints
#[derive(Clone)]
pub struct ServerState {
    pub emitter: Emitter,
    pub totals: SharedTotals,
}

/// The part this process plays for the inspector UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Serves the UI on this port
    Primary { port: u16 },
    /// Forwards events to the inspector at this origin
    Secondary { peer: String },
    /// No port could be used; events have no audience
    Detached,
}

/// A running (or joined) inspector
pub struct Launch {
    pub inspector: Inspector,
    pub role: Role,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/events", get(api::events))
        .route("/ping", get(api::ping))
        .route("/broadcast", post(api::broadcast))
        .route("/stats", get(api::stats))
        .with_state(state)
}

/// Claim or join the inspector port and start serving
///
/// Fails when every candidate port belongs to some other program.
pub async fn launch(config: &Config) -> Result<Launch> {
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to create inspector HTTP client")?;

    let binding = discovery::bind_or_attach(config.inspector_port, config.port_attempts, &http).await?;

    let (emitter, role) = match binding {
        Binding::Primary { listener, port } => {
            let emitter = Emitter::local(config.event_buffer);
            let totals = SharedTotals::default();
            spawn_totals_tracker(&emitter, totals.clone());
            spawn_server(listener, ServerState { emitter: emitter.clone(), totals });

            let ui_url = format!("http://{}:{}", discovery::INSPECTOR_HOST, port);
            tracing::info!("Inspector UI available at {}", ui_url);
            if config.open_browser {
                open_browser(&ui_url);
            }
            (emitter, Role::Primary { port })
        }
        Binding::Secondary { peer } => (Emitter::forwarding(http, &peer), Role::Secondary { peer }),
    };

    Ok(Launch {
        inspector: Inspector::new(settings(config), emitter),
        role,
    })
}

/// Like [`launch`], but never fails
///
/// Used when embedding in a host program: a missing UI must not stop the
/// host, so the inspector keeps running with nobody listening.
pub async fn launch_or_detach(config: &Config) -> Launch {
    match launch(config).await {
        Ok(launch) => launch,
        Err(e) => {
            tracing::warn!("Inspector UI unavailable, continuing without it: {:#}", e);
            Launch {
                inspector: Inspector::new(settings(config), Emitter::local(config.event_buffer)),
                role: Role::Detached,
            }
        }
    }
}

fn settings(config: &Config) -> InspectorSettings {
    InspectorSettings {
        target_host: config.target_host.clone(),
        raw_text_limit: config.raw_text_limit,
    }
}

/// Serve the endpoints from a detached task
///
/// The task is not joined; it ends with the runtime, so it never keeps the
/// host process alive.
fn spawn_server(listener: TcpListener, state: ServerState) {
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(state)).await {
            tracing::error!("Inspector server error: {}", e);
        }
    });
}

/// Fold every published event into the shared token totals
fn spawn_totals_tracker(emitter: &Emitter, totals: SharedTotals) {
    let Some(mut rx) = emitter.subscribe() else {
        return;
    };
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(published) => {
                    let Ok(mut totals) = totals.lock() else {
                        tracing::warn!("Token totals lock poisoned, tracking stopped");
                        break;
                    };
                    if let Some(turn) = totals.apply(&published.event) {
                        tracing::debug!(
                            input = turn.input,
                            output = turn.output,
                            total = turn.total,
                            "Token usage"
                        );
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Token tracker fell behind, totals undercount");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Best-effort attempt to show the UI in the default browser
fn open_browser(url: &str) {
    let mut command = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut cmd = std::process::Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else {
        std::process::Command::new("xdg-open")
    };

    command
        .arg(url)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    if let Err(e) = command.spawn() {
        tracing::debug!("Could not open browser: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ClassifiedEvent, EventType};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            inspector_port: 0,
            port_attempts: 1,
            open_browser: false,
            ..Config::default()
        }
    }

    async fn primary() -> (Launch, String) {
        let launch = launch(&test_config()).await.unwrap();
        let Role::Primary { port } = launch.role else {
            panic!("expected primary role");
        };
        (launch, format!("http://127.0.0.1:{port}"))
    }

    #[tokio::test]
    async fn test_ping_identifies_inspector() {
        let (_launch, origin) = primary().await;
        let body: Value = reqwest::get(format!("{origin}/ping")).await.unwrap().json().await.unwrap();
        assert_eq!(body["gemini_inspector"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_broadcast_republishes_and_rejects_bad_json() {
        let (launch, origin) = primary().await;
        let mut rx = launch.inspector.emitter().subscribe().unwrap();
        let client = reqwest::Client::new();

        let ok = client
            .post(format!("{origin}/broadcast"))
            .body(r#"{"type":"chat_request","summary":"User Chat Request","data":{"contents":[]}}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), 200);

        let published = rx.recv().await.unwrap();
        assert_eq!(published.event.event_type, EventType::ChatRequest);
        assert!(published.event.timestamp > 0);

        let bad = client
            .post(format!("{origin}/broadcast"))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), 400);
    }

    #[tokio::test]
    async fn test_events_stream_delivers_published_events() {
        let (launch, origin) = primary().await;
        let response = reqwest::get(format!("{origin}/events")).await.unwrap();
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        let mut body = response.bytes_stream();

        // Wait for the SSE handler to subscribe before publishing
        for _ in 0..50 {
            if launch.inspector.emitter().subscriber_count() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        launch.inspector.emitter().publish(ClassifiedEvent::new(
            EventType::ChatResponseText,
            "Response (Text)",
            json!({"candidates": []}),
        ));

        let mut received = String::new();
        while !received.contains("\n\n") {
            let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
        let line = received.lines().find(|l| l.starts_with("data:")).unwrap();
        let event: Value = serde_json::from_str(line.trim_start_matches("data:").trim()).unwrap();
        assert_eq!(event["type"], "chat_response_text");
    }

    #[tokio::test]
    async fn test_stats_accumulate_usage() {
        let (launch, origin) = primary().await;
        launch.inspector.emitter().publish(ClassifiedEvent::new(
            EventType::ChatResponseText,
            "Response (Text)",
            json!({"usageMetadata": {"promptTokenCount": 40, "candidatesTokenCount": 2}}),
        ));

        let mut stats = Value::Null;
        for _ in 0..50 {
            stats = reqwest::get(format!("{origin}/stats")).await.unwrap().json().await.unwrap();
            if stats["responses"] == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stats["promptTokens"], 40);
        assert_eq!(stats["totalTokens"], 42);
    }

    #[tokio::test]
    async fn test_second_instance_forwards_to_first() {
        let (first, _origin) = primary().await;
        let Role::Primary { port } = first.role else { unreachable!() };
        let mut rx = first.inspector.emitter().subscribe().unwrap();

        let second = launch(&Config {
            inspector_port: port,
            port_attempts: 1,
            open_browser: false,
            ..Config::default()
        })
        .await
        .unwrap();
        assert!(matches!(second.role, Role::Secondary { .. }));

        second.inspector.emitter().publish(ClassifiedEvent::new(
            EventType::MetaRequest,
            "Metadata Operation",
            json!({}),
        ));
        let relayed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relayed.event.summary, "Metadata Operation");
    }
}
