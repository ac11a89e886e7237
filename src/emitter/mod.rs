// Event emitter - fans classified events out to inspector subscribers
//
// An instance either owns the inspector port (local mode: events go to a
// broadcast channel that every SSE connection subscribes to) or found a peer
// already serving it (forwarding mode: events are POSTed to the peer's
// `/broadcast` endpoint). Publishing never blocks and never fails the caller.

use crate::events::ClassifiedEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default number of events a slow subscriber may fall behind
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Forwarded events are small; a peer that takes longer is gone
const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// An event as delivered to subscribers, serialized once
#[derive(Debug)]
pub struct Published {
    pub event: ClassifiedEvent,
    pub json: String,
}

#[derive(Clone)]
enum Mode {
    Local {
        tx: broadcast::Sender<Arc<Published>>,
    },
    Forward {
        client: reqwest::Client,
        endpoint: String,
    },
}

/// Cheap to clone; all clones publish to the same place
#[derive(Clone)]
pub struct Emitter {
    mode: Mode,
}

impl Emitter {
    /// Emitter for the instance that serves the inspector UI
    pub fn local(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            mode: Mode::Local { tx },
        }
    }

    /// Emitter that relays every event to a peer inspector at `peer_origin`
    pub fn forwarding(client: reqwest::Client, peer_origin: &str) -> Self {
        let endpoint = format!("{}/broadcast", peer_origin.trim_end_matches('/'));
        Self {
            mode: Mode::Forward { client, endpoint },
        }
    }

    pub fn is_forwarding(&self) -> bool {
        matches!(self.mode, Mode::Forward { .. })
    }

    /// New subscription; `None` in forwarding mode
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Arc<Published>>> {
        match &self.mode {
            Mode::Local { tx } => Some(tx.subscribe()),
            Mode::Forward { .. } => None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        match &self.mode {
            Mode::Local { tx } => tx.receiver_count(),
            Mode::Forward { .. } => 0,
        }
    }

    /// Stamp and deliver an event
    pub fn publish(&self, mut event: ClassifiedEvent) {
        event.stamp();

        match &self.mode {
            Mode::Local { tx } => {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(error = %e, event_type = %event.event_type, "Failed to serialize event");
                        return;
                    }
                };
                let event_type = event.event_type;
                // Err only means nobody is listening right now
                if tx.send(Arc::new(Published { event, json })).is_err() {
                    tracing::trace!(%event_type, "No subscribers, event dropped");
                }
            }
            Mode::Forward { client, endpoint } => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    tracing::debug!("No async runtime, forwarded event dropped");
                    return;
                };
                let client = client.clone();
                let endpoint = endpoint.clone();
                runtime.spawn(async move {
                    let result = client
                        .post(&endpoint)
                        .timeout(FORWARD_TIMEOUT)
                        .json(&event)
                        .send()
                        .await;
                    match result {
                        Ok(response) if !response.status().is_success() => {
                            tracing::debug!(status = %response.status(), "Peer inspector rejected event");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!(error = %e, "Failed to forward event to peer inspector"),
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use serde_json::json;

    fn sample() -> ClassifiedEvent {
        ClassifiedEvent::new(EventType::ChatRequest, "User Chat Request", json!({"contents": []}))
    }

    #[test]
    fn test_publish_without_subscribers() {
        let emitter = Emitter::local(4);
        assert_eq!(emitter.subscriber_count(), 0);
        emitter.publish(sample());
        emitter.publish(sample());
    }

    #[tokio::test]
    async fn test_fan_out_in_publish_order() {
        let emitter = Emitter::local(16);
        let mut first = emitter.subscribe().unwrap();
        let mut second = emitter.subscribe().unwrap();

        emitter.publish(sample());
        emitter.publish(ClassifiedEvent::new(EventType::ChatResponseText, "Response (Text)", json!({})));

        for rx in [&mut first, &mut second] {
            let a = rx.recv().await.unwrap();
            let b = rx.recv().await.unwrap();
            assert_eq!(a.event.event_type, EventType::ChatRequest);
            assert_eq!(b.event.event_type, EventType::ChatResponseText);
            assert!(a.event.timestamp > 0);
            let wire: serde_json::Value = serde_json::from_str(&b.json).unwrap();
            assert_eq!(wire["type"], "chat_response_text");
        }
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let emitter = Emitter::local(4);
        let rx = emitter.subscribe().unwrap();
        assert_eq!(emitter.subscriber_count(), 1);
        drop(rx);
        assert_eq!(emitter.subscriber_count(), 0);
        emitter.publish(sample());
    }

    #[tokio::test]
    async fn test_forwarding_to_unreachable_peer_is_silent() {
        // Port 9 (discard) is not listening in test environments
        let emitter = Emitter::forwarding(reqwest::Client::new(), "http://127.0.0.1:9/");
        assert!(emitter.is_forwarding());
        assert!(emitter.subscribe().is_none());
        emitter.publish(sample());
    }

    #[test]
    fn test_forwarding_outside_runtime_is_silent() {
        let emitter = Emitter::forwarding(reqwest::Client::new(), "http://127.0.0.1:9");
        emitter.publish(sample());
    }
}
