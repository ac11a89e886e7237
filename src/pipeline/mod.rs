//! Inspection pipeline for intercepted calls
//!
//! Ties the capture shim to the classifier, reassembler and emitter.
//!
//! # Flow
//!
//! ```text
//! request bytes  → JSON → classify_request → publish            (inline, before send)
//! response bytes → decode → parse_body → merge? → classify_response → publish
//!                                                                (spawned task)
//! ```
//!
//! The request event is published before the request leaves, and the response
//! event after its stream ends, so each call's events arrive request-first.
//! Calls running concurrently have no ordering between them.

use crate::classifier::{classify_request, classify_response};
use crate::decoder;
use crate::emitter::Emitter;
use crate::events::{generate_id, ClassifiedEvent, EventType};
use crate::reassembly::{self, ParsedBody};
use crate::util::preview;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde_json::{json, Value};
use std::sync::Arc;

/// Knobs the pipeline needs from the application config
#[derive(Debug, Clone)]
pub struct InspectorSettings {
    /// Host (or host suffix) whose traffic is inspected
    pub target_host: String,
    /// Unparseable bodies shorter than this are shown as raw text
    pub raw_text_limit: usize,
}

/// One outbound call being inspected
#[derive(Debug, Clone)]
pub struct InterceptedCall {
    pub id: String,
    pub url: Url,
    pub method: String,
    pub started_at: DateTime<Utc>,
}

impl InterceptedCall {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            id: generate_id(),
            url,
            method: method.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    fn stamp(&self, event: ClassifiedEvent) -> ClassifiedEvent {
        event.with_origin(&self.id, self.url.as_str(), &self.method)
    }
}

struct InspectorInner {
    settings: InspectorSettings,
    emitter: Emitter,
}

/// Shared handle to the pipeline; clones are cheap
#[derive(Clone)]
pub struct Inspector {
    inner: Arc<InspectorInner>,
}

impl Inspector {
    pub fn new(settings: InspectorSettings, emitter: Emitter) -> Self {
        Self {
            inner: Arc::new(InspectorInner { settings, emitter }),
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.inner.emitter
    }

    pub fn settings(&self) -> &InspectorSettings {
        &self.inner.settings
    }

    /// Whether a call to `url` should be inspected
    ///
    /// Matches the configured host exactly or as a dot-separated suffix, so
    /// `googleapis.com` covers `cloudcode-pa.googleapis.com`.
    pub fn is_target(&self, url: &Url) -> bool {
        let target = self.inner.settings.target_host.as_str();
        url.host_str().is_some_and(|host| {
            host.eq_ignore_ascii_case(target)
                || host
                    .len()
                    .checked_sub(target.len() + 1)
                    .is_some_and(|split| {
                        host.as_bytes().get(split) == Some(&b'.')
                            && host
                                .get(split + 1..)
                                .is_some_and(|suffix| suffix.eq_ignore_ascii_case(target))
                    })
        })
    }

    /// Classify and publish a captured request body
    ///
    /// Non-JSON bodies are skipped. Returns the published event.
    pub fn on_request(&self, call: &InterceptedCall, body: &[u8]) -> Option<ClassifiedEvent> {
        let mut json: Value = match serde_json::from_slice(body) {
            Ok(json) => json,
            Err(_) => {
                tracing::trace!(id = %call.id, bytes = body.len(), "Request body is not JSON, skipped");
                return None;
            }
        };

        let classification = classify_request(call.url.path(), &json);
        if let (Some(model), Some(obj)) = (&classification.model, json.as_object_mut()) {
            obj.entry("model")
                .or_insert_with(|| Value::String(model.clone()));
        }

        tracing::debug!(
            id = %call.id,
            event_type = %classification.event_type,
            model = classification.model.as_deref().unwrap_or("-"),
            "{} {}",
            call.method,
            call.url.path()
        );

        let event = call.stamp(
            ClassifiedEvent::new(classification.event_type, classification.summary, json)
                .with_model(classification.model),
        );
        self.inner.emitter.publish(event.clone());
        Some(event)
    }

    /// Hand off a completed response body for processing
    ///
    /// Processing runs on a spawned task so the host's stream is never held
    /// up. Outside a tokio runtime it runs inline instead.
    pub fn on_response(&self, call: InterceptedCall, status: u16, encoding: Option<String>, body: Bytes) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inspector = self.clone();
                runtime.spawn(async move {
                    inspector.process_response(&call, status, encoding.as_deref(), &body);
                });
            }
            Err(_) => {
                self.process_response(&call, status, encoding.as_deref(), &body);
            }
        }
    }

    /// Decode, reassemble, classify and publish a response body
    ///
    /// Returns the published event, or `None` when the body was dropped.
    pub fn process_response(
        &self,
        call: &InterceptedCall,
        status: u16,
        encoding: Option<&str>,
        body: &[u8],
    ) -> Option<ClassifiedEvent> {
        let limit = self.inner.settings.raw_text_limit;

        if body.is_empty() {
            tracing::debug!(id = %call.id, status, "Empty response body, nothing to publish");
            return None;
        }

        let event = match decoder::decode(body, encoding) {
            Ok(text) => self.classify_text(call, &text, limit)?,
            Err(e) => {
                tracing::warn!(id = %call.id, error = %e, "Failed to decode response body");
                if body.len() >= limit {
                    return None;
                }
                raw_text_event(String::from_utf8_lossy(body).into_owned())
            }
        };

        let event = call.stamp(event).with_status(status);
        tracing::debug!(
            id = %call.id,
            event_type = %event.event_type,
            status,
            elapsed_ms = call.elapsed_ms(),
            "{}",
            event.summary
        );
        self.inner.emitter.publish(event.clone());
        Some(event)
    }

    fn classify_text(&self, call: &InterceptedCall, text: &str, limit: usize) -> Option<ClassifiedEvent> {
        match reassembly::parse_body(text, limit) {
            ParsedBody::Single(json) => {
                let classification = classify_response(&json);
                Some(ClassifiedEvent::new(
                    classification.event_type,
                    classification.summary,
                    json,
                ))
            }
            ParsedBody::Fragments(fragments) => {
                let merged = reassembly::merge(&fragments).into_value();
                tracing::trace!(id = %call.id, chunks = fragments.len(), "Merged streamed response");
                let classification = classify_response(&merged);
                Some(ClassifiedEvent::new(
                    classification.event_type,
                    classification.summary,
                    merged,
                ))
            }
            ParsedBody::Raw(raw) => Some(raw_text_event(raw)),
            ParsedBody::Empty => {
                tracing::debug!(id = %call.id, "Blank response body, nothing to publish");
                None
            }
            ParsedBody::Unparseable => {
                tracing::debug!(
                    id = %call.id,
                    bytes = text.len(),
                    preview = %preview(text, 120),
                    "Unparseable response body dropped"
                );
                None
            }
        }
    }
}

fn raw_text_event(text: String) -> ClassifiedEvent {
    ClassifiedEvent::new(EventType::RawTextResponse, "Raw Text Response", json!({ "raw": text }))
}
