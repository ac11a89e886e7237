// Events that flow from the capture pipeline to the inspector UI
//
// Every intercepted call produces at most two ClassifiedEvents: one for the
// request and one for the (reassembled) response. The JSON field names are
// what the browser UI reads, so they are camelCase on the wire.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Business purpose of a request or response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ChatRequest,
    ChatResponseText,
    ChatResponseToolCall,
    ChatResponseEmpty,
    ToolResultRequest,
    ModelRoutingRequest,
    ModelRoutingResponse,
    AuthTokenResponse,
    UserProfileResponse,
    IdentityResponse,
    ConfigResponse,
    ModelUsageRequest,
    ModelUsageResponse,
    InitMetadataRequest,
    MetaRequest,
    MetaResponse,
    ErrorResponse,
    UnknownRequest,
    UnknownResponse,
    /// Body that was neither JSON nor a JSON stream, forwarded as text
    RawTextResponse,
}

impl EventType {
    /// Wire name, as used in the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ChatRequest => "chat_request",
            EventType::ChatResponseText => "chat_response_text",
            EventType::ChatResponseToolCall => "chat_response_tool_call",
            EventType::ChatResponseEmpty => "chat_response_empty",
            EventType::ToolResultRequest => "tool_result_request",
            EventType::ModelRoutingRequest => "model_routing_request",
            EventType::ModelRoutingResponse => "model_routing_response",
            EventType::AuthTokenResponse => "auth_token_response",
            EventType::UserProfileResponse => "user_profile_response",
            EventType::IdentityResponse => "identity_response",
            EventType::ConfigResponse => "config_response",
            EventType::ModelUsageRequest => "model_usage_request",
            EventType::ModelUsageResponse => "model_usage_response",
            EventType::InitMetadataRequest => "init_metadata_request",
            EventType::MetaRequest => "meta_request",
            EventType::MetaResponse => "meta_response",
            EventType::ErrorResponse => "error_response",
            EventType::UnknownRequest => "unknown_request",
            EventType::UnknownResponse => "unknown_response",
            EventType::RawTextResponse => "raw_text_response",
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(
            self,
            EventType::ChatRequest
                | EventType::ToolResultRequest
                | EventType::ModelRoutingRequest
                | EventType::ModelUsageRequest
                | EventType::InitMetadataRequest
                | EventType::MetaRequest
                | EventType::UnknownRequest
        )
    }

    pub fn is_response(&self) -> bool {
        !self.is_request()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled request or response, as published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedEvent {
    /// Unix epoch milliseconds, stamped at publish time
    #[serde(default)]
    pub timestamp: i64,

    #[serde(rename = "type")]
    pub event_type: EventType,

    pub summary: String,

    /// Full payload (merged for streamed responses)
    #[serde(default)]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Present on response events only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Correlates a request event with its response event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ClassifiedEvent {
    pub fn new(event_type: EventType, summary: impl Into<String>, data: Value) -> Self {
        Self {
            timestamp: 0,
            event_type,
            summary: summary.into(),
            data,
            model: None,
            url: None,
            method: None,
            status_code: None,
            request_id: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attach the call's url, method and correlation id
    pub fn with_origin(mut self, id: &str, url: &str, method: &str) -> Self {
        self.request_id = Some(id.to_string());
        self.url = Some(url.to_string());
        self.method = Some(method.to_string());
        self
    }

    /// Set the timestamp to now
    pub fn stamp(&mut self) {
        self.timestamp = Utc::now().timestamp_millis();
    }
}

/// Generate a unique correlation ID for an intercepted call
pub fn generate_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("gi-{}-{}", Utc::now().timestamp_millis(), seq)
}

/// Token usage reported by a single response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// Running token totals across every response seen this session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTotals {
    pub prompt_tokens: u64,
    pub candidates_tokens: u64,
    pub thoughts_tokens: u64,
    pub cached_tokens: u64,
    /// Responses that carried usage metadata
    pub responses: u64,
}

impl TokenTotals {
    /// Fold one event into the totals
    ///
    /// Usage is read from `data.usageMetadata`, or from
    /// `data.response.usageMetadata` for wrapped Code Assist payloads.
    /// Request events and responses without usage leave the totals unchanged.
    pub fn apply(&mut self, event: &ClassifiedEvent) -> Option<TurnUsage> {
        if !event.event_type.is_response() {
            return None;
        }

        let usage = event
            .data
            .get("usageMetadata")
            .or_else(|| event.data.get("response")?.get("usageMetadata"))
            .filter(|usage| usage.is_object())?;

        let count = |field: &str| usage.get(field).and_then(Value::as_u64).unwrap_or(0);
        let input = count("promptTokenCount");
        let output = count("candidatesTokenCount");
        let total = match count("totalTokenCount") {
            0 => input + output,
            reported => reported,
        };

        self.prompt_tokens += input;
        self.candidates_tokens += output;
        self.thoughts_tokens += count("thoughtsTokenCount");
        self.cached_tokens += count("cachedContentTokenCount");
        self.responses += 1;

        Some(TurnUsage {
            input,
            output,
            total,
        })
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.candidates_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let mut event = ClassifiedEvent::new(
            EventType::ChatResponseText,
            "Response (Text)",
            json!({"candidates": []}),
        )
        .with_status(200)
        .with_origin("gi-1-0", "https://x.googleapis.com/v1", "POST");
        event.stamp();

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "chat_response_text");
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["requestId"], "gi-1-0");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
        assert!(value.get("model").is_none());
    }

    #[test]
    fn test_event_accepts_missing_timestamp() {
        let event: ClassifiedEvent = serde_json::from_value(json!({
            "type": "meta_request",
            "summary": "Metadata Operation",
            "data": {}
        }))
        .unwrap();
        assert_eq!(event.timestamp, 0);
        assert_eq!(event.event_type, EventType::MetaRequest);
    }

    #[test]
    fn test_as_str_matches_serde() {
        for event_type in [
            EventType::ChatResponseToolCall,
            EventType::RawTextResponse,
            EventType::InitMetadataRequest,
        ] {
            let wire = serde_json::to_value(event_type).unwrap();
            assert_eq!(wire, event_type.as_str());
        }
    }

    #[test]
    fn test_generate_id_unique() {
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_totals_apply_plain_and_wrapped_usage() {
        let mut totals = TokenTotals::default();

        let plain = ClassifiedEvent::new(
            EventType::ChatResponseText,
            "Response (Text)",
            json!({"usageMetadata": {"promptTokenCount": 100, "candidatesTokenCount": 20, "thoughtsTokenCount": 5}}),
        );
        let turn = totals.apply(&plain).unwrap();
        assert_eq!(turn.total, 120);

        let wrapped = ClassifiedEvent::new(
            EventType::MetaResponse,
            "Metadata Response",
            json!({"response": {"usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 1, "totalTokenCount": 50, "cachedContentTokenCount": 8}}}),
        );
        assert_eq!(totals.apply(&wrapped).unwrap().total, 50);

        assert_eq!(totals.prompt_tokens, 110);
        assert_eq!(totals.candidates_tokens, 21);
        assert_eq!(totals.thoughts_tokens, 5);
        assert_eq!(totals.cached_tokens, 8);
        assert_eq!(totals.responses, 2);
        assert_eq!(totals.total_tokens(), 131);
    }

    #[test]
    fn test_totals_ignore_requests_and_missing_usage() {
        let mut totals = TokenTotals::default();
        let request = ClassifiedEvent::new(
            EventType::ChatRequest,
            "User Chat Request",
            json!({"usageMetadata": {"promptTokenCount": 9}}),
        );
        assert!(totals.apply(&request).is_none());

        let bare = ClassifiedEvent::new(EventType::ChatResponseEmpty, "Response (Empty)", json!({}));
        assert!(totals.apply(&bare).is_none());
        assert_eq!(totals, TokenTotals::default());
    }
}
