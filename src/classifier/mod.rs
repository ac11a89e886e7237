// Classifier module - labels captured payloads by business purpose
//
// Each direction has an ordered rule table. The first rule whose predicate
// matches decides the event type and renders the summary line. Both entry
// points are total: anything unmatched becomes `unknown_request` or
// `unknown_response`.

use crate::events::EventType;
use crate::parser::models::{Content, Part};
use crate::parser::{
    candidate_parts, display_value, extract_model, first_candidate, is_present, request_contents,
    system_instruction_text, unwrap_payload, REQUEST_WRAPPER, RESPONSE_WRAPPER,
};
use serde_json::Value;

/// Result of running a payload through a rule table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub event_type: EventType,
    pub summary: String,
    /// Only set for requests
    pub model: Option<String>,
}

/// How a rule renders its summary line
enum Summary<V> {
    Fixed(&'static str),
    Dynamic(V),
}

type RequestSummary = fn(&RequestView<'_>) -> String;
type ResponseSummary = fn(&ResponseView<'_>) -> String;

struct RequestRule {
    event_type: EventType,
    matches: fn(&RequestView<'_>) -> bool,
    summary: Summary<RequestSummary>,
}

struct ResponseRule {
    event_type: EventType,
    matches: fn(&ResponseView<'_>) -> bool,
    summary: Summary<ResponseSummary>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the request predicates look at, computed once per call
struct RequestView<'a> {
    path: &'a str,
    body: &'a Value,
    payload: &'a Value,
    model: &'a str,
    contents: Vec<Content>,
}

const IDE_CONTEXT_MARKERS: [&str; 2] = ["user's editor context", "summary of changes"];

const REQUEST_RULES: &[RequestRule] = &[
    RequestRule {
        event_type: EventType::MetaRequest,
        matches: is_metadata_path,
        summary: Summary::Fixed("Metadata Operation"),
    },
    RequestRule {
        event_type: EventType::ModelRoutingRequest,
        matches: is_routing_request,
        summary: Summary::Fixed("Model Routing Check"),
    },
    RequestRule {
        event_type: EventType::ToolResultRequest,
        matches: is_tool_result,
        summary: Summary::Fixed("Tool Result Submission"),
    },
    RequestRule {
        event_type: EventType::InitMetadataRequest,
        matches: has_client_metadata,
        summary: Summary::Dynamic(client_init_summary),
    },
    RequestRule {
        event_type: EventType::ModelUsageRequest,
        matches: is_usage_lookup,
        summary: Summary::Dynamic(usage_lookup_summary),
    },
    RequestRule {
        event_type: EventType::ChatRequest,
        matches: has_ide_context,
        summary: Summary::Fixed("Chat Request (with IDE Context)"),
    },
    RequestRule {
        event_type: EventType::ChatRequest,
        matches: has_contents,
        summary: Summary::Fixed("User Chat Request"),
    },
];

/// `/operations/...` polls, and `/models` listings or lookups
///
/// A `/models/<id>:method` path is a generation call and does not count.
fn is_metadata_path(view: &RequestView<'_>) -> bool {
    if view.path.contains("/operations") {
        return true;
    }
    let last_segment = view.path.rsplit('/').next().unwrap_or_default();
    view.path.contains("/models") && !last_segment.contains(':')
}

fn is_routing_request(view: &RequestView<'_>) -> bool {
    if view.model.contains("flash-lite") {
        return true;
    }
    let instruction = system_instruction_text(view.payload);
    instruction.contains("router") || instruction.contains("classify")
}

fn is_tool_result(view: &RequestView<'_>) -> bool {
    view.contents
        .last()
        .is_some_and(|last| last.is_user() && last.parts.iter().any(Part::is_function_response))
}

fn has_client_metadata(view: &RequestView<'_>) -> bool {
    view.payload
        .get("metadata")
        .is_some_and(|meta| is_present(meta.get("ideType")) || is_present(meta.get("pluginType")))
}

fn client_init_summary(view: &RequestView<'_>) -> String {
    let plugin = view
        .payload
        .get("metadata")
        .and_then(|meta| meta.get("pluginType"))
        .filter(|plugin| crate::parser::is_truthy(plugin))
        .map(display_value)
        .unwrap_or_else(|| "Unknown".to_string());
    format!("Client Init ({plugin})")
}

/// `loadCodeAssist`-style lookups carry nothing but the project id
fn is_usage_lookup(view: &RequestView<'_>) -> bool {
    is_present(view.body.get("project")) && view.body.as_object().is_some_and(|obj| obj.len() == 1)
}

fn usage_lookup_summary(view: &RequestView<'_>) -> String {
    let project = view.body.get("project").map(display_value).unwrap_or_default();
    format!("Model Usage Check ({project})")
}

fn has_ide_context(view: &RequestView<'_>) -> bool {
    view.contents.iter().filter(|c| c.is_user()).any(|content| {
        content
            .parts
            .iter()
            .filter_map(Part::text)
            .any(|text| IDE_CONTEXT_MARKERS.iter().any(|marker| text.contains(marker)))
    })
}

fn has_contents(view: &RequestView<'_>) -> bool {
    is_present(view.payload.get("contents"))
}

/// Label an outbound request body
///
/// `path` is the URL path of the call; it decides metadata operations and is
/// the last resort for model extraction.
pub fn classify_request(path: &str, body: &Value) -> Classification {
    let payload = unwrap_payload(body, REQUEST_WRAPPER);
    let model = extract_model(path, body, payload);
    let view = RequestView {
        path,
        body,
        payload,
        model: model.as_deref().unwrap_or_default(),
        contents: request_contents(payload),
    };

    let (event_type, summary) = REQUEST_RULES
        .iter()
        .find(|rule| (rule.matches)(&view))
        .map(|rule| {
            let summary = match &rule.summary {
                Summary::Fixed(text) => text.to_string(),
                Summary::Dynamic(render) => render(&view),
            };
            (rule.event_type, summary)
        })
        .unwrap_or((EventType::UnknownRequest, "Unknown Request".to_string()));

    Classification {
        event_type,
        summary,
        model,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

struct ResponseView<'a> {
    payload: &'a Value,
    /// Parts of the first candidate; `None` when `candidates` is absent or empty
    parts: Option<Vec<Part>>,
    /// `model_choice` from a JSON routing decision in the first text part
    routing_choice: Option<String>,
}

const RESPONSE_RULES: &[ResponseRule] = &[
    ResponseRule {
        event_type: EventType::AuthTokenResponse,
        matches: |view| {
            is_present(view.payload.get("access_token"))
                && is_present(view.payload.get("token_type"))
        },
        summary: Summary::Fixed("Auth Token (OAuth2)"),
    },
    ResponseRule {
        event_type: EventType::ModelRoutingResponse,
        matches: |view| view.routing_choice.is_some(),
        summary: Summary::Dynamic(|view| {
            format!(
                "Routing Decision: {}",
                view.routing_choice.as_deref().unwrap_or_default()
            )
        }),
    },
    ResponseRule {
        event_type: EventType::ModelRoutingResponse,
        matches: |view| {
            view.payload
                .get("modelVersion")
                .and_then(Value::as_str)
                .is_some_and(|version| version.contains("flash-lite"))
        },
        summary: Summary::Fixed("Routing Response (Flash Lite)"),
    },
    ResponseRule {
        event_type: EventType::UserProfileResponse,
        matches: |view| {
            is_present(view.payload.get("currentTier"))
                && is_present(view.payload.get("allowedTiers"))
        },
        summary: Summary::Dynamic(|view| {
            let tier = view
                .payload
                .get("currentTier")
                .and_then(|tier| tier.get("name"))
                .filter(|name| crate::parser::is_truthy(name))
                .map(display_value)
                .unwrap_or_else(|| "Unknown".to_string());
            format!("User Profile ({tier})")
        }),
    },
    ResponseRule {
        event_type: EventType::IdentityResponse,
        matches: |view| {
            ["azp", "aud", "email", "sub"]
                .iter()
                .all(|field| is_present(view.payload.get(*field)))
        },
        summary: Summary::Dynamic(|view| {
            let email = view.payload.get("email").map(display_value).unwrap_or_default();
            format!("Identity Info ({email})")
        }),
    },
    ResponseRule {
        event_type: EventType::ConfigResponse,
        matches: |view| {
            is_present(view.payload.get("experimentIds")) && is_present(view.payload.get("flags"))
        },
        summary: Summary::Dynamic(|view| {
            let flags = view
                .payload
                .get("flags")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            format!("Experiment Config (Flags: {flags})")
        }),
    },
    ResponseRule {
        event_type: EventType::ModelUsageResponse,
        matches: |view| view.payload.get("buckets").is_some_and(Value::is_array),
        summary: Summary::Fixed("Model Usage Statistics"),
    },
    ResponseRule {
        event_type: EventType::ChatResponseToolCall,
        matches: |view| {
            view.parts
                .as_ref()
                .is_some_and(|parts| parts.iter().any(Part::is_function_call))
        },
        summary: Summary::Dynamic(|view| {
            let names = view
                .parts
                .iter()
                .flatten()
                .filter(|part| part.is_function_call())
                .map(|part| part.function_name().unwrap_or_default())
                .collect::<Vec<_>>()
                .join(", ");
            format!("Response (Tool Call): {names}")
        }),
    },
    ResponseRule {
        event_type: EventType::ChatResponseText,
        matches: |view| {
            view.parts
                .as_ref()
                .is_some_and(|parts| parts.iter().any(|part| part.text().is_some()))
        },
        summary: Summary::Fixed("Response (Text)"),
    },
    ResponseRule {
        event_type: EventType::ChatResponseEmpty,
        matches: |view| view.parts.is_some(),
        summary: Summary::Fixed("Response (Empty)"),
    },
    ResponseRule {
        event_type: EventType::ErrorResponse,
        matches: |view| is_present(view.payload.get("error")),
        summary: Summary::Fixed("API Error"),
    },
    ResponseRule {
        event_type: EventType::MetaResponse,
        matches: |view| is_present(view.payload.get("usageMetadata")),
        summary: Summary::Fixed("Metadata Response"),
    },
];

/// Read a routing decision out of the first part's text
///
/// The router model answers with a small JSON document such as
/// `{"reasoning": "...", "model_choice": "flash"}`.
fn routing_choice(parts: Option<&[Part]>) -> Option<String> {
    let text = parts?.first()?.text()?.trim();
    if !text.starts_with('{') || !text.contains("\"model_choice\"") {
        return None;
    }
    let decision: Value = serde_json::from_str(text).ok()?;
    decision
        .get("model_choice")
        .filter(|choice| crate::parser::is_truthy(choice))
        .map(display_value)
}

/// Label an inbound response body (single object or merged stream)
pub fn classify_response(body: &Value) -> Classification {
    let payload = unwrap_payload(body, RESPONSE_WRAPPER);
    let parts = first_candidate(payload).map(candidate_parts);
    let view = ResponseView {
        payload,
        routing_choice: routing_choice(parts.as_deref()),
        parts,
    };

    let (event_type, summary) = RESPONSE_RULES
        .iter()
        .find(|rule| (rule.matches)(&view))
        .map(|rule| {
            let summary = match &rule.summary {
                Summary::Fixed(text) => text.to_string(),
                Summary::Dynamic(render) => render(&view),
            };
            (rule.event_type, summary)
        })
        .unwrap_or((EventType::UnknownResponse, "Unknown Response".to_string()));

    Classification {
        event_type,
        summary,
        model: None,
    }
}
