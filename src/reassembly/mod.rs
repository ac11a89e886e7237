// Stream reassembly - rebuilds one logical response from streamed fragments
//
// `streamGenerateContent` answers arrive in one of three shapes depending on
// the endpoint and `alt` parameter: a JSON array of chunks, SSE `data:` lines,
// or bare concatenated objects. `parse_body` recognizes the shape and `merge`
// folds the chunks into a single Gemini-shaped response.

use crate::parser::models::Part;
use crate::parser::{candidate_parts, first_candidate, is_truthy, unwrap_payload, RESPONSE_WRAPPER};
use serde_json::{json, Map, Value};

/// Default cutoff below which an unparseable body is still shown as text
pub const DEFAULT_RAW_TEXT_LIMIT: usize = 5000;

/// What a decoded response body turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// One complete JSON value
    Single(Value),
    /// A sequence of streamed chunks, in arrival order
    Fragments(Vec<Value>),
    /// Short non-JSON text
    Raw(String),
    /// Nothing to show
    Empty,
    /// Long non-JSON text, dropped
    Unparseable,
}

/// Recognize the wire shape of a decoded body
pub fn parse_body(text: &str, raw_limit: usize) -> ParsedBody {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParsedBody::Empty;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                ParsedBody::Fragments(items)
            }
            other => ParsedBody::Single(other),
        };
    }

    if let Some(fragments) = split_concatenated(trimmed) {
        return ParsedBody::Fragments(fragments);
    }

    if let Some(fragments) = split_lines(trimmed) {
        return ParsedBody::Fragments(fragments);
    }

    if trimmed.len() < raw_limit {
        ParsedBody::Raw(trimmed.to_string())
    } else {
        ParsedBody::Unparseable
    }
}

/// `{...}{...}` or `{...}\n{...}`: objects separated by whitespace only
fn split_concatenated(text: &str) -> Option<Vec<Value>> {
    let values = serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    (values.len() > 1 && values.iter().all(Value::is_object)).then_some(values)
}

/// SSE or newline-delimited JSON; unusable lines are skipped
fn split_lines(text: &str) -> Option<Vec<Value>> {
    let fragments: Vec<Value> = text.lines().filter_map(parse_line).collect();
    (!fragments.is_empty()).then_some(fragments)
}

fn parse_line(line: &str) -> Option<Value> {
    let line = line.trim();
    if line.starts_with(':')
        || line.starts_with("event:")
        || line.starts_with("id:")
        || line.starts_with("retry:")
    {
        return None;
    }

    let data = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    // Only objects are chunks; a stray number or string is plain text
    serde_json::from_str::<Value>(data)
        .ok()
        .filter(Value::is_object)
}

/// One response rebuilt from its streamed fragments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedResponse {
    /// Thought (if any), then text (if any), then each function call
    pub parts: Vec<Part>,
    pub finish_reason: Option<String>,
    pub usage_metadata: Option<Value>,
    pub model_version: Option<String>,
    pub response_id: Option<String>,
    /// Latest `error` object; streamed calls report failures as a chunk
    pub error: Option<Value>,
    /// Whether any chunk carried a candidate
    pub has_candidates: bool,
    pub chunk_count: usize,
}

impl MergedResponse {
    pub fn text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn thought(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Thought(text) => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &Value> {
        self.parts.iter().filter_map(|part| match part {
            Part::FunctionCall(call) => Some(call),
            _ => None,
        })
    }

    /// Gemini-shaped JSON so merged and unmerged responses render alike
    ///
    /// `candidates` is only present when some chunk had one, so an error or
    /// usage-only stream classifies like its single-object equivalent.
    pub fn into_value(self) -> Value {
        let mut out = Map::new();
        if self.has_candidates {
            let mut candidate = Map::new();
            candidate.insert(
                "content".to_string(),
                json!({"role": "model", "parts": self.parts}),
            );
            if let Some(reason) = self.finish_reason {
                candidate.insert("finishReason".to_string(), Value::String(reason));
            }
            out.insert("candidates".to_string(), json!([candidate]));
        }
        if let Some(error) = self.error {
            out.insert("error".to_string(), error);
        }
        if let Some(usage) = self.usage_metadata {
            out.insert("usageMetadata".to_string(), usage);
        }
        if let Some(version) = self.model_version {
            out.insert("modelVersion".to_string(), Value::String(version));
        }
        if let Some(id) = self.response_id {
            out.insert("responseId".to_string(), Value::String(id));
        }
        out.insert("chunkCount".to_string(), json!(self.chunk_count));
        Value::Object(out)
    }
}

/// Fold streamed fragments into one response
///
/// Text and thought deltas are concatenated in arrival order. The latest
/// non-null `finishReason` and the latest non-empty `usageMetadata` win; usage
/// often rides on a trailing fragment that has no candidates at all.
pub fn merge(fragments: &[Value]) -> MergedResponse {
    let mut text = String::new();
    let mut thought = String::new();
    let mut calls = Vec::new();
    let mut merged = MergedResponse {
        chunk_count: fragments.len(),
        ..Default::default()
    };

    for fragment in fragments {
        let payload = unwrap_payload(fragment, RESPONSE_WRAPPER);

        if let Some(candidate) = first_candidate(payload) {
            merged.has_candidates = true;
            for part in candidate_parts(candidate) {
                match part {
                    Part::Text(delta) => text.push_str(&delta),
                    Part::Thought(delta) => thought.push_str(&delta),
                    Part::FunctionCall(call) => calls.push(call),
                    Part::FunctionResponse(_) | Part::Other(_) => {}
                }
            }
            if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
                merged.finish_reason = Some(reason.to_string());
            }
        }

        if let Some(usage) = payload
            .get("usageMetadata")
            .filter(|usage| usage.as_object().is_some_and(|map| !map.is_empty()))
        {
            merged.usage_metadata = Some(usage.clone());
        }

        if let Some(error) = payload.get("error").filter(|error| is_truthy(error)) {
            merged.error = Some(error.clone());
        }

        let latest = |field: &str| {
            payload
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        if let Some(version) = latest("modelVersion") {
            merged.model_version = Some(version);
        }
        if let Some(id) = latest("responseId") {
            merged.response_id = Some(id);
        }
    }

    if !thought.is_empty() {
        merged.parts.push(Part::Thought(thought));
    }
    if !text.is_empty() {
        merged.parts.push(Part::Text(text));
    }
    merged.parts.extend(calls.into_iter().map(Part::FunctionCall));
    merged
}
