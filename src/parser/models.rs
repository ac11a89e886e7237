// Data models for the Gemini generateContent wire format
//
// Only the structures the inspector classifies or merges are modeled.
// Everything else stays as raw JSON so payloads reach the UI unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single content part, decoded from the wire at the boundary
///
/// Gemini marks a part's kind by which field is present (`text`,
/// `functionCall`, ...) and flags reasoning text with `thought: true`.
/// Downstream code matches on the variant instead of probing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPart", into = "RawPart")]
pub enum Part {
    /// User-visible model output
    Text(String),
    /// Reasoning text the model marked as a thought
    Thought(String),
    /// Tool invocation requested by the model (`{name, args}`)
    FunctionCall(Value),
    /// Tool result sent back by the client (`{name, response}`)
    FunctionResponse(Value),
    /// Anything else (inline data, executable code, ...) kept verbatim
    Other(Map<String, Value>),
}

impl Part {
    /// Text carried by the part, for both plain and thought text
    pub fn text(&self) -> Option<&str> {
        match self {
            Part::Text(text) | Part::Thought(text) => Some(text),
            _ => None,
        }
    }

    /// Name of the function for call and response parts
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Part::FunctionCall(call) | Part::FunctionResponse(call) => {
                call.get("name").and_then(Value::as_str)
            }
            _ => None,
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, Part::FunctionCall(_))
    }

    pub fn is_function_response(&self) -> bool {
        matches!(self, Part::FunctionResponse(_))
    }
}

/// Field-level view of a part as it appears on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<Value>,
    #[serde(
        rename = "functionCall",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    function_call: Option<Value>,
    #[serde(
        rename = "functionResponse",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    function_response: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawPart> for Part {
    fn from(raw: RawPart) -> Self {
        if let Some(call) = raw.function_call {
            return Part::FunctionCall(call);
        }
        if let Some(response) = raw.function_response {
            return Part::FunctionResponse(response);
        }

        let text = raw.text.as_ref().and_then(Value::as_str);
        match (&raw.thought, text) {
            // `{"text": "...", "thought": true}` is the documented shape;
            // `{"thought": "..."}` shows up in some SDK debug dumps
            (Some(Value::Bool(true)), Some(text)) => return Part::Thought(text.to_string()),
            (Some(Value::String(thought)), _) => return Part::Thought(thought.clone()),
            (_, Some(text)) => return Part::Text(text.to_string()),
            _ => {}
        }

        let mut other = raw.extra;
        if let Some(text) = raw.text {
            other.insert("text".to_string(), text);
        }
        if let Some(thought) = raw.thought {
            other.insert("thought".to_string(), thought);
        }
        Part::Other(other)
    }
}

impl From<Part> for RawPart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text(text) => RawPart {
                text: Some(Value::String(text)),
                ..Default::default()
            },
            Part::Thought(text) => RawPart {
                text: Some(Value::String(text)),
                thought: Some(Value::Bool(true)),
                ..Default::default()
            },
            Part::FunctionCall(call) => RawPart {
                function_call: Some(call),
                ..Default::default()
            },
            Part::FunctionResponse(response) => RawPart {
                function_response: Some(response),
                ..Default::default()
            },
            Part::Other(extra) => RawPart {
                extra,
                ..Default::default()
            },
        }
    }
}

/// One entry of a `contents` array (or a candidate's `content`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Content {
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    /// Decode leniently: a malformed part is skipped, never fatal
    pub fn from_value(value: &Value) -> Self {
        let role = value.get("role").and_then(Value::as_str).map(String::from);
        let parts = value
            .get("parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| Part::deserialize(part).ok())
                    .collect()
            })
            .unwrap_or_default();
        Self { role, parts }
    }

    pub fn is_user(&self) -> bool {
        self.role.as_deref() == Some("user")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_part_variants_from_wire() {
        let parts: Vec<Part> = serde_json::from_value(json!([
            {"text": "hello"},
            {"text": "pondering", "thought": true},
            {"functionCall": {"name": "read_file", "args": {"path": "a.rs"}}},
            {"functionResponse": {"name": "read_file", "response": {"ok": true}}},
            {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
        ]))
        .unwrap();

        assert_eq!(parts[0], Part::Text("hello".to_string()));
        assert_eq!(parts[1], Part::Thought("pondering".to_string()));
        assert_eq!(parts[2].function_name(), Some("read_file"));
        assert!(parts[3].is_function_response());
        assert!(matches!(&parts[4], Part::Other(map) if map.contains_key("inlineData")));
    }

    #[test]
    fn test_thought_false_is_plain_text() {
        let part: Part = serde_json::from_value(json!({"text": "x", "thought": false})).unwrap();
        assert_eq!(part, Part::Text("x".to_string()));
    }

    #[test]
    fn test_string_thought_shorthand() {
        let part: Part = serde_json::from_value(json!({"thought": "a"})).unwrap();
        assert_eq!(part, Part::Thought("a".to_string()));
    }

    #[test]
    fn test_thought_serializes_with_flag() {
        let value = serde_json::to_value(Part::Thought("why".to_string())).unwrap();
        assert_eq!(value, json!({"text": "why", "thought": true}));
    }

    #[test]
    fn test_content_skips_malformed_parts() {
        let content = Content::from_value(&json!({
            "role": "user",
            "parts": [{"text": "ok"}, 42, "nope"]
        }));
        assert!(content.is_user());
        assert_eq!(content.parts, vec![Part::Text("ok".to_string())]);
    }

    #[test]
    fn test_content_without_parts() {
        let content = Content::from_value(&json!({"role": "model", "parts": "bad"}));
        assert_eq!(content.role.as_deref(), Some("model"));
        assert!(content.parts.is_empty());
    }
}
