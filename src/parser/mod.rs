// Parser module - shared helpers for reading Gemini payloads
//
// The classifier and the reassembler both look at bodies that may be wrapped
// (`{"request": {...}}` / `{"response": {...}}`), may be partial, and may hold
// values of unexpected types. These helpers read them without ever failing.

pub mod models;

use models::{Content, Part};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Wrapper key the Code Assist API uses around request payloads
pub const REQUEST_WRAPPER: &str = "request";

/// Wrapper key the Code Assist API uses around response payloads
pub const RESPONSE_WRAPPER: &str = "response";

/// JavaScript-style truthiness for a JSON value
///
/// Payload predicates check "is this field present" the way the agent's own
/// tooling does: `null`, `false`, `0` and `""` count as absent, while empty
/// arrays and objects count as present.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Truthiness of an optional field lookup
pub fn is_present(value: Option<&Value>) -> bool {
    value.is_some_and(is_truthy)
}

/// Return the payload inside `wrapper` when it is present, else the body itself
pub fn unwrap_payload<'a>(body: &'a Value, wrapper: &str) -> &'a Value {
    match body.get(wrapper) {
        Some(inner) if is_truthy(inner) => inner,
        _ => body,
    }
}

/// Render a JSON value for a summary line (strings without quotes)
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn model_path_regex() -> Option<&'static Regex> {
    static MODEL_PATH: OnceLock<Option<Regex>> = OnceLock::new();
    MODEL_PATH
        .get_or_init(|| Regex::new(r"/models/([^:/?]+)").ok())
        .as_ref()
}

/// Pull the model id out of a request
///
/// Lookup order: `body.model`, then the unwrapped payload's `model`, then the
/// `/models/<id>:method` URL path segment.
pub fn extract_model(path: &str, body: &Value, payload: &Value) -> Option<String> {
    let from_field = |value: &Value| {
        value
            .get("model")
            .filter(|m| is_truthy(m))
            .map(display_value)
    };

    from_field(body).or_else(|| from_field(payload)).or_else(|| {
        model_path_regex()?
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// First entry of `candidates`, if the array is non-empty
pub fn first_candidate(payload: &Value) -> Option<&Value> {
    payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
}

/// Parts of a candidate's content, decoded leniently
pub fn candidate_parts(candidate: &Value) -> Vec<Part> {
    candidate
        .get("content")
        .map(|content| Content::from_value(content).parts)
        .unwrap_or_default()
}

/// The request's `contents` array, decoded leniently
pub fn request_contents(payload: &Value) -> Vec<Content> {
    payload
        .get("contents")
        .and_then(Value::as_array)
        .map(|contents| contents.iter().map(Content::from_value).collect())
        .unwrap_or_default()
}

/// Texts of the system instruction parts, joined by a space
pub fn system_instruction_text(payload: &Value) -> String {
    payload
        .get("systemInstruction")
        .map(Content::from_value)
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(Part::text)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness_matches_js() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!(-1)));
    }

    #[test]
    fn test_unwrap_payload() {
        let wrapped = json!({"request": {"contents": []}, "project": "p"});
        assert_eq!(unwrap_payload(&wrapped, REQUEST_WRAPPER), &json!({"contents": []}));

        let bare = json!({"contents": []});
        assert_eq!(unwrap_payload(&bare, REQUEST_WRAPPER), &bare);

        let null_wrapper = json!({"response": null, "candidates": []});
        assert_eq!(unwrap_payload(&null_wrapper, RESPONSE_WRAPPER), &null_wrapper);
    }

    #[test]
    fn test_extract_model_precedence() {
        let path = "/v1beta/models/gemini-pro:generateContent";

        let body = json!({"model": "from-body", "request": {"model": "from-payload"}});
        let payload = unwrap_payload(&body, REQUEST_WRAPPER);
        assert_eq!(extract_model(path, &body, payload).as_deref(), Some("from-body"));

        let body = json!({"request": {"model": "from-payload"}});
        let payload = unwrap_payload(&body, REQUEST_WRAPPER);
        assert_eq!(extract_model(path, &body, payload).as_deref(), Some("from-payload"));

        let body = json!({"contents": []});
        assert_eq!(extract_model(path, &body, &body).as_deref(), Some("gemini-pro"));

        assert_eq!(extract_model("/v1internal:generateContent", &body, &body), None);
    }

    #[test]
    fn test_system_instruction_text() {
        let payload = json!({
            "systemInstruction": {"parts": [{"text": "You are a router."}, {"text": "Pick one."}]}
        });
        assert_eq!(system_instruction_text(&payload), "You are a router. Pick one.");
        assert_eq!(system_instruction_text(&json!({"systemInstruction": "plain"})), "");
    }

    #[test]
    fn test_first_candidate_requires_non_empty_array() {
        assert!(first_candidate(&json!({"candidates": []})).is_none());
        assert!(first_candidate(&json!({"candidates": {}})).is_none());
        assert!(first_candidate(&json!({"candidates": [{"content": {}}]})).is_some());
    }
}
