//! Proxy error types and response handling
//!
//! Errors are returned in the Gemini API error shape so agents surface them
//! the same way they surface upstream failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors that can occur during proxying
#[derive(Debug)]
pub(crate) enum ProxyError {
    BodyRead(String),
    Upstream(String),
    Timeout(String),
}

impl ProxyError {
    /// Classify a reqwest failure from the upstream call
    pub(crate) fn from_upstream(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(err.to_string())
        } else {
            ProxyError::Upstream(err.to_string())
        }
    }

    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ProxyError::BodyRead(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            ProxyError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UNAVAILABLE"),
            ProxyError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED"),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, status_name) = self.status();
        let message = match self {
            ProxyError::BodyRead(msg) | ProxyError::Upstream(msg) | ProxyError::Timeout(msg) => msg,
        };

        tracing::error!("Proxy error: {} - {}", status, message);

        let body = json!({
            "error": {
                "code": status.as_u16(),
                "message": format!("gemini-inspector proxy: {}", message),
                "status": status_name,
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_body_uses_gemini_shape() {
        let response = ProxyError::Upstream("connection refused".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], 502);
        assert_eq!(body["error"]["status"], "UNAVAILABLE");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[test]
    fn test_body_read_is_client_error() {
        let (status, name) = ProxyError::BodyRead("truncated".to_string()).status();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(name, "INVALID_ARGUMENT");
    }
}
