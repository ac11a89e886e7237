// Inspecting HTTP client - a reqwest::Client that reports to the inspector
//
// Calls to the target host are captured: the request body is classified and
// published before the call is sent, and the response body stream is teed so
// the pipeline gets a full copy when the host finishes reading it. Every
// other call goes straight to the wrapped client.

use super::{shielded, CaptureBuffer, TeeBody, TeeStream};
use crate::pipeline::{InterceptedCall, Inspector};
use axum::http;
use bytes::Bytes;
use reqwest::header::CONTENT_ENCODING;
use reqwest::{IntoUrl, Method, Request, RequestBuilder, Response, ResponseBuilderExt};

/// Decorates a `reqwest::Client` with body capture
#[derive(Clone)]
pub struct InspectingClient {
    inner: reqwest::Client,
    inspector: Inspector,
}

impl InspectingClient {
    pub fn new(inner: reqwest::Client, inspector: Inspector) -> Self {
        Self { inner, inspector }
    }

    /// The wrapped client, for calls that must bypass inspection
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    pub fn inspector(&self) -> &Inspector {
        &self.inspector
    }

    /// Start building a request; send it with [`InspectingClient::send`]
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.inner.request(method, url)
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Build and execute a request
    pub async fn send(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        let request = builder.build()?;
        self.execute(request).await
    }

    /// Execute a request, capturing it when it targets the inspected host
    ///
    /// Errors are the wrapped client's own; the inspector never adds any.
    pub async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        if !self.inspector.is_target(request.url()) {
            return self.inner.execute(request).await;
        }

        let call = InterceptedCall::new(request.method().as_str(), request.url().clone());

        let mut capture = CaptureBuffer::default();
        match request.body().map(|body| body.as_bytes()) {
            Some(Some(bytes)) => capture.record(Bytes::copy_from_slice(bytes)),
            Some(None) => {
                tracing::debug!(id = %call.id, "Streaming request body, only the response is inspected")
            }
            None => {}
        }
        if let Some(body) = capture.finish() {
            shielded("request capture", || {
                self.inspector.on_request(&call, &body);
            });
        }

        let response = self.inner.execute(request).await?;
        Ok(self.tee_response(call, response))
    }

    /// Rebuild `response` around a teed body stream
    ///
    /// Status, version, headers, URL and exact content length are carried
    /// over; the body bytes the host reads are exactly the ones upstream sent.
    fn tee_response(&self, call: InterceptedCall, response: Response) -> Response {
        let content_length = response.content_length();
        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let encoding = headers
            .get(CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        let inspector = self.inspector.clone();
        let tee = TeeStream::new(
            response.bytes_stream(),
            content_length,
            Box::new(move |body| inspector.on_response(call, status.as_u16(), encoding, body)),
        );

        // Only the URL extension needs the builder; everything else is typed
        let shell = http::Response::builder()
            .url(url)
            .body(())
            .unwrap_or_else(|_| http::Response::new(()));
        let (mut parts, ()) = shell.into_parts();
        parts.status = status;
        parts.version = version;
        parts.headers = headers;

        Response::from(http::Response::from_parts(
            parts,
            reqwest::Body::wrap(TeeBody::new(tee, content_length)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Emitter;
    use crate::events::EventType;
    use crate::pipeline::InspectorSettings;
    use crate::reassembly::DEFAULT_RAW_TEXT_LIMIT;
    use axum::routing::post;
    use axum::Router;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    const STREAM_BODY: &str = concat!(
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hi \"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"there\"}]},\"finishReason\":\"STOP\"}]}\n\n",
    );

    async fn fake_upstream() -> SocketAddr {
        let app = Router::new().route(
            "/v1beta/models/:model",
            post(|| async { ([("content-type", "text/event-stream")], STREAM_BODY) }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client(target_host: &str) -> InspectingClient {
        let inspector = Inspector::new(
            InspectorSettings {
                target_host: target_host.to_string(),
                raw_text_limit: DEFAULT_RAW_TEXT_LIMIT,
            },
            Emitter::local(16),
        );
        InspectingClient::new(reqwest::Client::new(), inspector)
    }

    #[tokio::test]
    async fn test_non_target_host_passes_through_silently() {
        let addr = fake_upstream().await;
        let client = client("googleapis.com");
        let mut rx = client.inspector().emitter().subscribe().unwrap();

        let url = format!("http://{addr}/v1beta/models/gemini-pro:streamGenerateContent");
        let response = client
            .send(client.post(&url).body(r#"{"contents":[]}"#))
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), STREAM_BODY);

        let nothing = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(nothing.is_err(), "non-target call must not emit events");
    }

    #[tokio::test]
    async fn test_content_length_preserved() {
        let addr = fake_upstream().await;
        let client = client("127.0.0.1");
        let url = format!("http://{addr}/v1beta/models/gemini-pro:streamGenerateContent");

        let direct = client
            .inner()
            .post(&url)
            .body("{}")
            .send()
            .await
            .unwrap();
        let wrapped = client.send(client.post(&url).body("{}")).await.unwrap();

        assert_eq!(direct.content_length(), Some(STREAM_BODY.len() as u64));
        assert_eq!(wrapped.content_length(), direct.content_length());
    }

    #[tokio::test]
    async fn test_target_host_emits_request_then_merged_response() {
        let addr = fake_upstream().await;
        let client = client("127.0.0.1");
        let mut rx = client.inspector().emitter().subscribe().unwrap();

        let url = format!("http://{addr}/v1beta/models/gemini-pro:streamGenerateContent?alt=sse");
        let response = client
            .send(client.post(&url).body(r#"{"contents":[{"role":"user","parts":[{"text":"hello"}]}]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.url().as_str(), url);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        // The host still reads the untouched stream
        assert_eq!(response.text().await.unwrap(), STREAM_BODY);

        let request = rx.recv().await.unwrap();
        assert_eq!(request.event.event_type, EventType::ChatRequest);
        assert_eq!(request.event.model.as_deref(), Some("gemini-pro"));

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.event.event_type, EventType::ChatResponseText);
        assert_eq!(reply.event.status_code, Some(200));
        assert_eq!(reply.event.data["candidates"][0]["content"]["parts"][0]["text"], "Hi there");
        assert_eq!(reply.event.request_id, request.event.request_id);
    }
}
