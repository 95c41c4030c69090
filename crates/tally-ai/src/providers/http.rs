//! HTTP transport for the bookkeeping server's assistant endpoints

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;

use super::{AssistantTransport, endpoint_url};
use crate::{
    cancel::{CancelHandle, abortable},
    error::{Error, Result},
    stream::{ChunkStream, StreamChunk},
    types::{ChatRequest, ChatResponse},
};

const CHAT_PATH: &str = "llm/assistant/chat.json";
const CHAT_STREAM_PATH: &str = "llm/assistant/chat_stream.json";

/// Message used when the server answers without a usable result
const NO_RESULT_MESSAGE: &str = "Unable to get AI assistant response";

/// Client for the assistant API of a bookkeeping server
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Create a transport for the API rooted at `base_url` (e.g. `https://host/api/v1`)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: None,
            timeout: None,
        }
    }

    /// Authenticate with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Limit single-shot requests to `timeout`. Streams are not time-limited.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str, request: &ChatRequest) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(endpoint_url(&self.base_url, path))
            .json(request);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Prepare a request for the wire, rejecting what the server would refuse
fn prepare(request: &ChatRequest) -> Result<ChatRequest> {
    let request = request.clone().fit_to_limits();
    request.validate()?;
    Ok(request)
}

#[async_trait]
impl AssistantTransport for HttpTransport {
    async fn chat(&self, request: &ChatRequest, cancel: &CancelHandle) -> Result<ChatResponse> {
        let request = prepare(request)?;
        let mut builder = self.post(CHAT_PATH, &request);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let token = cancel.token().clone();
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Aborted),
            response = builder.send() => response?,
        };

        let status = response.status();
        let body = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Aborted),
            body = response.text() => body?,
        };

        parse_response(status, &body)
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancelHandle,
    ) -> Result<ChunkStream> {
        let request = prepare(request)?;
        let builder = self
            .post(CHAT_STREAM_PATH, &request)
            .header(reqwest::header::ACCEPT, "text/event-stream");

        let event_source = EventSource::new(builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;
        let event_source = open(event_source, cancel).await?;

        Ok(abortable(Box::pin(create_stream(event_source)), cancel))
    }
}

/// Response envelope used by every server endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_result(self) -> Result<T> {
        if let Some(message) = self.error_message.filter(|m| !m.trim().is_empty()) {
            return Err(Error::api(self.error_code, message));
        }
        match self.result {
            Some(result) if self.success => Ok(result),
            _ => Err(Error::UnexpectedResponse(NO_RESULT_MESSAGE.to_string())),
        }
    }
}

/// Failures the shared interceptor reports itself; callers must not report them again
fn intercepted(status: StatusCode, body: &str) -> Option<Error> {
    if status != StatusCode::UNAUTHORIZED {
        return None;
    }
    let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body)
        .ok()
        .and_then(|e| e.error_message)
        .unwrap_or_else(|| "unauthorized".to_string());
    tracing::warn!("Assistant request rejected ({}): {}", status, message);
    Some(Error::Processed {
        status: status.as_u16(),
        message,
    })
}

fn parse_response(status: StatusCode, body: &str) -> Result<ChatResponse> {
    if let Some(err) = intercepted(status, body) {
        return Err(err);
    }
    match serde_json::from_str::<ApiEnvelope<ChatResponse>>(body) {
        Ok(envelope) => envelope.into_result(),
        Err(_) if !status.is_success() => Err(Error::UnexpectedResponse(format!(
            "status {}: {}",
            status, body
        ))),
        Err(e) => Err(Error::Json(e)),
    }
}

/// Strip the `{success, result}` envelope if the event carries one
fn unwrap_envelope(value: serde_json::Value) -> Result<serde_json::Value> {
    if value.get("success").is_none() {
        return Ok(value);
    }
    serde_json::from_value::<ApiEnvelope<serde_json::Value>>(value)?.into_result()
}

fn parse_event(data: &str) -> Result<Option<StreamChunk>> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    StreamChunk::decode(unwrap_envelope(value)?)
}

/// Wait for the stream handshake so a refused request fails before any chunk is expected
async fn open(mut event_source: EventSource, cancel: &CancelHandle) -> Result<EventSource> {
    let token = cancel.token().clone();
    let first = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        event = event_source.next() => Some(event),
    };

    match first {
        None => {
            event_source.close();
            Err(Error::Aborted)
        }
        Some(Some(Ok(Event::Open))) => Ok(event_source),
        Some(Some(Ok(Event::Message(_)))) => {
            event_source.close();
            Err(Error::Sse("message received before the stream opened".to_string()))
        }
        Some(Some(Err(e))) => {
            event_source.close();
            Err(stream_error(e).await)
        }
        Some(None) => Err(Error::Sse("event source closed before opening".to_string())),
    }
}

/// Map an event source failure, reading the body of a rejected response
async fn stream_error(error: reqwest_eventsource::Error) -> Error {
    match error {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            rejected(status, &body)
        }
        reqwest_eventsource::Error::InvalidContentType(_, response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            rejected(status, &body)
        }
        reqwest_eventsource::Error::Transport(e) => Error::Http(e),
        other => Error::Sse(other.to_string()),
    }
}

fn rejected(status: StatusCode, body: &str) -> Error {
    intercepted(status, body).unwrap_or_else(|| {
        serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body)
            .ok()
            .and_then(|e| e.into_result().err())
            .unwrap_or_else(|| Error::UnexpectedResponse(format!("status {}: {}", status, body)))
    })
}

/// Chunks from an event source that has already opened
fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = Result<StreamChunk>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    let data = msg.data.trim();
                    if data.is_empty() {
                        continue;
                    }
                    if data == "[DONE]" {
                        break;
                    }

                    match parse_event(data) {
                        Ok(Some(chunk)) => {
                            let terminal = chunk.is_terminal();
                            yield Ok(chunk);
                            if terminal {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            event_source.close();
                            yield Err(e);
                            return;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    event_source.close();
                    yield Err(stream_error(e).await);
                    return;
                }
            }
        }
        // The event source reconnects on its own unless closed.
        event_source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssistantMode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read one request, headers and body, off `socket`
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        )
    }

    fn sse_body(events: &[&str]) -> String {
        events.iter().map(|e| format!("data: {}\n\n", e)).collect()
    }

    /// Serve one canned response; returns the API root
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/api/v1", addr)
    }

    async fn collect(stream: ChunkStream) -> Vec<Result<StreamChunk>> {
        stream.collect().await
    }

    #[test]
    fn test_parse_response_success() {
        let body = r#"{"success":true,"result":{"mode":"chat","reply":"You spent $42."}}"#;
        let resp = parse_response(StatusCode::OK, body).unwrap();
        assert_eq!(resp.mode, AssistantMode::Chat);
        assert_eq!(resp.reply, "You spent $42.");
    }

    #[test]
    fn test_parse_response_server_message() {
        let body = r#"{"success":false,"errorCode":200005,"errorMessage":"ai assistant is not enabled"}"#;
        let err = parse_response(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert_eq!(err.server_message(), Some("ai assistant is not enabled"));
    }

    #[test]
    fn test_parse_response_missing_result() {
        let err = parse_response(StatusCode::OK, r#"{"success":true}"#).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
        let err = parse_response(StatusCode::OK, r#"{"success":false,"result":{"reply":"x"}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[test]
    fn test_parse_response_unauthorized_is_processed() {
        let err = parse_response(StatusCode::UNAUTHORIZED, "").unwrap_err();
        assert!(matches!(err, Error::Processed { status: 401, .. }));
    }

    #[test]
    fn test_parse_response_non_json_error_page() {
        let err = parse_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[test]
    fn test_parse_event_envelope_and_bare() {
        let wrapped = r#"{"success":true,"result":{"type":"reply_delta","delta":"Hi"}}"#;
        assert_eq!(parse_event(wrapped).unwrap(), Some(StreamChunk::reply_delta("Hi")));

        let bare = r#"{"type":"thinking_delta","delta":"hm"}"#;
        assert_eq!(parse_event(bare).unwrap(), Some(StreamChunk::thinking_delta("hm")));
    }

    #[test]
    fn test_parse_event_error_envelope() {
        let data = r#"{"success":false,"errorCode":1,"errorMessage":"failed to request third party api"}"#;
        let err = parse_event(data).unwrap_err();
        assert_eq!(err.server_message(), Some("failed to request third party api"));
    }

    #[test]
    fn test_parse_event_unknown_kind() {
        assert_eq!(parse_event(r#"{"type":"heartbeat"}"#).unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_network() {
        let transport = HttpTransport::new("http://127.0.0.1:9");
        let err = transport
            .chat(&ChatRequest::chat("  ", vec![]), &CancelHandle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let transport = HttpTransport::new("http://127.0.0.1:9");
        let handle = CancelHandle::new();
        handle.cancel();
        let err = transport
            .chat(&ChatRequest::chat("hello", vec![]), &handle)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }

    #[tokio::test]
    async fn test_stream_success() {
        let body = sse_body(&[
            r#"{"type":"thinking_delta","delta":"Looking at groceries"}"#,
            r#"{"success":true,"result":{"type":"reply_delta","delta":"You spent "}}"#,
            r#"{"type":"reply_delta","delta":"$42.50."}"#,
            r#"{"type":"references","references":[{"id":"3012","time":1717000000,"type":3,"sourceAmount":4250}]}"#,
            r#"{"type":"done"}"#,
            r#"{"type":"reply_delta","delta":"ignored"}"#,
        ]);
        let base_url = serve_once(http_response("200 OK", "text/event-stream", &body)).await;

        let transport = HttpTransport::new(base_url).with_token("secret");
        let stream = transport
            .chat_stream(&ChatRequest::chat("groceries?", vec![]), &CancelHandle::new())
            .await
            .unwrap();
        let chunks: Vec<StreamChunk> = collect(stream)
            .await
            .into_iter()
            .map(|item| item.unwrap())
            .collect();

        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0], StreamChunk::thinking_delta("Looking at groceries"));
        assert_eq!(chunks[1], StreamChunk::reply_delta("You spent "));
        assert_eq!(chunks[2], StreamChunk::reply_delta("$42.50."));
        match &chunks[3] {
            StreamChunk::References {
                references: Some(references),
            } => {
                assert_eq!(references.len(), 1);
                assert_eq!(references[0].id, "3012");
            }
            other => panic!("expected references, got {:?}", other),
        }
        assert!(chunks[4].is_terminal());
    }

    #[tokio::test]
    async fn test_stream_refused_fails_at_open() {
        let body = r#"{"success":false,"errorCode":200005,"errorMessage":"llm provider is not enabled"}"#;
        let base_url =
            serve_once(http_response("400 Bad Request", "application/json", body)).await;

        let result = HttpTransport::new(base_url)
            .chat_stream(&ChatRequest::chat("hi", vec![]), &CancelHandle::new())
            .await;
        let err = result.err().unwrap();
        assert_eq!(err.server_message(), Some("llm provider is not enabled"));
    }

    #[tokio::test]
    async fn test_stream_unauthorized_is_processed() {
        let body = r#"{"success":false,"errorMessage":"token is expired"}"#;
        let base_url =
            serve_once(http_response("401 Unauthorized", "application/json", body)).await;

        let result = HttpTransport::new(base_url)
            .chat_stream(&ChatRequest::chat("hi", vec![]), &CancelHandle::new())
            .await;
        assert!(matches!(
            result.err().unwrap(),
            Error::Processed { status: 401, .. }
        ));
    }

    #[tokio::test]
    async fn test_stream_error_envelope_mid_stream() {
        let body = sse_body(&[
            r#"{"type":"reply_delta","delta":"Partial"}"#,
            r#"{"success":false,"errorCode":1,"errorMessage":"failed to request third party api"}"#,
            r#"{"type":"reply_delta","delta":"never"}"#,
        ]);
        let base_url = serve_once(http_response("200 OK", "text/event-stream", &body)).await;

        let stream = HttpTransport::new(base_url)
            .chat_stream(&ChatRequest::chat("hi", vec![]), &CancelHandle::new())
            .await
            .unwrap();
        let items = collect(stream).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &StreamChunk::reply_delta("Partial"));
        assert_eq!(
            items[1].as_ref().unwrap_err().server_message(),
            Some("failed to request third party api")
        );
    }

    #[tokio::test]
    async fn test_stream_ends_without_done() {
        let body = sse_body(&[r#"{"type":"reply_delta","delta":"Hi"}"#]);
        let base_url = serve_once(http_response("200 OK", "text/event-stream", &body)).await;

        let stream = HttpTransport::new(base_url)
            .chat_stream(&ChatRequest::chat("hi", vec![]), &CancelHandle::new())
            .await
            .unwrap();
        let items = collect(stream).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), &StreamChunk::reply_delta("Hi"));
    }

    #[tokio::test]
    async fn test_cancel_during_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            // Never answer
            std::future::pending::<()>().await;
        });

        let handle = CancelHandle::new();
        let canceler = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceler.cancel();
        });

        let result = HttpTransport::new(format!("http://{}/api/v1", addr))
            .chat_stream(&ChatRequest::chat("hi", vec![]), &handle)
            .await;
        assert!(result.err().unwrap().is_aborted());
    }
}
