//! Scripted transport for unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use tally_ai::{
    AssistantTransport, CancelHandle, ChatRequest, ChatResponse, ChunkStream, StreamChunk,
    abortable,
};

/// What the transport does for one call
pub(crate) enum Script {
    /// Stream these items; with `hang`, stay open afterwards until canceled
    Stream {
        items: Vec<tally_ai::Result<StreamChunk>>,
        hang: bool,
    },
    /// Fail to open the stream
    StreamOpenError(tally_ai::Error),
    /// Answer a single-shot request
    Reply(tally_ai::Result<ChatResponse>),
}

impl Script {
    pub(crate) fn chunks(chunks: Vec<StreamChunk>) -> Self {
        Script::Stream {
            items: chunks.into_iter().map(Ok).collect(),
            hang: false,
        }
    }

    pub(crate) fn chunks_then_hang(chunks: Vec<StreamChunk>) -> Self {
        Script::Stream {
            items: chunks.into_iter().map(Ok).collect(),
            hang: true,
        }
    }

    pub(crate) fn reply(reply: &str) -> Self {
        Script::Reply(Ok(ChatResponse {
            mode: Default::default(),
            reply: reply.to_string(),
            references: None,
        }))
    }
}

/// Plays back one [`Script`] per call and records the requests it saw
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    fn next(&self, request: &ChatRequest) -> Option<Script> {
        self.requests.lock().push(request.clone());
        self.scripts.lock().pop_front()
    }
}

#[async_trait]
impl AssistantTransport for ScriptedTransport {
    async fn chat(
        &self,
        request: &ChatRequest,
        cancel: &CancelHandle,
    ) -> tally_ai::Result<ChatResponse> {
        if cancel.is_cancelled() {
            return Err(tally_ai::Error::Aborted);
        }
        match self.next(request) {
            Some(Script::Reply(result)) => result,
            _ => Err(tally_ai::Error::UnexpectedResponse(
                "no scripted reply".into(),
            )),
        }
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancelHandle,
    ) -> tally_ai::Result<ChunkStream> {
        match self.next(request) {
            Some(Script::Stream { items, hang }) => {
                let inner: ChunkStream = if hang {
                    Box::pin(futures::StreamExt::chain(
                        stream::iter(items),
                        stream::pending(),
                    ))
                } else {
                    Box::pin(stream::iter(items))
                };
                Ok(abortable(inner, cancel))
            }
            Some(Script::StreamOpenError(error)) => Err(error),
            _ => Err(tally_ai::Error::UnexpectedResponse(
                "no scripted stream".into(),
            )),
        }
    }
}

/// Answer one HTTP request with a canned JSON body; returns the API root
pub(crate) async fn serve_json_once(status: &'static str, body: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            let complete = text.find("\r\n\r\n").is_some_and(|end| {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                request.len() >= end + 4 + length
            });
            if n == 0 || complete {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });
    format!("http://{}/api/v1", addr)
}
