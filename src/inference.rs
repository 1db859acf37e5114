//! Streaming client for an OpenAI-compatible chat completions endpoint
//! (the Hugging Face inference router by default).

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, Stream};
use futures::{FutureExt, StreamExt};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::chat::ConversationMessage;
use crate::constants;
use crate::error::RespondError;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

/// One streamed fragment, resolved from whatever shape the backend sent.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Incremental text to append.
    Delta(String),
    /// A complete message, usually on the terminal chunk.
    Final(String),
    /// Anything unrecognised; contributes no text.
    Unknown,
}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, RespondError>>;

/// A connected generation backend that streams chunks for a transcript.
pub trait ChatBackend: Send + Sync {
    fn stream_chat(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChunkStream, RespondError>>;
}

/// Builds a [`ChatBackend`] for a resolved credential.
pub trait BackendProvider: Send + Sync {
    fn connect(&self, credential: &str) -> Result<Arc<dyn ChatBackend>, RespondError>;
}

/// Maps a decoded chunk onto [`StreamChunk`]. Never fails.
pub fn classify_chunk(value: &Value) -> StreamChunk {
    let Some(choice) = value.get("choices").and_then(|c| c.get(0)) else {
        return StreamChunk::Unknown;
    };
    if let Some(text) = choice.pointer("/delta/content").and_then(Value::as_str) {
        return StreamChunk::Delta(text.to_string());
    }
    if let Some(text) = choice.pointer("/message/content").and_then(Value::as_str) {
        return StreamChunk::Final(text.to_string());
    }
    StreamChunk::Unknown
}

/// Accepts `org/name` with an optional `:provider` suffix.
fn validate_model_id(model: &str) -> Result<(), RespondError> {
    let name = model.split_once(':').map_or(model, |(name, _)| name);
    let valid = !model.chars().any(char::is_whitespace)
        && matches!(name.split_once('/'), Some((org, repo)) if !org.is_empty() && !repo.is_empty() && !repo.contains('/'));
    if valid {
        Ok(())
    } else {
        Err(RespondError::BackendInit(format!(
            "malformed model identifier '{model}' (expected 'org/name')"
        )))
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ConversationMessage],
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    stream: bool,
}

/// Shared HTTP client for the router. The read timeout bounds the gap between
/// two reads, so a stalled stream fails instead of hanging.
pub fn build_http_client(connect_timeout: Duration, read_timeout: Duration) -> Result<Client, RespondError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .build()
        .map_err(|e| RespondError::BackendInit(e.to_string()))
}

/// One credential bound to a shared [`Client`].
pub struct InferenceClient {
    http: Client,
    auth: HeaderValue,
    endpoint: String,
    model: String,
}

impl InferenceClient {
    pub fn new(http: Client, base_url: &str, model: &str, token: &str) -> Result<Self, RespondError> {
        validate_model_id(model)?;
        Url::parse(base_url)
            .map_err(|e| RespondError::BackendInit(format!("invalid base URL '{base_url}': {e}")))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            RespondError::BackendInit("credential is not a valid HTTP header value".to_string())
        })?;
        auth.set_sensitive(true);

        Ok(Self {
            http,
            auth,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model, messages = request.messages.len()))]
    async fn send(&self, request: ChatRequest) -> Result<ChunkStream, RespondError> {
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stream: true,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, self.auth.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| RespondError::BackendCall(format!("could not reach {}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Inference API request failed");
            return Err(RespondError::BackendCall(format!("{status}: {error_body}")));
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(true, |ct| !ct.starts_with("application/json"));

        if is_event_stream {
            debug!("Streaming response started");
            Ok(sse_chunks(response.bytes_stream()))
        } else {
            // Backend ignored stream=true and returned the whole completion.
            let value = response.json::<Value>().await?;
            Ok(stream::iter([Ok(classify_chunk(&value))]).boxed())
        }
    }
}

impl ChatBackend for InferenceClient {
    fn stream_chat(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChunkStream, RespondError>> {
        self.send(request).boxed()
    }
}

/// Hosted router configuration. Every credential shares one connection pool.
#[derive(Debug, Clone)]
pub struct HfRouterProvider {
    http: Client,
    pub base_url: String,
    pub model: String,
}

impl HfRouterProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, RespondError> {
        let http = build_http_client(
            Duration::from_secs(constants::CONNECT_TIMEOUT_SECS),
            Duration::from_secs(constants::READ_TIMEOUT_SECS),
        )?;
        Ok(Self::with_client(http, base_url, model))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    pub fn from_env() -> Result<Self, RespondError> {
        Self::new(constants::INFERENCE_URL.as_str(), constants::CHAT_MODEL.as_str())
    }
}

impl BackendProvider for HfRouterProvider {
    fn connect(&self, credential: &str) -> Result<Arc<dyn ChatBackend>, RespondError> {
        let client = InferenceClient::new(self.http.clone(), &self.base_url, &self.model, credential)?;
        Ok(Arc::new(client))
    }
}

struct SseState<S> {
    inner: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamChunk, RespondError>>,
    finished: bool,
}

impl<S> SseState<S> {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(data) = line.strip_prefix("data:") else {
            // event:, id:, retry:, comments and blank separators
            return;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.finished = true;
            return;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(value) => {
                if let Some(err) = value.get("error") {
                    let cause = err
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| err.to_string());
                    self.pending.push_back(Err(RespondError::BackendCall(cause)));
                    self.finished = true;
                } else {
                    self.pending.push_back(Ok(classify_chunk(&value)));
                }
            }
            Err(e) => {
                warn!("Failed to parse stream event: {} - Error: {}", data, e);
                self.pending.push_back(Ok(StreamChunk::Unknown));
            }
        }
    }
}

/// Decodes a server-sent-event byte stream into chunks. Lines split across
/// network reads are reassembled before decoding.
pub fn sse_chunks<S, B, E>(inner: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        inner: Box::pin(inner),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    st.buffer.extend_from_slice(bytes.as_ref());
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((
                        Err(RespondError::BackendCall(format!("stream interrupted: {e}"))),
                        st,
                    ));
                }
                None => {
                    // Trailing event without a final newline.
                    if !st.buffer.is_empty() {
                        let rest = std::mem::take(&mut st.buffer);
                        st.handle_line(&String::from_utf8_lossy(&rest));
                    }
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}
