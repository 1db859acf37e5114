//! Turns one user message into a stream of cumulative response texts.
//!
//! Each call to [`Responder::respond`] spawns a producer task that resolves a
//! credential, estimates the footprint, composes the system prompt and pulls
//! chunks from the backend. Events travel over a bounded channel, so the
//! producer only runs ahead of the consumer by one event. Dropping the
//! [`ResponseStream`] stops the producer and closes the backend connection.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chat::{ChatSettings, ConversationMessage};
use crate::constants;
use crate::error::RespondError;
use crate::footprint::{calculate_footprint, EmissionFactors, DEFAULT_FACTORS};
use crate::inference::{BackendProvider, ChatRequest, HfRouterProvider, StreamChunk};
use crate::llm_interaction::{LocalGenerator, LocalParams, OllamaGenerator};
use crate::prompt::{build_transcript, compose_system_prompt, flatten_transcript};

const EVENT_BUFFER: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// The full response so far.
    Partial(String),
    /// Generation finished normally.
    Done,
    /// Generation stopped; carries any partial text followed by the diagnostic.
    Failed(String),
}

impl ResponseEvent {
    pub fn into_text(self) -> Option<String> {
        match self {
            ResponseEvent::Partial(text) | ResponseEvent::Failed(text) => Some(text),
            ResponseEvent::Done => None,
        }
    }
}

/// Consumer side of a response. Ends after `Done` or `Failed`.
pub struct ResponseStream {
    rx: mpsc::Receiver<ResponseEvent>,
    finished: bool,
}

impl ResponseStream {
    fn new(rx: mpsc::Receiver<ResponseEvent>) -> Self {
        Self { rx, finished: false }
    }

    /// Only the displayable texts, each one cumulative.
    pub fn texts(self) -> impl Stream<Item = String> + Send {
        self.filter_map(|event| futures::future::ready(event.into_text()))
    }

    pub async fn collect_texts(self) -> Vec<String> {
        self.texts().collect().await
    }
}

impl Stream for ResponseStream {
    type Item = ResponseEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if !matches!(event, ResponseEvent::Partial(_)) {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// An explicit, non-blank per-request token wins over the process default.
pub fn resolve_credential(explicit: Option<&str>, default: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| default.map(str::trim).filter(|t| !t.is_empty()))
        .map(str::to_string)
}

/// Folds one chunk into the accumulator. A final message that extends what we
/// already have replaces it; otherwise it is appended, so the accumulator only grows.
pub fn apply_chunk(acc: &mut String, chunk: StreamChunk) {
    match chunk {
        StreamChunk::Delta(text) => acc.push_str(&text),
        StreamChunk::Final(text) => {
            if text.starts_with(acc.as_str()) {
                *acc = text;
            } else {
                acc.push_str(&text);
            }
        }
        StreamChunk::Unknown => {}
    }
}

fn render_failure(partial: &str, error: &RespondError) -> String {
    if partial.is_empty() {
        error.user_message()
    } else {
        format!("{partial}\n\n{}", error.user_message())
    }
}

enum Outcome {
    Completed,
    Cancelled,
}

#[derive(Clone)]
pub struct Responder {
    provider: Arc<dyn BackendProvider>,
    local: Arc<dyn LocalGenerator>,
    factors: EmissionFactors,
    default_token: Option<String>,
}

impl Responder {
    pub fn new(
        provider: Arc<dyn BackendProvider>,
        local: Arc<dyn LocalGenerator>,
        factors: EmissionFactors,
        default_token: Option<String>,
    ) -> Self {
        Self {
            provider,
            local,
            factors,
            default_token,
        }
    }

    /// Hosted router, local Ollama and `HF_TOKEN` as configured in the environment.
    pub fn from_env() -> Result<Self, RespondError> {
        Ok(Self::new(
            Arc::new(HfRouterProvider::from_env()?),
            Arc::new(OllamaGenerator::from_env()),
            DEFAULT_FACTORS,
            constants::HF_TOKEN.clone(),
        ))
    }

    /// Must be called from within a tokio runtime.
    pub fn respond(
        &self,
        message: &str,
        history: &[ConversationMessage],
        settings: ChatSettings,
    ) -> ResponseStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let responder = self.clone();
        let message = message.to_string();
        let history = history.to_vec();
        let settings = settings.clamped();

        tokio::spawn(async move {
            responder.produce(message, history, settings, tx).await;
        });

        ResponseStream::new(rx)
    }

    async fn produce(
        self,
        message: String,
        history: Vec<ConversationMessage>,
        settings: ChatSettings,
        tx: mpsc::Sender<ResponseEvent>,
    ) {
        info!(
            local = settings.use_local_model,
            history = history.len(),
            "Generating response"
        );

        let mut acc = String::new();
        let outcome = tokio::select! {
            _ = tx.closed() => {
                debug!("Response consumer went away, stopping generation");
                return;
            }
            outcome = self.run(&message, &history, &settings, &mut acc, &tx) => outcome,
        };

        let event = match outcome {
            Ok(Outcome::Completed) => {
                debug!(chars = acc.len(), "Response complete");
                ResponseEvent::Done
            }
            Ok(Outcome::Cancelled) => return,
            Err(e) => {
                warn!(error = %e, partial_chars = acc.len(), "Response generation failed");
                ResponseEvent::Failed(render_failure(&acc, &e))
            }
        };
        let _ = tx.send(event).await;
    }

    async fn run(
        &self,
        message: &str,
        history: &[ConversationMessage],
        settings: &ChatSettings,
        acc: &mut String,
        tx: &mpsc::Sender<ResponseEvent>,
    ) -> Result<Outcome, RespondError> {
        if settings.use_local_model {
            return self.run_local(message, history, settings, acc, tx).await;
        }

        let token = resolve_credential(settings.hf_token.as_deref(), self.default_token.as_deref())
            .ok_or(RespondError::MissingCredential)?;

        let footprint = calculate_footprint(&settings.activity, &self.factors)?;
        let system_prompt = compose_system_prompt(&footprint, &settings.system_message);
        let messages = build_transcript(system_prompt, history, message);

        let backend = self.provider.connect(&token)?;
        let mut chunks = backend
            .stream_chat(ChatRequest {
                messages,
                max_tokens: settings.max_tokens,
                temperature: settings.temperature,
                top_p: settings.top_p,
            })
            .await?;

        while let Some(chunk) = chunks.next().await {
            apply_chunk(acc, chunk?);
            if tx.send(ResponseEvent::Partial(acc.clone())).await.is_err() {
                return Ok(Outcome::Cancelled);
            }
        }
        Ok(Outcome::Completed)
    }

    async fn run_local(
        &self,
        message: &str,
        history: &[ConversationMessage],
        settings: &ChatSettings,
        acc: &mut String,
        tx: &mpsc::Sender<ResponseEvent>,
    ) -> Result<Outcome, RespondError> {
        let footprint = calculate_footprint(&settings.activity, &self.factors)?;
        let system_prompt = compose_system_prompt(&footprint, &settings.system_message);
        let prompt = flatten_transcript(&build_transcript(system_prompt, history, message));

        let text = self
            .local
            .generate(
                prompt,
                LocalParams {
                    max_new_tokens: settings.max_tokens,
                    do_sample: settings.do_sample,
                    temperature: settings.temperature,
                    top_p: settings.top_p,
                },
            )
            .await?;
        acc.push_str(&text);

        if tx.send(ResponseEvent::Partial(acc.clone())).await.is_err() {
            return Ok(Outcome::Cancelled);
        }
        Ok(Outcome::Completed)
    }
}
