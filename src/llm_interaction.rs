// Local, non-streaming generation through an Ollama instance on this machine.

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::constants;
use crate::error::RespondError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalParams {
    pub max_new_tokens: u32,
    pub do_sample: bool,
    pub temperature: f64,
    pub top_p: f64,
}

/// Produces one complete continuation for a flattened prompt.
pub trait LocalGenerator: Send + Sync {
    fn generate(&self, prompt: String, params: LocalParams) -> BoxFuture<'_, Result<String, RespondError>>;
}

// Structures matching Ollama's /api/generate endpoint
#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(constants::OLLAMA_URL.as_str(), constants::LOCAL_MODEL.as_str())
    }

    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate_once(&self, prompt: String, params: LocalParams) -> Result<String, RespondError> {
        let ollama_api_url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));

        let request_payload = OllamaRequest {
            model: self.model.clone(),
            prompt,
            stream: false,
            options: OllamaOptions {
                num_predict: params.max_new_tokens,
                // Greedy decoding when sampling is off.
                temperature: if params.do_sample { params.temperature } else { 0.0 },
                top_p: params.top_p,
            },
        };

        let response = self
            .client
            .post(&ollama_api_url)
            .json(&request_payload)
            .send()
            .await
            .map_err(|e| {
                RespondError::BackendCall(format!("Failed to send request to Ollama API at {ollama_api_url}: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Ollama API request failed");
            return Err(RespondError::BackendCall(format!(
                "Ollama API request failed with status {status}: {error_body}"
            )));
        }

        let ollama_response = response.json::<OllamaResponse>().await.map_err(|e| {
            RespondError::BackendCall(format!("Failed to parse JSON response from Ollama API: {e}"))
        })?;

        debug!(done = ollama_response.done, "Received Ollama response");

        Ok(ollama_response.response.trim().to_string())
    }
}

impl LocalGenerator for OllamaGenerator {
    fn generate(&self, prompt: String, params: LocalParams) -> BoxFuture<'_, Result<String, RespondError>> {
        self.generate_once(prompt, params).boxed()
    }
}
