// Process-wide configuration, read once from the environment (or `.env`).

use std::env;

lazy_static::lazy_static! {
    /// Default bearer token for the hosted inference router. A per-request token takes priority.
    pub static ref HF_TOKEN: Option<String> = env::var("HF_TOKEN").ok().filter(|t| !t.trim().is_empty());
    pub static ref INFERENCE_URL: String = env::var("SUSTAINABLE_INFERENCE_URL").unwrap_or_else(|_| "https://router.huggingface.co/v1".to_string());
    pub static ref CHAT_MODEL: String = env::var("SUSTAINABLE_MODEL").unwrap_or_else(|_| "openai/gpt-oss-20b".to_string());
    pub static ref OLLAMA_URL: String = env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
    pub static ref LOCAL_MODEL: String = env::var("SUSTAINABLE_LOCAL_MODEL").unwrap_or_else(|_| "gemma3:1b".to_string());
    pub static ref TEMPLATE_DIR: String = env::var("SUSTAINABLE_TEMPLATE_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("SUSTAINABLE_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
}

/// Connect timeout for the hosted router, in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Longest silence tolerated between two reads of a streamed response, in seconds.
pub const READ_TIMEOUT_SECS: u64 = 60;
