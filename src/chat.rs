// Conversation types, per-request settings, and the interactive terminal chat.

use std::io::Write;

use anyhow::{Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::footprint::ActivityInputs;
use crate::prompt::DEFAULT_SYSTEM_MESSAGE;
use crate::responder::{ResponseEvent, Responder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

pub const MAX_TOKENS_RANGE: (u32, u32) = (1, 2048);
pub const TEMPERATURE_RANGE: (f64, f64) = (0.1, 4.0);
pub const TOP_P_RANGE: (f64, f64) = (0.1, 1.0);

/// Everything a single `respond` call is configured with besides the message and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub system_message: String,
    #[serde(flatten)]
    pub activity: ActivityInputs,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub use_local_model: bool,
    /// Local model only; `false` means greedy decoding.
    pub do_sample: bool,
    /// Per-request token; overrides the process default.
    #[serde(skip_serializing)]
    pub hf_token: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            activity: ActivityInputs::default(),
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            use_local_model: false,
            do_sample: true,
            hf_token: None,
        }
    }
}

impl ChatSettings {
    /// Generation parameters forced into their supported ranges.
    pub fn clamped(mut self) -> Self {
        self.max_tokens = self.max_tokens.clamp(MAX_TOKENS_RANGE.0, MAX_TOKENS_RANGE.1);
        self.temperature = clamp_f64(self.temperature, TEMPERATURE_RANGE, 0.7);
        self.top_p = clamp_f64(self.top_p, TOP_P_RANGE, 0.95);
        self
    }
}

fn clamp_f64(value: f64, (min, max): (f64, f64), fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Reads lines from stdin and streams each reply to stdout until EOF or `/quit`.
/// History lives only for the duration of the session.
pub async fn run_terminal_chat(responder: &Responder, settings: ChatSettings) -> Result<()> {
    info!("Starting terminal chat session");
    println!("Sustainable.ai: tell me what you're up to (type /quit to leave).");

    let mut history: Vec<ConversationMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
            break;
        };
        let message = line.trim().to_string();
        if message.is_empty() {
            continue;
        }
        if message == "/quit" {
            break;
        }

        let mut stream = responder.respond(&message, &history, settings.clone());
        let mut printed = 0;
        let mut reply = String::new();
        while let Some(event) = stream.next().await {
            match event {
                ResponseEvent::Partial(text) | ResponseEvent::Failed(text) => {
                    // Each element is cumulative; only the tail is new.
                    if let Some(tail) = text.get(printed..) {
                        print!("{tail}");
                        stdout.flush().context("Failed to flush stdout")?;
                    } else {
                        print!("\n{text}");
                    }
                    printed = text.len();
                    reply = text;
                }
                ResponseEvent::Done => break,
            }
        }
        println!();

        history.push(ConversationMessage::user(message));
        history.push(ConversationMessage::assistant(reply));
    }

    info!("Terminal chat session finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ConversationMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ChatSettings::default();
        assert_eq!(settings.max_tokens, 512);
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.top_p, 0.95);
        assert!(!settings.use_local_model);
        assert!(settings.do_sample);
        assert_eq!(settings.system_message, DEFAULT_SYSTEM_MESSAGE);
    }

    #[test]
    fn test_settings_from_partial_json() {
        let settings: ChatSettings = serde_json::from_value(serde_json::json!({
            "car_km": 40.0,
            "meat_meals": 3,
            "temperature": 1.2,
            "do_sample": false,
            "hf_token": "hf_abc"
        }))
        .unwrap();
        assert_eq!(settings.activity.car_km, 40.0);
        assert_eq!(settings.activity.meat_meals, 3.0);
        assert_eq!(settings.temperature, 1.2);
        assert_eq!(settings.max_tokens, 512);
        assert!(!settings.do_sample);
        assert_eq!(settings.hf_token.as_deref(), Some("hf_abc"));
    }

    #[test]
    fn test_clamped_forces_ranges() {
        let settings = ChatSettings {
            max_tokens: 0,
            temperature: 9.0,
            top_p: f64::NAN,
            ..Default::default()
        }
        .clamped();
        assert_eq!(settings.max_tokens, 1);
        assert_eq!(settings.temperature, 4.0);
        assert_eq!(settings.top_p, 0.95);

        let settings = ChatSettings {
            max_tokens: 100_000,
            temperature: 0.0,
            top_p: 0.0,
            ..Default::default()
        }
        .clamped();
        assert_eq!(settings.max_tokens, 2048);
        assert_eq!(settings.temperature, 0.1);
        assert_eq!(settings.top_p, 0.1);
    }
}
