use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    serve, Json, Router,
};
use futures::stream::StreamExt;
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::chat::{ChatSettings, ConversationMessage, MAX_TOKENS_RANGE, TEMPERATURE_RANGE, TOP_P_RANGE};
use crate::constants;
use crate::footprint::{calculate_footprint, ActivityInputs, FootprintResult, DEFAULT_FACTORS};
use crate::responder::{ResponseEvent, ResponseStream, Responder};

/// One chat turn sent by the browser over the WebSocket.
#[derive(Debug, Deserialize)]
pub struct WsChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ConversationMessage>,
    #[serde(default)]
    pub settings: ChatSettings,
}

/// Frames pushed back to the browser while a response streams.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsFrame {
    Partial { text: String },
    Failed { text: String },
    Done,
}

impl From<ResponseEvent> for WsFrame {
    fn from(event: ResponseEvent) -> Self {
        match event {
            ResponseEvent::Partial(text) => WsFrame::Partial { text },
            ResponseEvent::Failed(text) => WsFrame::Failed { text },
            ResponseEvent::Done => WsFrame::Done,
        }
    }
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    responder: Responder,
}

impl AppState {
    pub fn new(responder: Responder, template_dir: &str) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(template_dir)),
            responder,
        }
    }
}

fn create_minijinja_env(template_dir: &str) -> AutoReloader {
    let template_dir = template_dir.to_string();
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&template_dir));
        notifier.watch_path(&template_dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let defaults = ChatSettings::default();
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(minijinja::context! {
                    title => "Sustainable.ai",
                    system_message => defaults.system_message,
                    max_tokens => defaults.max_tokens,
                    max_tokens_range => [MAX_TOKENS_RANGE.0, MAX_TOKENS_RANGE.1],
                    temperature => defaults.temperature,
                    temperature_range => [TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1],
                    top_p => defaults.top_p,
                    top_p_range => [TOP_P_RANGE.0, TOP_P_RANGE.1],
                })
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

async fn footprint_handler(
    Json(inputs): Json<ActivityInputs>,
) -> Result<Json<FootprintResult>, (StatusCode, String)> {
    calculate_footprint(&inputs, &DEFAULT_FACTORS)
        .map(Json)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_frame(socket: &mut WebSocket, frame: &WsFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize frame: {}", e);
            true
        }
    }
}

/// Forwards one response to the socket. Returns false once the client is gone,
/// in which case the response stream is dropped and generation stops.
async fn forward_response(socket: &mut WebSocket, mut stream: ResponseStream) -> bool {
    loop {
        tokio::select! {
            event = stream.next() => {
                let Some(event) = event else {
                    return true;
                };
                if !send_frame(socket, &WsFrame::from(event)).await {
                    warn!("WebSocket client disconnected or send error mid-response");
                    return false;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    info!("Client left while a response was streaming");
                    return false;
                }
                Some(Ok(_)) => warn!("Ignoring client message while a response is streaming"),
            }
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let request: WsChatRequest = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("Rejected malformed chat request: {}", e);
                        let frame = WsFrame::Failed {
                            text: format!("Invalid chat request: {e}"),
                        };
                        if !send_frame(&mut socket, &frame).await {
                            break;
                        }
                        continue;
                    }
                };
                let stream = state
                    .responder
                    .respond(&request.message, &request.history, request.settings);
                if !forward_response(&mut socket, stream).await {
                    break;
                }
            }
            Message::Close(_) => {
                info!("Client requested WebSocket close");
                break;
            }
            _ => {}
        }
    }
    info!("WebSocket connection closed");
}

pub fn build_router(state: AppState, static_dir: &str) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/footprint", post(footprint_handler))
        .route("/healthz", get(health_handler))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(port: u16, responder: Responder) -> Result<()> {
    let state = AppState::new(responder, constants::TEMPLATE_DIR.as_str());
    let app = build_router(state, constants::STATIC_DIR.as_str());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_serialize_with_type_tag() {
        let partial = serde_json::to_value(WsFrame::from(ResponseEvent::Partial("Hi".to_string()))).unwrap();
        assert_eq!(partial, serde_json::json!({"type": "partial", "text": "Hi"}));

        let done = serde_json::to_value(WsFrame::from(ResponseEvent::Done)).unwrap();
        assert_eq!(done, serde_json::json!({"type": "done"}));
    }

    #[test]
    fn test_ws_request_defaults() {
        let request: WsChatRequest = serde_json::from_str(r#"{"message": "hello"}"#).unwrap();
        assert!(request.history.is_empty());
        assert_eq!(request.settings, ChatSettings::default());
    }
}
