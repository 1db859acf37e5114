pub mod chat;
pub mod constants;
pub mod error;
pub mod footprint;
pub mod inference;
pub mod llm_interaction;
pub mod prompt;
pub mod responder;
pub mod web_server;

pub use chat::{ChatSettings, ConversationMessage, Role};
pub use error::RespondError;
pub use footprint::{calculate_footprint, ActivityInputs, EmissionFactors, FootprintResult};
pub use responder::{ResponseEvent, ResponseStream, Responder};
