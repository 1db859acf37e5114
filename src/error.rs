use thiserror::Error;

use crate::footprint::FootprintError;

/// Shown when no token can be resolved for the hosted router.
pub const MISSING_TOKEN_WARNING: &str = "⚠️ No Hugging Face token found. Please sign in or set the HF_TOKEN environment variable to chat with Sustainable.ai.";

/// Failures that end a response. None of them escape `Responder::respond`;
/// each is rendered into the final element of the response stream.
#[derive(Debug, Error)]
pub enum RespondError {
    #[error("no credential available for the inference backend")]
    MissingCredential,

    #[error("failed to initialise inference client: {0}")]
    BackendInit(String),

    #[error("inference request failed: {0}")]
    BackendCall(String),

    #[error(transparent)]
    InvalidInput(#[from] FootprintError),
}

impl RespondError {
    /// Human-readable diagnostic, including the underlying cause.
    pub fn user_message(&self) -> String {
        match self {
            RespondError::MissingCredential => MISSING_TOKEN_WARNING.to_string(),
            RespondError::BackendInit(cause) => {
                format!("⚠️ Could not set up the model client: {cause}")
            }
            RespondError::BackendCall(cause) => {
                format!("⚠️ Sorry, something went wrong while generating a response: {cause}")
            }
            RespondError::InvalidInput(cause) => {
                format!("⚠️ Please check your weekly habits: {cause}")
            }
        }
    }
}

impl From<reqwest::Error> for RespondError {
    fn from(e: reqwest::Error) -> Self {
        RespondError::BackendCall(e.to_string())
    }
}
