//! AI completion adapter
//!
//! Wraps the external generative-AI service behind the
//! [`CompletionClient`] trait so the orchestrator (and tests) never
//! talk to the network directly.

pub mod gemini;
pub mod provider;

use std::sync::Arc;

pub use provider::{CompletionClient, CompletionRequest};

use crate::config::Config;

/// Errors from the AI completion adapter.
///
/// Service failures are classified so operators can tell configuration
/// problems (`InvalidCredentials`, `PermissionDenied`) apart from
/// transient outages (`QuotaExceeded`, `NetworkUnavailable`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum AiError {
    #[error("AI service credentials rejected: {0}")]
    InvalidCredentials(String),

    #[error("AI service access denied: {0}")]
    PermissionDenied(String),

    #[error("AI service quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("unable to reach AI service: {0}")]
    NetworkUnavailable(String),

    #[error("AI service error ({status}): {message}")]
    Unknown { status: u16, message: String },

    #[error("invalid API key: {0}")]
    InvalidApiKey(String),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl AiError {
    /// Whether this failure points at operator configuration rather
    /// than a transient outage.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AiError::InvalidCredentials(_)
                | AiError::PermissionDenied(_)
                | AiError::InvalidApiKey(_)
                | AiError::InvalidBaseUrl(_)
        )
    }
}

/// Build the completion client from configuration.
///
/// Returns `None` when no AI credential is configured; the chat
/// endpoint then fails fast with a configuration error.
pub fn build_completion_client(
    config: &Config,
) -> Result<Option<Arc<dyn CompletionClient>>, AiError> {
    match &config.gemini {
        Some(gemini_cfg) => {
            let client =
                gemini::GeminiClient::new(gemini_cfg.api_key.clone(), gemini_cfg.model.clone())?;
            Ok(Some(Arc::new(client)))
        }
        None => Ok(None),
    }
}
