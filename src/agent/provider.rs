//! Completion client trait and request types.

use async_trait::async_trait;

use crate::agent::AiError;
use crate::sessions::{ChatMessage, ImageAttachment};

/// A single completion request.
///
/// `history` carries the prior turns (excluding the message the prompt
/// was built from); `prompt` is the fully-formed instruction for this
/// turn; `images` are attachments from the current user message.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub history: Vec<ChatMessage>,
    pub prompt: String,
    pub images: Vec<ImageAttachment>,
}

impl CompletionRequest {
    pub fn new(history: Vec<ChatMessage>, prompt: impl Into<String>) -> Self {
        Self {
            history,
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }
}

/// Trait for AI completion backends.
///
/// Implementations send one request and return the generated text.
/// They must not retry internally; retry policy belongs to the caller
/// so turn latency stays bounded.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError>;
}
