//! Conversation orchestrator
//!
//! The per-turn state machine behind the chat endpoint. The turn number
//! is never stored; it is derived from the message log (count of user
//! messages) under the session's lock, so it cannot drift out of sync
//! with the history.
//!
//! Protocol:
//! - turn 1: delegate to the AI adapter with an elaboration prompt that
//!   asks one clarifying question about *why* the change is needed. Any
//!   adapter failure is absorbed into a canned fallback reply.
//! - turn 2: fixed closing reply, no AI call, and the one-time hand-off
//!   to the issue pipeline (emitted as an explicit event, driven by the
//!   HTTP layer).
//! - turn 3+: out of the primary protocol; keeps delegating to the AI
//!   adapter but can never re-trigger issue creation.

use std::sync::Arc;

use tracing::{error, warn};

use crate::agent::{AiError, CompletionClient, CompletionRequest};
use crate::sessions::{ChatMessage, ImageAttachment, SessionStore};
use crate::validation::{
    is_valid_session_id, sanitize_input, validate_message_content, ValidationError,
    MAX_MESSAGE_CHARS,
};

/// Fixed reply for the terminal (second) turn. No AI round-trip: the
/// wrap-up is deterministic, which keeps conversation length bounded
/// and makes the one-shot issue hand-off tractable.
pub const CLOSING_REPLY: &str = "Thank you for the details! I've recorded your feedback and \
passed it along to the development team. We really appreciate you taking the time to share it.";

/// Canned acknowledgements substituted when the AI adapter fails,
/// selected round-robin by turn number.
pub const FALLBACK_REPLIES: [&str; 5] = [
    "Thank you! Could you tell me more details?",
    "I see, that's an interesting perspective. What background led you to feel this way?",
    "Could you tell me more specifically about that idea?",
    "In what situations do you feel that need?",
    "What good things do you think would happen if that feature existed?",
];

/// Errors surfaced to the chat caller. AI adapter failures are absent
/// on purpose: they are recovered internally via the fallback replies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid session ID format")]
    SessionIdInvalid,

    #[error("{0}")]
    MessageInvalid(ValidationError),

    #[error("AI service not configured")]
    NoAiServiceConfigured,
}

/// Signal that a session has gathered enough information and its
/// history should be filed as an issue. Emitted at most once per
/// session; the snapshot includes the closing reply.
#[derive(Debug, Clone)]
pub struct IssueSubmissionRequested {
    pub session_id: String,
    pub history: Vec<ChatMessage>,
}

/// Result of one accepted chat turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: ChatMessage,
    pub issue_request: Option<IssueSubmissionRequested>,
}

/// The conversation state machine.
pub struct Orchestrator {
    store: Arc<SessionStore>,
    completion: Option<Arc<dyn CompletionClient>>,
}

impl Orchestrator {
    pub fn new(store: Arc<SessionStore>, completion: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { store, completion }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Process one inbound user message.
    ///
    /// Validation failures and missing AI configuration are rejected
    /// before the session is touched, so a bad request never mutates
    /// state.
    pub async fn process_turn(
        &self,
        session_id: &str,
        message: &str,
        images: Vec<ImageAttachment>,
    ) -> Result<TurnOutcome, ChatError> {
        if !is_valid_session_id(session_id) {
            return Err(ChatError::SessionIdInvalid);
        }
        validate_message_content(message).map_err(ChatError::MessageInvalid)?;
        let completion = self
            .completion
            .as_ref()
            .ok_or(ChatError::NoAiServiceConfigured)?
            .clone();

        let sanitized = sanitize_input(message, MAX_MESSAGE_CHARS);
        let user_message = ChatMessage::user(sanitized.clone()).with_images(images.clone());
        let turn = self.store.append_user(session_id, user_message);
        let n = turn.turn;

        let (reply_content, issue_triggered) = if n == 2 {
            // Terminal turn: deterministic wrap-up, and the one-shot
            // flag is taken at decision time, before any network call,
            // so overlapping retries cannot double-file.
            (
                CLOSING_REPLY.to_string(),
                self.store.request_issue_once(session_id),
            )
        } else {
            let prompt = if n == 1 {
                elaboration_prompt(&sanitized)
            } else {
                continuation_prompt(&sanitized)
            };
            let request = CompletionRequest::new(turn.prior, prompt).with_images(images);
            let content = match completion.complete(request).await {
                Ok(text) => text,
                Err(e) => {
                    log_ai_failure(session_id, n, &e);
                    fallback_reply(n).to_string()
                }
            };
            (content, false)
        };

        let reply = ChatMessage::assistant(reply_content);
        // The snapshot taken here includes the closing turn, which is
        // what the issue pipeline receives.
        let history = self.store.append(session_id, reply.clone());

        let issue_request = issue_triggered.then(|| IssueSubmissionRequested {
            session_id: session_id.to_string(),
            history,
        });

        Ok(TurnOutcome {
            reply,
            issue_request,
        })
    }
}

/// Pick the canned fallback for a given turn number (1-based).
pub fn fallback_reply(turn: usize) -> &'static str {
    FALLBACK_REPLIES[(turn.saturating_sub(1)) % FALLBACK_REPLIES.len()]
}

/// Prompt for the first substantive turn: react positively, then ask a
/// single clarifying question about why the change is needed. The
/// adapter itself widens the wording when images are attached.
fn elaboration_prompt(message: &str) -> String {
    format!(
        "You are a feedback assistant collecting feature requests and bug reports \
for a development team.\n\n\
The user's first message: \"{message}\"\n\n\
React positively to the request, then ask exactly one short, friendly \
clarifying question about why the user needs this change - the background or \
problem behind it. Keep the whole reply to a few sentences."
    )
}

/// Prompt for turns beyond the primary protocol (n >= 3).
fn continuation_prompt(message: &str) -> String {
    format!(
        "You are a feedback assistant collecting feature requests and bug reports \
for a development team.\n\n\
The user's follow-up message: \"{message}\"\n\n\
Their feedback has already been recorded. Thank them briefly and answer any \
remaining question in one or two sentences."
    )
}

/// AI failures are a UX degradation, not an error, but the class still
/// matters to operators: credential problems are configuration bugs,
/// quota/network failures are transient.
fn log_ai_failure(session_id: &str, turn: usize, error: &AiError) {
    if error.is_configuration() {
        error!(session = %session_id, turn, %error, "AI completion failed (configuration)");
    } else {
        warn!(session = %session_id, turn, %error, "AI completion failed, using fallback reply");
    }
}
