//! Input validation and sanitization
//!
//! Pure functions over untrusted request data: session identifiers,
//! chat message content, and structured feedback payloads. Nothing in
//! this module touches shared state.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum chat message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Maximum issue title length in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Maximum issue description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

/// Maximum label length in characters.
pub const MAX_LABEL_CHARS: usize = 50;

/// Maximum number of labels on a single issue.
pub const MAX_LABELS: usize = 10;

static SESSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{6,40}$").expect("session id regex"));

static SCRIPT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script tag regex"));

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("html tag regex"));

static JS_PROTOCOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript:").expect("javascript protocol regex"));

static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)on\w+\s*=").expect("event handler regex"));

/// Case-insensitive scan for a `data:` URI with a non-image media type.
/// Done by hand because the regex crate has no lookahead.
fn contains_non_image_data_uri(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 5 <= bytes.len() {
        if bytes[i..i + 5].eq_ignore_ascii_case(b"data:") {
            let after = i + 5;
            let is_image = after + 6 <= bytes.len()
                && bytes[after..after + 6].eq_ignore_ascii_case(b"image/");
            if !is_image {
                return true;
            }
            i = after;
        } else {
            i += 1;
        }
    }
    false
}

/// Remove `data:` tokens whose media type is not `image/`, preserving
/// everything else byte for byte.
fn strip_non_image_data_uris(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if i + 5 <= bytes.len() && bytes[i..i + 5].eq_ignore_ascii_case(b"data:") {
            let after = i + 5;
            let is_image = after + 6 <= bytes.len()
                && bytes[after..after + 6].eq_ignore_ascii_case(b"image/");
            if is_image {
                out.extend_from_slice(&bytes[i..after]);
            }
            i = after;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    // only whole ASCII sequences were removed, so this is valid UTF-8
    String::from_utf8_lossy(&out).into_owned()
}

/// Validation errors surfaced to the caller as HTTP 400.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid session ID format")]
    SessionIdInvalid,

    #[error("Message content cannot be empty")]
    MessageEmpty,

    #[error("Message content is too long (max {MAX_MESSAGE_CHARS} characters)")]
    MessageTooLong,

    #[error("Message content contains suspicious patterns")]
    MessageSuspicious,

    #[error("Missing or invalid field: {0}")]
    FeedbackFieldMissing(&'static str),

    #[error("Title is too long (max {MAX_TITLE_CHARS} characters)")]
    TitleTooLong,

    #[error("Description is too long (max {MAX_DESCRIPTION_CHARS} characters)")]
    DescriptionTooLong,

    #[error("Invalid priority value")]
    PriorityInvalid,

    #[error("Invalid labels format or too many labels")]
    LabelsInvalid,
}

/// Check that a session id is alphanumeric (plus `-`/`_`) and 6-40 chars.
pub fn is_valid_session_id(session_id: &str) -> bool {
    SESSION_ID_RE.is_match(session_id)
}

/// Validate chat message content: non-empty after trimming, bounded
/// length, and free of script-injection patterns.
pub fn validate_message_content(content: &str) -> Result<(), ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MessageEmpty);
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong);
    }
    if trimmed.to_lowercase().contains("<script")
        || JS_PROTOCOL_RE.is_match(trimmed)
        || EVENT_HANDLER_RE.is_match(trimmed)
        || contains_non_image_data_uri(trimmed)
    {
        return Err(ValidationError::MessageSuspicious);
    }
    Ok(())
}

/// Sanitize untrusted text for inclusion in stored messages and issue
/// bodies: trim, truncate to `max_chars` (on a char boundary), and strip
/// script tags, HTML tags, `javascript:` protocols, inline event handlers,
/// and non-image `data:` URIs.
pub fn sanitize_input(input: &str, max_chars: usize) -> String {
    let truncated: String = input.trim().chars().take(max_chars).collect();
    let no_scripts = SCRIPT_TAG_RE.replace_all(&truncated, "");
    let no_tags = HTML_TAG_RE.replace_all(&no_scripts, "");
    let no_js = JS_PROTOCOL_RE.replace_all(&no_tags, "");
    let no_handlers = EVENT_HANDLER_RE.replace_all(&no_js, "");
    strip_non_image_data_uris(&no_handlers)
}

/// Structured feedback payload received on the submit endpoint.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct FeedbackData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub conversation_history: Option<String>,
}

/// Validate a feedback payload before it reaches the issue pipeline.
///
/// Title and description are required; priority must be one of
/// low/medium/high when present; at most [`MAX_LABELS`] labels.
pub fn validate_feedback_data(data: &FeedbackData) -> Result<(), ValidationError> {
    if data.title.trim().is_empty() {
        return Err(ValidationError::FeedbackFieldMissing("title"));
    }
    if data.description.trim().is_empty() {
        return Err(ValidationError::FeedbackFieldMissing("description"));
    }
    if data.title.chars().count() > MAX_TITLE_CHARS {
        return Err(ValidationError::TitleTooLong);
    }
    if data.description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ValidationError::DescriptionTooLong);
    }
    if let Some(priority) = data.priority.as_deref() {
        if !matches!(priority, "low" | "medium" | "high") {
            return Err(ValidationError::PriorityInvalid);
        }
    }
    if let Some(labels) = &data.labels {
        if labels.len() > MAX_LABELS {
            return Err(ValidationError::LabelsInvalid);
        }
    }
    Ok(())
}
