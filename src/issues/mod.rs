//! Issue submission pipeline
//!
//! Assembles a structured issue body from a session's history and files
//! it through the [`IssueTracker`] seam (GitHub in production, a
//! recording mock in tests). The pipeline itself has no dedup memory;
//! idempotency is enforced upstream by the session store's one-shot
//! flag.

mod github;

pub use github::GitHubTracker;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::sessions::{ChatMessage, ImageAttachment, MessageRole};
use crate::validation::{sanitize_input, MAX_LABELS, MAX_LABEL_CHARS, MAX_TITLE_CHARS};

/// Errors from issue submission. Tracker-side failures carry the
/// tracker's status and message verbatim: issue-creation failure is a
/// data-loss risk and must stay diagnosable, unlike the AI adapter's
/// smoothed-over failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    #[error("issue tracker token not configured")]
    NotConfigured,

    #[error("Invalid repository format. Expected: owner/repo")]
    InvalidRepository,

    #[error("{message}")]
    Tracker { status: u16, message: String },

    #[error("unable to reach issue tracker: {0}")]
    NetworkUnavailable(String),
}

/// A repository reference, validated to `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn parse(repository: &str) -> Result<Self, SubmitError> {
        match repository.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                })
            }
            _ => Err(SubmitError::InvalidRepository),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Optional end-user identity forwarded by the widget (`X-User-*`
/// headers). Attacker-controlled like everything else on the request.
#[derive(Debug, Clone, Default)]
pub struct ReporterInfo {
    pub name: Option<String>,
    pub contact: Option<String>,
}

impl ReporterInfo {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.contact.is_none()
    }
}

/// A fully-assembled issue ready for the tracker.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// The tracker's answer after filing an issue.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CreatedIssue {
    pub url: String,
    pub number: u64,
    pub title: String,
}

/// Everything the pipeline needs for one submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub session_id: String,
    pub history: Vec<ChatMessage>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub labels: Vec<String>,
    pub reporter: ReporterInfo,
    pub repo: RepoRef,
}

/// Trait for issue trackers, so tests can record submissions instead
/// of calling out to GitHub.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(&self, repo: &RepoRef, issue: &NewIssue)
        -> Result<CreatedIssue, SubmitError>;
}

/// The issue submission pipeline.
pub struct IssuePipeline {
    tracker: Arc<dyn IssueTracker>,
    mention: String,
}

impl IssuePipeline {
    pub fn new(tracker: Arc<dyn IssueTracker>, mention: impl Into<String>) -> Self {
        Self {
            tracker,
            mention: mention.into(),
        }
    }

    /// Whether issue notifications (a mention in the body) are enabled.
    pub fn notify_enabled(&self) -> bool {
        !self.mention.is_empty()
    }

    /// Build and file one issue. The caller guarantees at-most-once
    /// invocation per session; calling twice files a duplicate.
    pub async fn submit(&self, request: SubmitRequest) -> Result<CreatedIssue, SubmitError> {
        let title = sanitize_input(&request.title, MAX_TITLE_CHARS);
        let labels = sanitize_labels(&request.labels);
        let body = build_issue_body(&request, &self.mention);

        let issue = NewIssue {
            title,
            body,
            labels,
        };
        self.tracker.create_issue(&request.repo, &issue).await
    }
}

/// Sanitize and bound the label set: strip injection patterns, cap
/// length and count, drop empties, de-duplicate preserving order.
/// An empty result falls back to the default `feedback` label.
pub fn sanitize_labels(labels: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<String> = labels
        .iter()
        .map(|l| sanitize_input(l, MAX_LABEL_CHARS))
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(l.clone()))
        .take(MAX_LABELS)
        .collect();
    if out.is_empty() {
        out.push("feedback".to_string());
    }
    out
}

/// Render the deterministic issue body: overview, category, priority,
/// optional reporter section, image manifest, collapsible transcript,
/// and the mention footer. Raw image bytes never enter the body.
pub fn build_issue_body(request: &SubmitRequest, mention: &str) -> String {
    let mut body = String::new();

    body.push_str("## Overview\n\n");
    body.push_str(&request.description);
    body.push_str("\n\n## Category\n");
    body.push_str(&request.category);
    body.push_str("\n\n## Priority\n");
    body.push_str(&request.priority);
    body.push('\n');

    if !request.reporter.is_empty() {
        body.push_str("\n## Reported by\n");
        if let Some(name) = &request.reporter.name {
            body.push_str(&format!("- Name: {name}\n"));
        }
        if let Some(contact) = &request.reporter.contact {
            body.push_str(&format!("- Contact: {contact}\n"));
        }
    }

    let images: Vec<&ImageAttachment> =
        request.history.iter().flat_map(|m| &m.images).collect();
    if !images.is_empty() {
        body.push_str(&format!("\n## Attached images ({})\n", images.len()));
        for (i, image) in images.iter().enumerate() {
            body.push_str(&format!(
                "- Image {}: {} (~{} KB)\n",
                i + 1,
                image.mime_type,
                image.approx_size_bytes() / 1024,
            ));
        }
    }

    body.push_str("\n## Conversation\n\n<details>\n<summary>Full transcript</summary>\n\n```\n");
    body.push_str(&format_transcript(&request.history));
    body.push_str("\n```\n\n</details>\n\n---\n\n");
    body.push_str(&format!(
        "**Session ID**: {}  \n**Created**: {}  \n",
        request.session_id,
        Utc::now().to_rfc3339(),
    ));
    if !mention.is_empty() {
        body.push_str(&format!(
            "\n{mention} please review the feedback above.\n"
        ));
    }
    body.push_str("\n_This issue was generated automatically from user feedback._\n");

    body
}

/// Plain-text transcript, one block per message.
fn format_transcript(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| {
            let role = match m.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Derive an auto-submission from a completed conversation, the way
/// the widget's automatic trigger does: title and description from the
/// first user message, default category/priority/labels.
pub fn auto_submit_request(
    session_id: &str,
    history: Vec<ChatMessage>,
    reporter: ReporterInfo,
    repo: RepoRef,
) -> SubmitRequest {
    let first_user = history
        .iter()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.clone())
        .unwrap_or_else(|| "User feedback".to_string());
    let title = if first_user.chars().count() > 50 {
        let head: String = first_user.chars().take(47).collect();
        format!("{head}...")
    } else {
        first_user.clone()
    };

    SubmitRequest {
        session_id: session_id.to_string(),
        history,
        title,
        description: first_user,
        category: "feature".to_string(),
        priority: "medium".to_string(),
        labels: vec!["feedback".to_string(), "widget".to_string()],
        reporter,
        repo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> SubmitRequest {
        SubmitRequest {
            session_id: "abc123xy".to_string(),
            history: vec![
                ChatMessage::user("add dark mode"),
                ChatMessage::assistant("why do you need it?"),
                ChatMessage::user("I work at night and the glare hurts"),
                ChatMessage::assistant("thanks, filing it"),
            ],
            title: "add dark mode".to_string(),
            description: "add dark mode".to_string(),
            category: "feature".to_string(),
            priority: "medium".to_string(),
            labels: vec!["feedback".to_string(), "widget".to_string()],
            reporter: ReporterInfo::default(),
            repo: RepoRef::parse("acme/webapp").unwrap(),
        }
    }

    // ==================== repo parsing tests ====================

    #[test]
    fn test_repo_parse_valid() {
        let repo = RepoRef::parse("acme/webapp").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.repo, "webapp");
        assert_eq!(repo.full_name(), "acme/webapp");
    }

    #[test]
    fn test_repo_parse_invalid() {
        assert!(RepoRef::parse("no-slash").is_err());
        assert!(RepoRef::parse("/repo").is_err());
        assert!(RepoRef::parse("owner/").is_err());
        assert!(RepoRef::parse("a/b/c").is_err());
    }

    // ==================== label sanitization tests ====================

    #[test]
    fn test_labels_sanitized_and_deduped() {
        let labels = vec![
            "feedback".to_string(),
            "feedback".to_string(),
            "<script>evil()</script>".to_string(),
            "  widget  ".to_string(),
            "<b>ui</b>".to_string(),
        ];
        // script content is stripped entirely, tags are stripped but
        // their inner text survives, duplicates collapse
        assert_eq!(sanitize_labels(&labels), vec!["feedback", "widget", "ui"]);
    }

    #[test]
    fn test_labels_capped_at_max() {
        let labels: Vec<String> = (0..20).map(|i| format!("label{i}")).collect();
        assert_eq!(sanitize_labels(&labels).len(), MAX_LABELS);
    }

    #[test]
    fn test_labels_empty_falls_back_to_default() {
        assert_eq!(sanitize_labels(&[]), vec!["feedback"]);
        assert_eq!(
            sanitize_labels(&["<script></script>".to_string()]),
            vec!["feedback"]
        );
    }

    // ==================== body building tests ====================

    #[test]
    fn test_body_has_required_sections() {
        let body = build_issue_body(&sample_request(), "@claude");
        assert!(body.contains("## Overview"));
        assert!(body.contains("## Category\nfeature"));
        assert!(body.contains("## Priority\nmedium"));
        assert!(body.contains("<details>"));
        assert!(body.contains("User: add dark mode"));
        assert!(body.contains("Assistant: why do you need it?"));
        assert!(body.contains("**Session ID**: abc123xy"));
        assert!(body.contains("@claude"));
    }

    #[test]
    fn test_body_omits_reporter_when_absent() {
        let body = build_issue_body(&sample_request(), "@claude");
        assert!(!body.contains("## Reported by"));
    }

    #[test]
    fn test_body_includes_reporter_section() {
        let mut request = sample_request();
        request.reporter = ReporterInfo {
            name: Some("Alex".to_string()),
            contact: Some("alex@example.com".to_string()),
        };
        let body = build_issue_body(&request, "@claude");
        assert!(body.contains("## Reported by"));
        assert!(body.contains("- Name: Alex"));
        assert!(body.contains("- Contact: alex@example.com"));
    }

    #[test]
    fn test_body_image_manifest_without_raw_bytes() {
        let mut request = sample_request();
        let payload = "QUJD".repeat(600); // ~1.8 KB decoded
        request.history[0].images.push(ImageAttachment {
            mime_type: "image/png".to_string(),
            data: payload.clone(),
        });
        let body = build_issue_body(&request, "@claude");
        assert!(body.contains("## Attached images (1)"));
        assert!(body.contains("image/png"));
        assert!(!body.contains(&payload), "raw image data must not be embedded");
    }

    #[test]
    fn test_body_without_mention_has_no_footer_mention() {
        let body = build_issue_body(&sample_request(), "");
        assert!(!body.contains("please review the feedback above"));
    }

    // ==================== auto submission tests ====================

    #[test]
    fn test_auto_submit_titles_from_first_user_message() {
        let history = vec![
            ChatMessage::user("add dark mode"),
            ChatMessage::assistant("why?"),
        ];
        let request = auto_submit_request(
            "abc123xy",
            history,
            ReporterInfo::default(),
            RepoRef::parse("acme/webapp").unwrap(),
        );
        assert_eq!(request.title, "add dark mode");
        assert_eq!(request.description, "add dark mode");
        assert_eq!(request.category, "feature");
        assert_eq!(request.priority, "medium");
        assert_eq!(request.labels, vec!["feedback", "widget"]);
    }

    #[test]
    fn test_auto_submit_truncates_long_titles() {
        let long = "x".repeat(80);
        let request = auto_submit_request(
            "abc123xy",
            vec![ChatMessage::user(long)],
            ReporterInfo::default(),
            RepoRef::parse("acme/webapp").unwrap(),
        );
        assert_eq!(request.title.chars().count(), 50);
        assert!(request.title.ends_with("..."));
    }
}
