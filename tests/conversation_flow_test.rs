//! Conversation flow integration tests
//!
//! Exercises the orchestrator and issue pipeline against mock
//! collaborators: a scripted AI completion client and a recording
//! issue tracker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use chirp::agent::{AiError, CompletionClient, CompletionRequest};
use chirp::conversation::{ChatError, Orchestrator, CLOSING_REPLY, FALLBACK_REPLIES};
use chirp::issues::{
    auto_submit_request, CreatedIssue, IssuePipeline, IssueTracker, NewIssue, RepoRef,
    ReporterInfo, SubmitError,
};
use chirp::sessions::{MessageRole, SessionStore};

/// Scripted completion client: returns a fixed reply, or fails every
/// call when `fail` is set.
struct MockCompletion {
    reply: String,
    fail: bool,
    calls: AtomicUsize,
}

impl MockCompletion {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: String::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(AiError::NetworkUnavailable("mock outage".to_string()))
        } else {
            Ok(self.reply.clone())
        }
    }
}

/// Issue tracker that records every submission.
#[derive(Default)]
struct RecordingTracker {
    submissions: Mutex<Vec<(RepoRef, NewIssue)>>,
}

#[async_trait]
impl IssueTracker for RecordingTracker {
    async fn create_issue(
        &self,
        repo: &RepoRef,
        issue: &NewIssue,
    ) -> Result<CreatedIssue, SubmitError> {
        let mut submissions = self.submissions.lock();
        submissions.push((repo.clone(), issue.clone()));
        Ok(CreatedIssue {
            url: format!(
                "https://github.com/{}/issues/{}",
                repo.full_name(),
                submissions.len()
            ),
            number: submissions.len() as u64,
            title: issue.title.clone(),
        })
    }
}

fn orchestrator_with(
    completion: Arc<dyn CompletionClient>,
) -> (Orchestrator, Arc<SessionStore>) {
    let store = Arc::new(SessionStore::new());
    (Orchestrator::new(store.clone(), Some(completion)), store)
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_happy_path_two_turns() {
    let ai = MockCompletion::replying("Great idea! Why do you need dark mode?");
    let (orchestrator, store) = orchestrator_with(ai.clone());

    // turn 1: AI-generated elaboration
    let first = orchestrator
        .process_turn("abc123xy", "add dark mode", Vec::new())
        .await
        .unwrap();
    assert_eq!(first.reply.role, MessageRole::Assistant);
    assert!(!first.reply.content.is_empty());
    assert!(first.issue_request.is_none());
    assert_eq!(ai.calls.load(Ordering::SeqCst), 1);

    // turn 2: fixed closing reply, no AI call, issue hand-off emitted
    let second = orchestrator
        .process_turn(
            "abc123xy",
            "I work at night and the glare hurts",
            Vec::new(),
        )
        .await
        .unwrap();
    assert_eq!(second.reply.content, CLOSING_REPLY);
    assert_eq!(ai.calls.load(Ordering::SeqCst), 1, "terminal turn must not call the AI");

    let request = second.issue_request.expect("terminal turn emits the issue event");
    assert_eq!(request.session_id, "abc123xy");
    // snapshot includes the closing turn
    assert_eq!(request.history.len(), 4);
    assert_eq!(request.history[3].content, CLOSING_REPLY);
    assert!(store.issue_requested("abc123xy"));
}

#[tokio::test]
async fn test_second_turn_retries_trigger_exactly_once() {
    let ai = MockCompletion::replying("why?");
    let (orchestrator, _store) = orchestrator_with(ai);

    orchestrator
        .process_turn("retry123", "add dark mode", Vec::new())
        .await
        .unwrap();

    let mut triggered = 0;
    for _ in 0..3 {
        let outcome = orchestrator
            .process_turn("retry123", "because of the glare", Vec::new())
            .await
            .unwrap();
        if outcome.issue_request.is_some() {
            triggered += 1;
        }
    }
    assert_eq!(triggered, 1, "repeated second turns must fire the hand-off once");
}

#[tokio::test]
async fn test_later_turns_keep_delegating_without_retrigger() {
    let ai = MockCompletion::replying("noted");
    let (orchestrator, _store) = orchestrator_with(ai.clone());

    orchestrator
        .process_turn("longer12", "first", Vec::new())
        .await
        .unwrap();
    orchestrator
        .process_turn("longer12", "second", Vec::new())
        .await
        .unwrap();
    let third = orchestrator
        .process_turn("longer12", "third", Vec::new())
        .await
        .unwrap();

    assert!(third.issue_request.is_none());
    assert_eq!(third.reply.content, "noted");
    // turns 1 and 3 hit the AI, turn 2 did not
    assert_eq!(ai.calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Fallback law
// ============================================================================

#[tokio::test]
async fn test_fallback_on_ai_failure() {
    let (orchestrator, store) = orchestrator_with(MockCompletion::failing());

    let outcome = orchestrator
        .process_turn("fall1234", "add dark mode", Vec::new())
        .await
        .unwrap();

    assert!(
        FALLBACK_REPLIES.contains(&outcome.reply.content.as_str()),
        "fallback reply must come from the configured set, got: {}",
        outcome.reply.content
    );

    // session stays valid and continuable: the second turn still closes
    let second = orchestrator
        .process_turn("fall1234", "still here", Vec::new())
        .await
        .unwrap();
    assert_eq!(second.reply.content, CLOSING_REPLY);
    assert!(second.issue_request.is_some());
    assert_eq!(store.messages("fall1234").len(), 4);
}

// ============================================================================
// Validation and fail-fast behavior
// ============================================================================

#[tokio::test]
async fn test_invalid_session_id_rejected_without_mutation() {
    let (orchestrator, store) = orchestrator_with(MockCompletion::replying("hi"));

    let too_long = "x".repeat(41);
    for bad in ["short", "has space", "bad/slash", too_long.as_str()] {
        let result = orchestrator.process_turn(bad, "hello there", Vec::new()).await;
        assert_eq!(result.unwrap_err(), ChatError::SessionIdInvalid);
    }
    assert_eq!(store.session_count(), 0, "rejected requests must not touch the store");
}

#[tokio::test]
async fn test_oversized_message_rejected_without_mutation() {
    let (orchestrator, store) = orchestrator_with(MockCompletion::replying("hi"));

    let oversized = "a".repeat(2001);
    let result = orchestrator
        .process_turn("valid123", &oversized, Vec::new())
        .await;
    assert!(matches!(result, Err(ChatError::MessageInvalid(_))));
    assert!(store.messages("valid123").is_empty());
    assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn test_no_ai_configured_fails_fast() {
    let store = Arc::new(SessionStore::new());
    let orchestrator = Orchestrator::new(store.clone(), None);

    let result = orchestrator
        .process_turn("valid123", "hello there", Vec::new())
        .await;
    assert_eq!(result.unwrap_err(), ChatError::NoAiServiceConfigured);
    assert_eq!(store.session_count(), 0);
}

// ============================================================================
// Pipeline hand-off
// ============================================================================

#[tokio::test]
async fn test_auto_submission_files_one_issue() {
    let ai = MockCompletion::replying("why?");
    let (orchestrator, _store) = orchestrator_with(ai);
    let tracker = Arc::new(RecordingTracker::default());
    let pipeline = IssuePipeline::new(tracker.clone(), "@claude");

    orchestrator
        .process_turn("abc123xy", "add dark mode", Vec::new())
        .await
        .unwrap();
    let outcome = orchestrator
        .process_turn("abc123xy", "night glare hurts my eyes", Vec::new())
        .await
        .unwrap();

    let event = outcome.issue_request.unwrap();
    let request = auto_submit_request(
        &event.session_id,
        event.history,
        ReporterInfo::default(),
        RepoRef::parse("acme/webapp").unwrap(),
    );
    let created = pipeline.submit(request).await.unwrap();
    assert_eq!(created.number, 1);

    let submissions = tracker.submissions.lock();
    assert_eq!(submissions.len(), 1);
    let (repo, issue) = &submissions[0];
    assert_eq!(repo.full_name(), "acme/webapp");
    assert_eq!(issue.title, "add dark mode");
    assert!(issue.labels.contains(&"feedback".to_string()));
    assert!(issue.labels.contains(&"widget".to_string()));
    assert!(issue.body.contains("User: add dark mode"));
    assert!(issue.body.contains(CLOSING_REPLY));
    assert!(issue.body.contains("**Session ID**: abc123xy"));
}
