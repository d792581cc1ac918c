//! GitHub issue tracker client.
//!
//! Files issues through `POST /repos/{owner}/{repo}/issues`. Failures
//! are returned with GitHub's status and message untouched so the
//! operator sees exactly what the API said.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{CreatedIssue, IssueTracker, NewIssue, RepoRef, SubmitError};

/// Request timeout for tracker calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// GitHub REST API client for issue creation.
#[derive(Debug)]
pub struct GitHubTracker {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl GitHubTracker {
    pub fn new(token: String) -> Result<Self, SubmitError> {
        if token.trim().is_empty() {
            return Err(SubmitError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SubmitError::NetworkUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            token,
            base_url: "https://api.github.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    async fn create_issue(
        &self,
        repo: &RepoRef,
        issue: &NewIssue,
    ) -> Result<CreatedIssue, SubmitError> {
        let url = format!(
            "{}/repos/{}/{}/issues",
            self.base_url, repo.owner, repo.repo
        );

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {}", self.token))
            .header("accept", "application/vnd.github+json")
            // GitHub rejects requests without a User-Agent
            .header("user-agent", concat!("chirp/", env!("CARGO_PKG_VERSION")))
            .json(&json!({
                "title": issue.title,
                "body": issue.body,
                "labels": issue.labels,
            }))
            .send()
            .await
            .map_err(|e| SubmitError::NetworkUnavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SubmitError::NetworkUnavailable(e.to_string()))?;

        if !status.is_success() {
            // Surface GitHub's own message verbatim for diagnosis
            return Err(SubmitError::Tracker {
                status: status.as_u16(),
                message: extract_message(&text).unwrap_or(text),
            });
        }

        parse_created_issue(&text).ok_or(SubmitError::Tracker {
            status: status.as_u16(),
            message: "tracker response missing html_url/number".to_string(),
        })
    }
}

fn extract_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed.get("message")?.as_str().map(|s| s.to_string())
}

fn parse_created_issue(body: &str) -> Option<CreatedIssue> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    Some(CreatedIssue {
        url: parsed.get("html_url")?.as_str()?.to_string(),
        number: parsed.get("number")?.as_u64()?,
        title: parsed
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string(),
    })
}
