//! GitHub API client for pull requests, comments and commit statuses.

use async_trait::async_trait;
use buildhook_core::forge::{ForgeKind, ForgeProject, PullRequest};
use buildhook_core::report::{CommitState, StatusReport, StatusSink};
use buildhook_core::{Error, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ClientError, into_core};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub limits status descriptions to this many characters.
const MAX_DESCRIPTION: usize = 140;

const PAGE_SIZE: usize = 100;

/// One repository on GitHub.
pub struct GitHubProject {
    client: reqwest::Client,
    api_url: String,
    access_token: Option<String>,
    namespace: String,
    repo: String,
}

impl GitHubProject {
    pub fn new(
        namespace: impl Into<String>,
        repo: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            access_token,
            namespace: namespace.into(),
            repo: repo.into(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_url.trim_end_matches('/'),
            self.namespace,
            self.repo,
            path
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("User-Agent", "buildhook")
            .header("Accept", "application/vnd.github+json");
        match &self.access_token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> std::result::Result<Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Api(format!(
                "Failed to get {} ({}): {}",
                what, status, text
            )));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> std::result::Result<T, ClientError> {
        self.send(self.request(Method::GET, &self.repo_url(path)), what)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn comments(&self, pr_id: u64) -> std::result::Result<Vec<GitHubComment>, ClientError> {
        let mut comments = Vec::new();
        for page in 1.. {
            let batch: Vec<GitHubComment> = self
                .get_json(
                    &format!("/issues/{}/comments?per_page={}&page={}", pr_id, PAGE_SIZE, page),
                    "pull request comments",
                )
                .await?;
            let last_page = batch.len() < PAGE_SIZE;
            comments.extend(batch);
            if last_page {
                break;
            }
        }
        Ok(comments)
    }
}

fn forge_error(err: ClientError) -> Error {
    into_core(err, Error::Forge)
}

#[async_trait]
impl ForgeProject for GitHubProject {
    fn kind(&self) -> ForgeKind {
        ForgeKind::Github
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn repo(&self) -> &str {
        &self.repo
    }

    fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.namespace, self.repo)
    }

    async fn default_branch(&self) -> Result<String> {
        let repo: GitHubRepo = self.get_json("", "repository").await.map_err(forge_error)?;
        Ok(repo.default_branch)
    }

    async fn get_pr(&self, id: u64) -> Result<PullRequest> {
        let pr: GitHubPull = self
            .get_json(&format!("/pulls/{}", id), &format!("pull request {}", id))
            .await
            .map_err(forge_error)?;
        let branch: GitHubBranch = self
            .get_json(
                &format!("/branches/{}", pr.base.git_ref),
                &format!("branch {}", pr.base.git_ref),
            )
            .await
            .map_err(forge_error)?;

        Ok(PullRequest {
            id: pr.number,
            target_branch: pr.base.git_ref,
            target_branch_head_commit: branch.commit.sha,
            labels: pr.labels.into_iter().map(|l| l.name).collect(),
        })
    }

    async fn who_can_act(&self) -> Result<Vec<String>> {
        let collaborators: Vec<GitHubCollaborator> = self
            .get_json(&format!("/collaborators?per_page={}", PAGE_SIZE), "collaborators")
            .await
            .map_err(forge_error)?;
        Ok(collaborators
            .into_iter()
            .filter(|c| c.permissions.push || c.permissions.admin)
            .map(|c| c.login)
            .collect())
    }

    async fn post_comment(&self, pr_id: u64, body: &str) -> Result<()> {
        let url = self.repo_url(&format!("/issues/{}/comments", pr_id));
        self.send(
            self.request(Method::POST, &url)
                .json(&serde_json::json!({ "body": body })),
            "comment",
        )
        .await
        .map_err(forge_error)?;
        Ok(())
    }

    async fn last_comment(&self, pr_id: u64) -> Result<Option<String>> {
        let comments = self.comments(pr_id).await.map_err(forge_error)?;
        Ok(comments.into_iter().last().map(|c| c.body))
    }
}

/// GitHub commit status state for a report state.
pub fn status_state(state: CommitState) -> &'static str {
    match state {
        CommitState::Pending | CommitState::Running => "pending",
        CommitState::Success => "success",
        CommitState::Failure => "failure",
        CommitState::Error => "error",
    }
}

fn truncate_description(description: &str) -> String {
    if description.chars().count() <= MAX_DESCRIPTION {
        return description.to_string();
    }
    let mut truncated: String = description.chars().take(MAX_DESCRIPTION - 3).collect();
    truncated.push_str("...");
    truncated
}

#[async_trait]
impl StatusSink for GitHubProject {
    async fn report(&self, report: &StatusReport) -> Result<()> {
        if report.markdown.is_some() {
            debug!(check = %report.check_name, "Commit statuses cannot show markdown, dropping it");
        }

        let mut payload = serde_json::json!({
            "state": status_state(report.state),
            "description": truncate_description(&report.description),
            "context": report.check_name,
        });
        if !report.url.is_empty() {
            payload["target_url"] = serde_json::Value::String(report.url.clone());
        }

        let url = self.repo_url(&format!("/statuses/{}", report.commit_sha));
        self.send(self.request(Method::POST, &url).json(&payload), "commit status")
            .await
            .map_err(forge_error)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct GitHubPull {
    number: u64,
    base: GitHubRef,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubBranch {
    commit: GitHubCommit,
}

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubCollaborator {
    login: String,
    #[serde(default)]
    permissions: GitHubPermissions,
}

#[derive(Debug, Default, Deserialize)]
struct GitHubPermissions {
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    push: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubComment {
    body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_urls() {
        let project = GitHubProject::new("packit", "ogr", None)
            .with_api_url("https://ghe.example.com/api/v3/");
        assert_eq!(
            project.repo_url("/pulls/12"),
            "https://ghe.example.com/api/v3/repos/packit/ogr/pulls/12"
        );
        assert_eq!(project.clone_url(), "https://github.com/packit/ogr.git");
    }

    #[test]
    fn test_running_maps_to_pending() {
        assert_eq!(status_state(CommitState::Running), "pending");
        assert_eq!(status_state(CommitState::Pending), "pending");
        assert_eq!(status_state(CommitState::Error), "error");
    }

    #[test]
    fn test_long_descriptions_are_truncated() {
        let long = "x".repeat(200);
        let truncated = truncate_description(&long);
        assert_eq!(truncated.chars().count(), MAX_DESCRIPTION);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_description("short"), "short");
    }

    #[test]
    fn test_pull_request_parsing() {
        let pr: GitHubPull = serde_json::from_str(
            r#"{"number": 12, "base": {"ref": "main", "sha": "abc"}, "labels": [{"name": "tests"}]}"#,
        )
        .unwrap();
        assert_eq!(pr.base.git_ref, "main");
        assert_eq!(pr.labels[0].name, "tests");
    }

    #[tokio::test]
    #[ignore = "requires network access to api.github.com"]
    async fn test_default_branch() {
        let project = GitHubProject::new("packit", "ogr", None);
        assert_eq!(project.default_branch().await.unwrap(), "main");
    }
}
