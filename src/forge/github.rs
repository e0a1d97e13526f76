//! GitHub git-data API client for the `forge-api` retag strategy.
//!
//! Creates an annotated tag object and then the `refs/tags/<tag>` ref that
//! points at it, both via `POST` with HTTP Basic credentials.  The API
//! answers 201 Created on success; anything else is an error.  Unlike the
//! `git-cli` path there is no force semantics here: re-creating an existing
//! ref fails at the second step.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::config::Config;

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GitObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagResponse {
    pub tag: String,
    pub sha: String,
    #[serde(default)]
    pub message: String,
    pub object: GitObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefResponse {
    #[serde(rename = "ref")]
    pub reference: String,
    pub object: GitObject,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GitHubClient {
    api_url: String,
    owner: String,
    username: String,
    token: String,
}

impl GitHubClient {
    /// Build a [`GitHubClient`] from config, resolving the upstream token
    /// from its environment variable once.
    pub fn new(config: &Config) -> Self {
        let token = std::env::var(&config.upstream.token_env).unwrap_or_else(|_| {
            warn!(
                env = %config.upstream.token_env,
                "upstream token variable not set; forge API calls will be unauthenticated"
            );
            String::new()
        });

        Self {
            api_url: config.upstream.api_url.trim_end_matches('/').to_string(),
            owner: config.upstream.owner.clone(),
            username: config.upstream.username.clone(),
            token,
        }
    }

    /// Create the annotated tag object for `tag` at `commit`.
    #[instrument(skip(self, client), fields(%repo, %tag, %commit))]
    pub async fn create_tag_object(
        &self,
        client: &reqwest::Client,
        repo: &str,
        tag: &str,
        commit: &str,
    ) -> Result<TagResponse> {
        let url = format!("{}/repos/{}/{}/git/tags", self.api_url, self.owner, repo);

        let response = client
            .post(&url)
            .basic_auth(&self.username, Some(&self.token))
            .header("Accept", ACCEPT_HEADER)
            .json(&tag_request_body(tag, commit))
            .send()
            .await
            .context("upstream API request failed")?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            bail!("create tag failed with status {status}");
        }

        let tag_response: TagResponse = response
            .json()
            .await
            .context("failed to parse create-tag response")?;

        debug!(sha = %tag_response.sha, "tag object created");
        Ok(tag_response)
    }

    /// Create the `refs/tags/<tag>` ref pointing at `commit`.
    #[instrument(skip(self, client), fields(%repo, %tag, %commit))]
    pub async fn create_ref(
        &self,
        client: &reqwest::Client,
        repo: &str,
        tag: &str,
        commit: &str,
    ) -> Result<RefResponse> {
        let url = format!("{}/repos/{}/{}/git/refs", self.api_url, self.owner, repo);

        let response = client
            .post(&url)
            .basic_auth(&self.username, Some(&self.token))
            .header("Accept", ACCEPT_HEADER)
            .json(&ref_request_body(tag, commit))
            .send()
            .await
            .context("upstream API request failed")?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            bail!("create ref failed with status {status}");
        }

        let ref_response: RefResponse = response
            .json()
            .await
            .context("failed to parse create-ref response")?;

        debug!(reference = %ref_response.reference, "ref created");
        Ok(ref_response)
    }

    /// Tag `commit` as `tag` in `repo` purely through the API: tag object
    /// first, then the ref.
    #[instrument(skip(self, client), fields(%repo, %tag, %commit))]
    pub async fn retag(
        &self,
        client: &reqwest::Client,
        repo: &str,
        tag: &str,
        commit: &str,
    ) -> Result<()> {
        self.create_tag_object(client, repo, tag, commit).await?;
        self.create_ref(client, repo, tag, commit).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

fn tag_request_body(tag: &str, commit: &str) -> serde_json::Value {
    json!({
        "tag": tag,
        "object": commit,
        "type": "commit",
        "message": format!("create tag {tag}"),
    })
}

fn ref_request_body(tag: &str, commit: &str) -> serde_json::Value {
    json!({
        "ref": format!("refs/tags/{tag}"),
        "sha": commit,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_body_shape() {
        let body = tag_request_body("release-1", "abc123def");
        assert_eq!(body["tag"], "release-1");
        assert_eq!(body["object"], "abc123def");
        assert_eq!(body["type"], "commit");
        assert_eq!(body["message"], "create tag release-1");
    }

    #[test]
    fn ref_body_shape() {
        let body = ref_request_body("release-1", "abc123def");
        assert_eq!(body["ref"], "refs/tags/release-1");
        assert_eq!(body["sha"], "abc123def");
    }

    #[test]
    fn parse_tag_response() {
        let body = serde_json::json!({
            "node_id": "MDM6VGFn",
            "tag": "release-1",
            "sha": "940bd336248efae0f9ee5bc7b2d5c985887b16ac",
            "url": "https://api.github.com/repos/acme/widgets/git/tags/940bd336",
            "message": "create tag release-1",
            "object": {
                "type": "commit",
                "sha": "c3d0be41ecbe669545ee3e94d31ed9a4bc91ee3c",
                "url": "https://api.github.com/repos/acme/widgets/git/commits/c3d0be41"
            }
        });
        let parsed: TagResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.tag, "release-1");
        assert_eq!(parsed.object.kind, "commit");
    }

    #[test]
    fn parse_ref_response() {
        let body = serde_json::json!({
            "ref": "refs/tags/release-1",
            "node_id": "MDM6UmVm",
            "url": "https://api.github.com/repos/acme/widgets/git/refs/tags/release-1",
            "object": {
                "type": "tag",
                "sha": "940bd336248efae0f9ee5bc7b2d5c985887b16ac",
                "url": "https://api.github.com/repos/acme/widgets/git/tags/940bd336"
            }
        });
        let parsed: RefResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.reference, "refs/tags/release-1");
        assert_eq!(parsed.object.kind, "tag");
    }

    #[test]
    fn parse_tag_response_without_message() {
        let body = serde_json::json!({
            "tag": "v2",
            "sha": "940bd336248efae0f9ee5bc7b2d5c985887b16ac",
            "object": {"type": "commit", "sha": "c3d0be41ecbe669545ee3e94d31ed9a4bc91ee3c"}
        });
        let parsed: TagResponse = serde_json::from_value(body).unwrap();
        assert!(parsed.message.is_empty());
        assert!(parsed.object.url.is_empty());
    }
}
