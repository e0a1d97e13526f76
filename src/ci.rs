//! Outbound trigger for the CI server's build-by-token endpoint.
//!
//! One GET per trigger, no retries.  The per-job tokens are resolved from the
//! environment once at startup and the map is read-only afterwards.  An
//! unknown job name gets an empty token and the CI server rejects the
//! request; that keeps the relay itself free of job-name policy.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use reqwest::Url;
use tracing::{debug, instrument, warn};

use crate::config::CiConfig;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of a successful trigger request.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    /// The exact URL the trigger was sent to, token included.  Callers that
    /// log this must redact it first; the response body returns it verbatim.
    pub url: String,
    /// HTTP status the CI server answered with.
    pub status: u16,
}

// ---------------------------------------------------------------------------
// Trigger client
// ---------------------------------------------------------------------------

pub struct CiTrigger {
    base_url: String,
    tokens: HashMap<String, String>,
}

impl CiTrigger {
    /// Build a [`CiTrigger`] from config, resolving every job's token from
    /// its environment variable.
    pub fn new(config: &CiConfig) -> Self {
        let tokens = config
            .jobs
            .iter()
            .map(|(job, job_config)| {
                let token = std::env::var(&job_config.token_env).unwrap_or_else(|_| {
                    warn!(
                        %job,
                        env = %job_config.token_env,
                        "job token variable not set; triggers for this job will be rejected"
                    );
                    String::new()
                });
                (job.clone(), token)
            })
            .collect();

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn token_for(&self, job: &str) -> &str {
        self.tokens.get(job).map(String::as_str).unwrap_or("")
    }

    /// Construct the signed trigger URL for `job` with `text` as the build
    /// parameter.
    fn build_url(&self, job: &str, text: &str) -> Result<Url> {
        let endpoint = format!("{}/buildByToken/buildWithParameters", self.base_url);
        Url::parse_with_params(
            &endpoint,
            &[("job", job), ("token", self.token_for(job)), ("text", text)],
        )
        .context("failed to construct CI trigger URL")
    }

    /// Issue the trigger GET and report the CI server's answer.
    ///
    /// A network failure or a status of 500 and above is an error; anything
    /// below 500 is passed through to the caller as-is.
    #[instrument(skip(self, client), fields(%job, %text))]
    pub async fn trigger(
        &self,
        client: &reqwest::Client,
        job: &str,
        text: &str,
    ) -> Result<TriggerOutcome> {
        let url = self.build_url(job, text)?;
        debug!(url = %redacted(&url), "triggering CI build");

        let response = client
            .get(url.clone())
            .send()
            .await
            .context("failed to reach CI server")?;

        let status = response.status().as_u16();
        check_status(status)?;

        debug!(status, "CI server answered");
        Ok(TriggerOutcome {
            url: url.to_string(),
            status,
        })
    }
}

// ---------------------------------------------------------------------------
// Status policy
// ---------------------------------------------------------------------------

/// Statuses of 500 and above are upstream failures.  4xx answers are passed
/// through so the caller can see what the CI server said about the request.
fn check_status(status: u16) -> Result<()> {
    if status >= 500 {
        bail!("CI server responded with status {status}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Redaction
// ---------------------------------------------------------------------------

/// Copy of `url` with the `token` query value replaced, safe for logging.
fn redacted(url: &Url) -> String {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            if key == "token" {
                (key.into_owned(), "***".to_string())
            } else {
                (key.into_owned(), value.into_owned())
            }
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger_client() -> CiTrigger {
        let mut tokens = HashMap::new();
        tokens.insert("freestyle".to_string(), "s3cret".to_string());
        CiTrigger {
            base_url: "https://jenkins.example.com".to_string(),
            tokens,
        }
    }

    #[test]
    fn build_url_for_known_job() {
        let url = trigger_client().build_url("freestyle", "release-1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://jenkins.example.com/buildByToken/buildWithParameters\
             ?job=freestyle&token=s3cret&text=release-1",
        );
    }

    #[test]
    fn build_url_unknown_job_has_empty_token() {
        let url = trigger_client().build_url("nightly", "release-1").unwrap();
        assert!(url.as_str().contains("job=nightly&token=&text=release-1"));
    }

    #[test]
    fn build_url_encodes_text() {
        let url = trigger_client()
            .build_url("freestyle", "feature branch")
            .unwrap();
        assert!(url.as_str().ends_with("text=feature+branch"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = CiConfig {
            base_url: "https://jenkins.example.com/".to_string(),
            jobs: HashMap::new(),
        };
        let ci = CiTrigger::new(&config);
        let url = ci.build_url("freestyle", "v1").unwrap();
        assert!(url
            .as_str()
            .starts_with("https://jenkins.example.com/buildByToken/"));
    }

    #[test]
    fn check_status_accepts_sub_500() {
        assert!(check_status(200).is_ok());
        assert!(check_status(201).is_ok());
        assert!(check_status(404).is_ok());
        assert!(check_status(499).is_ok());
    }

    #[test]
    fn check_status_rejects_server_errors() {
        let err = check_status(503).unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(check_status(500).is_err());
    }

    #[test]
    fn redacted_url_hides_token() {
        let url = trigger_client().build_url("freestyle", "release-1").unwrap();
        let safe = redacted(&url);
        assert!(!safe.contains("s3cret"));
        assert!(safe.contains("token=***"));
        assert!(safe.contains("job=freestyle"));
    }
}
