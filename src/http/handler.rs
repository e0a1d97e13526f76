//! Main axum router and HTTP request handlers for the build relay.
//!
//! Routes:
//! - `GET /build?text=<job repo tag commit>` - re-tag the repo, trigger CI
//! - `GET /hello-world`                      - fixed liveness payload
//! - `GET /healthz`                          - deep health check
//! - `GET /metrics`                          - Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::RetagStrategy;
use crate::metrics::{BuildLabels, BuildOutcome, Stage, StageLabels};
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/build", get(handle_build))
        .route("/hello-world", get(handle_hello_world))
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BuildQuery {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct BuildResponse {
    text: String,
    url: String,
    #[serde(rename = "jenkinsResponse")]
    jenkins_response: u16,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Positional parameters extracted from the `text` query field.
#[derive(Debug, PartialEq, Eq)]
struct BuildRequest<'a> {
    job: &'a str,
    repo: &'a str,
    tag: &'a str,
    commit: &'a str,
}

/// Split `text` on whitespace into the four positional parameters.
///
/// All four must be present; extra tokens are ignored.
fn parse_build_request(text: &str) -> Option<BuildRequest<'_>> {
    let mut tokens = text.split_whitespace();
    Some(BuildRequest {
        job: tokens.next()?,
        repo: tokens.next()?,
        tag: tokens.next()?,
        commit: tokens.next()?,
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /build?text=<job> <repo> <tag> <commit>`
///
/// Re-tags the repository, then triggers the CI job.  Either stage failing
/// aborts the rest of the pipeline and answers 400 with an error body; the
/// relay never answers 5xx from this endpoint.
#[instrument(skip(state, query))]
async fn handle_build(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BuildQuery>,
) -> Result<Response, AppError> {
    let text = query.text.unwrap_or_default();

    let Some(request) = parse_build_request(&text) else {
        state
            .metrics
            .metrics
            .build_requests_total
            .get_or_create(&BuildLabels {
                outcome: BuildOutcome::Rejected,
            })
            .inc();
        return Err(AppError::BadRequest("insufficient params".to_string()));
    };

    info!(
        job = %request.job,
        repo = %request.repo,
        tag = %request.tag,
        commit = %request.commit,
        "handling build request"
    );

    // Stage 1: move the tag upstream.
    let retag_result = match state.config.retag.strategy {
        RetagStrategy::GitCli => {
            state
                .retagger
                .retag(request.repo, request.tag, request.commit)
                .await
        }
        RetagStrategy::ForgeApi => {
            state
                .forge
                .retag(&state.http_client, request.repo, request.tag, request.commit)
                .await
        }
    };
    if let Err(err) = retag_result {
        record_failure(&state, Stage::Retag);
        return Err(AppError::Relay(err));
    }

    // Stage 2: hand the build off to CI.
    let outcome = match state
        .ci
        .trigger(&state.http_client, request.job, request.tag)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            record_failure(&state, Stage::CiTrigger);
            return Err(AppError::Relay(err));
        }
    };

    state
        .metrics
        .metrics
        .build_requests_total
        .get_or_create(&BuildLabels {
            outcome: BuildOutcome::Success,
        })
        .inc();

    Ok((
        StatusCode::OK,
        Json(BuildResponse {
            text,
            url: outcome.url,
            jenkins_response: outcome.status,
        }),
    )
        .into_response())
}

/// `GET /hello-world`
///
/// Fixed liveness payload, no side effects.
async fn handle_hello_world() -> impl IntoResponse {
    Json(serde_json::json!({"status": "up & running"}))
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health_state = crate::health::HealthState {
        config: Arc::clone(&state.config),
        http_client: state.http_client.clone(),
    };
    crate::health::health_handler(axum::extract::State(health_state)).await
}

/// `GET /metrics`
///
/// Returns Prometheus metrics collected by the relay.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, &state.metrics.registry)
        .map_err(|e| AppError::Relay(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn record_failure(state: &AppState, stage: Stage) {
    state
        .metrics
        .metrics
        .relay_failures_total
        .get_or_create(&StageLabels { stage })
        .inc();
    state
        .metrics
        .metrics
        .build_requests_total
        .get_or_create(&BuildLabels {
            outcome: BuildOutcome::Failed,
        })
        .inc();
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
///
/// Every failure, the caller's fault or not, answers 400 with an `error`
/// body; downstream services are the only source of 5xx semantics here.
#[derive(Debug)]
pub enum AppError {
    /// Malformed or insufficient request parameters.
    BadRequest(String),
    /// A retag or CI trigger stage failed.
    Relay(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match self {
            AppError::BadRequest(msg) => msg,
            AppError::Relay(err) => {
                warn!(error = %format!("{err:#}"), "build pipeline failed");
                format!("{err:#}")
            }
        };

        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: message }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_request() {
        let parsed = parse_build_request("freestyle myrepo release-1 abc123def").unwrap();
        assert_eq!(
            parsed,
            BuildRequest {
                job: "freestyle",
                repo: "myrepo",
                tag: "release-1",
                commit: "abc123def",
            }
        );
    }

    #[test]
    fn parse_rejects_single_token() {
        assert!(parse_build_request("hello-world").is_none());
    }

    #[test]
    fn parse_rejects_three_tokens() {
        // The commit hash is read unconditionally, so three tokens are not
        // enough even though the job/repo/tag triple is complete.
        assert!(parse_build_request("freestyle myrepo release-1").is_none());
    }

    #[test]
    fn parse_rejects_empty_text() {
        assert!(parse_build_request("").is_none());
        assert!(parse_build_request("   ").is_none());
    }

    #[test]
    fn parse_ignores_extra_tokens() {
        let parsed = parse_build_request("job repo tag commit extra junk").unwrap();
        assert_eq!(parsed.commit, "commit");
    }

    #[test]
    fn parse_collapses_repeated_whitespace() {
        let parsed = parse_build_request("  job \t repo  tag   commit ").unwrap();
        assert_eq!(parsed.job, "job");
        assert_eq!(parsed.commit, "commit");
    }

    #[test]
    fn build_response_uses_jenkins_response_key() {
        let body = serde_json::to_value(BuildResponse {
            text: "freestyle myrepo release-1 abc123def".to_string(),
            url: "https://jenkins.example.com/buildByToken/buildWithParameters".to_string(),
            jenkins_response: 200,
        })
        .unwrap();
        assert_eq!(body["jenkinsResponse"], 200);
        assert!(body.get("jenkins_response").is_none());
    }

    #[test]
    fn error_response_shape() {
        let body = serde_json::to_value(ErrorResponse {
            error: "insufficient params".to_string(),
        })
        .unwrap();
        assert_eq!(body["error"], "insufficient params");
    }
}
