use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::config::Config;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub ci: CheckResult,
    pub git: CheckResult,
    pub workdir: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state expected by the handler
// ---------------------------------------------------------------------------

/// Minimal subset of `AppState` required by the health-check handler.
#[derive(Clone)]
pub struct HealthState {
    pub config: Arc<Config>,
    pub http_client: reqwest::Client,
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

async fn check_ci(client: &reqwest::Client, base_url: &str) -> CheckResult {
    let url = base_url.trim_end_matches('/');
    match client.head(url).send().await {
        Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
            CheckResult::healthy()
        }
        // An authenticated CI server commonly answers 403 to a bare HEAD;
        // reachability is what this check is about.
        Ok(resp) if resp.status().is_client_error() => CheckResult::healthy(),
        Ok(resp) => CheckResult::unhealthy(format!("HEAD {} returned {}", url, resp.status())),
        Err(e) => CheckResult::unhealthy(format!("HEAD {url} failed: {e}")),
    }
}

/// The retag path shells out to `git`; a missing binary makes every build
/// request fail.
async fn check_git() -> CheckResult {
    let output = tokio::process::Command::new("git")
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => CheckResult::healthy(),
        Ok(out) => CheckResult::unhealthy(format!("git --version exited with {}", out.status)),
        Err(e) => CheckResult::unhealthy(format!("failed to spawn git: {e}")),
    }
}

/// Verify that a retag working directory can actually be created.
async fn check_workdir(config: &Config) -> CheckResult {
    match &config.retag.workdir {
        Some(dir) => match tokio::fs::create_dir_all(dir).await {
            Ok(()) => CheckResult::healthy(),
            Err(e) => CheckResult::unhealthy(format!("cannot create workdir {dir}: {e}")),
        },
        None => match tempfile::tempdir() {
            Ok(_) => CheckResult::healthy(),
            Err(e) => CheckResult::unhealthy(format!("cannot create temp dir: {e}")),
        },
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    let all_ok = checks.ci.ok && checks.git.ok && checks.workdir.ok;
    // Without git or a writable working area no retag can succeed.
    let any_critical = !checks.git.ok || !checks.workdir.ok;

    if all_ok {
        HealthStatus::Ok
    } else if any_critical {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz` handler.  Returns 200 on Ok/Degraded, 503 on Unhealthy.
pub async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (ci, git, workdir) = tokio::join!(
        check_ci(&state.http_client, &state.config.ci.base_url),
        check_git(),
        check_workdir(&state.config),
    );

    let checks = HealthChecks { ci, git, workdir };
    let status = aggregate_status(&checks);
    let body = HealthResponse { status, checks };

    let http_status = match status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn checks(ci: bool, git: bool, workdir: bool) -> HealthChecks {
        let make = |ok| {
            if ok {
                CheckResult::healthy()
            } else {
                CheckResult::unhealthy("down")
            }
        };
        HealthChecks {
            ci: make(ci),
            git: make(git),
            workdir: make(workdir),
        }
    }

    #[test]
    fn all_checks_passing_is_ok() {
        assert_eq!(aggregate_status(&checks(true, true, true)), HealthStatus::Ok);
    }

    #[test]
    fn unreachable_ci_is_degraded() {
        assert_eq!(
            aggregate_status(&checks(false, true, true)),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn missing_git_is_unhealthy() {
        assert_eq!(
            aggregate_status(&checks(true, false, true)),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn unwritable_workdir_is_unhealthy() {
        assert_eq!(
            aggregate_status(&checks(true, true, false)),
            HealthStatus::Unhealthy
        );
    }
}
