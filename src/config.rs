use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Retag strategy
// ---------------------------------------------------------------------------

/// How tags are created on the upstream repository.
///
/// | Variant     | Mechanism                                     | Force semantics |
/// |-------------|-----------------------------------------------|-----------------|
/// | `git-cli`   | Local checkout + `git tag -f` / `git push -f` | Yes             |
/// | `forge-api` | Forge REST API (tag object + ref creation)    | No              |
///
/// The API path cannot move an existing tag; re-running it for the same tag
/// name fails at the ref-creation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetagStrategy {
    /// Shell out to the system `git` binary in an isolated working directory.
    #[default]
    GitCli,
    /// Create the tag through the upstream forge's REST API.
    ForgeApi,
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ci: CiConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retag: RetagConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:1323`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:1323".to_string()
}

// ---------------------------------------------------------------------------
// CI server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CiConfig {
    /// Base URL of the CI server (e.g. `https://jenkins.corp.example.com`).
    pub base_url: String,
    /// Known build jobs, keyed by job name.
    ///
    /// Each job carries the name of the environment variable holding its
    /// trigger token.  Tokens are resolved once at startup; jobs whose
    /// variable is unset get an empty token, which the CI server rejects.
    #[serde(default)]
    pub jobs: HashMap<String, JobConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Name of the environment variable that holds this job's trigger token.
    pub token_env: String,
}

// ---------------------------------------------------------------------------
// Upstream forge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Hostname used for authenticated clone/push URLs.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Full URL to the upstream API root, used by the `forge-api` strategy.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Organisation / user that owns the repositories being re-tagged.
    pub owner: String,
    /// Username embedded in authenticated HTTPS URLs and used for API
    /// Basic auth.
    pub username: String,
    /// Name of the environment variable that holds the upstream token.
    ///
    /// The token itself never appears in the config file, and must never be
    /// echoed into logs or error messages returned to callers.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_hostname() -> String {
    "github.com".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "FORGE_TOKEN".to_string()
}

// ---------------------------------------------------------------------------
// Retag behaviour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetagConfig {
    #[serde(default)]
    pub strategy: RetagStrategy,
    /// Optional fixed working directory for the `git-cli` strategy.
    ///
    /// When unset, every retag runs in its own temporary directory that is
    /// removed afterwards.  A fixed directory keeps fetched objects around
    /// between requests, but concurrent requests against it can interleave.
    #[serde(default)]
    pub workdir: Option<String>,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        !config.ci.base_url.trim().is_empty(),
        "ci.base_url must not be empty"
    );
    anyhow::ensure!(
        config.ci.base_url.starts_with("http://") || config.ci.base_url.starts_with("https://"),
        "ci.base_url must be an http(s) URL"
    );
    anyhow::ensure!(
        !config.upstream.owner.trim().is_empty(),
        "upstream.owner must not be empty"
    );
    anyhow::ensure!(
        !config.upstream.username.trim().is_empty(),
        "upstream.username must not be empty"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
server:
  listen: \"127.0.0.1:1323\"
ci:
  base_url: https://jenkins.example.com
  jobs:
    freestyle:
      token_env: TOKEN_FREESTYLE
    hello-world:
      token_env: TOKEN_HELLO_WORLD
upstream:
  owner: acme
  username: relay-bot
";

    #[test]
    fn parse_minimal_config() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:1323");
        assert_eq!(config.ci.jobs.len(), 2);
        assert_eq!(config.ci.jobs["freestyle"].token_env, "TOKEN_FREESTYLE");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn defaults_applied() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.upstream.hostname, "github.com");
        assert_eq!(config.upstream.api_url, "https://api.github.com");
        assert_eq!(config.upstream.token_env, "FORGE_TOKEN");
        assert_eq!(config.retag.strategy, RetagStrategy::GitCli);
        assert!(config.retag.workdir.is_none());
    }

    #[test]
    fn retag_strategy_kebab_case() {
        let yaml = format!("{MINIMAL}retag:\n  strategy: forge-api\n");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.retag.strategy, RetagStrategy::ForgeApi);
    }

    #[test]
    fn empty_owner_rejected() {
        let yaml = MINIMAL.replace("owner: acme", "owner: \"\"");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn non_http_base_url_rejected() {
        let yaml = MINIMAL.replace(
            "base_url: https://jenkins.example.com",
            "base_url: jenkins.example.com",
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(validate_config(&config).is_err());
    }
}
