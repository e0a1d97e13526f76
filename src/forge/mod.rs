//! Upstream forge API client.
//!
//! Used by the `forge-api` retag strategy; the default `git-cli` strategy
//! never touches the API.  Only GitHub's git-data endpoints are implemented.

pub mod github;

pub use github::GitHubClient;
