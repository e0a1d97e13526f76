//! Git command wrappers and the retag sequence.
//!
//! All operations shell out to the `git` binary using `tokio::process::Command`
//! with structured argument lists for non-blocking execution. Credentials are
//! injected through the remote URL and scrubbed from anything that can reach
//! logs or error responses.

pub mod commands;
pub mod retag;

pub use retag::Retagger;
