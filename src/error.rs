//! Custom error types for ckup.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, CkupError>;

/// Errors that can occur while driving a workflow.
#[derive(Error, Debug)]
pub enum CkupError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode JSON from `{context}`: {source}")]
    Json {
        context: String,
        output: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid checkpoint file {}: {reason}", .path.display())]
    CheckpointCorrupt { path: PathBuf, reason: String },

    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected output from `{command}`: {reason}")]
    UnexpectedOutput { command: String, reason: String },

    #[error("Failed to locate {target} with `{command}`: {reason}")]
    Locator {
        target: String,
        command: String,
        reason: String,
    },

    #[error(transparent)]
    Result(#[from] ResultError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error(
        "Step {step} is at position {position} and cannot run yet: {}",
        out_of_order_reason(.position, .current)
    )]
    OutOfOrder {
        step: String,
        position: usize,
        current: Option<usize>,
    },
}

impl CkupError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns true for errors raised while resolving the salt-master container.
    pub const fn is_locator(&self) -> bool {
        matches!(self, Self::Locator { .. })
    }
}

fn out_of_order_reason(position: &usize, current: &Option<usize>) -> String {
    match *current {
        None => format!(
            "no step has completed yet, so only position 0 may run (requested {position})"
        ),
        Some(current) => format!(
            "last completed position is {current}, so only position {} may run next",
            current + 1
        ),
    }
}

/// An external process exited with a non-zero status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultError {
    pub code: i32,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for ResultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` exited with code {}", self.command, self.code)?;
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        if !stderr.is_empty() {
            write!(f, "\nstderr: {stderr}")?;
        }
        if !stdout.is_empty() {
            write!(f, "\nstdout: {stdout}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ResultError {}

/// A parsed state run reported at least one failure.
///
/// Error-message payloads (render failures and the like) carry no `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateError {
    pub id: Option<String>,
    pub comment: String,
    pub duration: Option<f64>,
    pub namespace: Option<String>,
}

impl StateError {
    /// Build an error that only carries a message.
    pub fn message(comment: impl Into<String>) -> Self {
        Self {
            id: None,
            comment: comment.into(),
            duration: None,
            namespace: None,
        }
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(id) = &self.id else {
            return write!(f, "State run failed: {}", self.comment);
        };

        write!(f, "State {id}")?;
        if let Some(namespace) = &self.namespace {
            write!(f, " (on {namespace})")?;
        }
        write!(f, " failed")?;
        if let Some(duration) = self.duration {
            write!(f, " after {duration:.3} ms")?;
        }
        write!(f, ": {}", self.comment)
    }
}

impl std::error::Error for StateError {}
