//! Resolution of the salt-master container.

use tracing::debug;

use super::runner::CommandRunner;
use crate::error::{CkupError, Result, ResultError};
use crate::retry::{RetryPolicy, retry};

/// Default container name of the Salt master.
pub const DEFAULT_MASTER_CONTAINER: &str = "salt-master";

/// Finds exactly one running container by its Kubernetes container name.
#[derive(Debug, Clone)]
pub struct MasterLocator {
    pub container_name: String,
    pub policy: RetryPolicy,
}

impl Default for MasterLocator {
    fn default() -> Self {
        Self {
            container_name: DEFAULT_MASTER_CONTAINER.to_string(),
            policy: RetryPolicy::default(),
        }
    }
}

impl MasterLocator {
    pub fn new(container_name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            container_name: container_name.into(),
            policy,
        }
    }

    /// Return the container id, retrying while zero or several match.
    pub async fn locate<R: CommandRunner>(&self, runner: &R) -> Result<String> {
        retry(
            self.policy,
            |e: &CkupError| e.is_locator() || matches!(e, CkupError::Result(_)),
            || self.list_once(runner),
        )
        .await
    }

    fn listing_args(&self) -> Vec<String> {
        vec![
            "ps".to_string(),
            "-q".to_string(),
            "--label".to_string(),
            format!("io.kubernetes.container.name={}", self.container_name),
            "--state".to_string(),
            "Running".to_string(),
        ]
    }

    async fn list_once<R: CommandRunner>(&self, runner: &R) -> Result<String> {
        let args = self.listing_args();
        let command = format!("crictl {}", args.join(" "));
        let output = runner.run("crictl", &args).await?;

        if !output.success() {
            return Err(ResultError {
                code: output.code,
                command,
                stdout: output.stdout,
                stderr: output.stderr,
            }
            .into());
        }

        let ids: Vec<&str> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        match ids.as_slice() {
            [id] => {
                debug!("Located {} container: {}", self.container_name, id);
                Ok((*id).to_string())
            }
            [] => Err(CkupError::Locator {
                target: self.container_name.clone(),
                command,
                reason: "no running container found".to_string(),
            }),
            many => Err(CkupError::Locator {
                target: self.container_name.clone(),
                command,
                reason: format!(
                    "expected one running container, found {}: {}",
                    many.len(),
                    many.join(", ")
                ),
            }),
        }
    }
}
