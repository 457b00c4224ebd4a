//! Concrete step lists for the operations ckup drives.
//!
//! This is the only operation-specific code. Everything a step needs is
//! captured by its body when the list is built.

pub mod test_suite;
pub mod upgrade;

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde_json::{Value, json};

use crate::checkpoint::{Step, StepOutcome};
use crate::salt::SaltClient;
use crate::salt::runner::CommandRunner;

/// A named workflow with its own checkpoint file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkflowKind {
    Upgrade,
    Test,
}

impl WorkflowKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Upgrade => "upgrade",
            Self::Test => "test",
        }
    }

    /// Step ids in execution order.
    pub const fn step_ids(self) -> &'static [&'static str] {
        match self {
            Self::Upgrade => upgrade::STEPS,
            Self::Test => test_suite::STEPS,
        }
    }

    /// `<dir>/<name>.json`
    pub fn checkpoint_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.name()))
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pillar passed to every upgrade orchestration.
pub(crate) fn orchestrate_pillar(dest_version: &str) -> Value {
    json!({"orchestrate": {"dest_version": dest_version}})
}

/// A step that runs one orchestration and fails on any failed state.
pub(crate) fn orchestrate_step<'a, R: CommandRunner + 'a>(
    id: &str,
    client: &'a SaltClient<R>,
    sls: &'static str,
    pillar: Option<Value>,
) -> Step<'a> {
    Step::new(id, move |_| {
        let pillar = pillar.clone();
        async move {
            client.orchestrate(sls, pillar).await?;
            Ok(StepOutcome::Ran)
        }
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use crate::retry::RetryPolicy;
    use crate::salt::testing::FakeRunner;
    use crate::salt::{MasterLocator, SaltClient};

    pub fn client(runner: FakeRunner) -> SaltClient<FakeRunner> {
        SaltClient::with_runner(
            runner,
            MasterLocator::new("salt-master", RetryPolicy::new(0, Duration::ZERO)),
            Some("cluster-2.0".to_string()),
        )
    }

    /// The SLS a recorded state command applied, or the function it called.
    pub fn operation(command: &[String]) -> String {
        let Some(flag) = command.iter().position(|a| a == "--out=json") else {
            return String::new();
        };
        match command[flag - 1].as_str() {
            "state.orchestrate" | "state.sls" => command[flag + 1].clone(),
            function => function.to_string(),
        }
    }
}
