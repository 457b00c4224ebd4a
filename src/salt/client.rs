//! Salt invocation and result dispatch.

use serde_json::Value;
use tracing::{debug, info};

use super::command::SaltCommand;
use super::locator::MasterLocator;
use super::runner::{CommandOutput, CommandRunner, ProcessRunner};
use super::state::StateRun;
use crate::error::{CkupError, Result, ResultError};

/// Key under which `salt-call --local` nests its return value.
const LOCAL_KEY: &str = "local";

/// Client for the Salt master running in the control-plane container.
#[derive(Debug)]
pub struct SaltClient<R: CommandRunner = ProcessRunner> {
    runner: R,
    locator: MasterLocator,
    saltenv: Option<String>,
}

impl SaltClient<ProcessRunner> {
    pub fn new(locator: MasterLocator, saltenv: Option<String>) -> Self {
        Self::with_runner(ProcessRunner, locator, saltenv)
    }
}

impl<R: CommandRunner> SaltClient<R> {
    pub fn with_runner(runner: R, locator: MasterLocator, saltenv: Option<String>) -> Self {
        Self {
            runner,
            locator,
            saltenv,
        }
    }

    pub fn saltenv(&self) -> Option<&str> {
        self.saltenv.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn command_runner(&self) -> &R {
        &self.runner
    }

    /// Run `state.orchestrate` for an SLS on the master.
    pub async fn orchestrate(&self, sls: &str, pillar: Option<Value>) -> Result<StateRun> {
        let cmd = SaltCommand::new(["salt-run", "state.orchestrate"])
            .arg(sls)
            .saltenv(self.saltenv())
            .pillar(pillar);
        info!("Orchestrating {}", sls);
        let (output, command_line) = self.exec_in_master(&cmd).await?;
        interpret_state(output, &command_line, None)
    }

    /// Apply an SLS to a minion target.
    pub async fn state_apply(
        &self,
        target: &str,
        sls: &str,
        pillar: Option<Value>,
    ) -> Result<StateRun> {
        let cmd = SaltCommand::new(["salt", target, "state.sls"])
            .arg(sls)
            .saltenv(self.saltenv())
            .pillar(pillar);
        info!("Applying {} on {}", sls, target);
        let (output, command_line) = self.exec_in_master(&cmd).await?;
        interpret_state(output, &command_line, None)
    }

    /// Call a runner function on the master and return its decoded output.
    pub async fn runner(&self, fun: &str, args: &[&str]) -> Result<Value> {
        let cmd = SaltCommand::new(["salt-run", fun])
            .args(args.iter().copied())
            .saltenv(self.saltenv());
        let (output, command_line) = self.exec_in_master(&cmd).await?;
        interpret_plain(output, &command_line, None)
    }

    /// Call an execution function with the local minion agent on this host.
    pub async fn local_call(&self, fun: &str, args: &[&str]) -> Result<Value> {
        let cmd = SaltCommand::new(["salt-call", "--local", fun])
            .args(args.iter().copied())
            .saltenv(self.saltenv());
        let argv = cmd.to_args();
        let command_line = cmd.command_line();
        debug!("Dispatching: {}", command_line);

        let output = self.runner.run(&argv[0], &argv[1..]).await?;
        interpret_plain(output, &command_line, Some(LOCAL_KEY))
    }

    /// Apply an SLS with the local minion agent on this host.
    pub async fn local_state_apply(&self, sls: &str, pillar: Option<Value>) -> Result<StateRun> {
        let cmd = SaltCommand::new(["salt-call", "--local", "state.sls"])
            .arg(sls)
            .saltenv(self.saltenv())
            .pillar(pillar);
        let argv = cmd.to_args();
        let command_line = cmd.command_line();
        info!("Applying {} locally", sls);

        let output = self.runner.run(&argv[0], &argv[1..]).await?;
        interpret_state(output, &command_line, Some(LOCAL_KEY))
    }

    /// Run a command inside the salt-master container.
    async fn exec_in_master(&self, cmd: &SaltCommand) -> Result<(CommandOutput, String)> {
        let container = self.locator.locate(&self.runner).await?;

        let mut args = vec!["exec".to_string(), "-i".to_string(), container];
        args.extend(cmd.to_args());
        let command_line = format!("crictl {}", args.join(" "));
        debug!("Dispatching: {}", command_line);

        let output = self.runner.run("crictl", &args).await?;
        Ok((output, command_line))
    }
}

fn result_error(output: CommandOutput, command_line: &str) -> CkupError {
    CkupError::Result(ResultError {
        code: output.code,
        command: command_line.to_string(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Parse state.sls / state.orchestrate output.
///
/// The exit code is frequently 0 even when states failed, so the parsed
/// results decide. It only matters when the output is not JSON at all.
fn interpret_state(
    output: CommandOutput,
    command_line: &str,
    key: Option<&str>,
) -> Result<StateRun> {
    let mut value = match serde_json::from_str::<Value>(&output.stdout) {
        Ok(value) => value,
        Err(_) if !output.success() => return Err(result_error(output, command_line)),
        Err(source) => {
            return Err(CkupError::Json {
                context: command_line.to_string(),
                output: output.stdout,
                source,
            });
        }
    };

    if let Some(key) = key {
        value = narrow(value, key, command_line)?;
    }
    StateRun::parse(value, Some(output.code)).raise_or_return()
}

fn narrow(mut value: Value, key: &str, command_line: &str) -> Result<Value> {
    value
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| CkupError::UnexpectedOutput {
            command: command_line.to_string(),
            reason: format!("missing `{key}` key"),
        })
}

/// Decode plain call output, optionally narrowed to one top-level key.
fn interpret_plain(output: CommandOutput, command_line: &str, key: Option<&str>) -> Result<Value> {
    if !output.success() {
        return Err(result_error(output, command_line));
    }

    let value: Value = serde_json::from_str(&output.stdout).map_err(|source| CkupError::Json {
        context: command_line.to_string(),
        output: output.stdout.clone(),
        source,
    })?;

    match key {
        None => Ok(value),
        Some(key) => narrow(value, key, command_line),
    }
}
