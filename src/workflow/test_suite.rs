//! Post-deployment test run.

use serde_json::Value;
use tracing::info;

use super::orchestrate_step;
use crate::checkpoint::{Step, StepOutcome};
use crate::error::{CkupError, Result};
use crate::salt::SaltClient;
use crate::salt::runner::CommandRunner;

pub const CHECK_MINIONS: &str = "check-minions";
pub const RUN_TESTS: &str = "run-tests";

pub const STEPS: &[&str] = &[CHECK_MINIONS, RUN_TESTS];

const TESTS_SLS: &str = "orchestrate.tests";

pub fn steps<'a, R: CommandRunner + 'a>(client: &'a SaltClient<R>) -> Vec<Step<'a>> {
    vec![
        Step::new(CHECK_MINIONS, move |_| async move {
            let status = client.runner("manage.status", &[]).await?;
            let up = check_minions(&status)?;
            info!("{} minion(s) up", up);
            Ok(StepOutcome::Ran)
        }),
        orchestrate_step(RUN_TESTS, client, TESTS_SLS, None),
    ]
}

/// Count responding minions, failing when any is down.
fn check_minions(status: &Value) -> Result<usize> {
    let names = |key: &str| -> Vec<String> {
        status
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    if status.get("up").is_none() && status.get("down").is_none() {
        return Err(CkupError::UnexpectedOutput {
            command: "salt-run manage.status".to_string(),
            reason: format!("no `up` or `down` key in {status}"),
        });
    }

    let down = names("down");
    if !down.is_empty() {
        return Err(CkupError::UnexpectedOutput {
            command: "salt-run manage.status".to_string(),
            reason: format!("minions not responding: {}", down.join(", ")),
        });
    }
    Ok(names("up").len())
}
