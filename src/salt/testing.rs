//! Scripted command runner for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use super::runner::{CommandOutput, CommandRunner};
use crate::error::Result;

/// Replays canned outputs and records every invocation.
///
/// `crictl ps` listings are served from their own queue (falling back to a
/// single running container) so tests only script the calls they care about.
#[derive(Debug, Default)]
pub struct FakeRunner {
    listings: RefCell<VecDeque<CommandOutput>>,
    outputs: RefCell<VecDeque<CommandOutput>>,
    calls: RefCell<Vec<Vec<String>>>,
}

pub const MASTER_ID: &str = "3f9a1c";

pub fn output(code: i32, stdout: &str) -> CommandOutput {
    CommandOutput {
        code,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(self, listing: CommandOutput) -> Self {
        self.listings.borrow_mut().push_back(listing);
        self
    }

    pub fn with_output(self, output: CommandOutput) -> Self {
        self.outputs.borrow_mut().push_back(output);
        self
    }

    /// Every invocation as `program args...`.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Invocations other than container listings.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| !(c[0] == "crictl" && c.get(1).is_some_and(|a| a == "ps")))
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.calls.borrow_mut().push(call);

        if program == "crictl" && args.first().is_some_and(|a| a == "ps") {
            return Ok(self
                .listings
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| output(0, &format!("{MASTER_ID}\n"))));
        }

        Ok(self
            .outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| output(0, "{}")))
    }
}
