//! Salt command-line assembly.

use serde_json::Value;

/// Flag requesting machine-readable output.
pub const JSON_OUTPUT_FLAG: &str = "--out=json";

/// A Salt invocation.
///
/// Arguments are emitted as: base subcommand, [`JSON_OUTPUT_FLAG`], positional
/// args, then `saltenv=` and `pillar=`. Salt parses the trailing keyword
/// arguments positionally, so this order is fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct SaltCommand {
    base: Vec<String>,
    args: Vec<String>,
    saltenv: Option<String>,
    pillar: Option<Value>,
}

impl SaltCommand {
    pub fn new<I, S>(base: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base: base.into_iter().map(Into::into).collect(),
            args: Vec::new(),
            saltenv: None,
            pillar: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn saltenv(mut self, saltenv: Option<&str>) -> Self {
        self.saltenv = saltenv.map(str::to_string);
        self
    }

    pub fn pillar(mut self, pillar: Option<Value>) -> Self {
        self.pillar = pillar;
        self
    }

    /// Full argument vector, program included.
    pub fn to_args(&self) -> Vec<String> {
        let mut out = self.base.clone();
        out.push(JSON_OUTPUT_FLAG.to_string());
        out.extend(self.args.iter().cloned());
        if let Some(saltenv) = &self.saltenv {
            out.push(format!("saltenv={saltenv}"));
        }
        if let Some(pillar) = &self.pillar {
            out.push(format!("pillar={pillar}"));
        }
        out
    }

    /// Printable command line for logs and errors.
    pub fn command_line(&self) -> String {
        self.to_args().join(" ")
    }
}
