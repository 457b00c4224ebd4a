//! Interpretation of state runs into a uniform success/failure report.

use std::fmt::{self, Write as _};

use serde_json::Value;
use tracing::{error, info};

use super::payload::{ResourceRecord, StatePayload, is_truthy};
use crate::error::{CkupError, Result, StateError};

const INDENT: &str = "    ";

/// Counters over the records of one state run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub changed: usize,
    pub run_time_ms: f64,
}

/// What a step carries besides its record.
#[derive(Debug, Clone, PartialEq)]
pub enum StepDetail {
    /// Plain state: the record's own changes.
    Changes(Value),
    /// Orchestration record wrapping another full run.
    Nested(Box<StateRun>),
    /// `salt.function` call: changes discarded, raw return kept.
    FunctionCall { ret: Option<Value> },
}

/// One interpreted record.
#[derive(Debug, Clone, PartialEq)]
pub struct StateStep {
    pub record: ResourceRecord,
    pub detail: StepDetail,
}

impl StateStep {
    fn from_record(mut record: ResourceRecord) -> Self {
        let detail = if let Some(payload) = StatePayload::embedded(&record) {
            record.changes = Value::Null;
            StepDetail::Nested(Box::new(StateRun::from_payload(payload)))
        } else if record.is_function_call() {
            let ret = record.changes.get("ret").cloned();
            record.changes = Value::Null;
            StepDetail::FunctionCall { ret }
        } else {
            StepDetail::Changes(std::mem::take(&mut record.changes))
        };

        Self { record, detail }
    }

    /// Returns true when this step changed something (recursively for nested runs).
    pub fn has_changes(&self) -> bool {
        match &self.detail {
            StepDetail::Changes(changes) => is_truthy(changes),
            StepDetail::Nested(run) => run.summary.changed > 0,
            StepDetail::FunctionCall { .. } => false,
        }
    }

    /// Resolve the error for this failed step, descending into nested runs.
    fn to_error(&self) -> StateError {
        if let StepDetail::Nested(run) = &self.detail
            && let Some(inner) = &run.error
        {
            return inner.clone();
        }

        StateError {
            id: Some(self.record.id.clone()),
            comment: self.record.comment.clone(),
            duration: Some(self.record.duration),
            namespace: self.record.namespace(),
        }
    }
}

/// Structured interpretation of one state or orchestrate run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateRun {
    /// Steps ordered by `__run_num__`.
    pub steps: Vec<StateStep>,
    pub summary: Summary,
    pub error: Option<StateError>,
    pub retcode: Option<i32>,
}

impl StateRun {
    /// Parse raw JSON output. `exit_code` is the fallback retcode.
    pub fn parse(value: Value, exit_code: Option<i32>) -> Self {
        Self::from_payload(StatePayload::decode(value, exit_code))
    }

    /// Build a run from an already decoded payload.
    pub fn from_payload(payload: StatePayload) -> Self {
        let (retcode, mut records) = match payload {
            StatePayload::ErrorMessage(message) => {
                return Self {
                    error: Some(StateError::message(message)),
                    ..Self::default()
                };
            }
            StatePayload::ResourceMap { retcode, records } => (retcode, records),
        };

        // Execution order, not map order, decides which failure came first.
        records.sort_by(|a, b| {
            a.run_num
                .cmp(&b.run_num)
                .then_with(|| a.target.cmp(&b.target))
                .then_with(|| a.id.cmp(&b.id))
        });

        let steps: Vec<StateStep> = records.into_iter().map(StateStep::from_record).collect();

        let mut summary = Summary::default();
        for step in &steps {
            if step.record.result {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            if step.has_changes() {
                summary.changed += 1;
            }
            summary.run_time_ms += step.record.duration;
        }

        let error = steps
            .iter()
            .find(|step| !step.record.result)
            .map(StateStep::to_error);

        Self {
            steps,
            summary,
            error,
            retcode,
        }
    }

    /// Returns true when no record failed and no error message was reported.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Render the report, optionally including the changes of changed steps.
    pub fn to_report(&self, verbose: bool) -> String {
        let mut out = String::new();
        self.write_report(&mut out, 0, verbose);
        out
    }

    fn write_report(&self, out: &mut String, depth: usize, verbose: bool) {
        let pad = INDENT.repeat(depth);

        if self.steps.is_empty()
            && let Some(err) = &self.error
        {
            let _ = writeln!(out, "{pad}Error: {}", err.comment);
            return;
        }

        let _ = writeln!(
            out,
            "{pad}Summary: {} succeeded, {} failed, {} changed (took {:.3} ms)",
            self.summary.succeeded,
            self.summary.failed,
            self.summary.changed,
            self.summary.run_time_ms
        );

        for step in &self.steps {
            out.push_str(&step_to_string(step, depth + 1, verbose));
        }
    }

    /// Log the error and return it, or log the report and hand back the run.
    pub fn raise_or_return(self) -> Result<Self> {
        if let Some(err) = self.error {
            error!(
                id = err.id.as_deref().unwrap_or("-"),
                namespace = err.namespace.as_deref().unwrap_or("-"),
                "State run failed: {}",
                err.comment
            );
            return Err(CkupError::State(err));
        }

        info!("State run succeeded\n{}", self.to_report(true).trim_end());
        Ok(self)
    }
}

impl fmt::Display for StateRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_report(false))
    }
}

/// Render one step (and any nested run) at the given depth.
pub fn step_to_string(step: &StateStep, depth: usize, verbose: bool) -> String {
    let pad = INDENT.repeat(depth);
    let record = &step.record;
    let status = if record.result { "succeeded" } else { "failed" };
    let changes = if step.has_changes() {
        " with changes"
    } else {
        ""
    };

    let mut out = String::new();
    let _ = write!(
        out,
        "{pad}- {}: {status}{changes} ({:.3} ms)",
        record.id, record.duration
    );
    if !record.result && !record.comment.is_empty() {
        let _ = write!(out, ": {}", record.comment);
    }
    out.push('\n');

    match &step.detail {
        StepDetail::Nested(run) => run.write_report(&mut out, depth + 1, verbose),
        StepDetail::Changes(changes) if verbose && record.result && is_truthy(changes) => {
            let rendered = serde_json::to_string_pretty(changes).unwrap_or_default();
            for line in rendered.lines() {
                let _ = writeln!(out, "{pad}{INDENT}{line}");
            }
        }
        _ => {}
    }

    out
}
