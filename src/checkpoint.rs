//! Resumable sequential step execution.
//!
//! A [`Checkpointer`] runs an ordered list of [`Step`]s and records the index
//! of the last completed one on disk after every success. Re-running the same
//! workflow against the same file skips completed steps, so each step runs at
//! most once across any number of invocations. A failed step leaves the file
//! untouched and is retried verbatim on the next run.

pub mod step;
pub mod store;

use std::collections::HashMap;
use std::path::Path;

use tracing::{Instrument, Span, error, info, info_span};

use crate::error::{CkupError, Result};
use crate::retry::{RetryPrompt, TerminalPrompt, retry_interactive};

pub use step::{Step, StepContext, StepOutcome};
pub use store::CheckpointStore;

/// Completion state of one step, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepStatus {
    pub position: usize,
    pub id: String,
    pub completed: bool,
}

/// Completion state of `ids` given the last completed position.
pub fn step_status<S: AsRef<str>>(ids: &[S], current: Option<usize>) -> Vec<StepStatus> {
    ids.iter()
        .enumerate()
        .map(|(position, id)| StepStatus {
            position,
            id: id.as_ref().to_string(),
            completed: current.is_some_and(|c| c >= position),
        })
        .collect()
}

/// Drives the steps of one workflow with durable progress.
pub struct Checkpointer<'a> {
    order: Vec<String>,
    steps: HashMap<String, Step<'a>>,
    current: Option<usize>,
    store: CheckpointStore,
    prompt: Box<dyn RetryPrompt + 'a>,
    span: Span,
}

impl<'a> Checkpointer<'a> {
    /// Build a checkpointer and load any existing progress from `path`.
    pub fn new(name: &str, steps: Vec<Step<'a>>, path: impl AsRef<Path>) -> Result<Self> {
        let span = info_span!("workflow", name = %name);
        let store = CheckpointStore::new(path.as_ref());

        let mut order = Vec::with_capacity(steps.len());
        let mut by_id = HashMap::with_capacity(steps.len());
        for step in steps {
            let id = step.id().to_string();
            if by_id.contains_key(&id) {
                return Err(CkupError::DuplicateStep(id));
            }
            order.push(id.clone());
            by_id.insert(id, step);
        }

        let current = store.load()?;
        if let Some(current) = current
            && current >= order.len()
        {
            return Err(CkupError::CheckpointCorrupt {
                path: store.path().to_path_buf(),
                reason: format!(
                    "current position {current} is out of range for {} steps",
                    order.len()
                ),
            });
        }

        let checkpointer = Self {
            order,
            steps: by_id,
            current,
            store,
            prompt: Box::new(TerminalPrompt),
            span,
        };

        let remaining = checkpointer.remaining();
        info!(
            parent: &checkpointer.span,
            checkpoint = %checkpointer.store.path().display(),
            "Remaining steps ({}): {}",
            remaining.len(),
            remaining.join(", ")
        );

        Ok(checkpointer)
    }

    /// Replace the operator prompt used when `prompt_for_retry` is set.
    pub fn with_prompt(mut self, prompt: impl RetryPrompt + 'a) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Index of the last completed step.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Step ids in execution order.
    pub fn step_ids(&self) -> &[String] {
        &self.order
    }

    /// Ids of the steps that have not completed yet.
    pub fn remaining(&self) -> Vec<String> {
        let start = self.current.map_or(0, |c| c + 1);
        self.order.iter().skip(start).cloned().collect()
    }

    /// Completion state of every step.
    pub fn status(&self) -> Vec<StepStatus> {
        step_status(&self.order, self.current)
    }

    /// Run one step if it is the next one due.
    ///
    /// Completed steps are skipped. Any step other than the immediate next one
    /// is rejected with [`CkupError::OutOfOrder`] without running its body.
    pub async fn run_step(&mut self, id: &str, prompt_for_retry: bool) -> Result<StepOutcome> {
        let position = self
            .order
            .iter()
            .position(|s| s == id)
            .ok_or_else(|| CkupError::UnknownStep(id.to_string()))?;

        if let Some(current) = self.current
            && current >= position
        {
            info!(parent: &self.span, step = %id, "Step already completed, skipping");
            return Ok(StepOutcome::Skipped);
        }

        let next = self.current.map_or(0, |c| c + 1);
        if position != next {
            return Err(CkupError::OutOfOrder {
                step: id.to_string(),
                position,
                current: self.current,
            });
        }

        info!(
            parent: &self.span,
            step = %id,
            position = position,
            total = self.order.len(),
            "Running step"
        );

        let ctx = StepContext {
            id: id.to_string(),
            position,
            current: self.current,
        };
        let step_span = info_span!(parent: &self.span, "step", id = %id);
        let step = &self.steps[id];

        let result = if prompt_for_retry {
            retry_interactive(self.prompt.as_ref(), |_: &CkupError| true, || {
                step.call(ctx.clone())
            })
            .instrument(step_span)
            .await
        } else {
            step.call(ctx).instrument(step_span).await
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(parent: &self.span, step = %id, "Step failed: {}", e);
                return Err(e);
            }
        };

        self.store.save(position)?;
        self.current = Some(position);

        info!(parent: &self.span, step = %id, outcome = ?outcome, "Step completed");
        Ok(outcome)
    }

    /// Run every step in order, skipping those already completed.
    ///
    /// The checkpoint file is removed afterwards when `destroy_on_success` is set.
    pub async fn run_all(&mut self, prompt_for_retry: bool, destroy_on_success: bool) -> Result<()> {
        for id in self.order.clone() {
            self.run_step(&id, prompt_for_retry).await?;
        }

        info!(parent: &self.span, "All {} steps completed", self.order.len());

        if destroy_on_success {
            self.destroy()?;
        }
        Ok(())
    }

    /// Remove the checkpoint file. Already absent is fine.
    pub fn destroy(&self) -> Result<()> {
        self.store.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use tempfile::TempDir;

    type Log = Rc<RefCell<Vec<String>>>;

    fn recording_step<'a>(id: &str, log: &Log) -> Step<'a> {
        let log = Rc::clone(log);
        let name = id.to_string();
        Step::new(id, move |_ctx| {
            let log = Rc::clone(&log);
            let name = name.clone();
            async move {
                log.borrow_mut().push(name);
                Ok(StepOutcome::Ran)
            }
        })
    }

    fn failing_step<'a>(id: &str, calls: &Rc<Cell<u32>>) -> Step<'a> {
        let calls = Rc::clone(calls);
        Step::new(id, move |_ctx| {
            calls.set(calls.get() + 1);
            async {
                Err::<StepOutcome, _>(CkupError::UnexpectedOutput {
                    command: "test".to_string(),
                    reason: "boom".to_string(),
                })
            }
        })
    }

    fn steps<'a>(ids: &[&str], log: &Log) -> Vec<Step<'a>> {
        ids.iter().map(|id| recording_step(id, log)).collect()
    }

    struct Answers(RefCell<Vec<bool>>);

    impl RetryPrompt for Answers {
        fn confirm_retry(&self, _error: &str) -> bool {
            self.0.borrow_mut().pop().unwrap_or(false)
        }
    }

    #[tokio::test]
    async fn test_resume_runs_only_remaining_steps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        std::fs::write(&path, r#"{"current": 1}"#).unwrap();

        let log = Log::default();
        let mut cp = Checkpointer::new("upgrade", steps(&["a", "b", "c"], &log), &path).unwrap();
        cp.run_all(false, false).await.unwrap();

        assert_eq!(*log.borrow(), vec!["c"]);
        assert_eq!(cp.current(), Some(2));
    }

    #[tokio::test]
    async fn test_body_sees_context_of_resumed_step() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        std::fs::write(&path, r#"{"current": 0}"#).unwrap();

        let seen: Rc<RefCell<Vec<StepContext>>> = Rc::default();
        let record = Rc::clone(&seen);
        let step = Step::new("b", move |ctx: StepContext| {
            record.borrow_mut().push(ctx.clone());
            async move { Ok(ctx.maybe_skip().unwrap_or(StepOutcome::Ran)) }
        });
        let log = Log::default();
        let mut cp = Checkpointer::new(
            "upgrade",
            vec![recording_step("a", &log), step],
            &path,
        )
        .unwrap();

        assert_eq!(cp.run_step("b", false).await.unwrap(), StepOutcome::Ran);
        assert_eq!(
            *seen.borrow(),
            vec![StepContext {
                id: "b".to_string(),
                position: 1,
                current: Some(0),
            }]
        );
        assert!(log.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_step_is_rejected() {
        let dir = TempDir::new().unwrap();
        let log = Log::default();
        let mut cp = Checkpointer::new(
            "upgrade",
            steps(&["a", "b", "c"], &log),
            dir.path().join("upgrade.json"),
        )
        .unwrap();

        let err = cp.run_step("c", false).await.unwrap_err();

        assert!(matches!(
            err,
            CkupError::OutOfOrder {
                position: 2,
                current: None,
                ..
            }
        ));
        assert!(log.borrow().is_empty());
        assert!(!cp.path().exists());
    }

    #[tokio::test]
    async fn test_gap_after_progress_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        std::fs::write(&path, r#"{"current": 0}"#).unwrap();

        let log = Log::default();
        let mut cp = Checkpointer::new("upgrade", steps(&["a", "b", "c"], &log), &path).unwrap();
        let err = cp.run_step("c", false).await.unwrap_err();

        assert!(matches!(
            err,
            CkupError::OutOfOrder {
                current: Some(0),
                ..
            }
        ));
        assert!(err.to_string().contains("only position 1 may run next"));
        assert!(log.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_progress_survives_new_instance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        let log = Log::default();

        {
            let mut cp = Checkpointer::new("upgrade", steps(&["a", "b"], &log), &path).unwrap();
            assert_eq!(cp.run_step("a", false).await.unwrap(), StepOutcome::Ran);
        }

        let mut cp = Checkpointer::new("upgrade", steps(&["a", "b"], &log), &path).unwrap();
        assert_eq!(cp.current(), Some(0));
        assert_eq!(cp.run_step("a", false).await.unwrap(), StepOutcome::Skipped);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_failed_step_does_not_advance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        let log = Log::default();
        let calls = Rc::new(Cell::new(0));

        let mut cp = Checkpointer::new(
            "upgrade",
            vec![recording_step("a", &log), failing_step("b", &calls), recording_step("c", &log)],
            &path,
        )
        .unwrap();

        assert!(cp.run_all(false, true).await.is_err());
        assert_eq!(cp.current(), Some(0));
        assert_eq!(CheckpointStore::new(&path).load().unwrap(), Some(0));
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(calls.get(), 1);
        assert_eq!(cp.remaining(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_run_all_destroys_on_success() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        let log = Log::default();

        let mut cp = Checkpointer::new("upgrade", steps(&["a", "b"], &log), &path).unwrap();
        cp.run_all(false, true).await.unwrap();

        assert!(!path.exists());
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_run_all_keeps_file_without_destroy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        let log = Log::default();

        let mut cp = Checkpointer::new("upgrade", steps(&["a", "b"], &log), &path).unwrap();
        cp.run_all(false, false).await.unwrap();

        assert_eq!(CheckpointStore::new(&path).load().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_prompt_for_retry_reruns_body() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(Cell::new(0u32));
        let body_calls = Rc::clone(&calls);
        let flaky = Step::new("flaky", move |_ctx| {
            body_calls.set(body_calls.get() + 1);
            let attempt = body_calls.get();
            async move {
                if attempt < 2 {
                    Err(CkupError::UnknownStep("transient".to_string()))
                } else {
                    Ok(StepOutcome::Ran)
                }
            }
        });

        let mut cp = Checkpointer::new("test", vec![flaky], dir.path().join("test.json"))
            .unwrap()
            .with_prompt(Answers(RefCell::new(vec![true])));

        assert_eq!(cp.run_step("flaky", true).await.unwrap(), StepOutcome::Ran);
        assert_eq!(calls.get(), 2);
        assert_eq!(cp.current(), Some(0));
    }

    #[tokio::test]
    async fn test_prompt_declined_propagates_error() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(Cell::new(0));

        let mut cp = Checkpointer::new(
            "test",
            vec![failing_step("a", &calls)],
            dir.path().join("test.json"),
        )
        .unwrap()
        .with_prompt(Answers(RefCell::new(vec![false])));

        assert!(cp.run_step("a", true).await.is_err());
        assert_eq!(calls.get(), 1);
        assert_eq!(cp.current(), None);
    }

    #[tokio::test]
    async fn test_unknown_step() {
        let dir = TempDir::new().unwrap();
        let log = Log::default();
        let mut cp =
            Checkpointer::new("upgrade", steps(&["a"], &log), dir.path().join("u.json")).unwrap();
        assert!(matches!(
            cp.run_step("zzz", false).await,
            Err(CkupError::UnknownStep(_))
        ));
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let log = Log::default();
        let err = Checkpointer::new("upgrade", steps(&["a", "a"], &log), dir.path().join("u.json"))
            .err()
            .unwrap();
        assert!(matches!(err, CkupError::DuplicateStep(id) if id == "a"));
    }

    #[test]
    fn test_out_of_range_checkpoint_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u.json");
        std::fs::write(&path, r#"{"current": 5}"#).unwrap();
        let log = Log::default();
        let err = Checkpointer::new("upgrade", steps(&["a", "b"], &log), &path)
            .err()
            .unwrap();
        assert!(matches!(err, CkupError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn test_missing_current_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u.json");
        std::fs::write(&path, r#"{"position": 0}"#).unwrap();
        let log = Log::default();
        assert!(Checkpointer::new("upgrade", steps(&["a"], &log), &path).is_err());
    }

    #[test]
    fn test_status_and_remaining() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u.json");
        std::fs::write(&path, r#"{"current": 0}"#).unwrap();
        let log = Log::default();
        let cp = Checkpointer::new("upgrade", steps(&["a", "b", "c"], &log), &path).unwrap();

        let status = cp.status();
        assert!(status[0].completed);
        assert!(!status[1].completed);
        assert_eq!(status[2].id, "c");
        assert_eq!(cp.remaining(), vec!["b", "c"]);
        assert_eq!(cp.step_ids(), ["a", "b", "c"]);
    }
}
