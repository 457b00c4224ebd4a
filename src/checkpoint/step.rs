//! Workflow steps.

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::error::Result;

/// How a step body finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The body ran to completion.
    Ran,
    /// The work was already done and nothing ran.
    Skipped,
}

/// What a step body knows about its own position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub id: String,
    pub position: usize,
    /// Last completed position when the step started.
    pub current: Option<usize>,
}

impl StepContext {
    /// Returns `Some(Skipped)` when `current` has already reached `position`.
    ///
    /// [`Checkpointer::run_step`](super::Checkpointer::run_step) skips completed
    /// steps before their body starts, so a body it invokes always sees `None`.
    pub fn maybe_skip(&self) -> Option<StepOutcome> {
        match self.current {
            Some(current) if current >= self.position => Some(StepOutcome::Skipped),
            _ => None,
        }
    }
}

type StepBody<'a> = Box<dyn Fn(StepContext) -> LocalBoxFuture<'a, Result<StepOutcome>> + 'a>;

/// A named unit of work. Arguments are captured by the body.
pub struct Step<'a> {
    id: String,
    body: StepBody<'a>,
}

impl<'a> Step<'a> {
    pub fn new<F, Fut>(id: impl Into<String>, body: F) -> Self
    where
        F: Fn(StepContext) -> Fut + 'a,
        Fut: Future<Output = Result<StepOutcome>> + 'a,
    {
        Self {
            id: id.into(),
            body: Box::new(move |ctx| body(ctx).boxed_local()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn call(&self, ctx: StepContext) -> LocalBoxFuture<'a, Result<StepOutcome>> {
        (self.body)(ctx)
    }
}

impl fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("id", &self.id).finish_non_exhaustive()
    }
}
