//! Checkpointed cluster upgrade and maintenance orchestration.
//!
//! Workflows are ordered lists of [`checkpoint::Step`]s driven by a
//! [`checkpoint::Checkpointer`], which persists progress after each step.
//! Steps call Salt through [`salt::SaltClient`], whose state results are
//! normalized into a [`salt::StateRun`] before success is decided.

pub mod checkpoint;
pub mod error;
pub mod retry;
pub mod salt;
pub mod workflow;

pub use error::{CkupError, Result};
