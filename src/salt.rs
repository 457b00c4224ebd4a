//! Salt command invocation and result interpretation.

pub mod client;
pub mod command;
pub mod locator;
pub mod payload;
pub mod runner;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use client::SaltClient;
pub use locator::MasterLocator;
pub use state::StateRun;
