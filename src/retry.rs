//! Retry strategies for fallible async operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};
use tracing::{error, warn};

/// Fixed-interval retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub retries: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(retries: u32, interval: Duration) -> Self {
        Self { retries, interval }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 10,
            interval: Duration::from_secs(5),
        }
    }
}

/// Call `f` until it succeeds, retrying errors accepted by `should_retry`.
///
/// At most `policy.retries + 1` attempts are made. The last error is returned
/// once the budget is spent or an error is not retryable.
pub async fn retry<T, E, F, Fut, P>(policy: RetryPolicy, should_retry: P, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt: u32 = 0;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.retries && should_retry(&e) => {
                attempt += 1;
                warn!(
                    attempt = attempt,
                    max_retries = policy.retries,
                    retry_interval_secs = policy.interval.as_secs_f64(),
                    error = %e,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(policy.interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Asks the operator whether a failed operation should be attempted again.
pub trait RetryPrompt {
    /// Returns true to retry.
    fn confirm_retry(&self, error: &str) -> bool;
}

/// Prompt on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl RetryPrompt for TerminalPrompt {
    fn confirm_retry(&self, error: &str) -> bool {
        eprintln!();
        eprintln!("{}", "Operation failed:".red().bold());
        eprintln!("{}", error);
        eprintln!();

        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Retry?")
            .default(true)
            .interact()
            .unwrap_or_else(|e| {
                warn!("Retry prompt unavailable, not retrying: {}", e);
                false
            })
    }
}

/// Call `f` until it succeeds or the operator declines to retry.
///
/// Errors rejected by `should_retry` are returned without prompting.
pub async fn retry_interactive<T, E, F, Fut, P>(
    prompt: &dyn RetryPrompt,
    should_retry: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if should_retry(&e) => {
                error!("{}", e);
                if !prompt.confirm_retry(&e.to_string()) {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}
