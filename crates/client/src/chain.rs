//! Ordered fallback chain.
//!
//! Each step is an independent future; steps run in insertion order and the
//! first `Ok` wins. A failing step is logged and the next one runs. When every
//! step fails, the last error is returned.

use futures_util::future::BoxFuture;
use webpaper_core::Error;

struct Step<'a, T> {
    name: &'static str,
    run: BoxFuture<'a, Result<T, Error>>,
}

/// Ordered list of attempts, tried until one succeeds.
pub struct FallbackChain<'a, T> {
    steps: Vec<Step<'a, T>>,
}

impl<'a, T> Default for FallbackChain<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> FallbackChain<'a, T> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a named step. Futures are lazy, so nothing runs until `run`.
    pub fn attempt(mut self, name: &'static str, run: BoxFuture<'a, Result<T, Error>>) -> Self {
        self.steps.push(Step { name, run });
        self
    }

    /// Run steps in order and return the first success.
    pub async fn run(self) -> Result<T, Error> {
        let total = self.steps.len();
        let mut last_err = None;

        for (idx, step) in self.steps.into_iter().enumerate() {
            match step.run.await {
                Ok(value) => {
                    tracing::debug!(strategy = step.name, "fallback chain step succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    if idx + 1 < total {
                        tracing::warn!(strategy = step.name, error = %e, "step failed, falling back");
                    } else {
                        tracing::warn!(strategy = step.name, error = %e, "last step failed");
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::ExtractFailed("no strategies configured".into())))
    }
}
