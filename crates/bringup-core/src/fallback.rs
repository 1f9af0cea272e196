//! Ordered fallbacks: try each method in turn, stop at the first success.

use crate::CoreError;
use tracing::{debug, warn};

pub struct Method<'a, T> {
    name: &'static str,
    run: Box<dyn FnOnce() -> Result<T, CoreError> + 'a>,
}

impl<'a, T> Method<'a, T> {
    pub fn new(name: &'static str, run: impl FnOnce() -> Result<T, CoreError> + 'a) -> Self {
        Self {
            name,
            run: Box::new(run),
        }
    }
}

/// The method that worked and what it returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chosen<T> {
    pub method: &'static str,
    pub value: T,
    /// `name: error` for every method tried before it.
    pub skipped: Vec<String>,
}

/// Run `methods` in order until one succeeds.
///
/// Connectivity errors and non-retryable errors abort the chain, since no
/// later method can succeed either. Otherwise the failures of every method
/// end up in [`CoreError::AllMethodsFailed`].
pub fn try_in_order<T>(operation: &str, methods: Vec<Method<'_, T>>) -> Result<Chosen<T>, CoreError> {
    let mut failures = Vec::new();
    for method in methods {
        match (method.run)() {
            Ok(value) => {
                debug!("{operation}: using {}", method.name);
                return Ok(Chosen {
                    method: method.name,
                    value,
                    skipped: failures,
                });
            }
            Err(e) if e.is_connectivity() || !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!("{operation}: {} failed: {e}", method.name);
                failures.push(format!("{}: {e}", method.name));
            }
        }
    }
    Err(CoreError::AllMethodsFailed {
        operation: operation.to_owned(),
        failures,
    })
}
