//! Observers for verification pipeline events.
//!
//! Hooks fire around each pipeline stage and for every internal fault, so a
//! host can trace how long a snapshot took to verify and where it failed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::declaration::Identity;

/// One stage of the verification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Collect,
    Registry,
    Graph,
    Rules,
    Cycles,
    Lifetimes,
    Emit,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Collect => "collect",
            Stage::Registry => "registry",
            Stage::Graph => "graph",
            Stage::Rules => "rules",
            Stage::Cycles => "cycles",
            Stage::Lifetimes => "lifetimes",
            Stage::Emit => "emit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer of verification events.
///
/// Calls are synchronous. Cycle detection and lifetime validation may run on
/// separate threads, so their hooks can arrive concurrently.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use ferrous_di_verify::{DeclarationFragment, Stage, Verifier, VerifyObserver};
///
/// #[derive(Default)]
/// struct CountingObserver {
///     finished: AtomicUsize,
/// }
///
/// impl VerifyObserver for CountingObserver {
///     fn stage_started(&self, _stage: Stage) {}
///
///     fn stage_finished(&self, _stage: Stage, _elapsed: Duration, _findings: usize) {
///         self.finished.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let observer = Arc::new(CountingObserver::default());
/// let verifier = Verifier::default().with_observer(observer.clone());
/// verifier.verify(&[DeclarationFragment::class("Clock").singleton()]);
/// assert_eq!(observer.finished.load(Ordering::Relaxed), 7);
/// ```
pub trait VerifyObserver: Send + Sync {
    fn stage_started(&self, stage: Stage);

    /// `findings` counts the diagnostics the stage produced before deduplication.
    fn stage_finished(&self, stage: Stage, elapsed: Duration, findings: usize);

    /// A declaration faulted during `stage` and was reported as an internal error.
    fn internal_fault(&self, stage: Stage, subject: &Identity, message: &str) {
        let _ = (stage, subject, message);
    }
}

/// The observers attached to one verifier.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn VerifyObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn VerifyObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    #[inline]
    pub(crate) fn stage_started(&self, stage: Stage) {
        for observer in &self.observers {
            observer.stage_started(stage);
        }
    }

    #[inline]
    pub(crate) fn stage_finished(&self, stage: Stage, elapsed: Duration, findings: usize) {
        for observer in &self.observers {
            observer.stage_finished(stage, elapsed, findings);
        }
    }

    pub(crate) fn internal_fault(&self, stage: Stage, subject: &Identity, message: &str) {
        for observer in &self.observers {
            observer.internal_fault(stage, subject, message);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("count", &self.observers.len()).finish()
    }
}

/// Forwards pipeline events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    prefix: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "ferrous-di-verify".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifyObserver for LoggingObserver {
    fn stage_started(&self, stage: Stage) {
        tracing::debug!(prefix = %self.prefix, %stage, "stage started");
    }

    fn stage_finished(&self, stage: Stage, elapsed: Duration, findings: usize) {
        tracing::info!(prefix = %self.prefix, %stage, ?elapsed, findings, "stage finished");
    }

    fn internal_fault(&self, stage: Stage, subject: &Identity, message: &str) {
        tracing::error!(prefix = %self.prefix, %stage, %subject, fault = message, "internal fault");
    }
}
