//! Observers of compiler runs.
//!
//! Observers are told when each pass starts and finishes, how long it took,
//! and which log lines it produced. They are a diagnostic seam only:
//! nothing they do can influence the compilation.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::compiler::PassPhase;
use crate::error::CompileError;

/// Observer of compiler pass execution.
///
/// Calls are made synchronously between passes; keep implementations
/// cheap.
///
/// # Examples
///
/// ```
/// use ferrous_container::{CompilerObserver, ContainerBuilder, PassPhase};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct PassCounter(AtomicUsize);
///
/// impl CompilerObserver for PassCounter {
///     fn pass_finished(&self, _pass: &str, _phase: PassPhase, _elapsed: Duration) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let counter = Arc::new(PassCounter::default());
/// let mut container = ContainerBuilder::new();
/// container.compiler_mut().add_observer(counter.clone());
/// container.compile().unwrap();
/// assert!(counter.0.load(Ordering::Relaxed) > 10);
/// ```
pub trait CompilerObserver: Send + Sync {
    /// Called before a pass runs.
    fn pass_started(&self, pass: &str, phase: PassPhase) {
        let _ = (pass, phase);
    }

    /// Called after a pass returned successfully.
    fn pass_finished(&self, pass: &str, phase: PassPhase, elapsed: Duration) {
        let _ = (pass, phase, elapsed);
    }

    /// Called when a pass aborted the compilation.
    fn pass_failed(&self, pass: &str, phase: PassPhase, error: &CompileError) {
        let _ = (pass, phase, error);
    }

    /// Called for every line a pass appended to the compiler log.
    fn logged(&self, line: &str) {
        let _ = line;
    }
}

/// The observers registered on a compiler.
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn CompilerObserver>>,
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.observers.len())
            .finish()
    }
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Arc<dyn CompilerObserver>) {
        self.observers.push(observer);
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[inline]
    pub(crate) fn pass_started(&self, pass: &str, phase: PassPhase) {
        for observer in &self.observers {
            observer.pass_started(pass, phase);
        }
    }

    #[inline]
    pub(crate) fn pass_finished(&self, pass: &str, phase: PassPhase, elapsed: Duration) {
        for observer in &self.observers {
            observer.pass_finished(pass, phase, elapsed);
        }
    }

    #[inline]
    pub(crate) fn pass_failed(&self, pass: &str, phase: PassPhase, error: &CompileError) {
        for observer in &self.observers {
            observer.pass_failed(pass, phase, error);
        }
    }

    #[inline]
    pub(crate) fn logged(&self, line: &str) {
        for observer in &self.observers {
            observer.logged(line);
        }
    }
}

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CompilerObserver for TracingObserver {
    fn pass_started(&self, pass: &str, phase: PassPhase) {
        debug!(pass, ?phase, "pass started");
    }

    fn pass_finished(&self, pass: &str, phase: PassPhase, elapsed: Duration) {
        debug!(pass, ?phase, elapsed_us = elapsed.as_micros() as u64, "pass finished");
    }

    fn pass_failed(&self, pass: &str, phase: PassPhase, error: &CompileError) {
        warn!(pass, ?phase, %error, "pass failed");
    }

    fn logged(&self, line: &str) {
        debug!(line, "compiler log");
    }
}

/// Accumulates the time spent in each pass across compilations.
///
/// # Examples
///
/// ```
/// use ferrous_container::{ContainerBuilder, PassTimings};
/// use std::sync::Arc;
///
/// let timings = Arc::new(PassTimings::new());
/// let mut container = ContainerBuilder::new();
/// container.compiler_mut().add_observer(timings.clone());
/// container.compile().unwrap();
///
/// let report = timings.snapshot();
/// assert!(report.contains_key("AutowirePass"));
/// assert_eq!(report["AutowirePass"].runs, 1);
/// ```
#[derive(Debug, Default)]
pub struct PassTimings {
    timings: Mutex<IndexMap<String, PassTiming>>,
}

/// Time spent in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassTiming {
    pub runs: u32,
    pub total: Duration,
    pub max: Duration,
}

impl PassTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timings per pass, in order of first run.
    pub fn snapshot(&self) -> IndexMap<String, PassTiming> {
        self.timings.lock().clone()
    }

    /// Total time spent in all passes.
    pub fn total(&self) -> Duration {
        self.timings.lock().values().map(|t| t.total).sum()
    }

    pub fn reset(&self) {
        self.timings.lock().clear();
    }
}

impl CompilerObserver for PassTimings {
    fn pass_finished(&self, pass: &str, _phase: PassPhase, elapsed: Duration) {
        let mut timings = self.timings.lock();
        let entry = timings.entry(pass.to_string()).or_default();
        entry.runs += 1;
        entry.total += elapsed;
        entry.max = entry.max.max(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl CompilerObserver for Recorder {
        fn pass_started(&self, pass: &str, _phase: PassPhase) {
            self.events.lock().push(format!("start {}", pass));
        }

        fn logged(&self, line: &str) {
            self.events.lock().push(format!("log {}", line));
        }
    }

    #[test]
    fn observers_receive_events_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut observers = Observers::new();
        observers.add(recorder.clone());
        observers.pass_started("A", PassPhase::Optimization);
        observers.logged("A: hello");
        observers.pass_started("B", PassPhase::Removing);
        assert_eq!(*recorder.events.lock(), vec!["start A", "log A: hello", "start B"]);
    }

    #[test]
    fn timings_accumulate_per_pass() {
        let timings = PassTimings::new();
        timings.pass_finished("A", PassPhase::Optimization, Duration::from_millis(2));
        timings.pass_finished("A", PassPhase::Removing, Duration::from_millis(5));
        let snapshot = timings.snapshot();
        assert_eq!(snapshot["A"].runs, 2);
        assert_eq!(snapshot["A"].total, Duration::from_millis(7));
        assert_eq!(snapshot["A"].max, Duration::from_millis(5));
        assert_eq!(timings.total(), Duration::from_millis(7));
    }
}
