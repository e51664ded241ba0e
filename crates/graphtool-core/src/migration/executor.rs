//! Plan execution.
//!
//! Steps run strictly in plan order. The first failure stops the run; steps
//! already applied stay applied. Cancellation is checked between steps only.

use super::steps::{ExecutionStep, ExecutionSteps};
use super::version::Version;
use crate::error::{MigrationError, Result};
use crate::store::VersionStore;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error type returned by step runners.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Runs a single step against the target system.
pub trait StepRunner {
    /// Run the step, returning once it has finished.
    fn run(&mut self, step: &ExecutionStep) -> std::result::Result<(), StepError>;
}

impl<F> StepRunner for F
where
    F: FnMut(&ExecutionStep) -> std::result::Result<(), StepError>,
{
    fn run(&mut self, step: &ExecutionStep) -> std::result::Result<(), StepError> {
        self(step)
    }
}

/// When the executor records a new version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordGranularity {
    /// After every successful step. A failed run resumes after the last
    /// applied step.
    #[default]
    PerStep,
    /// Once a batch's steps have all succeeded. A failed run leaves the
    /// batch at its previous version.
    PerBatch,
}

/// Shared flag used to stop execution between steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Steps handed to the runner.
    pub executed: usize,
    /// No-op steps skipped.
    pub skipped: usize,
    /// Versions written, in order.
    pub recorded: Vec<(String, Version)>,
}

/// Drives a plan through a [`StepRunner`], recording versions in a [`VersionStore`].
pub struct Executor<R, S> {
    runner: R,
    store: S,
    granularity: RecordGranularity,
    cancel: CancellationToken,
}

impl<R: StepRunner, S: VersionStore> Executor<R, S> {
    /// Create an executor recording after every step.
    pub fn new(runner: R, store: S) -> Self {
        Self {
            runner,
            store,
            granularity: RecordGranularity::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the recording granularity.
    pub fn with_granularity(mut self, granularity: RecordGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Use an externally controlled cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this executor.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute every step of the plan.
    pub fn execute(&mut self, steps: &ExecutionSteps) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        let steps = steps.as_slice();

        for (step_index, step) in steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(step_index, "execution cancelled");
                return Err(MigrationError::Cancelled { step_index });
            }

            if step.is_noop() {
                tracing::info!(step_index, batch = %step.batch, version = %step.version, "skipping no-op step");
                report.skipped += 1;
            } else {
                tracing::info!(
                    step_index,
                    batch = %step.batch,
                    direction = %step.direction,
                    version = %step.version,
                    name = %step.name,
                    "executing step"
                );
                self.runner
                    .run(step)
                    .map_err(|e| MigrationError::StepExecution {
                        step_index,
                        batch: step.batch.clone(),
                        version: step.version.clone(),
                        direction: step.direction,
                        message: e.to_string(),
                    })?;
                report.executed += 1;
            }

            let batch_done = steps
                .get(step_index + 1)
                .map_or(true, |next| next.batch != step.batch);
            if self.granularity == RecordGranularity::PerStep || batch_done {
                self.record(&step.batch, &step.record_version, &mut report)?;
            }
        }

        tracing::info!(
            executed = report.executed,
            skipped = report.skipped,
            "plan finished"
        );
        Ok(report)
    }

    fn record(&self, batch: &str, version: &Version, report: &mut ExecutionReport) -> Result<()> {
        self.store.write_version(batch, version)?;
        tracing::info!(batch, version = %version, "recorded version");
        report.recorded.push((batch.to_string(), version.clone()));
        Ok(())
    }

    /// Consume the executor, returning the runner and store.
    pub fn into_parts(self) -> (R, S) {
        (self.runner, self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::artifact::{Direction, Payload};
    use crate::store::MemoryVersionStore;

    fn step(batch: &str, rev: u64, payload: Payload) -> ExecutionStep {
        ExecutionStep {
            batch: batch.to_string(),
            version: Version::new(rev),
            name: format!("m{rev}"),
            direction: Direction::Up,
            payload,
            record_version: Version::new(rev),
        }
    }

    fn script(batch: &str, rev: u64) -> ExecutionStep {
        step(batch, rev, Payload::Script(format!("RETURN {rev};")))
    }

    fn plan(steps: Vec<ExecutionStep>) -> ExecutionSteps {
        steps.into_iter().collect()
    }

    #[test]
    fn test_runs_in_order_and_records_each_step() {
        let store = MemoryVersionStore::new();
        let mut seen = Vec::new();
        let runner = |s: &ExecutionStep| -> std::result::Result<(), StepError> {
            seen.push(s.version.revision());
            Ok(())
        };

        let report = Executor::new(runner, &store)
            .execute(&plan(vec![script("schema", 100), script("schema", 200)]))
            .unwrap();

        assert_eq!(seen, vec![100, 200]);
        assert_eq!(report.executed, 2);
        assert_eq!(
            store.writes(),
            vec![
                ("schema".to_string(), Version::new(100)),
                ("schema".to_string(), Version::new(200)),
            ]
        );
    }

    #[test]
    fn test_fail_fast() {
        let store = MemoryVersionStore::new();
        let mut seen = Vec::new();
        let runner = |s: &ExecutionStep| -> std::result::Result<(), StepError> {
            seen.push(s.version.revision());
            if s.version.revision() == 200 {
                return Err("constraint violation".into());
            }
            Ok(())
        };

        let err = Executor::new(runner, &store)
            .execute(&plan(vec![
                script("schema", 100),
                script("schema", 200),
                script("schema", 300),
            ]))
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::StepExecution { step_index: 1, ref message, .. } if message == "constraint violation"
        ));
        assert_eq!(seen, vec![100, 200]);
        assert_eq!(store.writes(), vec![("schema".to_string(), Version::new(100))]);
    }

    #[test]
    fn test_noop_step_is_skipped_but_recorded() {
        let store = MemoryVersionStore::new();
        let mut calls = 0;
        let runner = |_: &ExecutionStep| -> std::result::Result<(), StepError> {
            calls += 1;
            Ok(())
        };

        let report = Executor::new(runner, &store)
            .execute(&plan(vec![
                step("schema", 100, Payload::Command(vec!["exit".into()])),
                script("schema", 200),
            ]))
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.executed, 1);
        assert_eq!(store.writes().len(), 2);
    }

    #[test]
    fn test_per_batch_granularity() {
        let store = MemoryVersionStore::new();
        let runner = |s: &ExecutionStep| -> std::result::Result<(), StepError> {
            if s.batch == "data" && s.version.revision() == 400 {
                return Err("boom".into());
            }
            Ok(())
        };

        let err = Executor::new(runner, &store)
            .with_granularity(RecordGranularity::PerBatch)
            .execute(&plan(vec![
                script("schema", 100),
                script("schema", 200),
                script("data", 300),
                script("data", 400),
            ]))
            .unwrap_err();

        assert!(matches!(err, MigrationError::StepExecution { step_index: 3, .. }));
        assert_eq!(store.writes(), vec![("schema".to_string(), Version::new(200))]);
    }

    #[test]
    fn test_per_batch_records_last_batch_on_success() {
        let store = MemoryVersionStore::new();
        let runner = |_: &ExecutionStep| -> std::result::Result<(), StepError> { Ok(()) };

        let report = Executor::new(runner, &store)
            .with_granularity(RecordGranularity::PerBatch)
            .execute(&plan(vec![script("schema", 100), script("data", 300), script("data", 400)]))
            .unwrap();

        assert_eq!(
            report.recorded,
            vec![
                ("schema".to_string(), Version::new(100)),
                ("data".to_string(), Version::new(400)),
            ]
        );
    }

    #[test]
    fn test_cancellation_between_steps() {
        let store = MemoryVersionStore::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut seen = Vec::new();
        let runner = |s: &ExecutionStep| -> std::result::Result<(), StepError> {
            seen.push(s.version.revision());
            // The running step completes even though cancellation is requested.
            trigger.cancel();
            Ok(())
        };

        let err = Executor::new(runner, &store)
            .with_cancellation(cancel)
            .execute(&plan(vec![script("schema", 100), script("schema", 200)]))
            .unwrap_err();

        assert!(matches!(err, MigrationError::Cancelled { step_index: 1 }));
        assert_eq!(seen, vec![100]);
        assert_eq!(store.writes(), vec![("schema".to_string(), Version::new(100))]);
    }

    #[test]
    fn test_empty_plan_is_success() {
        let store = MemoryVersionStore::new();
        let runner = |_: &ExecutionStep| -> std::result::Result<(), StepError> {
            panic!("nothing to run")
        };
        let report = Executor::new(runner, &store)
            .execute(&ExecutionSteps::new())
            .unwrap();
        assert_eq!(report, ExecutionReport::default());
        assert!(store.writes().is_empty());
    }
}
