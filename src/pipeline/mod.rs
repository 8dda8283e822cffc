// Shared machinery for the analysis and diff pipelines: the run context with
// its progress counters, the bounded worker pool, and per-job bookkeeping.

pub mod analysis;
pub mod diff;
pub mod progress;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error};

use crate::config::PipelineConfig;
use crate::error::is_fatal;
pub use progress::{format_duration, ProgressReporter, ProgressSnapshot};

/// Sub-task counters. A task moves enqueued -> in flight -> completed or failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub enqueued: u64,
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Counters shared by every task of one pipeline run.
///
/// State transitions touch two counters at once and happen under one lock,
/// so a snapshot never sees a task in two states or in none.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    tasks: Mutex<TaskCounts>,
    processed_bytes: AtomicU64,
    total_bytes: AtomicU64,
}

impl ProgressCounters {
    fn update(&self, change: impl FnOnce(&mut TaskCounts)) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        change(&mut tasks);
    }

    /// Grow the amount of work the run is expected to process
    pub fn add_total(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn task_enqueued(&self) {
        self.update(|t| t.enqueued += 1);
    }

    pub fn task_started(&self) {
        self.update(|t| {
            t.enqueued -= 1;
            t.in_flight += 1;
        });
    }

    /// A task that never started, e.g. because the pool shut down
    pub fn task_dropped(&self) {
        self.update(|t| {
            t.enqueued -= 1;
            t.failed += 1;
        });
    }

    pub fn task_finished(&self, bytes: u64, success: bool) {
        self.processed_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.update(|t| {
            t.in_flight -= 1;
            if success {
                t.completed += 1;
            } else {
                t.failed += 1;
            }
        });
    }

    pub fn tasks(&self) -> TaskCounts {
        *self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }
}

/// State of one pipeline run, created when the pipeline starts and handed to
/// everything that needs elapsed time or counters
#[derive(Debug)]
pub struct PipelineContext {
    start: Instant,
    counters: ProgressCounters,
    config: PipelineConfig,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            start: Instant::now(),
            counters: ProgressCounters::default(),
            config,
        }
    }

    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            tasks: self.counters.tasks(),
            processed_bytes: self.counters.processed_bytes(),
            total_bytes: self.counters.total_bytes(),
            elapsed: self.elapsed(),
        }
    }
}

/// Runs blocking sub-tasks with at most `workers` of them at once
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    context: Arc<PipelineContext>,
}

impl WorkerPool {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        let workers = context.config().workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            context,
        }
    }

    /// Queue `task`, which processes `bytes` bytes of input, on the pool.
    /// The returned handle resolves once the task has run and the counters
    /// reflect it.
    pub fn submit<T, F>(&self, bytes: u64, task: F) -> JoinHandle<Result<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.context.counters().task_enqueued();
        let permits = Arc::clone(&self.permits);
        let context = Arc::clone(&self.context);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                context.counters().task_dropped();
                return Err(anyhow!("worker pool closed before the task could start"));
            };
            context.counters().task_started();
            let result = match tokio::task::spawn_blocking(task).await {
                Ok(result) => result,
                Err(e) => Err(anyhow!("sub-task panicked: {e}")),
            };
            context.counters().task_finished(bytes, result.is_ok());
            result
        })
    }
}

/// Wait for every handle, then return the first failure if any.
/// A job is only done once all of its sub-tasks are.
pub async fn join_all<T>(handles: Vec<JoinHandle<Result<T>>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for handle in handles {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("sub-task panicked: {e}")),
        };
        match outcome {
            Ok(value) => values.push(value),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(e) => debug!("Additional sub-task failure: {:#}", e),
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

/// A job that did not complete
#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub path: PathBuf,
    pub error: String,
    /// Broken internal invariant rather than bad input
    pub fatal: bool,
}

/// Outcome of a whole pipeline run, written with `--stats-out`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub failures: Vec<JobFailure>,
    pub tasks: TaskCounts,
    pub processed_bytes: u64,
    pub total_bytes: u64,
    pub elapsed_ms: u64,
    pub bytes_per_sec: f64,
    /// Diverging spans handed to the statistics consumer (diff runs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spans_written: Option<usize>,
}

type JobOutcome<T> = (PathBuf, Result<T>);

/// Jobs of one pipeline, keyed by the file they work on
pub(crate) struct JobSet<T> {
    jobs: JoinSet<JobOutcome<T>>,
    completed: u64,
    failures: Vec<JobFailure>,
    fail_fast: bool,
}

impl<T: Send + 'static> JobSet<T> {
    pub(crate) fn new(fail_fast: bool) -> Self {
        Self {
            jobs: JoinSet::new(),
            completed: 0,
            failures: Vec::new(),
            fail_fast,
        }
    }

    pub(crate) fn spawn<F>(&mut self, path: PathBuf, job: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.jobs.spawn(async move {
            let result = job.await;
            (path, result)
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub(crate) async fn join_next(&mut self) -> Option<Result<JobOutcome<T>, JoinError>> {
        self.jobs.join_next().await
    }

    /// Book a finished job. Fails the run on a panic, on a fatal error, or on
    /// any error when `fail_fast` is set; other failures are recorded and
    /// the run continues.
    pub(crate) fn record(&mut self, joined: Result<JobOutcome<T>, JoinError>) -> Result<Option<T>> {
        let (path, result) = joined.context("Pipeline job panicked")?;
        match result {
            Ok(value) => {
                self.completed += 1;
                debug!("Job completed for {}", path.display());
                Ok(Some(value))
            }
            Err(e) => {
                let fatal = is_fatal(&e);
                error!("Job failed for {}: {:#}", path.display(), e);
                self.failures.push(JobFailure {
                    path: path.clone(),
                    error: format!("{e:#}"),
                    fatal,
                });
                if fatal || self.fail_fast {
                    self.jobs.abort_all();
                    return Err(e.context(format!("Job failed for {}", path.display())));
                }
                Ok(None)
            }
        }
    }

    pub(crate) fn summary(&self, context: &PipelineContext) -> RunSummary {
        let snapshot = context.snapshot();
        RunSummary {
            jobs_completed: self.completed,
            jobs_failed: self.failures.len() as u64,
            failures: self.failures.clone(),
            tasks: snapshot.tasks,
            processed_bytes: snapshot.processed_bytes,
            total_bytes: snapshot.total_bytes,
            elapsed_ms: snapshot.elapsed.as_millis() as u64,
            bytes_per_sec: snapshot.throughput(),
            spans_written: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokdiffError;

    fn context(workers: usize) -> Arc<PipelineContext> {
        Arc::new(PipelineContext::new(PipelineConfig {
            workers,
            show_progress: false,
            ..PipelineConfig::default()
        }))
    }

    #[tokio::test]
    async fn test_counters_settle_after_all_subtasks() {
        let ctx = context(2);
        let pool = WorkerPool::new(Arc::clone(&ctx));
        let sizes = [10u64, 20, 30, 40, 50];
        ctx.counters().add_total(sizes.iter().sum());

        let handles: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, &bytes)| pool.submit(bytes, move || Ok(i)))
            .collect();
        let values = join_all(handles).await.unwrap();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);

        let tasks = ctx.counters().tasks();
        assert_eq!(tasks.enqueued, 0);
        assert_eq!(tasks.in_flight, 0);
        assert_eq!(tasks.completed, sizes.len() as u64);
        assert_eq!(tasks.failed, 0);
        assert_eq!(ctx.counters().processed_bytes(), 150);
        assert_eq!(ctx.snapshot().remaining(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_pool_bounds_parallelism() {
        use std::sync::atomic::AtomicUsize;

        let ctx = context(2);
        let pool = WorkerPool::new(Arc::clone(&ctx));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.submit(1, move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        join_all(handles).await.unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(ctx.counters().tasks().completed, 8);
    }

    #[tokio::test]
    async fn test_failed_subtask_waits_for_siblings() {
        let ctx = context(4);
        let pool = WorkerPool::new(Arc::clone(&ctx));
        let handles = vec![
            pool.submit(5, || Err(anyhow!("tokenizer crashed"))),
            pool.submit(7, || {
                std::thread::sleep(Duration::from_millis(20));
                Ok(())
            }),
        ];
        let err = join_all(handles).await.unwrap_err();
        assert!(err.to_string().contains("tokenizer crashed"));

        let tasks = ctx.counters().tasks();
        assert_eq!(tasks.in_flight, 0);
        assert_eq!(tasks.completed, 1);
        assert_eq!(tasks.failed, 1);
        assert_eq!(ctx.counters().processed_bytes(), 12);
    }

    #[tokio::test]
    async fn test_job_set_records_failures_and_continues() {
        let ctx = context(1);
        let mut jobs: JobSet<u32> = JobSet::new(false);
        jobs.spawn(PathBuf::from("ok.txt"), async { Ok(1) });
        jobs.spawn(PathBuf::from("bad.txt"), async {
            Err(TokdiffError::structural("left ended early").into())
        });

        let mut values = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            if let Some(value) = jobs.record(joined).unwrap() {
                values.push(value);
            }
        }
        assert_eq!(values, vec![1]);

        let summary = jobs.summary(&ctx);
        assert_eq!(summary.jobs_completed, 1);
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(summary.failures[0].path, PathBuf::from("bad.txt"));
        assert!(!summary.failures[0].fatal);
    }

    #[tokio::test]
    async fn test_job_set_stops_on_fatal_error() {
        let mut jobs: JobSet<()> = JobSet::new(false);
        jobs.spawn(PathBuf::from("broken.txt"), async {
            Err(TokdiffError::invariant("scan past buffer end").into())
        });
        let joined = jobs.join_next().await.unwrap();
        assert!(jobs.record(joined).is_err());
    }

    #[tokio::test]
    async fn test_job_set_fail_fast() {
        let mut jobs: JobSet<()> = JobSet::new(true);
        jobs.spawn(PathBuf::from("bad.txt"), async { Err(anyhow!("no such file")) });
        let joined = jobs.join_next().await.unwrap();
        let err = jobs.record(joined).unwrap_err();
        assert!(format!("{err:#}").contains("bad.txt"));
    }
}
