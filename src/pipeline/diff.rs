use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, info};

use super::{JobOutcome, JobSet, PipelineContext, ProgressReporter, RunSummary, WorkerPool};
use crate::candidate::{DiffCandidateDetector, SentenceDiff};
use crate::config::PipelineConfig;
use crate::error::TokdiffError;
use crate::report::{DiffDetails, DiffPack};
use crate::statistics::DiffStatistics;
use crate::token_stream::AnnotatedTokenStream;
use crate::tokenizer::{counterpart_path, diff_output_path, open_compressed};

/// Compares matching analyzer outputs of two runs, one job per file pair.
/// Results travel to the consumer through a bounded queue.
pub struct DiffPipeline {
    left_root: PathBuf,
    right_root: PathBuf,
    output_root: PathBuf,
    context: Arc<PipelineContext>,
    pool: WorkerPool,
    jobs: JobSet<usize>,
    sender: Option<mpsc::Sender<DiffPack>>,
    receiver: mpsc::Receiver<DiffPack>,
}

enum Event {
    Pack(Option<DiffPack>),
    Joined(Result<JobOutcome<usize>, JoinError>),
    Tick,
}

impl DiffPipeline {
    pub fn new(
        left_root: impl Into<PathBuf>,
        right_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        config: PipelineConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.result_queue_capacity.max(1));
        let fail_fast = config.fail_fast;
        let context = Arc::new(PipelineContext::new(config));
        Self {
            left_root: left_root.into(),
            right_root: right_root.into(),
            output_root: output_root.into(),
            pool: WorkerPool::new(Arc::clone(&context)),
            context,
            jobs: JobSet::new(fail_fast),
            sender: Some(sender),
            receiver,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Start the job comparing `left` with its counterpart under the right root
    pub fn enqueue(&mut self, left: PathBuf) -> Result<()> {
        let sender = self
            .sender
            .clone()
            .ok_or_else(|| anyhow!("Cannot enqueue {} after the pipeline was drained", left.display()))?;
        let job = DiffJob {
            left: left.clone(),
            left_root: self.left_root.clone(),
            right_root: self.right_root.clone(),
            output_root: self.output_root.clone(),
            context: Arc::clone(&self.context),
            pool: self.pool.clone(),
            sender,
        };
        self.jobs.spawn(left, job.run());
        Ok(())
    }

    /// Feed every result into `statistics` as it arrives and return once all
    /// jobs are done and the queue is drained.
    ///
    /// Each job holds a sender until it finishes, so the queue reports closed
    /// exactly when no producer is left.
    pub async fn wait_for_completion(&mut self, statistics: &mut DiffStatistics) -> Result<RunSummary> {
        self.sender = None;
        let reporter = ProgressReporter::new(self.context.config().show_progress);
        let mut ticker = tokio::time::interval(self.context.config().progress_interval);
        let mut spans_written = 0usize;

        loop {
            let event = tokio::select! {
                pack = self.receiver.recv() => Event::Pack(pack),
                Some(joined) = self.jobs.join_next(), if !self.jobs.is_empty() => Event::Joined(joined),
                _ = ticker.tick() => Event::Tick,
            };
            match event {
                Event::Pack(Some(pack)) => {
                    debug!("Received {} spans for {}", pack.diffs.len(), pack.path.display());
                    spans_written += pack.diffs.len();
                    statistics.handle(&pack);
                }
                Event::Pack(None) => break,
                Event::Joined(joined) => {
                    self.jobs.record(joined)?;
                }
                Event::Tick => reporter.report(&self.context.snapshot()),
            }
        }
        while let Some(joined) = self.jobs.join_next().await {
            self.jobs.record(joined)?;
        }
        reporter.finish();

        let mut summary = self.jobs.summary(&self.context);
        summary.spans_written = Some(spans_written);
        info!(
            "Diff finished: {} file pairs, {} failed, {} diverging spans in {}ms",
            summary.jobs_completed, summary.jobs_failed, spans_written, summary.elapsed_ms
        );
        Ok(summary)
    }
}

struct DiffJob {
    left: PathBuf,
    left_root: PathBuf,
    right_root: PathBuf,
    output_root: PathBuf,
    context: Arc<PipelineContext>,
    pool: WorkerPool,
    sender: mpsc::Sender<DiffPack>,
}

impl DiffJob {
    /// Diff one file pair and queue its pack; returns the number of spans
    async fn run(self) -> Result<usize> {
        let right = counterpart_path(&self.left_root, &self.right_root, &self.left)?;
        if tokio::fs::metadata(&right).await.is_err() {
            return Err(TokdiffError::MissingCounterpart {
                left: self.left.clone(),
                right,
            }
            .into());
        }
        let size = tokio::fs::metadata(&self.left)
            .await
            .with_context(|| format!("Cannot access {}", self.left.display()))?
            .len();
        self.context.counters().add_total(size);

        let output = diff_output_path(&self.left_root, &self.output_root, &self.left)?;
        let left = self.left.clone();
        let handle = self.pool.submit(size, move || {
            diff_file(&left, &right, output).with_context(|| format!("Diffing {}", left.display()))
        });
        let pack = handle.await.context("Diff sub-task panicked")??;

        let spans = pack.diffs.len();
        self.sender
            .send(pack)
            .await
            .map_err(|_| anyhow!("Diff result consumer stopped before {} was delivered", self.left.display()))?;
        Ok(spans)
    }
}

/// Walk both streams sentence by sentence and render the differing ones
pub fn diff_file(left: &Path, right: &Path, output: PathBuf) -> Result<DiffPack, TokdiffError> {
    let mut detector = DiffCandidateDetector::new(
        AnnotatedTokenStream::new(open_compressed(left)?),
        AnnotatedTokenStream::new(open_compressed(right)?),
    );
    let mut details = DiffDetails::new(output);
    loop {
        match detector.process_one()? {
            SentenceDiff::Finished => break,
            SentenceDiff::NoDiff => {}
            diff @ SentenceDiff::Diff { .. } => details.add_diff(diff.compute_spans()),
        }
    }
    debug!(
        "{}: {} sentences, {} with differences",
        left.display(),
        detector.sentences(),
        details.diff_count()
    );
    details.make_pack()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tokens(path: &Path, text: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = std::fs::File::create(path).unwrap();
        let mut encoder = zstd::stream::Encoder::new(file, 3).unwrap();
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            workers: 2,
            show_progress: false,
            result_queue_capacity: 1,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_differing_pair_produces_pack() {
        let dir = TempDir::new().unwrap();
        let left = dir.path().join("left/doc.txt-00000.txt.zst");
        write_tokens(&left, "THIS\nIS\nEOS\n");
        write_tokens(&dir.path().join("right/doc.txt-00000.txt.zst"), "THIS\nARE\nEOS\n");

        let mut pipeline = DiffPipeline::new(dir.path().join("left"), dir.path().join("right"), dir.path().join("out"), config());
        pipeline.enqueue(left).unwrap();
        let mut stats = DiffStatistics::new();
        let summary = pipeline.wait_for_completion(&mut stats).await.unwrap();

        assert_eq!(summary.jobs_completed, 1);
        assert_eq!(summary.spans_written, Some(1));
        assert_eq!(stats.span_count(), 1);
        assert!(dir.path().join("out/diffs/doc.txt-00000.diff.txt").exists());
    }

    #[tokio::test]
    async fn test_backpressure_with_many_pairs() {
        let dir = TempDir::new().unwrap();
        let mut lefts = Vec::new();
        for i in 0..12 {
            let name = format!("doc{i}.txt-00000.txt.zst");
            let left = dir.path().join("left").join(&name);
            write_tokens(&left, "A\nB\nEOS\n");
            write_tokens(&dir.path().join("right").join(&name), "A\nC\nEOS\n");
            lefts.push(left);
        }

        let mut pipeline = DiffPipeline::new(dir.path().join("left"), dir.path().join("right"), dir.path().join("out"), config());
        for left in lefts {
            pipeline.enqueue(left).unwrap();
        }
        let mut stats = DiffStatistics::new();
        let summary = pipeline.wait_for_completion(&mut stats).await.unwrap();
        assert_eq!(summary.jobs_completed, 12);
        assert_eq!(summary.spans_written, Some(12));
        assert_eq!(summary.tasks.completed, 12);
    }

    #[tokio::test]
    async fn test_missing_counterpart_fails_only_its_job() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("left/a.txt-00000.txt.zst");
        let orphan = dir.path().join("left/b.txt-00000.txt.zst");
        write_tokens(&present, "A\nEOS\n");
        write_tokens(&orphan, "A\nEOS\n");
        write_tokens(&dir.path().join("right/a.txt-00000.txt.zst"), "A\nEOS\n");

        let mut pipeline = DiffPipeline::new(dir.path().join("left"), dir.path().join("right"), dir.path().join("out"), config());
        pipeline.enqueue(present).unwrap();
        pipeline.enqueue(orphan).unwrap();
        let mut stats = DiffStatistics::new();
        let summary = pipeline.wait_for_completion(&mut stats).await.unwrap();

        assert_eq!(summary.jobs_completed, 1);
        assert_eq!(summary.jobs_failed, 1);
        assert!(summary.failures[0].error.contains("no counterpart"));
        assert_eq!(summary.spans_written, Some(0));
    }

    #[tokio::test]
    async fn test_enqueue_after_drain_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = DiffPipeline::new(dir.path().join("l"), dir.path().join("r"), dir.path().join("o"), config());
        let mut stats = DiffStatistics::new();
        let summary = pipeline.wait_for_completion(&mut stats).await.unwrap();
        assert_eq!(summary.jobs_completed, 0);
        assert!(pipeline.enqueue(dir.path().join("l/x.txt.zst")).is_err());
    }
}
