use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{join_all, JobSet, PipelineContext, ProgressReporter, RunSummary, WorkerPool};
use crate::config::PipelineConfig;
use crate::segmenter::FileSegmenter;
use crate::tokenizer::{segment_output_path, Tokenizer};

/// Drives input files through the tokenizer, one job per file and one
/// sub-task per segment
pub struct AnalysisPipeline {
    tokenizer: Arc<dyn Tokenizer>,
    segmenter: Arc<FileSegmenter>,
    input_root: PathBuf,
    output_root: PathBuf,
    context: Arc<PipelineContext>,
    pool: WorkerPool,
    jobs: JobSet<usize>,
}

impl AnalysisPipeline {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        segmenter: FileSegmenter,
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        config: PipelineConfig,
    ) -> Self {
        let fail_fast = config.fail_fast;
        let context = Arc::new(PipelineContext::new(config));
        Self {
            tokenizer,
            segmenter: Arc::new(segmenter),
            input_root: input_root.into(),
            output_root: output_root.into(),
            pool: WorkerPool::new(Arc::clone(&context)),
            context,
            jobs: JobSet::new(fail_fast),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Start the job for one input file. Returns as soon as the job is queued.
    pub fn enqueue(&mut self, input: PathBuf) {
        let job = AnalysisJob {
            input: input.clone(),
            tokenizer: Arc::clone(&self.tokenizer),
            segmenter: Arc::clone(&self.segmenter),
            input_root: self.input_root.clone(),
            output_root: self.output_root.clone(),
            context: Arc::clone(&self.context),
            pool: self.pool.clone(),
        };
        self.jobs.spawn(input, job.run());
    }

    /// Wait until every enqueued file has been analyzed, reporting progress
    /// periodically
    pub async fn wait_for_completion(&mut self) -> Result<RunSummary> {
        let reporter = ProgressReporter::new(self.context.config().show_progress);
        let mut ticker = tokio::time::interval(self.context.config().progress_interval);
        let mut segments = 0usize;

        while !self.jobs.is_empty() {
            let joined = tokio::select! {
                Some(joined) = self.jobs.join_next() => joined,
                _ = ticker.tick() => {
                    reporter.report(&self.context.snapshot());
                    continue;
                }
            };
            if let Some(count) = self.jobs.record(joined)? {
                segments += count;
            }
        }
        reporter.finish();

        let summary = self.jobs.summary(&self.context);
        info!(
            "Analysis finished: {} files, {} segments, {} failed in {}ms",
            summary.jobs_completed, segments, summary.jobs_failed, summary.elapsed_ms
        );
        Ok(summary)
    }
}

struct AnalysisJob {
    input: PathBuf,
    tokenizer: Arc<dyn Tokenizer>,
    segmenter: Arc<FileSegmenter>,
    input_root: PathBuf,
    output_root: PathBuf,
    context: Arc<PipelineContext>,
    pool: WorkerPool,
}

impl AnalysisJob {
    /// Segment the file and analyze every segment; returns the segment count
    async fn run(self) -> Result<usize> {
        let size = tokio::fs::metadata(&self.input)
            .await
            .with_context(|| format!("Cannot access {}", self.input.display()))?
            .len();
        self.context.counters().add_total(size);

        let segmenter = Arc::clone(&self.segmenter);
        let path = self.input.clone();
        let segments = tokio::task::spawn_blocking(move || segmenter.segments(&path))
            .await
            .context("Segmenter panicked")??;
        debug!("{} split into {} segments", self.input.display(), segments.len());

        let mut handles = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().copied().enumerate() {
            let output = segment_output_path(&self.input_root, &self.output_root, &self.input, index)?;
            let tokenizer = Arc::clone(&self.tokenizer);
            let input = self.input.clone();
            handles.push(self.pool.submit(segment.len(), move || {
                tokenizer
                    .analyze(&input, segment, &output)
                    .with_context(|| describe_segment(&input, index))
            }));
        }

        join_all(handles).await?;
        Ok(segments.len())
    }
}

fn describe_segment(input: &Path, index: usize) -> String {
    format!("Analyzing segment {index} of {}", input.display())
}
