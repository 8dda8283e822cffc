use std::sync::Arc;
use tokdiff::error::is_fatal;
use tokdiff::{AnalysisPipeline, DiffPipeline, DiffStatistics, FileSegmenter, PipelineConfig};

#[path = "integration/fixtures/mod.rs"]
mod fixtures;
use fixtures::*;

#[path = "integration/mod.rs"]
mod test_utils;
use test_utils::{FakeTokenizer, TestFixture};

fn config(fail_fast: bool) -> PipelineConfig {
    PipelineConfig {
        workers: 2,
        fail_fast,
        show_progress: false,
        ..PipelineConfig::default()
    }
}

/// A left file without right counterpart fails its own job only
#[tokio::test]
async fn test_missing_counterpart_is_reported_per_job() {
    let fixture = TestFixture::new();
    let paired = fixture.create_token_file("left/a.txt-00000.txt.zst", THIS_IS_TOKENS);
    let orphan = fixture.create_token_file("left/b.txt-00000.txt.zst", THIS_IS_TOKENS);
    fixture.create_token_file("right/a.txt-00000.txt.zst", THIS_ARE_TOKENS);

    let mut pipeline = DiffPipeline::new(fixture.path("left"), fixture.path("right"), fixture.path("out"), config(false));
    pipeline.enqueue(paired).unwrap();
    pipeline.enqueue(orphan.clone()).unwrap();
    let mut stats = DiffStatistics::new();
    let summary = pipeline.wait_for_completion(&mut stats).await.unwrap();

    assert_eq!(summary.jobs_completed, 1);
    assert_eq!(summary.jobs_failed, 1);
    assert_eq!(summary.failures[0].path, orphan);
    assert!(!summary.failures[0].fatal);
    assert!(summary.failures[0].error.contains("right/b.txt-00000.txt.zst"));
    assert_eq!(summary.spans_written, Some(1));
}

#[tokio::test]
async fn test_missing_counterpart_with_fail_fast_aborts_run() {
    let fixture = TestFixture::new();
    let orphan = fixture.create_token_file("left/b.txt-00000.txt.zst", THIS_IS_TOKENS);

    let mut pipeline = DiffPipeline::new(fixture.path("left"), fixture.path("right"), fixture.path("out"), config(true));
    pipeline.enqueue(orphan).unwrap();
    let mut stats = DiffStatistics::new();
    let err = pipeline.wait_for_completion(&mut stats).await.unwrap_err();
    assert!(format!("{err:#}").contains("no counterpart"));
    assert!(!is_fatal(&err));
}

/// Streams with different sentence counts are never silently aligned
#[tokio::test]
async fn test_desynchronized_streams_are_structural_mismatch() {
    let fixture = TestFixture::new();
    let left = fixture.create_token_file("left/a.txt-00000.txt.zst", "A\nEOS\n");
    fixture.create_token_file("right/a.txt-00000.txt.zst", "A\nEOS\nB\nEOS\n");

    let mut pipeline = DiffPipeline::new(fixture.path("left"), fixture.path("right"), fixture.path("out"), config(false));
    pipeline.enqueue(left).unwrap();
    let mut stats = DiffStatistics::new();
    let summary = pipeline.wait_for_completion(&mut stats).await.unwrap();

    assert_eq!(summary.jobs_failed, 1);
    assert!(summary.failures[0].error.contains("token streams diverged"));
    assert_eq!(summary.tasks.failed, 1);
    assert_eq!(summary.tasks.in_flight, 0);
}

#[tokio::test]
async fn test_corrupt_compressed_input_fails_job() {
    let fixture = TestFixture::new();
    let left = fixture.create_text_file("left/a.txt-00000.txt.zst", "not zstd at all");
    fixture.create_token_file("right/a.txt-00000.txt.zst", THIS_IS_TOKENS);

    let mut pipeline = DiffPipeline::new(fixture.path("left"), fixture.path("right"), fixture.path("out"), config(false));
    pipeline.enqueue(left.clone()).unwrap();
    let mut stats = DiffStatistics::new();
    let summary = pipeline.wait_for_completion(&mut stats).await.unwrap();

    assert_eq!(summary.jobs_failed, 1);
    assert_eq!(summary.failures[0].path, left);
}

#[tokio::test]
async fn test_unreadable_input_does_not_stop_analysis() {
    let fixture = TestFixture::new();
    let good = fixture.create_text_file("corpus/good.txt", PLAIN_CORPUS);

    let mut pipeline = AnalysisPipeline::new(
        Arc::new(FakeTokenizer { split_hyphens: false }),
        FileSegmenter::default(),
        fixture.path("corpus"),
        fixture.path("out"),
        config(false),
    );
    pipeline.enqueue(fixture.path("corpus/vanished.txt"));
    pipeline.enqueue(good);
    let summary = pipeline.wait_for_completion().await.unwrap();

    assert_eq!(summary.jobs_completed, 1);
    assert_eq!(summary.jobs_failed, 1);
    assert_eq!(summary.processed_bytes, PLAIN_CORPUS.len() as u64);
    assert!(fixture.path("out/good.txt-00000.txt.zst").exists());
}
