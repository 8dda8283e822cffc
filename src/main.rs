use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use tokdiff::discovery::discover_files;
use tokdiff::statistics::LevelSummary;
use tokdiff::{
    AnalysisPipeline, CommandTokenizer, DiffPipeline, DiffStatistics, DiscoveryConfig, FileSegmenter,
    PipelineConfig, RunSummary, SegmenterConfig,
};

#[derive(Parser, Debug)]
#[command(name = "tokdiff")]
#[command(about = "Analyze text corpora with an external tokenizer and diff two analysis runs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split every *.txt file under INPUT into segments and tokenize them
    Analyze(AnalyzeArgs),
    /// Compare two analysis output trees file by file
    Diff(DiffArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Number of parallel workers (defaults to the CPU count)
    #[arg(long)]
    workers: Option<usize>,

    /// Abort on first failed file
    #[arg(long)]
    fail_fast: bool,

    /// Suppress the console progress line
    #[arg(long)]
    no_progress: bool,

    /// Progress refresh period in milliseconds
    #[arg(long, default_value_t = 250)]
    progress_interval_ms: u64,

    /// Stats output file path
    #[arg(long)]
    stats_out: Option<PathBuf>,
}

impl RunArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            workers: self.workers.unwrap_or(defaults.workers).max(1),
            fail_fast: self.fail_fast,
            show_progress: !self.no_progress,
            progress_interval: Duration::from_millis(self.progress_interval_ms.max(1)),
            ..defaults
        }
    }
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Root directory of the raw text corpus
    input: PathBuf,

    /// Directory receiving the compressed tokenizer output
    #[arg(long, short)]
    output: PathBuf,

    /// Tokenizer executable; reads text on stdin, writes token lines on stdout
    #[arg(long)]
    tokenizer: PathBuf,

    /// Extra argument passed to the tokenizer (repeatable)
    #[arg(long = "tokenizer-arg", allow_hyphen_values = true)]
    tokenizer_args: Vec<String>,

    /// File name glob selecting input files
    #[arg(long, default_value = "*.txt")]
    filter: String,

    /// Approximate segment size in bytes
    #[arg(long, default_value_t = SegmenterConfig::default().target_size)]
    segment_size: u64,

    /// Read window used to find segment boundaries, in bytes
    #[arg(long, default_value_t = SegmenterConfig::default().window_size)]
    window_size: usize,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Output tree of the first analysis run
    left: PathBuf,

    /// Output tree of the second analysis run
    right: PathBuf,

    /// Directory receiving rendered diffs and statistics
    #[arg(long, short)]
    output: PathBuf,

    /// Write the aggregated span statistics here (defaults to OUTPUT/statistics.json)
    #[arg(long)]
    statistics_out: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,
}

/// Everything `--stats-out` records about a run
#[derive(Serialize)]
struct RunStats<'a> {
    command: &'static str,
    config: &'a PipelineConfig,
    summary: &'a RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    statistics: Option<Vec<LevelSummary>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON lines on stderr; stdout carries the summary
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    info!(?cli, "Parsed CLI arguments");

    match cli.command {
        Command::Analyze(args) => run_analyze(args).await,
        Command::Diff(args) => run_diff(args).await,
    }
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    ensure_dir(&args.input)?;
    let segmenter_config = SegmenterConfig {
        target_size: args.segment_size.max(1),
        window_size: args.window_size.max(1),
    };
    let pipeline_config = args.run.pipeline_config();
    info!(?segmenter_config, ?pipeline_config, "Starting analysis");

    let files = discover_files(&args.input, &DiscoveryConfig { pattern: args.filter.clone() }).await?;
    println!("Found {} input files matching {}", files.len(), args.filter);

    let tokenizer = Arc::new(CommandTokenizer::new(&args.tokenizer, args.tokenizer_args.clone()));
    let mut pipeline = AnalysisPipeline::new(
        tokenizer,
        FileSegmenter::new(segmenter_config),
        &args.input,
        &args.output,
        pipeline_config.clone(),
    );
    for file in files {
        pipeline.enqueue(file);
    }
    let summary = pipeline.wait_for_completion().await?;

    print_summary(&summary);
    if let Some(path) = &args.run.stats_out {
        write_stats(
            path,
            &RunStats {
                command: "analyze",
                config: &pipeline_config,
                summary: &summary,
                statistics: None,
            },
        )?;
    }
    Ok(())
}

async fn run_diff(args: DiffArgs) -> Result<()> {
    ensure_dir(&args.left)?;
    ensure_dir(&args.right)?;
    let pipeline_config = args.run.pipeline_config();
    info!(?pipeline_config, "Starting diff");

    let files = discover_files(&args.left, &DiscoveryConfig::analyzed()).await?;
    println!("Found {} analyzed files under {}", files.len(), args.left.display());

    let mut pipeline = DiffPipeline::new(&args.left, &args.right, &args.output, pipeline_config.clone());
    for file in files {
        pipeline.enqueue(file)?;
    }
    let mut statistics = DiffStatistics::new();
    let summary = pipeline.wait_for_completion(&mut statistics).await?;

    print_summary(&summary);
    if statistics.span_count() == 0 && summary.jobs_failed == 0 {
        println!("Completely identical!");
    } else if statistics.span_count() == 0 {
        println!("No differences in the {} file pairs that completed", summary.jobs_completed);
    } else {
        let statistics_path = args
            .statistics_out
            .clone()
            .unwrap_or_else(|| args.output.join("statistics.json"));
        statistics
            .write_summary(&statistics_path)
            .with_context(|| format!("Failed to write statistics to {}", statistics_path.display()))?;
        println!(
            "{} diverging spans, statistics written to {}",
            statistics.span_count(),
            statistics_path.display()
        );
    }

    if let Some(path) = &args.run.stats_out {
        write_stats(
            path,
            &RunStats {
                command: "diff",
                config: &pipeline_config,
                summary: &summary,
                statistics: Some(statistics.summary()),
            },
        )?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<()> {
    // WHY: roots are checked before any job is enqueued
    if !path.exists() {
        anyhow::bail!("Directory does not exist: {}", path.display());
    }
    if !path.is_dir() {
        anyhow::bail!("Path is not a directory: {}", path.display());
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Processing complete:");
    println!("  Completed: {} files", summary.jobs_completed);
    if summary.jobs_failed > 0 {
        println!("  Failed: {} files", summary.jobs_failed);
        for failure in &summary.failures {
            warn!("{}: {}", failure.path.display(), failure.error);
            println!("    {}: {}", failure.path.display(), failure.error);
        }
    }
    println!(
        "  {} bytes in {}ms ({:.2} MiB/s)",
        summary.processed_bytes,
        summary.elapsed_ms,
        summary.bytes_per_sec / (1024.0 * 1024.0)
    );
}

fn write_stats(path: &Path, stats: &RunStats<'_>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(stats)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write stats to {}", path.display()))?;
    info!("Run statistics written to {}", path.display());
    Ok(())
}
