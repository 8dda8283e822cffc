use serde::Serialize;
use std::time::Duration;

/// Configuration for splitting input files into analysis segments
#[derive(Debug, Clone, Serialize)]
pub struct SegmenterConfig {
    /// Approximate size of one segment in bytes
    pub target_size: u64,
    /// Size of the read window used while searching for a line end
    pub window_size: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            target_size: 8 * 1024 * 1024,
            window_size: 64 * 1024,
        }
    }
}

/// Configuration shared by the analysis and diff pipelines
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// Maximum number of sub-tasks running at once
    pub workers: usize,
    /// Abort the run on the first failed job
    pub fail_fast: bool,
    /// Draw the console progress line
    pub show_progress: bool,
    /// Period of the progress reporter
    pub progress_interval: Duration,
    /// Capacity of the diff result queue
    pub result_queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            fail_fast: false,
            show_progress: true,
            progress_interval: Duration::from_millis(250),
            result_queue_capacity: 10,
        }
    }
}

/// Configuration for input file discovery
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryConfig {
    /// Glob matched against file names (not full paths)
    pub pattern: String,
}

impl DiscoveryConfig {
    /// Plain text corpus files fed to the analyzer
    pub fn corpus() -> Self {
        Self {
            pattern: "*.txt".to_string(),
        }
    }

    /// Compressed segment outputs produced by the analysis stage
    pub fn analyzed() -> Self {
        Self {
            pattern: format!("*.txt.{}", crate::tokenizer::COMPRESSED_EXTENSION),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::corpus()
    }
}
