use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::TaskCounts;

/// Projections past this total duration are reported as unknown
const ETA_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

const MIB: f64 = 1024.0 * 1024.0;

/// Point-in-time view of the pipeline counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressSnapshot {
    pub tasks: TaskCounts,
    pub processed_bytes: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Bytes per second since the pipeline started
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.processed_bytes as f64 / secs
    }

    /// Estimated time until `total_bytes` are processed.
    /// `None` when nothing has been processed yet or the projected total run
    /// time exceeds 24 hours.
    pub fn remaining(&self) -> Option<Duration> {
        let throughput = self.throughput();
        if throughput <= 0.0 {
            return None;
        }
        let left = self.total_bytes.saturating_sub(self.processed_bytes) as f64 / throughput;
        if !left.is_finite() || self.elapsed.as_secs_f64() + left > ETA_HORIZON.as_secs_f64() {
            return None;
        }
        Some(Duration::from_secs_f64(left))
    }

    /// Single status line: task counters, elapsed time, throughput and ETA
    pub fn render(&self) -> String {
        format!(
            "[{} queued / {} running / {} done / {} failed] {} elapsed, {:.1}/{:.1} MiB, {:.2} MiB/s, ETA {}",
            self.tasks.enqueued,
            self.tasks.in_flight,
            self.tasks.completed,
            self.tasks.failed,
            format_duration(Some(self.elapsed)),
            self.processed_bytes as f64 / MIB,
            self.total_bytes as f64 / MIB,
            self.throughput() / MIB,
            format_duration(self.remaining())
        )
    }
}

/// `h:mm:ss`, or `--:--:--` when unknown or a day or longer
pub fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) if d < ETA_HORIZON => {
            let secs = d.as_secs();
            format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
        }
        _ => "--:--:--".to_string(),
    }
}

/// Console progress line. All updates go through one lock so concurrent
/// reporters never interleave their output.
pub struct ProgressReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    pub fn new(show_progress: bool) -> Self {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar
        });
        Self { bar: Mutex::new(bar) }
    }

    pub fn report(&self, snapshot: &ProgressSnapshot) {
        let line = snapshot.render();
        let guard = self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(bar) => {
                bar.set_message(line);
                bar.tick();
            }
            None => debug!("{}", line),
        }
    }

    pub fn finish(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(bar) = guard.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}
