use anyhow::{Context, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;

/// Recursively find regular files under `root_dir` whose file name matches the
/// configured glob. Paths are returned in a stable, sorted order.
///
/// Unreadable directory entries are logged and skipped.
pub async fn discover_files(root_dir: impl AsRef<Path>, config: &DiscoveryConfig) -> Result<Vec<PathBuf>> {
    let root = root_dir.as_ref().to_path_buf();
    let pattern = Pattern::new(&config.pattern)
        .with_context(|| format!("Invalid discovery pattern '{}'", config.pattern))?;

    // WHY: walkdir is synchronous; keep directory IO off the async workers
    tokio::task::spawn_blocking(move || walk(&root, &pattern))
        .await
        .context("Discovery task panicked")?
}

fn walk(root: &Path, pattern: &Pattern) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("Input root {} is not a directory", root.display());
    }
    let start = std::time::Instant::now();
    debug!("Starting file discovery in {} with pattern {}", root.display(), pattern);

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry.file_name().to_str().is_some_and(|name| pattern.matches(name));
        if matches {
            debug!("Found matching file: {}", entry.path().display());
            files.push(entry.into_path());
        }
    }

    info!(
        "Discovered {} files under {} in {:.2}ms",
        files.len(),
        root.display(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(files)
}
