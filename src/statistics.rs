use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::report::{DiffPack, ProcessedSpan};
use crate::token::{AnnotatedToken, FIELD_COUNT, LEVEL_NAMES};

/// Where a span pattern was seen
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SpanLocation {
    pub path: PathBuf,
    pub sentence_id: String,
}

/// A span reduced to the field that differs at its level
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LevelledKey {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl LevelledKey {
    fn new(left: &[AnnotatedToken], right: &[AnnotatedToken], level: usize) -> Self {
        let project = |tokens: &[AnnotatedToken]| -> Vec<String> {
            tokens.iter().map(|t| t.field(level).to_string()).collect()
        };
        Self {
            left: project(left),
            right: project(right),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternSummary {
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub occurrences: usize,
    pub locations: Vec<SpanLocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelSummary {
    pub level: usize,
    pub name: &'static str,
    pub total: usize,
    pub patterns: Vec<PatternSummary>,
}

/// Groups diverging spans by mismatch level and by what differs at that level.
/// Aggregation is order independent: the summary only depends on the set of packs handled.
#[derive(Debug)]
pub struct DiffStatistics {
    by_level: Vec<HashMap<LevelledKey, Vec<SpanLocation>>>,
    spans: usize,
}

impl DiffStatistics {
    pub fn new() -> Self {
        Self {
            by_level: (0..FIELD_COUNT).map(|_| HashMap::new()).collect(),
            spans: 0,
        }
    }

    pub fn handle(&mut self, pack: &DiffPack) {
        for span in &pack.diffs {
            self.add(&pack.path, span);
        }
    }

    fn add(&mut self, path: &Path, span: &ProcessedSpan) {
        let level = span.level.min(FIELD_COUNT - 1);
        let key = LevelledKey::new(&span.left, &span.right, level);
        self.by_level[level].entry(key).or_default().push(SpanLocation {
            path: path.to_path_buf(),
            sentence_id: span.sentence_id.clone(),
        });
        self.spans += 1;
    }

    /// Number of spans handled so far
    pub fn span_count(&self) -> usize {
        self.spans
    }

    /// Most frequent patterns per level, 500 for surface differences and 100 otherwise
    pub fn summary(&self) -> Vec<LevelSummary> {
        let mut result = Vec::new();
        for (level, entries) in self.by_level.iter().enumerate() {
            if entries.is_empty() {
                continue;
            }
            let limit = if level == 0 { 500 } else { 100 };
            let mut sorted: Vec<(&LevelledKey, &Vec<SpanLocation>)> = entries.iter().collect();
            sorted.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

            let patterns = sorted
                .into_iter()
                .take(limit)
                .map(|(key, locations)| {
                    let occurrences = locations.len();
                    let mut locations = locations.clone();
                    locations.sort();
                    locations.truncate(20);
                    PatternSummary {
                        left: key.left.clone(),
                        right: key.right.clone(),
                        occurrences,
                        locations,
                    }
                })
                .collect();

            result.push(LevelSummary {
                level,
                name: LEVEL_NAMES[level],
                total: entries.values().map(Vec::len).sum(),
                patterns,
            });
        }
        result
    }

    /// Write the summary as pretty JSON
    pub fn write_summary(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.summary())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for DiffStatistics {
    fn default() -> Self {
        Self::new()
    }
}
