use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::alignment::AlignmentSpan;
use crate::error::TokdiffError;
use crate::token::AnnotatedToken;

const TOKEN_SEPARATOR: &str = "¦";

/// A diverging region located in a rendered diff file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedSpan {
    pub sentence_id: String,
    pub left: Vec<AnnotatedToken>,
    pub right: Vec<AnnotatedToken>,
    pub level: usize,
}

/// Everything the diff consumer receives for one file pair
#[derive(Debug, Clone, Serialize)]
pub struct DiffPack {
    pub diffs: Vec<ProcessedSpan>,
    /// Rendered diff output of the file
    pub path: PathBuf,
}

/// Collects the differing sentences of one file pair
pub struct DiffDetails {
    output_path: PathBuf,
    stored: Vec<Vec<AlignmentSpan>>,
}

impl DiffDetails {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            stored: Vec::new(),
        }
    }

    pub fn add_diff(&mut self, spans: Vec<AlignmentSpan>) {
        self.stored.push(spans);
    }

    pub fn diff_count(&self) -> usize {
        self.stored.len()
    }

    /// Render the collected sentences and package their diverging regions.
    /// Nothing is written when the file had no differences.
    pub fn make_pack(self) -> Result<DiffPack, TokdiffError> {
        let mut diffs = Vec::new();
        if self.stored.is_empty() {
            return Ok(DiffPack {
                diffs,
                path: self.output_path,
            });
        }

        let context = || format!("writing {}", self.output_path.display());
        if let Some(parent) = self.output_path.parent() {
            fs::create_dir_all(parent).map_err(|e| TokdiffError::io(context(), e))?;
        }
        let file = File::create(&self.output_path).map_err(|e| TokdiffError::io(context(), e))?;
        let mut out = BufWriter::with_capacity(32 * 1024, file);

        for (index, spans) in self.stored.iter().enumerate() {
            let sentence_id = sentence_id(index);
            let mut line = String::new();
            for span in spans {
                match span {
                    AlignmentSpan::Equal(tokens) => {
                        tokens.iter().for_each(|t| line.push_str(t.surface()));
                    }
                    AlignmentSpan::Both { left, right, .. } => {
                        let level = span_level(left, right);
                        render_diff(&mut line, left, right, level);
                        diffs.push(ProcessedSpan {
                            sentence_id: sentence_id.clone(),
                            left: left.clone(),
                            right: right.clone(),
                            level,
                        });
                    }
                    AlignmentSpan::LeftOnly(tokens) => render_diff(&mut line, tokens, &[], 0),
                    AlignmentSpan::RightOnly(tokens) => render_diff(&mut line, &[], tokens, 0),
                }
            }
            writeln!(out, "{sentence_id}\t{line}").map_err(|e| TokdiffError::io(context(), e))?;
        }
        out.flush().map_err(|e| TokdiffError::io(context(), e))?;

        Ok(DiffPack {
            diffs,
            path: self.output_path,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Identifier of the `index`-th differing sentence within its file
pub fn sentence_id(index: usize) -> String {
    format!("s-{index:08}")
}

/// Mismatch level of a whole region: 0 when the token counts differ,
/// otherwise the shallowest level over the token pairs
pub fn span_level(left: &[AnnotatedToken], right: &[AnnotatedToken]) -> usize {
    if left.len() != right.len() {
        return 0;
    }
    left.iter()
        .zip(right)
        .filter_map(|(a, b)| a.diff_level(b))
        .min()
        .unwrap_or(0)
}

fn join_field(tokens: &[AnnotatedToken], level: usize) -> String {
    tokens
        .iter()
        .map(|t| t.field(level))
        .collect::<Vec<_>>()
        .join(TOKEN_SEPARATOR)
}

/// `[l1¦l2/r1]` for surface differences, `[surface L: left/right]` otherwise
pub fn render_diff(out: &mut String, left: &[AnnotatedToken], right: &[AnnotatedToken], level: usize) {
    out.push('[');
    if level != 0 {
        out.push_str(&join_field(left, 0));
        out.push_str(&format!(" {level}: "));
    }
    out.push_str(&join_field(left, level));
    out.push('/');
    out.push_str(&join_field(right, level));
    out.push(']');
}
