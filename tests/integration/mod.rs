// Integration test utilities and common code
// Shared fixtures and helpers for the integration tests

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokdiff::{Segment, TokdiffError, Tokenizer};

/// Temporary directory holding corpora and analysis trees
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();
        Self { temp_dir, root_path }
    }

    pub fn path<P: AsRef<Path>>(&self, relative_path: P) -> PathBuf {
        self.root_path.join(relative_path)
    }

    /// Create a raw corpus file
    pub fn create_text_file<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        let file_path = self.path(relative_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    /// Create a zstd-compressed analyzer output file
    pub fn create_token_file<P: AsRef<Path>>(&self, relative_path: P, tokens: &str) -> PathBuf {
        let file_path = self.path(relative_path);
        write_compressed(&file_path, tokens.as_bytes()).expect("Failed to write token file");
        file_path
    }

    /// Decompress an analyzer output file
    pub fn read_token_file<P: AsRef<Path>>(&self, relative_path: P) -> String {
        let file = fs::File::open(self.path(relative_path)).expect("Failed to open token file");
        let bytes = zstd::stream::decode_all(file).expect("Failed to decompress token file");
        String::from_utf8(bytes).expect("Token file is not UTF-8")
    }
}

pub fn write_compressed(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut encoder = zstd::stream::Encoder::new(fs::File::create(path)?, 3)?;
    encoder.write_all(bytes)?;
    encoder.finish()?;
    Ok(())
}

/// In-process stand-in for the external analyzer: every text line is a
/// sentence and every whitespace-separated word a token. With
/// `split_hyphens`, hyphenated words become three tokens, which mimics a
/// new analyzer version changing token boundaries.
pub struct FakeTokenizer {
    pub split_hyphens: bool,
}

impl FakeTokenizer {
    pub fn token_line(surface: &str) -> String {
        let normalized = surface.to_lowercase();
        let pos = if surface.chars().all(|c| c.is_ascii_punctuation()) { "symbol" } else { "word" };
        format!("{surface}\t{normalized}\t*\t{pos}\t*\t*\t*\t*\t*\n")
    }

    pub fn tokenize(&self, text: &str) -> String {
        let mut out = String::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            for word in line.split_whitespace() {
                if self.split_hyphens && word.contains('-') && word.len() > 1 {
                    for (i, part) in word.split('-').enumerate() {
                        if i > 0 {
                            out.push_str(&Self::token_line("-"));
                        }
                        if !part.is_empty() {
                            out.push_str(&Self::token_line(part));
                        }
                    }
                } else {
                    out.push_str(&Self::token_line(word));
                }
            }
            out.push_str("EOS\n");
        }
        out
    }
}

impl Tokenizer for FakeTokenizer {
    fn analyze(&self, input: &Path, segment: Segment, output: &Path) -> Result<(), TokdiffError> {
        let data = fs::read(input).map_err(|e| TokdiffError::io("reading fake input", e))?;
        let range = &data[segment.start as usize..segment.end as usize];
        let text = String::from_utf8_lossy(range);
        write_compressed(output, self.tokenize(&text).as_bytes())
            .map_err(|e| TokdiffError::io("writing fake output", e))
    }
}
