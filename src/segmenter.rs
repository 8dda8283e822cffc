use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

use crate::config::SegmenterConfig;
use crate::error::TokdiffError;
use crate::scanner::LineScanner;

/// Half-open byte range `[start, end)` of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: u64,
    pub end: u64,
}

impl Segment {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits files into line-aligned segments of roughly `target_size` bytes
#[derive(Debug, Clone, Default)]
pub struct FileSegmenter {
    config: SegmenterConfig,
}

impl FileSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Compute the segments of `path`.
    ///
    /// Every segment except possibly the last ends right after a line
    /// terminator. Memory use is bounded by `window_size` whatever the line
    /// lengths are.
    pub fn segments(&self, path: &Path) -> Result<Vec<Segment>, TokdiffError> {
        let context = || format!("segmenting {}", path.display());
        let mut file = File::open(path).map_err(|e| TokdiffError::io(context(), e))?;
        let length = file
            .metadata()
            .map_err(|e| TokdiffError::io(context(), e))?
            .len();

        let mut window = vec![0u8; self.config.window_size];
        let mut scanner = LineScanner::new();
        let mut result = Vec::new();
        let mut start = 0u64;

        'segments: while start < length {
            let mut rough_end = start + self.config.target_size;
            loop {
                if rough_end >= length {
                    result.push(Segment::new(start, length));
                    break 'segments;
                }

                file.seek(SeekFrom::Start(rough_end))
                    .map_err(|e| TokdiffError::io(context(), e))?;
                let nread = read_window(&mut file, &mut window)
                    .map_err(|e| TokdiffError::io(context(), e))?;
                if nread == 0 {
                    result.push(Segment::new(start, length));
                    break 'segments;
                }

                scanner.reset(0, nread);
                scanner.next_line(&window[..nread])?;
                if scanner.is_terminated() {
                    let real_end = rough_end + scanner.end() as u64;
                    result.push(Segment::new(start, real_end));
                    start = real_end;
                    break;
                }
                rough_end += nread as u64;
            }
        }

        debug!(
            "Split {} ({} bytes) into {} segments",
            path.display(),
            length,
            result.len()
        );
        Ok(result)
    }
}

/// Fill `window` as far as the file allows; short reads are retried
fn read_window(file: &mut File, window: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < window.len() {
        match file.read(&mut window[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
