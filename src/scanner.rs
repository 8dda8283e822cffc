// Line scanning over raw analyzer output without building strings.
// Every line gets a position-sensitive 64-bit hash; equal hashes are the cheap
// "same token line" test used by the diff candidate detector.

use crate::error::TokdiffError;

/// Line terminator
pub const EOL: u8 = b'\n';

/// Content of the line that terminates a sentence
pub const END_MARKER: &[u8] = b"EOS";

const SEED: u64 = 0xdead_beef;
// Multipliers from MurmurHash3
const MULT1: u64 = 0xcc9e_2d51;
const MULT2: u64 = 0x1b87_3593;

/// Hash of `line` (terminator excluded)
pub const fn line_hash(line: &[u8]) -> u64 {
    let mut hash = SEED;
    let mut i = 0;
    while i < line.len() {
        hash = mix(hash, i, line[i]);
        i += 1;
    }
    hash
}

/// Hash of the end-of-sentence marker line
pub const EOS_HASH: u64 = line_hash(END_MARKER);

#[inline(always)]
const fn mix(hash: u64, position: usize, byte: u8) -> u64 {
    let part = (((position as u64) << 32) | byte as u64).wrapping_mul(MULT1);
    (hash ^ part).wrapping_mul(MULT2)
}

/// Cursor that walks a byte buffer line by line.
///
/// The scanner does not own the buffer: callers pass the same slice to every
/// `next_line` call and may move bytes around between calls (see
/// [`LineScanner::rebase`]).
#[derive(Debug, Clone, Default)]
pub struct LineScanner {
    start: usize,
    end: usize,
    limit: usize,
    terminated: bool,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the scanner at `offset`, scanning up to `limit` (exclusive)
    pub fn reset(&mut self, offset: usize, limit: usize) {
        self.start = offset;
        self.end = offset;
        self.limit = limit;
        self.terminated = false;
    }

    /// Scan the next line and return its hash.
    ///
    /// `start`/`end` are updated to the line bounds; `end` includes the
    /// terminator when one was found, otherwise it equals the scan limit.
    pub fn next_line(&mut self, data: &[u8]) -> Result<u64, TokdiffError> {
        if self.limit > data.len() || self.end > self.limit {
            return Err(TokdiffError::invariant(format!(
                "scan window [{}, {}) exceeds buffer of {} bytes",
                self.end,
                self.limit,
                data.len()
            )));
        }

        self.start = self.end;
        let mut hash = SEED;
        for (count, &byte) in data[self.start..self.limit].iter().enumerate() {
            if byte == EOL {
                self.end = self.start + count + 1;
                self.terminated = true;
                return Ok(hash);
            }
            hash = mix(hash, count, byte);
        }
        self.end = self.limit;
        self.terminated = false;
        Ok(hash)
    }

    /// Start offset of the last scanned line
    pub fn start(&self) -> usize {
        self.start
    }

    /// End offset of the last scanned line, terminator included
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes not yet scanned
    pub fn remaining(&self) -> usize {
        self.limit - self.end
    }

    /// Whether the last scanned line ended with a terminator
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether the last scanned line is exactly the end-of-sentence marker.
    /// An unterminated `EOS` is accepted only as the final line of the data.
    pub fn is_end_marker(&self, data: &[u8]) -> bool {
        let idx = self.start;
        let len = self.end - self.start;
        let marker = data.len() >= idx + 3
            && data[idx] == b'E'
            && data[idx + 1] == b'O'
            && data[idx + 2] == b'S';
        if !marker {
            return false;
        }
        if self.terminated {
            len == 4 && data[idx + 3] == EOL
        } else {
            len == 3
        }
    }

    /// Move the scan position back to `offset` so the line starting there is scanned again
    pub fn rewind(&mut self, offset: usize) {
        self.start = offset;
        self.end = offset;
        self.terminated = false;
    }

    /// Account for the first `shift` bytes of the buffer being discarded
    pub fn rebase(&mut self, shift: usize) {
        self.start = self.start.saturating_sub(shift);
        self.end = self.end.saturating_sub(shift);
        self.limit = self.limit.saturating_sub(shift);
    }

    /// Extend the scan limit after more data was appended to the buffer
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }
}
