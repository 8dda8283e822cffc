use std::io::{ErrorKind, Read};

use crate::error::TokdiffError;
use crate::scanner::{LineScanner, EOS_HASH};

/// Default working buffer size
pub const BUFFER_SIZE: usize = 512 * 1024;

/// `maybe_refill` does nothing while more than this many bytes are unscanned
const REFILL_THRESHOLD: usize = 64 * 1024;

/// Buffered reader over one analyzer output stream.
///
/// Lines are hashed in place; the bytes of the current sentence stay in the
/// buffer until the next refill so that the sentence can be decoded on demand.
pub struct AnnotatedTokenStream<R> {
    source: R,
    buffer: Vec<u8>,
    filled: usize,
    exhausted: bool,
    scanner: LineScanner,
    sentence_start: usize,
    sentence_end: usize,
    at_sentence_end: bool,
    /// Bytes discarded from the front of the buffer so far
    offset: u64,
    materialized: u64,
}

impl<R: Read> AnnotatedTokenStream<R> {
    pub fn new(source: R) -> Self {
        Self::with_capacity(source, BUFFER_SIZE)
    }

    pub fn with_capacity(source: R, capacity: usize) -> Self {
        Self {
            source,
            buffer: vec![0u8; capacity.max(1)],
            filled: 0,
            exhausted: false,
            scanner: LineScanner::new(),
            sentence_start: 0,
            sentence_end: 0,
            at_sentence_end: false,
            offset: 0,
            materialized: 0,
        }
    }

    /// Top up the buffer unless enough unscanned data remains or the source is exhausted
    pub fn maybe_refill(&mut self) -> Result<(), TokdiffError> {
        if self.exhausted || self.scanner.remaining() > REFILL_THRESHOLD {
            return Ok(());
        }
        self.refill()
    }

    /// Compact the consumed prefix away and read until the buffer is full or the source ends
    fn refill(&mut self) -> Result<(), TokdiffError> {
        // keep the current sentence so that it can still be materialized
        let keep_from = self.sentence_end;
        if keep_from == 0 && self.filled == self.buffer.len() {
            let grown = self.buffer.len() * 2;
            self.buffer.resize(grown, 0);
        }

        self.buffer.copy_within(keep_from..self.filled, 0);
        self.filled -= keep_from;
        self.offset += keep_from as u64;
        self.scanner.rebase(keep_from);
        self.sentence_start = 0;
        self.sentence_end = 0;

        while self.filled < self.buffer.len() {
            match self.source.read(&mut self.buffer[self.filled..]) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TokdiffError::io("reading analyzer output", e)),
            }
        }
        self.scanner.set_limit(self.filled);
        Ok(())
    }

    /// Hash the next token line.
    ///
    /// A line cut off by the end of the buffer is re-read after a refill, so
    /// the returned hash always covers a whole line.
    pub fn next_token_hash(&mut self) -> Result<u64, TokdiffError> {
        loop {
            let line_start = self.scanner.end();
            let hash = self.scanner.next_line(&self.buffer[..self.filled])?;
            if self.scanner.is_terminated() || self.exhausted {
                self.at_sentence_end = hash == EOS_HASH && self.is_end_marker();
                if self.at_sentence_end {
                    self.sentence_start = self.sentence_end;
                    self.sentence_end = self.scanner.end();
                }
                return Ok(hash);
            }
            self.scanner.rewind(line_start);
            self.refill()?;
        }
    }

    /// Read up to the end of the current sentence and decode it.
    ///
    /// If the last line read was already an end marker, that sentence is returned.
    /// A stream ending without a marker yields its trailing lines as the sentence.
    pub fn full_sentence(&mut self) -> Result<String, TokdiffError> {
        while !self.at_sentence_end {
            if !self.has_data() {
                self.sentence_start = self.sentence_end;
                self.sentence_end = self.scanner.end();
                self.at_sentence_end = true;
                break;
            }
            self.next_token_hash()?;
        }
        if self.sentence_start > self.sentence_end || self.sentence_end > self.filled {
            return Err(TokdiffError::invariant(format!(
                "sentence range [{}, {}) outside buffer of {} bytes",
                self.sentence_start, self.sentence_end, self.filled
            )));
        }
        let bytes = &self.buffer[self.sentence_start..self.sentence_end];
        self.materialized += 1;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Number of `full_sentence` calls that decoded text
    pub fn sentences_materialized(&self) -> u64 {
        self.materialized
    }

    /// Whether the last scanned line was the end-of-sentence marker
    pub fn is_end_marker(&self) -> bool {
        self.scanner.is_end_marker(&self.buffer[..self.filled])
    }

    /// Whether unscanned bytes remain (after the last refill)
    pub fn has_data(&self) -> bool {
        self.scanner.remaining() > 0 || !self.exhausted
    }

    /// Start of the last scanned line, relative to the buffer
    pub fn line_start(&self) -> usize {
        self.scanner.start()
    }

    /// End of the last scanned line, relative to the buffer
    pub fn line_end(&self) -> usize {
        self.scanner.end()
    }

    /// Absolute stream position after the last scanned line
    pub fn position(&self) -> u64 {
        self.offset + self.scanner.end() as u64
    }
}
