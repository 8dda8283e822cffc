use std::io::Read;

use crate::alignment::{AlignmentSpan, TokenAligner};
use crate::error::TokdiffError;
use crate::scanner::EOS_HASH;
use crate::token::parse_sentence;
use crate::token_stream::AnnotatedTokenStream;

/// Outcome of comparing one sentence from each stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentenceDiff {
    /// The sentence is byte-identical on both sides
    NoDiff,
    /// Both streams are exhausted
    Finished,
    /// The sentence differs; both sides are materialized
    Diff { left: String, right: String },
}

impl SentenceDiff {
    /// Align the two sides of a `Diff`; other variants have no spans
    pub fn compute_spans(&self) -> Vec<AlignmentSpan> {
        match self {
            SentenceDiff::Diff { left, right } => {
                TokenAligner::new(parse_sentence(left), parse_sentence(right)).compute()
            }
            SentenceDiff::NoDiff | SentenceDiff::Finished => Vec::new(),
        }
    }
}

/// Walks two analyzer output streams in lockstep, one sentence per call.
///
/// Matching lines are compared by hash only; text is decoded just for
/// sentences that differ.
pub struct DiffCandidateDetector<L, R> {
    left: AnnotatedTokenStream<L>,
    right: AnnotatedTokenStream<R>,
    finished: bool,
    sentences: u64,
}

impl<L: Read, R: Read> DiffCandidateDetector<L, R> {
    pub fn new(left: AnnotatedTokenStream<L>, right: AnnotatedTokenStream<R>) -> Self {
        Self {
            left,
            right,
            finished: false,
            sentences: 0,
        }
    }

    /// Number of sentences consumed so far
    pub fn sentences(&self) -> u64 {
        self.sentences
    }

    /// Sentences decoded to text across both streams
    pub fn sentences_materialized(&self) -> u64 {
        self.left.sentences_materialized() + self.right.sentences_materialized()
    }

    pub fn process_one(&mut self) -> Result<SentenceDiff, TokdiffError> {
        if self.finished {
            return Ok(SentenceDiff::Finished);
        }
        self.left.maybe_refill()?;
        self.right.maybe_refill()?;

        while self.left.has_data() || self.right.has_data() {
            self.check_alignment()?;

            let left_hash = self.left.next_token_hash()?;
            let right_hash = self.right.next_token_hash()?;

            if left_hash != right_hash {
                let left = self.left.full_sentence()?;
                let right = self.right.full_sentence()?;
                self.sentences += 1;
                return Ok(SentenceDiff::Diff { left, right });
            }
            if left_hash == EOS_HASH && self.left.is_end_marker() {
                self.sentences += 1;
                return Ok(SentenceDiff::NoDiff);
            }
        }

        self.finished = true;
        Ok(SentenceDiff::Finished)
    }

    /// Fail when only one of the streams still has data
    fn check_alignment(&mut self) -> Result<(), TokdiffError> {
        if self.left.has_data() == self.right.has_data() {
            return Ok(());
        }
        self.left.maybe_refill()?;
        self.right.maybe_refill()?;
        match (self.left.has_data(), self.right.has_data()) {
            (true, false) => Err(TokdiffError::structural(format!(
                "right stream ended at byte {} after {} sentences, left continues at byte {}",
                self.right.position(),
                self.sentences,
                self.left.position()
            ))),
            (false, true) => Err(TokdiffError::structural(format!(
                "left stream ended at byte {} after {} sentences, right continues at byte {}",
                self.left.position(),
                self.sentences,
                self.right.position()
            ))),
            _ => Ok(()),
        }
    }
}
