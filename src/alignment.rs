// Linear-time alignment of two tokenizations of the same sentence.
//
// Both sides tokenize identical text, so their surfaces concatenate to the same
// string. Cumulative surface length is therefore a synchronization signal: after
// a diverging region both sides reach the same length again and become directly
// comparable. No edit-distance search is needed.

use serde::Serialize;

use crate::token::AnnotatedToken;

/// A maximal run of tokens with one classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AlignmentSpan {
    /// Identical tokens on both sides
    Equal(Vec<AnnotatedToken>),
    /// Trailing tokens present only on the left
    LeftOnly(Vec<AnnotatedToken>),
    /// Trailing tokens present only on the right
    RightOnly(Vec<AnnotatedToken>),
    /// A diverging region; `level` is the field index where the tokens differ
    Both {
        left: Vec<AnnotatedToken>,
        right: Vec<AnnotatedToken>,
        level: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Equal,
    Both,
}

/// Aligns the token lists of one sentence that is known to differ
pub struct TokenAligner {
    left: Vec<AnnotatedToken>,
    right: Vec<AnnotatedToken>,
    left_buf: Vec<AnnotatedToken>,
    right_buf: Vec<AnnotatedToken>,
    state: State,
    level: usize,
    result: Vec<AlignmentSpan>,
}

impl TokenAligner {
    pub fn new(left: Vec<AnnotatedToken>, right: Vec<AnnotatedToken>) -> Self {
        Self {
            left,
            right,
            left_buf: Vec::new(),
            right_buf: Vec::new(),
            state: State::Equal,
            level: 0,
            result: Vec::new(),
        }
    }

    pub fn compute(mut self) -> Vec<AlignmentSpan> {
        let left = std::mem::take(&mut self.left);
        let right = std::mem::take(&mut self.right);

        let (mut i, mut j) = (0, 0);
        let mut left_done = 0usize;
        let mut right_done = 0usize;

        while i < left.len() || j < right.len() {
            if i == left.len() || j == right.len() {
                self.finish_unbalanced(&left[i..], &right[j..]);
                break;
            }

            let lt = &left[i];
            let rt = &right[j];
            // Equal tokens only count as aligned when they start at the same offset
            let synchronized = left_done == right_done;
            if synchronized && lt == rt {
                if self.state != State::Equal {
                    self.flush();
                    self.state = State::Equal;
                }
                self.left_buf.push(lt.clone());
                i += 1;
                j += 1;
                left_done += lt.surface_len();
                right_done += rt.surface_len();
                continue;
            }

            let level = lt.diff_level(rt).unwrap_or(0);
            if self.state != State::Both {
                self.flush();
                self.state = State::Both;
                self.level = level;
            } else if synchronized && self.level != level {
                self.flush();
                self.level = level;
            }

            let left_projected = left_done + lt.surface_len();
            let right_projected = right_done + rt.surface_len();
            if left_projected < right_projected {
                self.left_buf.push(lt.clone());
                left_done = left_projected;
                i += 1;
            } else if right_projected < left_projected {
                self.right_buf.push(rt.clone());
                right_done = right_projected;
                j += 1;
            } else {
                self.left_buf.push(lt.clone());
                self.right_buf.push(rt.clone());
                left_done = left_projected;
                right_done = right_projected;
                i += 1;
                j += 1;
            }
        }

        self.flush();
        self.result
    }

    /// One side ran out of tokens: only possible when the surfaces have different total length
    fn finish_unbalanced(&mut self, left_rest: &[AnnotatedToken], right_rest: &[AnnotatedToken]) {
        self.flush();
        let mut rest: Vec<AnnotatedToken> = left_rest.iter().chain(right_rest).cloned().collect();
        strip_eos(&mut rest);
        if rest.is_empty() {
            return;
        }
        if left_rest.is_empty() {
            self.result.push(AlignmentSpan::RightOnly(rest));
        } else {
            self.result.push(AlignmentSpan::LeftOnly(rest));
        }
    }

    fn flush(&mut self) {
        strip_eos(&mut self.left_buf);
        strip_eos(&mut self.right_buf);

        let left = std::mem::take(&mut self.left_buf);
        let right = std::mem::take(&mut self.right_buf);
        let span = match (self.state, left.is_empty(), right.is_empty()) {
            (_, true, true) => return,
            (State::Equal, _, _) => AlignmentSpan::Equal(left),
            (State::Both, _, _) => AlignmentSpan::Both {
                left,
                right,
                level: self.level,
            },
        };
        self.result.push(span);
    }
}

fn strip_eos(buf: &mut Vec<AnnotatedToken>) {
    if buf.last().is_some_and(AnnotatedToken::is_eos) {
        buf.pop();
    }
}
