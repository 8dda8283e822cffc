use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the scanning, diffing and pipeline layers
#[derive(Debug, Error)]
pub enum TokdiffError {
    /// Broken internal invariant (programmer error). Terminates the enclosing task.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("no counterpart for {} (expected {})", left.display(), right.display())]
    MissingCounterpart { left: PathBuf, right: PathBuf },

    /// The two token streams no longer describe the same text
    #[error("token streams diverged: {detail}")]
    StructuralMismatch { detail: String },

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("tokenizer failed on {}: {message}", path.display())]
    Tokenizer { path: PathBuf, message: String },
}

impl TokdiffError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn structural(detail: impl Into<String>) -> Self {
        Self::StructuralMismatch {
            detail: detail.into(),
        }
    }

    /// Fatal errors are never retried or downgraded to warnings
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

/// Check whether an `anyhow` chain carries a fatal invariant violation
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<TokdiffError>())
        .any(TokdiffError::is_fatal)
}
