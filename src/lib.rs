pub mod alignment;
pub mod candidate;
pub mod config;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod segmenter;
pub mod statistics;
pub mod token;
pub mod token_stream;
pub mod tokenizer;

// Re-export the types most callers need
pub use alignment::{AlignmentSpan, TokenAligner};
pub use candidate::{DiffCandidateDetector, SentenceDiff};
pub use config::{DiscoveryConfig, PipelineConfig, SegmenterConfig};
pub use error::TokdiffError;
pub use pipeline::analysis::AnalysisPipeline;
pub use pipeline::diff::DiffPipeline;
pub use pipeline::{JobFailure, PipelineContext, RunSummary, WorkerPool};
pub use report::{DiffDetails, DiffPack, ProcessedSpan};
pub use scanner::{line_hash, LineScanner};
pub use segmenter::{FileSegmenter, Segment};
pub use statistics::DiffStatistics;
pub use token::AnnotatedToken;
pub use token_stream::AnnotatedTokenStream;
pub use tokenizer::{CommandTokenizer, Tokenizer};
