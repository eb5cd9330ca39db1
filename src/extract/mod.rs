//! Candidate extraction from note text
//!
//! Pure, read-only scanning: nothing here touches the filesystem except
//! the thin `*_from_file` wrappers, and nothing mutates the text.

mod context;
mod keyword;
mod link;

pub use context::build_context;
pub use keyword::{CandidateKeyword, KeywordExtractor};
pub use link::{scan_markers, CandidateRef, LinkExtractor};
