//! Weaver: AI-assisted note-vault linking engine
//!
//! Watches a vault of plain-text notes containing `[[wikilink]]`
//! cross-references, asks an inference oracle to classify the relation
//! each reference expresses, annotates the note in place, and accumulates
//! the resulting nodes and edges in a persistent knowledge graph.
//! A second pass links recurring keywords across notes once the oracle
//! confirms they denote the same concept.
//!
//! # Core guarantees
//!
//! - **At-most-once processing per file**: no two tasks ever work on the
//!   same path concurrently.
//! - **Crash-safe rewrites**: every file mutation stages to a temp file
//!   and commits with a single rename.
//! - **Incremental graph merge**: node importance and edge strength are
//!   running averages over occurrence counts; re-adding is idempotent in
//!   structure and monotone in counts.

pub mod config;
pub mod extract;
pub mod graph;
pub mod infer;
pub mod pipeline;
pub mod rewrite;

pub use config::{OracleConfig, RelationConfig, VaultConfig, WeaverConfig};
pub use extract::{CandidateKeyword, CandidateRef, KeywordExtractor, LinkExtractor};
pub use graph::{GraphEdge, GraphError, GraphNode, GraphResult, KnowledgeGraph};
pub use infer::{InferenceClient, MockOracle, Oracle, OracleError};
pub use pipeline::{BatchReport, FileReport, PipelineError, ShutdownToken, VaultPipeline};
pub use rewrite::RewriteEngine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
