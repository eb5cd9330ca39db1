//! Inference client: the boundary to the relation/similarity oracle
//!
//! The `Oracle` trait abstracts over transport (HTTP, mock) so the
//! pipeline never depends on how the oracle is reached. Two
//! implementations:
//! - `HttpOracle`: OpenAI-compatible chat completions (production)
//! - `MockOracle`: preconfigured responses (testing and explicit offline mode)
//!
//! Every failure path (transport, timeout, parse, unknown label) is
//! absorbed into "no result this pass": `infer_relation` yields `None`
//! and `verify_similarity` yields `false`. Nothing here ever takes down a
//! processing task.

mod http;

pub use http::HttpOracle;

use crate::config::{OracleConfig, FALLBACK_RELATION};
use crate::extract::{CandidateKeyword, CandidateRef};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Affirmative verdicts accepted from the similarity oracle.
///
/// Anything not containing one of these reads as "not similar"
/// (fail-closed).
const AFFIRMATIVE_PHRASES: [&str; 6] = ["是的", "是", "相同", "一样", "同一个概念", "相同概念"];

/// Errors from oracle transports.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle not available: {0}")]
    Unavailable(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("response parse error: {0}")]
    Parse(String),
}

/// Transport-level oracle interface.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send one prompt and return the raw response text.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, OracleError>;
}

/// Extract the first bracketed label token from oracle response text.
///
/// Returns the trimmed inner text of the first `[[...]]` span, or `None`
/// when no complete span exists or the span is empty. Later spans are
/// ignored by design: the oracle contract is a single label token.
pub fn parse_bracket_token(response: &str) -> Option<String> {
    let start = response.find("[[")?;
    let rest = &response[start + 2..];
    let end = rest.find("]]")?;
    let label = rest[..end].trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

/// High-level inference client used by the pipeline.
///
/// Wraps an oracle transport with prompt construction, response
/// validation against the relation vocabulary, and a per-call timeout.
pub struct InferenceClient {
    oracle: Arc<dyn Oracle>,
    vocabulary: Vec<String>,
    timeout: Duration,
}

impl InferenceClient {
    pub fn new(oracle: Arc<dyn Oracle>, vocabulary: Vec<String>, timeout: Duration) -> Self {
        Self {
            oracle,
            vocabulary,
            timeout,
        }
    }

    /// Build a client from config, choosing the transport by provider.
    ///
    /// `provider: mock` is the explicit offline mode: a fixed fallback
    /// label with no network. It is announced at construction so it can
    /// never be mistaken for live inference.
    pub fn from_config(oracle_cfg: &OracleConfig, vocabulary: Vec<String>) -> Self {
        let timeout = Duration::from_secs(oracle_cfg.timeout_secs);
        let oracle: Arc<dyn Oracle> = if oracle_cfg.provider.eq_ignore_ascii_case("mock") {
            info!("oracle provider is 'mock': returning fixed relation {FALLBACK_RELATION}, no network calls");
            Arc::new(MockOracle::fixed(format!("[[{FALLBACK_RELATION}]]")))
        } else {
            Arc::new(HttpOracle::from_config(oracle_cfg))
        };
        Self::new(oracle, vocabulary, timeout)
    }

    /// Infer the relation a candidate reference expresses.
    ///
    /// Returns the validated label text, or `None` on any transport,
    /// timeout, or parse failure, or when the oracle answers with a label
    /// outside the vocabulary. Callers treat `None` as "skip this
    /// candidate this pass".
    pub async fn infer_relation(&self, candidate: &CandidateRef) -> Option<String> {
        let system = self.relation_system_prompt();
        let prompt = relation_prompt(candidate);

        let response = match self.call(&system, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    source = %candidate.source_note,
                    target = %candidate.target_note,
                    error = %e,
                    "relation inference failed, skipping candidate this pass"
                );
                return None;
            }
        };

        match parse_bracket_token(&response) {
            Some(label) if self.vocabulary.iter().any(|v| *v == label) => Some(label),
            Some(label) => {
                debug!(label, "oracle returned a label outside the vocabulary");
                None
            }
            None => {
                debug!("no bracket token in oracle response");
                None
            }
        }
    }

    /// Ask whether a group of keyword occurrences denotes one concept.
    ///
    /// Groups of fewer than two occurrences are trivially not linkable.
    /// Only an allow-listed affirmative phrase counts as "yes"; every
    /// failure reads as "not similar".
    pub async fn verify_similarity(&self, group: &[CandidateKeyword]) -> bool {
        if group.len() < 2 {
            return false;
        }
        let prompt = similarity_prompt(group);
        let response = match self.call(SIMILARITY_SYSTEM, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    term = %group[0].term,
                    error = %e,
                    "similarity verification failed, treating group as not similar"
                );
                return false;
            }
        };
        let verdict = response.trim().to_lowercase();
        AFFIRMATIVE_PHRASES.iter().any(|p| verdict.contains(p))
    }

    async fn call(&self, system: &str, prompt: &str) -> Result<String, OracleError> {
        match tokio::time::timeout(self.timeout, self.oracle.complete(system, prompt)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.timeout)),
        }
    }

    /// System prompt listing the configured relation vocabulary.
    fn relation_system_prompt(&self) -> String {
        let mut labels = String::new();
        for label in &self.vocabulary {
            labels.push_str("- ");
            labels.push_str(label);
            labels.push('\n');
        }
        format!(
            "你是一位专注于知识图谱分析的AI助手，对笔记双链的链接哲学有深刻理解。你的核心任务是：\n\n\
             1. 分析上下文: 阅读提供的、包含一个链接的文本片段（上下文）。\n\
             2. 判断关系: 根据上下文，从预定义关系列表中，选择一个最能描述\"源笔记\"与\"目标笔记\"之间关系。\n\
             3. 生成链接: 将选定的关系名称封装成一个标准的wiki链接 `[[关系名称]]`。\n\
             4. 严格输出: 你的最终回答必须且只能是一个单一的、无任何多余文本的wiki链接。不要包含任何解释、问候、标点或额外的文字。\n\n\
             预定义关系列表：\n{labels}"
        )
    }
}

const SIMILARITY_SYSTEM: &str = "你是一位有帮助的AI助手，擅长文本分析和关键词提取。";

fn relation_prompt(candidate: &CandidateRef) -> String {
    format!(
        "源笔记:《{}》\n目标笔记:《{}》\n上下文:\"...{}...\"\n\n请判断关系并生成链接。",
        candidate.source_note, candidate.target_note, candidate.context
    )
}

fn similarity_prompt(group: &[CandidateKeyword]) -> String {
    let mut occurrences = String::new();
    for kw in group {
        occurrences.push_str(&format!(
            "关键词: '{}', 上下文: '{}', 文件: {}\n",
            kw.term,
            kw.context,
            kw.file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));
    }
    format!(
        "请分析以下关键词是否指向同一个概念或实体。考虑：\n\
         1. 语义相似性（同义词、近义词、相关概念）\n\
         2. 上下文中的使用方式\n\n\
         关键词组分析：\n{occurrences}\n\
         如果这些关键词确实指向同一个概念，回复\"是\"，否则回复\"否\"。\n\
         注意：即使关键词的字面形式不同，如果它们在语境中表示相同的核心概念，也应该被认为是相同的。"
    )
}

/// Mock oracle for testing and explicit offline mode.
///
/// Responds with the first rule whose needle appears in the prompt, then
/// the fixed default, then an error. Call count is shared across clones.
pub struct MockOracle {
    default_response: Option<String>,
    rules: Vec<(String, String)>,
    fail: Option<String>,
    calls: AtomicUsize,
    prompts: std::sync::Mutex<Vec<String>>,
}

impl MockOracle {
    /// A mock that answers every prompt with the same text.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self {
            default_response: Some(response.into()),
            rules: Vec::new(),
            fail: None,
            calls: AtomicUsize::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A mock with no default: prompts must match a registered rule.
    pub fn scripted() -> Self {
        Self {
            default_response: None,
            rules: Vec::new(),
            fail: None,
            calls: AtomicUsize::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A mock whose every call fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            default_response: None,
            rules: Vec::new(),
            fail: Some(message.into()),
            calls: AtomicUsize::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Respond with `response` whenever the prompt contains `needle`.
    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    /// Number of completed calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(ref message) = self.fail {
            return Err(OracleError::Unavailable(message.clone()));
        }
        for (needle, response) in &self.rules {
            if prompt.contains(needle) {
                return Ok(response.clone());
            }
        }
        match &self.default_response {
            Some(response) => Ok(response.clone()),
            None => Err(OracleError::Unavailable(format!(
                "no scripted response matches prompt: {}",
                prompt.chars().take(60).collect::<String>()
            ))),
        }
    }
}

/// Per-needle delayed mock, for exercising in-flight behavior in tests.
pub struct DelayedOracle {
    inner: MockOracle,
    delay: Duration,
}

impl DelayedOracle {
    pub fn new(inner: MockOracle, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Oracle for DelayedOracle {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, OracleError> {
        tokio::time::sleep(self.delay).await;
        self.inner.complete(system, prompt).await
    }
}
