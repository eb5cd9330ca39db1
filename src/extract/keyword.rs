//! Keyword occurrence extraction
//!
//! Finds recurring-concept candidates for the cross-note linking pass.
//! CJK runs without whitespace word boundaries are segmented with a small
//! sliding window (lengths 2–3) filtered at the window boundaries by stop
//! terms. This is a deliberate noise-reduction heuristic, not a
//! tokenizer: it trades linguistic correctness for bounded cost and has
//! known false positives and negatives.

use super::context::build_context;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Sliding-window lengths for unsegmented CJK runs.
const CJK_WINDOW_LENGTHS: [usize; 2] = [2, 3];

/// CJK runs up to this many chars are kept whole instead of windowed.
const CJK_WHOLE_WORD_MAX: usize = 4;

/// Common terms excluded from keyword candidates.
const STOP_TERMS: [&str; 24] = [
    "的", "了", "在", "是", "我", "有", "和", "就", "都", "而", "及", "与", "等", "这", "那",
    "你", "他", "她", "它", "我们", "他们", "你们", "这个", "那个",
];

/// One keyword occurrence with its surrounding context.
///
/// Transient: grouped by normalized term across a batch, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateKeyword {
    /// The raw term as it appears in the text
    pub term: String,
    /// File the occurrence was found in
    pub file_path: PathBuf,
    /// Bounded text surrounding the occurrence
    pub context: String,
    /// 1-based line number
    pub line_number: usize,
    /// The full line, trimmed
    pub original_line: String,
}

impl CandidateKeyword {
    /// Normalized form used for cross-file grouping.
    pub fn normalized(&self) -> String {
        self.term.to_lowercase()
    }
}

/// Extracts keyword occurrences from note text.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    stop_terms: HashSet<&'static str>,
    min_len: usize,
    context_window: usize,
}

impl KeywordExtractor {
    pub fn new(context_window: usize) -> Self {
        Self {
            stop_terms: STOP_TERMS.iter().copied().collect(),
            min_len: 2,
            context_window,
        }
    }

    /// Extract keyword occurrences from `text`, deduplicated per line.
    ///
    /// Lines already containing a `[[...]]` span are skipped entirely so
    /// existing links are never reprocessed into keywords.
    pub fn extract_keywords(&self, path: &Path, text: &str) -> Vec<CandidateKeyword> {
        let lines: Vec<&str> = text.lines().collect();
        let mut keywords = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            if !super::scan_markers(line).is_empty() {
                continue;
            }
            for term in self.terms_in_line(line.trim()) {
                let span = match line.find(&term) {
                    Some(start) => (start, start + term.len()),
                    None => (0, line.len()),
                };
                keywords.push(CandidateKeyword {
                    term,
                    file_path: path.to_path_buf(),
                    context: build_context(&lines, idx, span, self.context_window),
                    line_number: idx + 1,
                    original_line: line.trim().to_string(),
                });
            }
        }
        keywords
    }

    /// Read a note file and extract keyword occurrences.
    pub fn extract_from_file(&self, path: &Path) -> std::io::Result<Vec<CandidateKeyword>> {
        let text = std::fs::read_to_string(path)?;
        Ok(self.extract_keywords(path, &text))
    }

    /// Candidate terms in one line, in order, deduplicated.
    fn terms_in_line(&self, line: &str) -> Vec<String> {
        let mut terms = Vec::new();
        for run in tokenize(line) {
            if run.chars().all(is_cjk) {
                let chars: Vec<char> = run.chars().collect();
                if chars.len() <= CJK_WHOLE_WORD_MAX {
                    terms.push(run);
                } else {
                    terms.extend(self.window_segments(&chars));
                }
            } else if run.chars().count() >= self.min_len && !self.stop_terms.contains(run.as_str())
            {
                terms.push(run);
            }
        }

        let mut seen = HashSet::new();
        terms
            .into_iter()
            .filter(|t| self.keep_term(t) && seen.insert(t.clone()))
            .collect()
    }

    /// Bounded sliding-window segmentation of a long CJK run.
    ///
    /// Fixed window lengths keep the cost linear in the run length, and
    /// windows whose boundary chars are stop terms are rejected to cut
    /// the worst of the fragment noise.
    fn window_segments(&self, chars: &[char]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut segments = Vec::new();
        for start in 0..chars.len().saturating_sub(1) {
            for len in CJK_WINDOW_LENGTHS {
                if start + len > chars.len() {
                    continue;
                }
                let segment: String = chars[start..start + len].iter().collect();
                let first = chars[start].to_string();
                let last = chars[start + len - 1].to_string();
                if self.stop_terms.contains(segment.as_str())
                    || self.stop_terms.contains(first.as_str())
                    || self.stop_terms.contains(last.as_str())
                {
                    continue;
                }
                if seen.insert(segment.clone()) {
                    segments.push(segment);
                }
            }
        }
        segments
    }

    /// Final filter applied to every candidate term.
    fn keep_term(&self, term: &str) -> bool {
        term.chars().count() >= self.min_len
            && !self.stop_terms.contains(term)
            && !term.chars().all(|c| c.is_ascii_digit())
            && !self.stop_terms.iter().any(|sw| term.contains(sw))
    }
}

/// Split a line into runs of word chars (CJK, alphanumeric, underscore).
fn tokenize(line: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for c in line.chars() {
        if is_cjk(c) || c.is_ascii_alphanumeric() || c == '_' {
            current.push(c);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}
