//! Reference marker extraction
//!
//! Scans note text for `[[target]]` / `[[target|alias]]` markers and
//! produces one candidate per occurrence, in document order.

use super::context::build_context;
use std::path::Path;

/// An extracted, not-yet-resolved cross-reference.
///
/// Produced once per marker occurrence; consumed by inference and then
/// discarded. Never persisted standalone.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRef {
    /// Note the reference was found in (file stem)
    pub source_note: String,
    /// Alias-stripped reference target
    pub target_note: String,
    /// Bounded text surrounding the marker
    pub context: String,
    /// 1-based line number of the marker
    pub line_number: usize,
    /// The full line, trimmed
    pub original_line: String,
}

/// Scan one line for `[[...]]` markers.
///
/// Returns `(start, end, inner)` per marker, where `start..end` is the
/// byte span including the brackets and `inner` is the raw text between
/// them (alias not yet stripped). Unclosed markers are ignored.
pub fn scan_markers(line: &str) -> Vec<(usize, usize, &str)> {
    let mut markers = Vec::new();
    let mut pos = 0;
    while let Some(open) = line[pos..].find("[[") {
        let start = pos + open;
        let Some(close) = line[start + 2..].find("]]") else {
            break;
        };
        let inner_end = start + 2 + close;
        markers.push((start, inner_end + 2, &line[start + 2..inner_end]));
        pos = inner_end + 2;
    }
    markers
}

/// Extracts candidate references from note text.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    vocabulary: Vec<String>,
    context_window: usize,
}

impl LinkExtractor {
    pub fn new(vocabulary: Vec<String>, context_window: usize) -> Self {
        Self {
            vocabulary,
            context_window,
        }
    }

    /// Whether a line already carries a resolved relation label.
    pub fn line_has_relation(&self, line: &str) -> bool {
        scan_markers(line)
            .iter()
            .any(|(_, _, inner)| self.is_relation_label(inner.trim()))
    }

    /// Whether a bare label belongs to the configured vocabulary.
    pub fn is_relation_label(&self, label: &str) -> bool {
        self.vocabulary.iter().any(|v| v == label)
    }

    /// Extract all candidate references from `text`, in document order.
    ///
    /// With `skip_resolved`, lines already carrying a relation label are
    /// skipped entirely, which makes reprocessing annotated files a no-op.
    /// Markers whose alias-stripped target is empty are discarded, as are
    /// markers that are themselves relation labels.
    pub fn extract_refs(
        &self,
        source_note: &str,
        text: &str,
        skip_resolved: bool,
    ) -> Vec<CandidateRef> {
        let lines: Vec<&str> = text.lines().collect();
        let mut refs = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            if skip_resolved && self.line_has_relation(line) {
                continue;
            }
            for (start, end, inner) in scan_markers(line) {
                let target = match inner.find('|') {
                    Some(pipe) => inner[..pipe].trim(),
                    None => inner.trim(),
                };
                if target.is_empty() || self.is_relation_label(target) {
                    continue;
                }
                refs.push(CandidateRef {
                    source_note: source_note.to_string(),
                    target_note: target.to_string(),
                    context: build_context(&lines, idx, (start, end), self.context_window),
                    line_number: idx + 1,
                    original_line: line.trim().to_string(),
                });
            }
        }
        refs
    }

    /// Read a note file and extract references; the source note name is
    /// the file stem.
    pub fn extract_from_file(
        &self,
        path: &Path,
        skip_resolved: bool,
    ) -> std::io::Result<Vec<CandidateRef>> {
        let text = std::fs::read_to_string(path)?;
        let source_note = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.extract_refs(&source_note, &text, skip_resolved))
    }
}
