//! Bounded context window around an extraction site
//!
//! Deterministic: the same (lines, index, span, window) always yields the
//! same string, so inference prompts are reproducible in tests.

/// Build a context string around a byte span on one line.
///
/// Takes half the window before and after the span on the same line, plus
/// a quarter-window tail of the previous line and head of the next line
/// when they exist. Whitespace is collapsed to single spaces. All slicing
/// is char-based so CJK text never splits mid-character.
pub fn build_context(lines: &[&str], line_idx: usize, span: (usize, usize), window: usize) -> String {
    let Some(current) = lines.get(line_idx) else {
        return String::new();
    };
    let half = window / 2;
    let quarter = window / 4;

    let before = chars_before(current, span.0, half);
    let site = &current[span.0.min(current.len())..span.1.min(current.len())];
    let after = chars_after(current, span.1, half);

    let mut parts: Vec<&str> = Vec::with_capacity(5);
    let prev_tail;
    if line_idx > 0 {
        prev_tail = tail_chars(lines[line_idx - 1], quarter);
        parts.push(prev_tail);
    }
    parts.push(before);
    parts.push(site);
    parts.push(after);
    let next_head;
    if line_idx + 1 < lines.len() {
        next_head = head_chars(lines[line_idx + 1], quarter);
        parts.push(next_head);
    }

    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Up to `n` chars of `s` ending at byte offset `end`.
fn chars_before(s: &str, end: usize, n: usize) -> &str {
    let end = end.min(s.len());
    let prefix = &s[..end];
    let start = prefix
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(end);
    &s[start..end]
}

/// Up to `n` chars of `s` starting at byte offset `start`.
fn chars_after(s: &str, start: usize, n: usize) -> &str {
    let start = start.min(s.len());
    let suffix = &s[start..];
    match suffix.char_indices().nth(n) {
        Some((i, _)) => &suffix[..i],
        None => suffix,
    }
}

/// Last `n` chars of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    chars_before(s, s.len(), n)
}

/// First `n` chars of `s`.
fn head_chars(s: &str, n: usize) -> &str {
    chars_after(s, 0, n)
}
