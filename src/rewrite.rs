//! Crash-safe document rewriting
//!
//! Every mutation goes through the same protocol: optional sibling
//! backup, edit an in-memory copy of the lines, stage the new content in
//! a temp file next to the target, commit by rename. A reader of the
//! target path never sees a half-written file.

use crate::extract::{CandidateKeyword, CandidateRef};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Suffix appended to a file's name for its sibling backup.
const BACKUP_SUFFIX: &str = ".bak";

/// Write `content` to `path` atomically: stage into a temp file in the
/// same directory, then rename over the target. On any staging error the
/// temp file is removed and the target is untouched.
pub(crate) fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut staging = match parent {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new_in(".")?,
    };
    staging.write_all(content.as_bytes())?;
    staging.flush()?;
    staging.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Applies relation and keyword annotations to vault documents.
#[derive(Debug, Clone)]
pub struct RewriteEngine {
    backup_files: bool,
}

impl RewriteEngine {
    pub fn new(backup_files: bool) -> Self {
        Self { backup_files }
    }

    /// Append `relation_label` as a `[[...]]` marker to the candidate's
    /// line.
    ///
    /// Returns `Ok(false)` without touching the file when the label is
    /// already on the line, or when the recorded line number no longer
    /// exists (the file changed between extraction and rewrite).
    pub fn add_relation_to_file(
        &self,
        path: &Path,
        candidate: &CandidateRef,
        relation_label: &str,
    ) -> io::Result<bool> {
        let original = std::fs::read_to_string(path)?;
        let mut lines: Vec<String> = original.lines().map(str::to_string).collect();

        let idx = candidate.line_number.checked_sub(1);
        let line = match idx.and_then(|i| lines.get_mut(i)) {
            Some(line) => line,
            None => {
                warn!(
                    path = %path.display(),
                    line = candidate.line_number,
                    "line no longer exists, skipping stale candidate"
                );
                return Ok(false);
            }
        };

        let marker = format!("[[{relation_label}]]");
        if line.contains(&marker) {
            debug!(path = %path.display(), relation = relation_label, "relation already present");
            return Ok(false);
        }

        if self.backup_files {
            self.ensure_backup(path, &original)?;
        }

        line.push(' ');
        line.push_str(&marker);

        self.commit(path, &original, &lines)?;
        Ok(true)
    }

    /// Replace the first occurrence of the raw keyword on its recorded
    /// line with `[[canonical]]`.
    ///
    /// No-op returning `Ok(false)` when the keyword is already bracketed
    /// on that line, the line is gone, or the replacement changes
    /// nothing.
    pub fn add_keyword_links_to_file(
        &self,
        path: &Path,
        occurrence: &CandidateKeyword,
        canonical: &str,
    ) -> io::Result<bool> {
        let original = std::fs::read_to_string(path)?;
        let mut lines: Vec<String> = original.lines().map(str::to_string).collect();

        let idx = occurrence.line_number.checked_sub(1);
        let line = match idx.and_then(|i| lines.get_mut(i)) {
            Some(line) => line,
            None => {
                warn!(
                    path = %path.display(),
                    line = occurrence.line_number,
                    "line no longer exists, skipping stale keyword"
                );
                return Ok(false);
            }
        };

        let bracketed = format!("[[{canonical}]]");
        if line.contains(&bracketed) {
            return Ok(false);
        }
        let replaced = line.replacen(&occurrence.term, &bracketed, 1);
        if replaced == *line {
            return Ok(false);
        }

        if self.backup_files {
            self.ensure_backup(path, &original)?;
        }

        *line = replaced;
        self.commit(path, &original, &lines)?;
        Ok(true)
    }

    /// Move the sibling backup back over the working file.
    ///
    /// Returns `Ok(false)` when no backup exists.
    pub fn restore_backup(&self, path: &Path) -> io::Result<bool> {
        let backup = Self::backup_path(path);
        if !backup.exists() {
            return Ok(false);
        }
        std::fs::rename(&backup, path)?;
        debug!(path = %path.display(), "restored from backup");
        Ok(true)
    }

    /// Sibling backup path for `path`.
    pub fn backup_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("{name}{BACKUP_SUFFIX}"))
    }

    fn ensure_backup(&self, path: &Path, original: &str) -> io::Result<()> {
        let backup = Self::backup_path(path);
        if backup.exists() {
            return Ok(());
        }
        std::fs::write(&backup, original)
    }

    fn commit(&self, path: &Path, original: &str, lines: &[String]) -> io::Result<()> {
        let mut content = lines.join("\n");
        if original.ends_with('\n') {
            content.push('\n');
        }
        write_atomic(path, &content)
    }
}
