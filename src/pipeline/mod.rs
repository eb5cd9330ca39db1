//! Change pipeline and scheduler
//!
//! Drives a file from candidate extraction through inference, rewrite,
//! and graph update. A per-path in-flight set guarantees at most one
//! concurrent processing task per file; a file already claimed is
//! silently skipped by any later trigger. Per-candidate failures are
//! contained: they are logged and the pass moves on.

mod watch;

pub use watch::{watch_vault, ShutdownToken};

use crate::config::{VaultConfig, WeaverConfig};
use crate::extract::{CandidateKeyword, KeywordExtractor, LinkExtractor};
use crate::graph::{GraphError, KnowledgeGraph};
use crate::infer::InferenceClient;
use crate::rewrite::RewriteEngine;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Errors that abort a batch (individual file errors never do).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("watcher error: {0}")]
    Watch(String),
}

/// Outcome counts for one file pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileReport {
    /// Candidate references found
    pub candidates: usize,
    /// Candidates resolved and written back
    pub resolved: usize,
    /// Candidates skipped (no verdict, duplicate, or stale line)
    pub skipped: usize,
    /// Candidates whose rewrite failed
    pub failed: usize,
}

/// Aggregate outcome counts for a batch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Files processed (claimed files in flight elsewhere not included)
    pub files: usize,
    pub candidates: usize,
    pub resolved: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    fn absorb(&mut self, file: FileReport) {
        self.files += 1;
        self.candidates += file.candidates;
        self.resolved += file.resolved;
        self.skipped += file.skipped;
        self.failed += file.failed;
    }

    fn merge(&mut self, other: BatchReport) {
        self.files += other.files;
        self.candidates += other.candidates;
        self.resolved += other.resolved;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Outcome counts for a keyword-linking pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeywordReport {
    /// Eligible files scanned
    pub files: usize,
    /// Normalized groups with at least two occurrences
    pub groups: usize,
    /// Groups the oracle confirmed as one concept
    pub verified: usize,
    /// Occurrences actually rewritten into links
    pub links_added: usize,
}

/// Outcome counts for a graph rebuild pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    /// Eligible files scanned
    pub files: usize,
    /// Edges restored into the graph
    pub edges: usize,
    /// Lines carrying a relation label but no surviving reference marker
    pub unrecoverable: usize,
}

/// Releases the per-path claim when dropped, error paths included.
struct ClaimGuard {
    in_flight: Arc<StdMutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl ClaimGuard {
    fn try_claim(in_flight: &Arc<StdMutex<HashSet<PathBuf>>>, path: &Path) -> Option<Self> {
        let mut set = in_flight.lock().unwrap();
        if !set.insert(path.to_path_buf()) {
            return None;
        }
        Some(Self {
            in_flight: Arc::clone(in_flight),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.path);
    }
}

/// The vault processing pipeline.
///
/// Cheap to share: clone an `Arc<VaultPipeline>` per task. The graph is
/// the single piece of shared mutable state and sits behind its own
/// mutex; the in-flight set is only ever held for a check-and-insert.
pub struct VaultPipeline {
    links: LinkExtractor,
    keywords: KeywordExtractor,
    client: InferenceClient,
    rewriter: RewriteEngine,
    vault: VaultConfig,
    graph: Arc<Mutex<KnowledgeGraph>>,
    in_flight: Arc<StdMutex<HashSet<PathBuf>>>,
}

impl VaultPipeline {
    pub fn new(config: &WeaverConfig, client: InferenceClient, graph: KnowledgeGraph) -> Self {
        Self {
            links: LinkExtractor::new(
                config.relations.vocabulary(),
                config.vault.context_window,
            ),
            keywords: KeywordExtractor::new(config.vault.context_window),
            client,
            rewriter: RewriteEngine::new(config.backup_files),
            vault: config.vault.clone(),
            graph: Arc::new(Mutex::new(graph)),
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    /// Whether a path is eligible for processing: watched extension and
    /// no ignore-pattern substring in the path.
    pub fn is_eligible(&self, path: &Path) -> bool {
        let name = path.to_string_lossy();
        let has_extension = self
            .vault
            .watch_extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()));
        has_extension && !self.vault.ignore_patterns.iter().any(|p| name.contains(p.as_str()))
    }

    /// Eligible files under `root`, in stable sorted order.
    pub fn discover(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.is_eligible(path))
            .collect();
        files.sort();
        files
    }

    /// Run the relation pass over one file.
    ///
    /// Returns `None` when the file is already claimed by another task;
    /// the caller should treat that as "nothing to do". The graph
    /// snapshot is not saved here, callers persist after their batch.
    pub async fn process_file(&self, path: &Path) -> Option<FileReport> {
        let _claim = match ClaimGuard::try_claim(&self.in_flight, path) {
            Some(claim) => claim,
            None => {
                debug!(path = %path.display(), "already in flight, skipping");
                return None;
            }
        };

        let mut report = FileReport::default();
        let candidates = match self.links.extract_from_file(path, true) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot extract references");
                return Some(report);
            }
        };
        report.candidates = candidates.len();

        for candidate in &candidates {
            let Some(label) = self.client.infer_relation(candidate).await else {
                report.skipped += 1;
                continue;
            };
            match self.rewriter.add_relation_to_file(path, candidate, &label) {
                Ok(true) => {
                    let mut graph = self.graph.lock().await;
                    graph.add_node(&candidate.source_note, &candidate.source_note, "note", 1.0);
                    graph.add_node(&candidate.target_note, &candidate.target_note, "note", 1.0);
                    graph.add_edge(&candidate.source_note, &candidate.target_note, &label, 1.0);
                    report.resolved += 1;
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "rewrite failed, continuing");
                    report.failed += 1;
                }
            }
        }

        debug!(
            path = %path.display(),
            candidates = report.candidates,
            resolved = report.resolved,
            "file processed"
        );
        Some(report)
    }

    /// Run the relation pass over every eligible file under `folder`,
    /// then persist the graph snapshot once.
    pub async fn process_folder(&self, folder: &Path) -> Result<BatchReport, PipelineError> {
        let files = self.discover(folder);
        let mut report = BatchReport::default();
        for path in &files {
            if let Some(file) = self.process_file(path).await {
                report.absorb(file);
            }
        }
        self.save_graph().await?;
        info!(
            folder = %folder.display(),
            files = report.files,
            candidates = report.candidates,
            resolved = report.resolved,
            skipped = report.skipped,
            failed = report.failed,
            "folder pass complete"
        );
        Ok(report)
    }

    /// Run the relation pass over a whole vault root.
    pub async fn process_vault(&self, root: &Path) -> Result<BatchReport, PipelineError> {
        self.process_folder(root).await
    }

    /// Run the relation pass over every configured scan folder.
    pub async fn process_config_folders(&self) -> Result<BatchReport, PipelineError> {
        let folders = self.vault.folders_to_scan.clone();
        if folders.is_empty() {
            warn!("no folders configured for scanning");
            return Ok(BatchReport::default());
        }
        let mut report = BatchReport::default();
        for folder in &folders {
            report.merge(self.process_folder(folder).await?);
        }
        Ok(report)
    }

    /// Run the keyword-linking pass over every eligible file in `folder`.
    ///
    /// Occurrences are grouped by normalized term across files; each
    /// group with at least two occurrences is verified with the oracle
    /// exactly once, and every occurrence of a verified group becomes a
    /// `[[link]]`. The graph records the confirmed keyword and its
    /// cross-file similarity edges; the snapshot is saved once at the end.
    pub async fn process_keywords(&self, folder: &Path) -> Result<KeywordReport, PipelineError> {
        let files = self.discover(folder);
        let mut report = KeywordReport {
            files: files.len(),
            ..KeywordReport::default()
        };

        let mut groups: BTreeMap<String, Vec<CandidateKeyword>> = BTreeMap::new();
        for path in &files {
            match self.keywords.extract_from_file(path) {
                Ok(occurrences) => {
                    for kw in occurrences {
                        groups.entry(kw.normalized()).or_default().push(kw);
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot extract keywords");
                }
            }
        }
        groups.retain(|_, group| group.len() >= 2);
        report.groups = groups.len();

        for (normalized, group) in &groups {
            if !self.client.verify_similarity(group).await {
                debug!(term = %normalized, "group not confirmed as one concept");
                continue;
            }
            report.verified += 1;
            let canonical = group[0].term.clone();

            for occurrence in group {
                match self
                    .rewriter
                    .add_keyword_links_to_file(&occurrence.file_path, occurrence, &canonical)
                {
                    Ok(true) => report.links_added += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            path = %occurrence.file_path.display(),
                            term = %occurrence.term,
                            error = %e,
                            "keyword rewrite failed, continuing"
                        );
                    }
                }
            }

            let mut graph = self.graph.lock().await;
            graph.add_node(&canonical, &canonical, "keyword", 1.0);
            for occurrence in group {
                let note = occurrence
                    .file_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                graph.add_node(&note, &note, "note", 1.0);
                graph.add_edge(&note, &canonical, "相似概念", 1.0);
            }
        }

        self.save_graph().await?;
        info!(
            folder = %folder.display(),
            files = report.files,
            groups = report.groups,
            verified = report.verified,
            links_added = report.links_added,
            "keyword pass complete"
        );
        Ok(report)
    }

    /// Rebuild the graph from already-annotated documents.
    ///
    /// Clears the graph, then re-derives (source, target, relation) from
    /// every line that carries both a reference marker and a resolved
    /// relation label. Lines with a label but no surviving reference are
    /// counted as unrecoverable and reported, not guessed at.
    pub async fn rebuild_graph(&self, root: &Path) -> Result<RebuildReport, PipelineError> {
        let files = self.discover(root);
        let mut report = RebuildReport {
            files: files.len(),
            ..RebuildReport::default()
        };

        let mut graph = self.graph.lock().await;
        graph.clear();

        for path in &files {
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read file, skipping");
                    continue;
                }
            };
            let source = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            for (idx, line) in text.lines().enumerate() {
                let mut label = None;
                let mut target = None;
                for (_, _, inner) in crate::extract::scan_markers(line) {
                    let bare = match inner.find('|') {
                        Some(pipe) => inner[..pipe].trim(),
                        None => inner.trim(),
                    };
                    if bare.is_empty() {
                        continue;
                    }
                    if self.links.is_relation_label(bare) {
                        label.get_or_insert_with(|| bare.to_string());
                    } else {
                        target.get_or_insert_with(|| bare.to_string());
                    }
                }
                match (label, target) {
                    (Some(label), Some(target)) => {
                        graph.add_node(&source, &source, "note", 1.0);
                        graph.add_node(&target, &target, "note", 1.0);
                        graph.add_edge(&source, &target, &label, 1.0);
                        report.edges += 1;
                    }
                    (Some(label), None) => {
                        warn!(
                            path = %path.display(),
                            line = idx + 1,
                            label = %label,
                            "relation label without a reference marker, cannot rebuild"
                        );
                        report.unrecoverable += 1;
                    }
                    _ => {}
                }
            }
        }
        graph.save(None)?;
        drop(graph);

        info!(
            root = %root.display(),
            files = report.files,
            edges = report.edges,
            unrecoverable = report.unrecoverable,
            "graph rebuilt"
        );
        Ok(report)
    }

    /// Persist the graph snapshot to its configured location.
    pub async fn save_graph(&self) -> Result<(), PipelineError> {
        self.graph.lock().await.save(None)?;
        Ok(())
    }

    /// Read-only access to the graph for queries and tests.
    pub fn graph(&self) -> Arc<Mutex<KnowledgeGraph>> {
        Arc::clone(&self.graph)
    }

    pub(crate) fn vault(&self) -> &VaultConfig {
        &self.vault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::MockOracle;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn pipeline_with(config: WeaverConfig, oracle: MockOracle, graph_path: &Path) -> VaultPipeline {
        let client = InferenceClient::new(
            Arc::new(oracle),
            config.relations.vocabulary(),
            Duration::from_secs(5),
        );
        let graph = KnowledgeGraph::new(graph_path);
        VaultPipeline::new(&config, client, graph)
    }

    #[test]
    fn eligibility_checks_extension_and_ignores() {
        let dir = tempdir().unwrap();
        let p = pipeline_with(
            WeaverConfig::default(),
            MockOracle::fixed(""),
            &dir.path().join("g.json"),
        );
        assert!(p.is_eligible(Path::new("/vault/note.md")));
        assert!(!p.is_eligible(Path::new("/vault/note.txt")));
        assert!(!p.is_eligible(Path::new("/vault/.git/note.md")));
        assert!(!p.is_eligible(Path::new("/vault/.obsidian/cache.md")));
        assert!(!p.is_eligible(Path::new("/vault/note.md.bak")));
    }

    #[test]
    fn discovery_is_recursive_and_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.md"), "").unwrap();
        fs::write(dir.path().join("a.md"), "").unwrap();
        fs::write(dir.path().join("sub/c.md"), "").unwrap();
        fs::write(dir.path().join("not-a-note.txt"), "").unwrap();

        let p = pipeline_with(
            WeaverConfig::default(),
            MockOracle::fixed(""),
            &dir.path().join("g.json"),
        );
        let found = p.discover(dir.path());
        assert_eq!(found.len(), 3);
        assert!(found[0].ends_with("a.md"));
        assert!(found[1].ends_with("b.md"));
        assert!(found[2].ends_with("sub/c.md"));
    }

    #[tokio::test]
    async fn claim_guard_releases_on_drop() {
        let in_flight: Arc<StdMutex<HashSet<PathBuf>>> = Arc::new(StdMutex::new(HashSet::new()));
        let path = Path::new("/vault/note.md");

        let first = ClaimGuard::try_claim(&in_flight, path);
        assert!(first.is_some());
        assert!(ClaimGuard::try_claim(&in_flight, path).is_none());

        drop(first);
        assert!(ClaimGuard::try_claim(&in_flight, path).is_some());
    }

    #[tokio::test]
    async fn resolved_candidate_updates_file_and_graph() {
        let dir = tempdir().unwrap();
        let mut config = WeaverConfig::default();
        config.backup_files = false;
        let note = dir.path().join("驱动理论.md");
        fs::write(&note, "人活着的四个驱动：性驱力、[[攻击性]]、关系驱动、自恋\n").unwrap();

        let p = pipeline_with(
            config,
            MockOracle::fixed("[[简单提及]]"),
            &dir.path().join("g.json"),
        );
        let report = p.process_file(&note).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.resolved, 1);

        let content = fs::read_to_string(&note).unwrap();
        assert!(content.lines().next().unwrap().ends_with("[[简单提及]]"));

        let graph = p.graph();
        let graph = graph.lock().await;
        assert!(graph.get_node("驱动理论").is_some());
        assert!(graph.get_node("攻击性").is_some());
        let edges = graph.get_edges(Some("攻击性"));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relation, "简单提及");
        assert_eq!(edges[0].occurrences, 1);
    }

    #[tokio::test]
    async fn failed_inference_skips_candidate_without_mutation() {
        let dir = tempdir().unwrap();
        let note = dir.path().join("note.md");
        let body = "see [[alpha]]\n";
        fs::write(&note, body).unwrap();

        let p = pipeline_with(
            WeaverConfig::default(),
            MockOracle::failing("offline"),
            &dir.path().join("g.json"),
        );
        let report = p.process_file(&note).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.resolved, 0);
        assert_eq!(fs::read_to_string(&note).unwrap(), body);
    }

    #[tokio::test]
    async fn folder_pass_saves_snapshot_once_at_end() {
        let dir = tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        let vault = dir.path().join("vault");
        fs::create_dir_all(&vault).unwrap();
        fs::write(vault.join("a.md"), "link to [[beta]]\n").unwrap();

        let mut config = WeaverConfig::default();
        config.backup_files = false;
        let p = pipeline_with(config, MockOracle::fixed("[[简单提及]]"), &graph_path);
        let report = p.process_folder(&vault).await.unwrap();
        assert_eq!(report.files, 1);
        assert_eq!(report.resolved, 1);

        let reloaded = KnowledgeGraph::open(&graph_path);
        assert_eq!(reloaded.edge_count(), 1);
    }

    #[tokio::test]
    async fn rebuild_restores_edges_and_counts_gaps() {
        let dir = tempdir().unwrap();
        let vault = dir.path().join("vault");
        fs::create_dir_all(&vault).unwrap();
        fs::write(
            vault.join("note.md"),
            "annotated [[alpha]] line [[简单提及]]\norphaned label [[支撑观点]]\nplain text\n",
        )
        .unwrap();

        let p = pipeline_with(
            WeaverConfig::default(),
            MockOracle::fixed(""),
            &dir.path().join("g.json"),
        );
        let report = p.rebuild_graph(&vault).await.unwrap();
        assert_eq!(report.edges, 1);
        assert_eq!(report.unrecoverable, 1);

        let graph = p.graph();
        let graph = graph.lock().await;
        let edges = graph.get_edges(Some("alpha"));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relation, "简单提及");
    }

    #[tokio::test]
    async fn keyword_pass_links_verified_groups() {
        let dir = tempdir().unwrap();
        let vault = dir.path().join("vault");
        fs::create_dir_all(&vault).unwrap();
        fs::write(vault.join("a.md"), "人格 的塑造过程\n").unwrap();
        fs::write(vault.join("b.md"), "人格 发展研究\n").unwrap();

        let mut config = WeaverConfig::default();
        config.backup_files = false;
        let oracle = MockOracle::scripted().with_rule("人格", "是");
        let p = pipeline_with(config, oracle, &dir.path().join("g.json"));

        let report = p.process_keywords(&vault).await.unwrap();
        assert!(report.verified >= 1);
        assert!(report.links_added >= 2);

        assert!(fs::read_to_string(vault.join("a.md")).unwrap().contains("[[人格]]"));
        assert!(fs::read_to_string(vault.join("b.md")).unwrap().contains("[[人格]]"));

        let graph = p.graph();
        let graph = graph.lock().await;
        let node = graph.get_node("人格").unwrap();
        assert_eq!(node.node_type, "keyword");
        assert!(!graph.get_edges(Some("人格")).is_empty());
    }
}
