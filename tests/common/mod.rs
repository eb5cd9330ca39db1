//! Common test utilities for weaver integration tests
//!
//! Provides a throwaway vault on disk and pipeline construction with a
//! scripted oracle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use weaver::infer::Oracle;
use weaver::{InferenceClient, KnowledgeGraph, VaultPipeline, WeaverConfig};

/// A temporary vault directory, removed on drop.
pub struct TestVault {
    dir: TempDir,
}

impl TestVault {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp vault"),
        }
    }

    /// Path where the pipeline persists its graph snapshot. Kept outside
    /// the vault root so it never shows up in discovery.
    pub fn graph_path(&self) -> PathBuf {
        self.dir.path().join("graph-snapshot.json")
    }

    pub fn notes_dir(&self) -> PathBuf {
        let notes = self.dir.path().join("notes");
        std::fs::create_dir_all(&notes).expect("create notes dir");
        notes
    }

    pub fn write_note(&self, name: &str, content: &str) -> PathBuf {
        let path = self.notes_dir().join(name);
        std::fs::write(&path, content).expect("write note");
        path
    }

    pub fn read_note(&self, name: &str) -> String {
        std::fs::read_to_string(self.notes_dir().join(name)).expect("read note")
    }
}

/// Build a pipeline over the vault with the given oracle and no backups.
pub fn test_pipeline(vault: &TestVault, oracle: Arc<dyn Oracle>) -> Arc<VaultPipeline> {
    let mut config = WeaverConfig::default();
    config.backup_files = false;
    pipeline_with_config(vault, oracle, config)
}

pub fn pipeline_with_config(
    vault: &TestVault,
    oracle: Arc<dyn Oracle>,
    config: WeaverConfig,
) -> Arc<VaultPipeline> {
    let client = InferenceClient::new(
        oracle,
        config.relations.vocabulary(),
        Duration::from_secs(5),
    );
    let graph = KnowledgeGraph::new(vault.graph_path());
    Arc::new(VaultPipeline::new(&config, client, graph))
}
