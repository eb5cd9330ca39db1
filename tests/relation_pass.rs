//! End-to-end relation pass: extraction, inference, rewrite, graph.

mod common;

use common::{test_pipeline, TestVault};
use std::sync::Arc;
use std::time::Duration;
use weaver::infer::DelayedOracle;
use weaver::{KnowledgeGraph, MockOracle};

const DRIVE_LINE: &str = "人活着的四个驱动：性驱力、[[攻击性]]、关系驱动、自恋";

#[tokio::test]
async fn annotates_reference_and_records_edge() {
    let vault = TestVault::new();
    vault.write_note("驱动理论.md", &format!("{DRIVE_LINE}\n"));

    let pipeline = test_pipeline(&vault, Arc::new(MockOracle::fixed("[[简单提及]]")));
    let report = pipeline.process_folder(&vault.notes_dir()).await.unwrap();
    assert_eq!(report.files, 1);
    assert_eq!(report.candidates, 1);
    assert_eq!(report.resolved, 1);

    let content = vault.read_note("驱动理论.md");
    let line = content.lines().next().unwrap();
    assert!(line.ends_with("[[简单提及]]"));
    assert_eq!(line.matches("[[简单提及]]").count(), 1);

    let graph = pipeline.graph();
    let graph = graph.lock().await;
    assert!(graph.get_node("驱动理论").is_some());
    assert!(graph.get_node("攻击性").is_some());
    let edges = graph.get_edges(Some("攻击性"));
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].relation, "简单提及");
    assert_eq!(edges[0].occurrences, 1);
}

#[tokio::test]
async fn second_pass_over_annotated_vault_is_a_no_op() {
    let vault = TestVault::new();
    vault.write_note("驱动理论.md", &format!("{DRIVE_LINE}\n"));

    let oracle = Arc::new(MockOracle::fixed("[[简单提及]]"));
    let pipeline = test_pipeline(&vault, oracle.clone());
    pipeline.process_folder(&vault.notes_dir()).await.unwrap();
    let annotated = vault.read_note("驱动理论.md");

    let report = pipeline.process_folder(&vault.notes_dir()).await.unwrap();
    assert_eq!(report.candidates, 0);
    assert_eq!(vault.read_note("驱动理论.md"), annotated);
    assert_eq!(oracle.call_count(), 1);

    let graph = pipeline.graph();
    let graph = graph.lock().await;
    assert_eq!(graph.get_edges(Some("攻击性"))[0].occurrences, 1);
}

#[tokio::test]
async fn batch_pass_persists_a_loadable_snapshot() {
    let vault = TestVault::new();
    vault.write_note("a.md", "note links to [[beta]] here\n");
    vault.write_note("b.md", "and [[gamma]] there\n");

    let pipeline = test_pipeline(&vault, Arc::new(MockOracle::fixed("[[引出主题]]")));
    let report = pipeline.process_folder(&vault.notes_dir()).await.unwrap();
    assert_eq!(report.resolved, 2);

    let reloaded = KnowledgeGraph::open(vault.graph_path());
    assert_eq!(reloaded.edge_count(), 2);
    assert!(reloaded.get_node("beta").is_some());
    assert!(reloaded.get_node("gamma").is_some());
}

#[tokio::test]
async fn unresolved_candidates_leave_the_file_untouched() {
    let vault = TestVault::new();
    let body = "see [[alpha]] for details\n";
    vault.write_note("a.md", body);

    let pipeline = test_pipeline(&vault, Arc::new(MockOracle::failing("offline")));
    let report = pipeline.process_folder(&vault.notes_dir()).await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.resolved, 0);
    assert_eq!(vault.read_note("a.md"), body);
}

#[tokio::test]
async fn concurrent_triggers_process_a_file_at_most_once() {
    let vault = TestVault::new();
    let path = vault.write_note("a.md", "see [[alpha]]\n");

    let slow = DelayedOracle::new(
        MockOracle::fixed("[[简单提及]]"),
        Duration::from_millis(150),
    );
    let pipeline = test_pipeline(&vault, Arc::new(slow));

    let first = {
        let pipeline = Arc::clone(&pipeline);
        let path = path.clone();
        tokio::spawn(async move { pipeline.process_file(&path).await })
    };
    let second = {
        let pipeline = Arc::clone(&pipeline);
        let path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            pipeline.process_file(&path).await
        })
    };

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    let processed = outcomes.iter().filter(|o| o.is_some()).count();
    assert_eq!(processed, 1, "only one task may hold the claim");

    let content = vault.read_note("a.md");
    assert_eq!(content.matches("[[简单提及]]").count(), 1);
}

#[tokio::test]
async fn ignored_directories_are_never_processed() {
    let vault = TestVault::new();
    let hidden = vault.notes_dir().join(".obsidian");
    std::fs::create_dir_all(&hidden).unwrap();
    std::fs::write(hidden.join("cache.md"), "see [[alpha]]\n").unwrap();
    vault.write_note("real.md", "see [[beta]]\n");

    let pipeline = test_pipeline(&vault, Arc::new(MockOracle::fixed("[[简单提及]]")));
    let report = pipeline.process_folder(&vault.notes_dir()).await.unwrap();
    assert_eq!(report.files, 1);

    let untouched = std::fs::read_to_string(hidden.join("cache.md")).unwrap();
    assert_eq!(untouched, "see [[alpha]]\n");
}

#[tokio::test]
async fn backups_capture_pre_rewrite_content() {
    let vault = TestVault::new();
    vault.write_note("a.md", "see [[alpha]]\n");

    let mut config = weaver::WeaverConfig::default();
    config.backup_files = true;
    let pipeline = common::pipeline_with_config(
        &vault,
        Arc::new(MockOracle::fixed("[[简单提及]]")),
        config,
    );
    pipeline.process_folder(&vault.notes_dir()).await.unwrap();

    let backup = std::fs::read_to_string(vault.notes_dir().join("a.md.bak")).unwrap();
    assert_eq!(backup, "see [[alpha]]\n");
    assert!(vault.read_note("a.md").contains("[[简单提及]]"));
}
