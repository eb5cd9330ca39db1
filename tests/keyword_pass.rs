//! Cross-note keyword linking: grouping, verification, rewrites.

mod common;

use common::{test_pipeline, TestVault};
use std::sync::Arc;
use weaver::MockOracle;

#[tokio::test]
async fn verified_keyword_group_is_linked_in_every_file() {
    let vault = TestVault::new();
    vault.write_note("a.md", "人格 的塑造过程\n");
    vault.write_note("b.md", "人格 发展研究\n");

    let oracle = Arc::new(MockOracle::scripted().with_rule("人格", "是"));
    let pipeline = test_pipeline(&vault, oracle.clone());

    let report = pipeline.process_keywords(&vault.notes_dir()).await.unwrap();
    assert_eq!(report.files, 2);
    assert!(report.verified >= 1);
    assert!(report.links_added >= 2);

    assert!(vault.read_note("a.md").contains("[[人格]]"));
    assert!(vault.read_note("b.md").contains("[[人格]]"));

    // One verification call per cross-file group.
    let similarity_prompts = oracle
        .prompts()
        .iter()
        .filter(|p| p.contains("人格"))
        .count();
    assert_eq!(similarity_prompts, 1);
}

#[tokio::test]
async fn rejected_group_changes_nothing() {
    let vault = TestVault::new();
    vault.write_note("a.md", "人格 的塑造过程\n");
    vault.write_note("b.md", "人格 发展研究\n");

    let pipeline = test_pipeline(&vault, Arc::new(MockOracle::fixed("否")));
    let report = pipeline.process_keywords(&vault.notes_dir()).await.unwrap();
    assert_eq!(report.verified, 0);
    assert_eq!(report.links_added, 0);
    assert_eq!(vault.read_note("a.md"), "人格 的塑造过程\n");
    assert_eq!(vault.read_note("b.md"), "人格 发展研究\n");
}

#[tokio::test]
async fn confirmed_keyword_is_recorded_in_the_graph() {
    let vault = TestVault::new();
    vault.write_note("a.md", "人格 的塑造过程\n");
    vault.write_note("b.md", "人格 发展研究\n");

    let oracle = Arc::new(MockOracle::scripted().with_rule("人格", "是"));
    let pipeline = test_pipeline(&vault, oracle);
    pipeline.process_keywords(&vault.notes_dir()).await.unwrap();

    let graph = pipeline.graph();
    let graph = graph.lock().await;
    let keyword = graph.get_node("人格").expect("keyword node recorded");
    assert_eq!(keyword.node_type, "keyword");
    let edges = graph.get_edges(Some("人格"));
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.relation == "相似概念"));
}

#[tokio::test]
async fn linked_lines_are_skipped_on_the_next_pass() {
    let vault = TestVault::new();
    vault.write_note("a.md", "人格 的塑造过程\n");
    vault.write_note("b.md", "人格 发展研究\n");

    let oracle = Arc::new(MockOracle::scripted().with_rule("人格", "是"));
    let pipeline = test_pipeline(&vault, oracle.clone());
    pipeline.process_keywords(&vault.notes_dir()).await.unwrap();
    let first_pass_calls = oracle.call_count();
    let a = vault.read_note("a.md");
    let b = vault.read_note("b.md");

    // Bracketed lines produce no new candidates, so nothing to verify.
    let report = pipeline.process_keywords(&vault.notes_dir()).await.unwrap();
    assert_eq!(report.groups, 0);
    assert_eq!(oracle.call_count(), first_pass_calls);
    assert_eq!(vault.read_note("a.md"), a);
    assert_eq!(vault.read_note("b.md"), b);
}

#[tokio::test]
async fn single_occurrence_terms_are_never_sent_to_the_oracle() {
    let vault = TestVault::new();
    vault.write_note("a.md", "完全独立甲部分\n");
    vault.write_note("b.md", "互不相干乙内容\n");

    let oracle = Arc::new(MockOracle::fixed("是"));
    let pipeline = test_pipeline(&vault, oracle.clone());
    let report = pipeline.process_keywords(&vault.notes_dir()).await.unwrap();

    assert_eq!(report.groups, 0);
    assert_eq!(report.links_added, 0);
    assert_eq!(oracle.call_count(), 0);
    assert_eq!(vault.read_note("a.md"), "完全独立甲部分\n");
    assert_eq!(vault.read_note("b.md"), "互不相干乙内容\n");
}
