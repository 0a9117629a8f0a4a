//! Tests for the build command

use std::sync::Arc;

use knowledge_graph::commands::build::{collect_files, document_id_for, DEFAULT_EXTENSIONS};
use knowledge_graph::commands::{build_run, BuildArgs};
use knowledge_graph::config::GraphSettings;
use knowledge_graph::{Chunker, KnowledgeGraphBuilder, MemoryGraphStore};

fn extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

#[tokio::test]
async fn test_build_chunks_long_files() {
    let dir = tempfile::tempdir().unwrap();
    let body = "Rust services deployed on Kubernetes in Berlin. ".repeat(40);
    std::fs::write(dir.path().join("long.md"), &body).unwrap();

    let store = Arc::new(MemoryGraphStore::default());
    let mut builder = KnowledgeGraphBuilder::new(store, GraphSettings::default(), None)
        .await
        .unwrap();
    let args = BuildArgs {
        paths: vec![dir.path().to_path_buf()],
        extensions: extensions(),
        chunker: Chunker::new(50, 10),
    };

    let summary = build_run(&mut builder, &args).await.unwrap();
    assert_eq!(summary.documents.len(), 1);

    let doc = &summary.documents[0];
    assert!(doc.chunks > 1);
    assert_eq!(doc.document_id, document_id_for(&dir.path().join("long.md")));
    assert_eq!(summary.totals, doc.stats);

    let stats = builder.get_graph_stats().await.unwrap();
    assert_eq!(stats.chunk_count, doc.chunks);
    assert_eq!(stats.entity_count, 3);
}

#[tokio::test]
async fn test_build_skips_unreadable_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("binary.txt"), [0xff, 0xfe, 0x00, 0x80]).unwrap();
    std::fs::write(dir.path().join("ok.txt"), "Meetings in Paris.").unwrap();

    let store = Arc::new(MemoryGraphStore::default());
    let mut builder = KnowledgeGraphBuilder::new(store, GraphSettings::default(), None)
        .await
        .unwrap();
    let args = BuildArgs {
        paths: vec![dir.path().to_path_buf()],
        extensions: extensions(),
        chunker: Chunker::default(),
    };

    let summary = build_run(&mut builder, &args).await.unwrap();
    assert_eq!(summary.documents.len(), 1);
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].ends_with("binary.txt"));
}

#[test]
fn test_collect_files_ignores_missing_roots() {
    let dir = tempfile::tempdir().unwrap();
    let files = collect_files(&[dir.path().join("does-not-exist")], &extensions());
    assert!(files.is_empty());
}
