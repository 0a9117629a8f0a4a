//! Ingest files from disk into the knowledge graph

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::{print_json, OutputFormat};
use crate::chunker::Chunker;
use crate::graph::models::DocumentNode;
use crate::graph::{GraphBuildStats, KnowledgeGraphBuilder};

/// Extensions ingested when none are given
pub const DEFAULT_EXTENSIONS: &[&str] = &["md", "txt", "rst"];

#[derive(Debug, Clone)]
pub struct BuildArgs {
    /// Files or directories to ingest
    pub paths: Vec<PathBuf>,
    /// File extensions to pick up while walking directories
    pub extensions: Vec<String>,
    pub chunker: Chunker,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentBuild {
    pub path: String,
    pub document_id: String,
    pub chunks: usize,
    pub stats: GraphBuildStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub documents: Vec<DocumentBuild>,
    pub skipped: Vec<String>,
    pub totals: GraphBuildStats,
}

/// Files under `paths` with a matching extension, sorted and deduplicated.
///
/// Explicit file arguments are always included.
pub fn collect_files(paths: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    let wanted = |path: &Path| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
            })
    };

    let mut files = Vec::new();
    for root in paths {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && wanted(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

/// Stable document id derived from the file path.
pub fn document_id_for(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(16);
    format!("doc_{id}")
}

/// Chunk and ingest every collected file, one document per file.
pub async fn run(builder: &mut KnowledgeGraphBuilder, args: &BuildArgs) -> Result<BuildSummary> {
    let files = collect_files(&args.paths, &args.extensions);
    info!("Building graph from {} files", files.len());

    let mut summary = BuildSummary::default();
    for path in files {
        let shown = path.display().to_string();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping {}: {}", shown, e);
                summary.skipped.push(shown);
                continue;
            }
        };

        let chunks = args.chunker.chunk(&text);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| shown.clone());
        let mut document = DocumentNode::new(document_id_for(&path), name)
            .with_path(shown.clone())
            .with_metadata(json!({ "bytes": text.len(), "chunks": chunks.len() }));
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            document = document.with_type(ext.to_lowercase());
        }

        let stats = builder
            .build_graph_from_document(&document, &chunks)
            .await
            .with_context(|| format!("Failed to build graph for {shown}"))?;

        summary.totals += &stats;
        summary.documents.push(DocumentBuild {
            path: shown,
            document_id: document.id,
            chunks: chunks.len(),
            stats,
        });
    }

    info!(
        "Ingested {} documents ({} skipped), {} nodes, {} relationships",
        summary.documents.len(),
        summary.skipped.len(),
        summary.totals.nodes_created,
        summary.totals.relationships_created
    );
    Ok(summary)
}

pub fn print_summary(summary: &BuildSummary, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(summary);
    }

    for doc in &summary.documents {
        println!(
            "{:<50} chunks={:<4} entities={:<4} relationships={:<4} concepts={}",
            doc.path,
            doc.chunks,
            doc.stats.entities_extracted,
            doc.stats.relationships_created,
            doc.stats.concepts_created
        );
    }
    for path in &summary.skipped {
        println!("{:<50} skipped", path);
    }
    println!(
        "\nTotal: {} documents, {} nodes, {} relationships, {} mentions, {} concepts",
        summary.documents.len(),
        summary.totals.nodes_created,
        summary.totals.relationships_created,
        summary.totals.mentions_created,
        summary.totals.concepts_created
    );
    Ok(())
}
