//! Read-side commands: stats, search, traversal and typed queries

use anyhow::{Context, Result};
use tracing::info;

use super::{print_json, OutputFormat};
use crate::graph::models::{EntityType, RelationType};
use crate::graph::query::{EntitySummary, GraphPath, RelationshipSummary};
use crate::graph::{GraphQuery, KnowledgeGraphBuilder, QueryResult};

/// Parse a comma separated list of entity types ("person,organization").
pub fn parse_entity_types(raw: &str) -> Result<Vec<EntityType>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<EntityType>().with_context(|| format!("Unknown entity type: {s}")))
        .collect()
}

pub async fn stats(builder: &KnowledgeGraphBuilder, format: OutputFormat) -> Result<()> {
    let stats = builder.get_graph_stats().await?;
    if format == OutputFormat::Json {
        return print_json(&stats);
    }

    println!("Nodes:         {}", stats.total_nodes);
    println!("Relationships: {}", stats.total_relationships);
    println!("Documents:     {}", stats.document_count);
    println!("Chunks:        {}", stats.chunk_count);
    println!("Entities:      {}", stats.entity_count);
    println!("Concepts:      {}", stats.concept_count);
    Ok(())
}

pub async fn metrics_report(builder: &KnowledgeGraphBuilder, format: OutputFormat) -> Result<()> {
    let report = builder.export_graph_metrics().await?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }

    println!(
        "Entities: {}  Relationships: {}  Documents: {}",
        report.total_entities, report.total_relationships, report.total_documents
    );
    println!("\nBy type:");
    for row in &report.entity_types {
        println!("  {:<14} {}", row.entity_type.as_str(), row.count);
    }
    println!("\nTop entities:");
    for entity in &report.top_entities {
        println!(
            "  {:<30} {:<14} {}",
            entity.name,
            entity.entity_type.as_str(),
            entity.mention_count
        );
    }
    Ok(())
}

pub async fn search(
    builder: &KnowledgeGraphBuilder,
    query: &str,
    types: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let types = types.map(parse_entity_types).transpose()?;
    let response = builder.graph_search(query, types.as_deref()).await?;
    info!(
        "Search '{}' matched {} entities and {} relationships",
        response.query, response.entity_count, response.relationship_count
    );

    if format == OutputFormat::Json {
        return print_json(&response);
    }
    print_entities(&response.entities);
    print_relationships(&response.relationships);
    Ok(())
}

pub async fn context(
    builder: &KnowledgeGraphBuilder,
    entity_id: &str,
    depth: usize,
    format: OutputFormat,
) -> Result<()> {
    let context = builder
        .get_entity_context(entity_id, depth)
        .await?
        .with_context(|| format!("Entity not found: {entity_id}"))?;

    if format == OutputFormat::Json {
        return print_json(&context);
    }
    println!("{} ({})", context.name, context.entity_type);
    println!("  id:            {}", context.id);
    println!("  confidence:    {:.2}", context.confidence);
    println!("  mentions:      {}", context.mention_count);
    if let Some(description) = &context.description {
        println!("  description:   {}", description);
    }
    println!("  neighbors:     {}", context.neighbors_count);
    println!("  relationships: {}", context.relationships_count);
    Ok(())
}

pub async fn neighbors(
    builder: &KnowledgeGraphBuilder,
    entity_id: &str,
    relation_type: Option<&str>,
    depth: usize,
    format: OutputFormat,
) -> Result<()> {
    let relation_type = relation_type
        .map(|t| t.parse::<RelationType>())
        .transpose()?;
    let nodes = builder
        .get_entity_neighbors(entity_id, relation_type, depth)
        .await?;

    if format == OutputFormat::Json {
        return print_json(&nodes);
    }
    for node in &nodes {
        println!(
            "  {:<24} {:<30} {}",
            node.id,
            node.name.as_deref().unwrap_or("-"),
            node.labels.join(",")
        );
    }
    println!("{} neighbors", nodes.len());
    Ok(())
}

pub async fn paths(
    builder: &KnowledgeGraphBuilder,
    source_id: &str,
    target_id: &str,
    max_length: usize,
    format: OutputFormat,
) -> Result<()> {
    let paths = builder.find_paths(source_id, target_id, max_length).await?;
    if format == OutputFormat::Json {
        return print_json(&paths);
    }
    print_paths(&paths);
    Ok(())
}

pub async fn clusters(
    builder: &KnowledgeGraphBuilder,
    min_connections: usize,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let ranked = builder.get_concept_clusters(min_connections, limit).await?;
    if format == OutputFormat::Json {
        return print_json(&ranked);
    }
    for entity in &ranked {
        println!(
            "  {:<30} {:>4}  {}",
            entity.entity_name,
            entity.connections,
            entity.neighbors.join(", ")
        );
    }
    Ok(())
}

/// Run a JSON encoded [`GraphQuery`], e.g. `{"kind":"concepts","limit":5}`.
pub async fn typed_query(
    builder: &KnowledgeGraphBuilder,
    raw: &str,
    format: OutputFormat,
) -> Result<()> {
    let query: GraphQuery = serde_json::from_str(raw).context("Invalid graph query")?;
    let result = builder.query_graph(query).await?;

    if format == OutputFormat::Json {
        return print_json(&result);
    }
    match &result {
        QueryResult::Entities(entities) => print_entities(entities),
        QueryResult::Relationships(relationships) => print_relationships(relationships),
        QueryResult::Paths(paths) => print_paths(paths),
        QueryResult::Concepts(concepts) => {
            for concept in concepts {
                println!(
                    "  {:<40} {:>4}  {}",
                    concept.name,
                    concept.entity_count,
                    concept.entity_names.join(", ")
                );
            }
        }
    }
    Ok(())
}

fn print_entities(entities: &[EntitySummary]) {
    println!("Entities ({}):", entities.len());
    for entity in entities {
        println!(
            "  {:<14} {:<30} mentions={:<4} {}",
            entity.entity_type.as_str(),
            entity.name,
            entity.mention_count,
            entity.id
        );
    }
}

fn print_relationships(relationships: &[RelationshipSummary]) {
    println!("Relationships ({}):", relationships.len());
    for rel in relationships {
        println!(
            "  {} -[{} {:.2}]-> {}",
            rel.source_name, rel.relation_type, rel.weight, rel.target_name
        );
    }
}

fn print_paths(paths: &[GraphPath]) {
    for path in paths {
        let hops: Vec<&str> = path
            .nodes
            .iter()
            .map(|n| n.name.as_deref().unwrap_or(n.id.as_str()))
            .collect();
        println!("  [{}] {}", path.length(), hops.join(" -> "));
    }
    println!("{} paths", paths.len());
}
