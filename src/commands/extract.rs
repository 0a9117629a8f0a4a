//! Offline extraction dump: no store, no embeddings

use serde::Serialize;

use super::{print_json, OutputFormat};
use crate::graph::models::Relationship;
use crate::graph::query::EntitySummary;
use crate::graph::EntityExtractor;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub entities: Vec<EntitySummary>,
    pub relationships: Vec<Relationship>,
}

/// Run the default extractor over `text`.
pub fn run(text: &str) -> ExtractionReport {
    let (entities, relationships) = EntityExtractor::new().extract(text);
    ExtractionReport {
        entities: entities.iter().map(EntitySummary::from).collect(),
        relationships,
    }
}

pub fn print_report(report: &ExtractionReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    println!("Entities ({}):", report.entities.len());
    for entity in &report.entities {
        println!(
            "  {:<14} {:<30} {}",
            entity.entity_type.as_str(),
            entity.name,
            entity.id
        );
    }

    let names: std::collections::HashMap<&str, &str> = report
        .entities
        .iter()
        .map(|e| (e.id.as_str(), e.name.as_str()))
        .collect();

    println!("Relationships ({}):", report.relationships.len());
    for rel in &report.relationships {
        println!(
            "  {} -[{} {:.2}]-> {}",
            names.get(rel.source_id.as_str()).unwrap_or(&rel.source_id.as_str()),
            rel.relation_type,
            rel.weight,
            names.get(rel.target_id.as_str()).unwrap_or(&rel.target_id.as_str()),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::EntityType;

    #[test]
    fn report_lists_entities_and_co_occurrences() {
        let report = run("Alice works at Google.");
        assert!(report
            .entities
            .iter()
            .any(|e| e.name == "Alice" && e.entity_type == EntityType::Person));
        assert!(report
            .entities
            .iter()
            .any(|e| e.name == "Google" && e.entity_type == EntityType::Organization));
        assert_eq!(report.relationships.len(), 1);
    }

    #[test]
    fn empty_text_gives_empty_report() {
        let report = run("");
        assert!(report.entities.is_empty());
        assert!(report.relationships.is_empty());
    }
}
