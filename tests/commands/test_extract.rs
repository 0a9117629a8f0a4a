//! Tests for the extract command

use knowledge_graph::commands::extract_run;
use knowledge_graph::EntityType;

#[test]
fn test_extract_reports_concepts_and_technologies() {
    let report = extract_run("We use PyTorch for deep learning and RAG pipelines.");

    let types: Vec<EntityType> = report.entities.iter().map(|e| e.entity_type).collect();
    assert!(types.contains(&EntityType::Technology));
    assert!(types.contains(&EntityType::Concept));
    assert!(!report.relationships.is_empty());
}

#[test]
fn test_extract_serializes_to_json() {
    let report = extract_run("Alice works at Google.");
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["entities"].as_array().unwrap().len(), 2);
    assert_eq!(json["relationships"][0]["relation_type"], "CO_OCCURS");
}
