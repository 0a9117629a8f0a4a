//! In-memory temporal index of entity sightings.
//!
//! Timestamps are stored as fixed-width ISO-8601 strings and compared
//! lexicographically. That ordering is only correct while every timestamp
//! shares one format and timezone; [`iso_timestamp`] produces that format.
//! Range queries are a linear scan over all recorded history.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};

use super::models::{iso_timestamp, now_timestamp, Entity, EntityType};

/// One sighting of an entity.
#[derive(Debug, Clone)]
pub struct TemporalRecord {
    pub entity: Entity,
    pub timestamp: String,
}

/// Per-entity, append-only history of sightings.
#[derive(Debug, Clone)]
pub struct TemporalGraphBuilder {
    window: Duration,
    index: BTreeMap<String, Vec<TemporalRecord>>,
}

impl Default for TemporalGraphBuilder {
    fn default() -> Self {
        Self::new(Duration::days(crate::config::DEFAULT_TEMPORAL_WINDOW_DAYS))
    }
}

impl TemporalGraphBuilder {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            index: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of distinct entity ids tracked.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Append a sighting; `timestamp` defaults to now.
    pub fn add_temporal_entity(&mut self, entity: Entity, timestamp: Option<&str>) {
        let timestamp = timestamp.map(str::to_string).unwrap_or_else(now_timestamp);
        self.index
            .entry(entity.id.clone())
            .or_default()
            .push(TemporalRecord { entity, timestamp });
    }

    /// Entities of `entity_type` recorded within `[start, end]` (inclusive).
    ///
    /// Bounds default to `now - window` and `now`. Each matching record is
    /// returned, so an entity seen twice in range appears twice.
    pub fn query_temporal_entities(
        &self,
        entity_type: EntityType,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Vec<Entity> {
        let now = Utc::now();
        // A window reaching past the representable range leaves the start open
        let start = start.map(str::to_string).unwrap_or_else(|| {
            now.checked_sub_signed(self.window)
                .map(iso_timestamp)
                .unwrap_or_default()
        });
        let end = end.map(str::to_string).unwrap_or_else(|| iso_timestamp(now));

        self.index
            .values()
            .flatten()
            .filter(|r| r.entity.entity_type == entity_type)
            .filter(|r| start.as_str() <= r.timestamp.as_str() && r.timestamp.as_str() <= end.as_str())
            .map(|r| r.entity.clone())
            .collect()
    }

    /// `(timestamp, description)` pairs for one entity, oldest first.
    ///
    /// Unknown ids yield an empty timeline.
    pub fn get_entity_timeline(&self, entity_id: &str) -> Vec<(String, String)> {
        let Some(records) = self.index.get(entity_id) else {
            return Vec::new();
        };

        let mut timeline: Vec<(String, String)> = records
            .iter()
            .map(|r| (r.timestamp.clone(), describe(&r.entity)))
            .collect();
        timeline.sort_by(|a, b| a.0.cmp(&b.0));
        timeline
    }
}

fn describe(entity: &Entity) -> String {
    match &entity.description {
        Some(description) => description.clone(),
        None => format!("Mentioned as {} ({})", entity.name, entity.entity_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> String {
        iso_timestamp(
            chrono::DateTime::parse_from_rfc3339(s)
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    #[test]
    fn timeline_is_sorted_regardless_of_insertion_order() {
        let mut temporal = TemporalGraphBuilder::default();
        let entity = Entity::new("Rust", EntityType::Technology);

        for t in ["2024-03-01T00:00:00Z", "2024-01-01T00:00:00Z", "2024-02-01T00:00:00Z"] {
            temporal.add_temporal_entity(entity.clone(), Some(&ts(t)));
        }

        let timeline = temporal.get_entity_timeline(&entity.id);
        assert_eq!(timeline.len(), 3);
        assert!(timeline.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(timeline[0].0, ts("2024-01-01T00:00:00Z"));
        assert!(timeline[0].1.contains("Rust"));
    }

    #[test]
    fn timeline_uses_description_when_present() {
        let mut temporal = TemporalGraphBuilder::default();
        let entity = Entity::new("Rust", EntityType::Technology).with_description("language");
        temporal.add_temporal_entity(entity.clone(), None);

        let timeline = temporal.get_entity_timeline(&entity.id);
        assert_eq!(timeline[0].1, "language");
    }

    #[test]
    fn unknown_entity_has_empty_timeline() {
        let temporal = TemporalGraphBuilder::default();
        assert!(temporal.get_entity_timeline("missing").is_empty());
    }

    #[test]
    fn oversized_window_leaves_start_open() {
        let mut temporal = TemporalGraphBuilder::new(Duration::MAX);
        let entity = Entity::new("Rust", EntityType::Technology);
        temporal.add_temporal_entity(entity, Some(&ts("1970-01-01T00:00:00Z")));

        let found = temporal.query_temporal_entities(EntityType::Technology, None, None);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn range_query_is_inclusive_and_type_filtered() {
        let mut temporal = TemporalGraphBuilder::default();
        let org = Entity::new("Apple", EntityType::Organization);
        let tech = Entity::new("Apple", EntityType::Technology);

        temporal.add_temporal_entity(org.clone(), Some(&ts("2024-01-01T00:00:00Z")));
        temporal.add_temporal_entity(org.clone(), Some(&ts("2024-06-01T00:00:00Z")));
        temporal.add_temporal_entity(tech.clone(), Some(&ts("2024-01-15T00:00:00Z")));

        let start = ts("2024-01-01T00:00:00Z");
        let end = ts("2024-01-31T00:00:00Z");

        let orgs =
            temporal.query_temporal_entities(EntityType::Organization, Some(&start), Some(&end));
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].id, org.id);

        let techs =
            temporal.query_temporal_entities(EntityType::Technology, Some(&start), Some(&end));
        assert_eq!(techs.len(), 1);
        assert_eq!(techs[0].id, tech.id);

        let people = temporal.query_temporal_entities(EntityType::Person, Some(&start), Some(&end));
        assert!(people.is_empty());
    }

    #[test]
    fn entity_outside_window_is_excluded_even_if_seen_in_range_under_another_type() {
        let mut temporal = TemporalGraphBuilder::default();
        let as_person = Entity::new("Jordan", EntityType::Person);
        let as_location = Entity::new("Jordan", EntityType::Location);

        temporal.add_temporal_entity(as_person.clone(), Some(&ts("2024-05-10T00:00:00Z")));
        temporal.add_temporal_entity(as_location, Some(&ts("2023-01-01T00:00:00Z")));

        let found = temporal.query_temporal_entities(
            EntityType::Location,
            Some(&ts("2024-05-01T00:00:00Z")),
            Some(&ts("2024-05-31T00:00:00Z")),
        );
        assert!(found.is_empty());
    }

    #[test]
    fn default_range_covers_recent_window() {
        let mut temporal = TemporalGraphBuilder::new(Duration::days(7));
        let recent = Entity::new("Berlin", EntityType::Location);
        let old = Entity::new("Paris", EntityType::Location);

        temporal.add_temporal_entity(recent.clone(), None);
        temporal.add_temporal_entity(old, Some(&iso_timestamp(Utc::now() - Duration::days(30))));

        let found = temporal.query_temporal_entities(EntityType::Location, None, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, recent.id);
        assert_eq!(temporal.len(), 2);
    }
}
