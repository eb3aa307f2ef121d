//! Bulk ingestion of nested JSON mappings
//!
//! A load replaces each top-level key it touches, turns every nested list
//! into a sorted, deduplicated member set, and commits once at the end: the
//! whole load becomes visible at that commit or not at all.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::model::Members;
use crate::persistence::{Connection, Shape, Structure};

use super::index::NestedIndex;
use super::labels::LabelRegistry;
use super::{KgError, KgResult};

/// What one structure load wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub structure: Structure,
    /// Top-level keys written
    pub rows: usize,
    /// Entries written; equals `rows` for flat structures
    pub entries: usize,
}

/// A complete graph in the external nested-dictionary format
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExternalGraph {
    pub id_entity: Map<String, Value>,
    pub id_relation: Map<String, Value>,
    pub subject_triples: Map<String, Value>,
    pub object_triples: Map<String, Value>,
    pub relation_subject_object: Map<String, Value>,
    pub relation_object_subject: Map<String, Value>,
    pub type_triples: Map<String, Value>,
    pub entity_type: Map<String, Value>,
}

impl ExternalGraph {
    /// Structures an external graph carries, in load order
    pub const LOAD_ORDER: [Structure; 8] = [
        Structure::IdEntity,
        Structure::IdRelation,
        Structure::SubjectTriples,
        Structure::ObjectTriples,
        Structure::RelationSubjectObject,
        Structure::RelationObjectSubject,
        Structure::TypeTriples,
        Structure::EntityType,
    ];

    /// Read `<structure>.json` files from `dir`; absent files give empty maps
    pub fn from_dir(dir: impl AsRef<Path>) -> KgResult<Self> {
        let dir = dir.as_ref();
        let mut graph = ExternalGraph::default();
        for structure in Self::LOAD_ORDER {
            let path = dir.join(format!("{}.json", structure.cf_name()));
            if !path.exists() {
                info!("No {} found in {:?}; leaving it empty", structure, dir);
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            let map: Map<String, Value> = serde_json::from_str(&text)?;
            debug!("Read {} top-level keys from {:?}", map.len(), path);
            if let Some(slot) = graph.slot_mut(structure) {
                *slot = map;
            }
        }
        Ok(graph)
    }

    /// Read a single JSON object holding every structure by name
    pub fn from_json_file(path: impl AsRef<Path>) -> KgResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn get(&self, structure: Structure) -> Option<&Map<String, Value>> {
        match structure {
            Structure::IdEntity => Some(&self.id_entity),
            Structure::IdRelation => Some(&self.id_relation),
            Structure::SubjectTriples => Some(&self.subject_triples),
            Structure::ObjectTriples => Some(&self.object_triples),
            Structure::RelationSubjectObject => Some(&self.relation_subject_object),
            Structure::RelationObjectSubject => Some(&self.relation_object_subject),
            Structure::TypeTriples => Some(&self.type_triples),
            Structure::EntityType => Some(&self.entity_type),
            Structure::InverseEntity => None,
        }
    }

    fn slot_mut(&mut self, structure: Structure) -> Option<&mut Map<String, Value>> {
        match structure {
            Structure::IdEntity => Some(&mut self.id_entity),
            Structure::IdRelation => Some(&mut self.id_relation),
            Structure::SubjectTriples => Some(&mut self.subject_triples),
            Structure::ObjectTriples => Some(&mut self.object_triples),
            Structure::RelationSubjectObject => Some(&mut self.relation_subject_object),
            Structure::RelationObjectSubject => Some(&mut self.relation_object_subject),
            Structure::TypeTriples => Some(&mut self.type_triples),
            Structure::EntityType => Some(&mut self.entity_type),
            Structure::InverseEntity => None,
        }
    }
}

/// Loads mappings into the store through one connection
pub struct BulkLoader<'c, 'db> {
    conn: &'c mut Connection<'db>,
}

impl<'c, 'db> BulkLoader<'c, 'db> {
    pub fn new(conn: &'c mut Connection<'db>) -> Self {
        Self { conn }
    }

    /// Load `input` into `target` and commit
    pub fn fill_from_dict(
        &mut self,
        input: &Map<String, Value>,
        target: Structure,
    ) -> KgResult<LoadSummary> {
        let staged = self.fill(input, target);
        let summary = self.commit_or_abort(staged)?;
        info!("Structure {} filled and committed", target);
        Ok(summary)
    }

    /// Parse the JSON object at `path`, load it into `target` and commit
    pub fn fill_from_json(
        &mut self,
        path: impl AsRef<Path>,
        target: Structure,
    ) -> KgResult<LoadSummary> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let input: Map<String, Value> = serde_json::from_str(&text)?;
        let staged = self.fill(&input, target);
        let summary = self.commit_or_abort(staged)?;
        info!("Structure {} filled from {:?} and committed", target, path);
        Ok(summary)
    }

    /// Load labels, rebuild the inverse index, load triples; one commit
    pub fn fill_from_external_graph(&mut self, graph: &ExternalGraph) -> KgResult<Vec<LoadSummary>> {
        let staged = self.stage_external_graph(graph);
        let summaries = self.commit_or_abort(staged)?;
        info!("External graph loaded and committed");
        Ok(summaries)
    }

    fn stage_external_graph(&self, graph: &ExternalGraph) -> KgResult<Vec<LoadSummary>> {
        let mut summaries = Vec::new();

        info!("Filling label maps...");
        for structure in [Structure::IdEntity, Structure::IdRelation] {
            if let Some(input) = graph.get(structure) {
                summaries.push(self.fill(input, structure)?);
            }
        }
        if graph.id_entity.is_empty() {
            warn!("No entity labels in external graph; inverse index left unbuilt");
        } else {
            LabelRegistry::new(&*self.conn).invert_labels()?;
        }

        info!("Filling triple maps...");
        for structure in &ExternalGraph::LOAD_ORDER[2..] {
            if let Some(input) = graph.get(*structure) {
                summaries.push(self.fill(input, *structure)?);
            }
        }
        Ok(summaries)
    }

    /// Commit a fully staged load; a failed one is rolled back entirely
    fn commit_or_abort<T>(&mut self, staged: KgResult<T>) -> KgResult<T> {
        match staged {
            Ok(value) => {
                self.conn.commit()?;
                Ok(value)
            }
            Err(e) => {
                warn!("Load failed, discarding staged writes: {}", e);
                self.conn.abort()?;
                Err(e)
            }
        }
    }

    fn fill(&self, input: &Map<String, Value>, target: Structure) -> KgResult<LoadSummary> {
        let total = input.len();
        let mut summary = LoadSummary {
            structure: target,
            rows: 0,
            entries: 0,
        };
        let mut last_progress = None;

        for (i, (key, value)) in input.iter().enumerate() {
            summary.entries += match target.shape() {
                Shape::Nested => self.write_row(target, key, value)?,
                Shape::Flat => self.write_scalar(target, key, value)?,
            };
            summary.rows += 1;

            let progress = (i + 1) * 100 / total;
            if last_progress != Some(progress) {
                info!("{} progress: {}%", target, progress);
                last_progress = Some(progress);
            }
        }

        match target {
            Structure::IdEntity => self.invalidate_inverse()?,
            Structure::InverseEntity => self.mark_inverse_loaded()?,
            _ => {}
        }

        info!("\t{} filled ({} keys, {} entries)", target, summary.rows, summary.entries);
        Ok(summary)
    }

    fn write_row(&self, target: Structure, key: &str, value: &Value) -> KgResult<usize> {
        let Value::Object(row) = value else {
            return Err(ingestion(target, key, "expected an object of key -> list"));
        };

        let index = NestedIndex::new(&*self.conn, target);
        index.take_row(key)?;
        for (secondary, list) in row {
            let Value::Array(items) = list else {
                return Err(ingestion(
                    target,
                    &format!("{}/{}", key, secondary),
                    "expected a list of strings",
                ));
            };
            let mut members = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => members.push(s.as_str()),
                    other => {
                        return Err(ingestion(
                            target,
                            &format!("{}/{}", key, secondary),
                            &format!("non-string member {}", other),
                        ))
                    }
                }
            }
            index.put(key, secondary, &Members::from_set(members))?;
        }
        Ok(row.len())
    }

    fn write_scalar(&self, target: Structure, key: &str, value: &Value) -> KgResult<usize> {
        let scalar = match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
            Value::Array(_) | Value::Object(_) => {
                return Err(ingestion(target, key, "expected a scalar value"));
            }
        };

        if target == Structure::InverseEntity {
            let Some(id) = scalar else {
                return Err(ingestion(target, key, "inverse entries need an entity id"));
            };
            self.conn.put_value(target, key.as_bytes(), &id)?;
        } else {
            self.conn.put_value(target, key.as_bytes(), &scalar)?;
        }
        Ok(1)
    }

    /// Entity labels changed wholesale; drop the derived index from the schema
    fn invalidate_inverse(&self) -> KgResult<()> {
        if let Some(mut schema) = self.conn.schema()? {
            if schema.is_present(Structure::InverseEntity) {
                schema.unmark(Structure::InverseEntity);
                self.conn.put_schema(&schema)?;
                info!("Entity labels reloaded; inverse index marked for rebuild");
            }
        }
        Ok(())
    }

    /// An inverse index loaded verbatim counts as built
    fn mark_inverse_loaded(&self) -> KgResult<()> {
        let mut schema = self.conn.schema()?.unwrap_or_default();
        schema.mark(Structure::InverseEntity);
        self.conn.put_schema(&schema)?;
        Ok(())
    }
}

fn ingestion(structure: Structure, key: &str, reason: &str) -> KgError {
    KgError::Ingestion {
        structure,
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
