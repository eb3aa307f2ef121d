//! Entity and relation label registry
//!
//! `id_entity` and `id_relation` map ids to optional labels (`None` marks an
//! id registered for labeling). `inverse_entity` maps labels back to entity
//! ids and is derived from `id_entity` on demand.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::model::{EntityId, Id};
use crate::persistence::{Connection, Structure};

use super::{KgError, KgResult};

/// Result of [`LabelRegistry::check_existence`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelStatus {
    Absent,
    Present { current: Option<String> },
}

impl LabelStatus {
    pub fn exists(&self) -> bool {
        matches!(self, LabelStatus::Present { .. })
    }

    /// Whether writing `proposed` would change an existing label
    pub fn would_change(&self, proposed: &str) -> bool {
        match self {
            LabelStatus::Present { current } => current.as_deref() != Some(proposed),
            LabelStatus::Absent => false,
        }
    }
}

/// Label maps seen through one connection's transaction
#[derive(Clone, Copy)]
pub struct LabelRegistry<'c, 'db> {
    conn: &'c Connection<'db>,
}

fn structure_for(id: &Id) -> Structure {
    match id {
        Id::Entity(_) => Structure::IdEntity,
        Id::Relation(_) => Structure::IdRelation,
    }
}

impl<'c, 'db> LabelRegistry<'c, 'db> {
    pub fn new(conn: &'c Connection<'db>) -> Self {
        Self { conn }
    }

    fn entry(&self, id: &Id) -> KgResult<Option<Option<String>>> {
        Ok(self.conn.get_value(structure_for(id), id.as_str().as_bytes())?)
    }

    /// Label of `id`; `None` when unlabeled or unknown
    pub fn get(&self, id: &Id) -> KgResult<Option<String>> {
        Ok(self.entry(id)?.flatten())
    }

    pub fn exists(&self, id: &Id) -> KgResult<bool> {
        Ok(self.entry(id)?.is_some())
    }

    /// Like [`get`](Self::get), but an unregistered id is an error
    pub fn require(&self, id: &Id) -> KgResult<Option<String>> {
        self.entry(id)?
            .ok_or_else(|| KgError::NotFound(format!("{} has no label entry", id)))
    }

    /// Report whether `id` is registered and with which label; never writes
    pub fn check_existence(&self, id: &Id, proposed: &str) -> KgResult<LabelStatus> {
        let kind = if id.is_entity() { "Entity" } else { "Relation" };
        let status = match self.entry(id)? {
            Some(current) => {
                info!(
                    "{} {} already exists with label '{}'. Should it change to '{}'?",
                    kind,
                    id,
                    current.as_deref().unwrap_or("<unlabeled>"),
                    proposed
                );
                LabelStatus::Present { current }
            }
            None => {
                info!(
                    "{} {} doesn't exist yet. Should it be assigned label '{}'?",
                    kind, id, proposed
                );
                LabelStatus::Absent
            }
        };
        Ok(status)
    }

    /// Register or relabel `id`
    ///
    /// With `label == None` an already registered id is left alone. Any other
    /// call overwrites, so check with [`check_existence`](Self::check_existence)
    /// first. Returns whether anything was written.
    pub fn add_label(&self, id: &Id, label: Option<&str>) -> KgResult<bool> {
        let structure = structure_for(id);
        let previous = self.entry(id)?;

        if label.is_none() {
            if let Some(current) = &previous {
                debug!(
                    "{} already exists with label '{}'",
                    id,
                    current.as_deref().unwrap_or("<unlabeled>")
                );
                return Ok(false);
            }
        }

        let value = label.map(str::to_string);
        self.conn.put_value(structure, id.as_str().as_bytes(), &value)?;

        if let (Id::Entity(_), Some(new_label)) = (id, label) {
            self.sync_inverse(id.as_str(), previous.flatten(), new_label)?;
        }
        Ok(true)
    }

    /// Keep a present inverse index in step with a relabel
    fn sync_inverse(&self, id: &str, old_label: Option<String>, new_label: &str) -> KgResult<()> {
        if !self.is_inverse_present()? {
            return Ok(());
        }
        if let Some(old) = old_label.filter(|old| old != new_label) {
            let owner: Option<String> =
                self.conn.get_value(Structure::InverseEntity, old.as_bytes())?;
            if owner.as_deref() == Some(id) {
                self.conn.delete_raw(Structure::InverseEntity, old.as_bytes())?;
            }
        }
        self.conn
            .put_value(Structure::InverseEntity, new_label.as_bytes(), &id.to_string())?;
        Ok(())
    }

    pub fn is_inverse_present(&self) -> KgResult<bool> {
        Ok(self
            .conn
            .schema()?
            .map(|schema| schema.is_present(Structure::InverseEntity))
            .unwrap_or(false))
    }

    /// Rebuild `inverse_entity` from `id_entity`
    ///
    /// Entities are visited in ascending id order, so on duplicate labels
    /// the greatest id wins. Unlabeled entities are skipped. Fails if the
    /// rebuilt index would be empty. Returns the number of labels indexed.
    pub fn invert_labels(&self) -> KgResult<usize> {
        let mut schema = self.conn.schema()?.unwrap_or_default();
        if !schema.is_present(Structure::InverseEntity) {
            info!("Inverse entity index not initialised. Initialising new one.");
        }

        let source = self.conn.scan_all(Structure::IdEntity)?;
        let mut inverse: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in &source {
            let label: Option<String> = bincode::deserialize(value)
                .map_err(crate::persistence::StorageError::from)?;
            if let Some(label) = label {
                let id = String::from_utf8_lossy(key).into_owned();
                if let Some(previous) = inverse.insert(label.clone(), id.clone()) {
                    debug!("Duplicate label '{}': {} replaces {}", label, id, previous);
                }
            }
        }

        if inverse.is_empty() {
            return Err(KgError::IntegrityAssertion(format!(
                "inverse entity index is empty after inverting {} id_entity entries",
                source.len()
            )));
        }

        self.conn.clear(Structure::InverseEntity)?;
        for (label, id) in &inverse {
            self.conn
                .put_value(Structure::InverseEntity, label.as_bytes(), id)?;
        }
        schema.mark(Structure::InverseEntity);
        self.conn.put_schema(&schema)?;

        info!("Inverting successful: {} labels indexed", inverse.len());
        Ok(inverse.len())
    }

    /// Build the inverse index if the schema says it is absent
    pub fn ensure_inverse(&self) -> KgResult<bool> {
        if self.is_inverse_present()? {
            return Ok(false);
        }
        info!("Inverting labels");
        self.invert_labels()?;
        Ok(true)
    }

    /// Inverse lookup without building the index
    pub fn inverse(&self, label: &str) -> KgResult<Option<EntityId>> {
        let id: Option<String> = self
            .conn
            .get_value(Structure::InverseEntity, label.as_bytes())?;
        Ok(id.map(EntityId::parse).transpose()?)
    }

    /// Entity carrying `label`, building the inverse index first if absent
    pub fn entity_for_label(&self, label: &str) -> KgResult<Option<EntityId>> {
        self.ensure_inverse()?;
        self.inverse(label)
    }
}
