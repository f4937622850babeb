//! The programmatic entry point: adding, removing and listing datasets and
//! running queries against them.
//!
//! The facade shares one [`Database`] (behind an `Arc`) so the HTTP layer and
//! any embedding program can hold cheap clones of it.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::construct::{Database, DatasetInfo};
use crate::error::{InsightError, Result};
use crate::query::Engine;
use crate::record::{DatasetKind, Record, Row};

#[derive(Clone)]
pub struct InsightFacade {
    db: Arc<Database>, // shared database
}

impl InsightFacade {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Adds typed records under `id`, returning the ids of all datasets.
    pub fn add_dataset(&self, id: &str, kind: DatasetKind, records: Vec<Record>) -> Result<Vec<String>> {
        self.db.add_dataset(id, kind, records).inspect_err(|e| {
            warn!(id, %kind, error = %e, "add dataset failed");
        })
    }

    /// Adds records given as a JSON array of section or room objects.
    pub fn add_dataset_json(&self, id: &str, kind: DatasetKind, content: &Value) -> Result<Vec<String>> {
        let items = content
            .as_array()
            .ok_or_else(|| InsightError::validation("Dataset content must be a JSON array of records"))?;
        let records = items
            .iter()
            .map(|item| Record::from_json(kind, item.clone()))
            .collect::<Result<Vec<_>>>()?;
        self.add_dataset(id, kind, records)
    }

    pub fn remove_dataset(&self, id: &str) -> Result<String> {
        self.db.remove_dataset(id).inspect_err(|e| {
            warn!(id, error = %e, "remove dataset failed");
        })
    }

    pub fn list_datasets(&self) -> Result<Vec<DatasetInfo>> {
        self.db.list_datasets()
    }

    /// Validates and runs a query. Nothing is returned unless the whole
    /// query succeeds.
    pub fn perform_query(&self, query: &Value) -> Result<Vec<Row>> {
        let engine = Engine::new(self.db.as_ref());
        match engine.perform_query(query) {
            Ok(rows) => {
                info!(rows = rows.len(), "query complete");
                Ok(rows)
            }
            Err(e) => {
                warn!(error = %e, "query rejected");
                Err(e)
            }
        }
    }
}
