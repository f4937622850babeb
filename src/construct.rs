//! Datasets and the registry that owns them.
//!
//! A [`Dataset`] is an immutable, ordered collection of records of one
//! [`DatasetKind`]. The [`Database`] keeps the loaded datasets in a
//! [`DatasetKeeper`] and writes every added dataset through its
//! [`Persistor`]. Datasets that only exist in storage (for example after a
//! restart) are rehydrated the first time they are referenced.

use std::sync::{Arc, Mutex, MutexGuard};

// the keeper uses a HashMap keyed by dataset id
use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use seahash::SeaHasher;

// used for the time a dataset was added
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{InsightError, Result};
use crate::persist::{PersistenceMode, Persistor};
use crate::record::{DatasetKind, Record};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

// ------------- Dataset -------------
#[derive(Debug)]
pub struct Dataset {
    id: String,
    kind: DatasetKind,
    added_at: DateTime<Utc>,
    records: Vec<Record>,
}

impl Dataset {
    /// Builds a dataset, checking the id and that every record matches the kind.
    pub fn new(id: &str, kind: DatasetKind, records: Vec<Record>) -> Result<Self> {
        validate_id(id)?;
        if records.is_empty() {
            return Err(InsightError::validation(format!(
                "Dataset '{id}' has no valid {kind} records"
            )));
        }
        if let Some(stray) = records.iter().find(|r| r.kind() != kind) {
            return Err(InsightError::validation(format!(
                "Dataset '{id}' of kind {kind} contains a {} record",
                stray.kind()
            )));
        }
        Ok(Self {
            id: id.to_string(),
            kind,
            added_at: Utc::now(),
            records,
        })
    }
    // Restoration trusts what was validated when the dataset was first added.
    pub(crate) fn restore(
        id: String,
        kind: DatasetKind,
        added_at: DateTime<Utc>,
        records: Vec<Record>,
    ) -> Self {
        Self { id, kind, added_at, records }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn kind(&self) -> DatasetKind {
        self.kind
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }
    pub fn records(&self) -> &[Record] {
        &self.records
    }
    pub fn row_count(&self) -> usize {
        self.records.len()
    }
    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            id: self.id.clone(),
            kind: self.kind,
            num_rows: self.records.len(),
        }
    }
}

/// A dataset id is non-empty, not only whitespace, and has no underscore.
pub fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() || id.contains('_') {
        return Err(InsightError::validation(format!("Invalid dataset id '{id}'")));
    }
    Ok(())
}

/// Listing entry for a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub id: String,
    pub kind: DatasetKind,
    #[serde(rename = "numRows")]
    pub num_rows: usize,
}

// ------------- DatasetKeeper -------------
#[derive(Debug, Default)]
pub struct DatasetKeeper {
    kept: HashMap<String, Arc<Dataset>, OtherHasher>,
    // registration order, so listings are stable
    order: Vec<String>,
}

impl DatasetKeeper {
    pub fn new() -> Self {
        Self::default()
    }
    /// Keeps the dataset, replacing any previous one with the same id.
    pub fn keep(&mut self, dataset: Dataset) -> Arc<Dataset> {
        let id = dataset.id().to_string();
        let kept = Arc::new(dataset);
        if self.kept.insert(id.clone(), Arc::clone(&kept)).is_none() {
            self.order.push(id);
        }
        kept
    }
    pub fn get(&self, id: &str) -> Option<Arc<Dataset>> {
        self.kept.get(id).map(Arc::clone)
    }
    pub fn contains(&self, id: &str) -> bool {
        self.kept.contains_key(id)
    }
    pub fn release(&mut self, id: &str) -> Option<Arc<Dataset>> {
        let released = self.kept.remove(id);
        if released.is_some() {
            self.order.retain(|kept_id| kept_id != id);
        }
        released
    }
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Dataset>> {
        self.order.iter().filter_map(|id| self.kept.get(id))
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

// ------------- DatasetSource -------------
/// Read-only access to datasets, as needed by the query engine.
pub trait DatasetSource {
    /// The dataset with the given id, loading it from storage if necessary.
    fn resolve_dataset(&self, id: &str) -> Result<Option<Arc<Dataset>>>;
    /// Ids of every dataset that can be resolved.
    fn dataset_ids(&self) -> Result<Vec<String>>;
}

// ------------- Database -------------
// This sets up the registry with the necessary structures
pub struct Database {
    // owns the loaded datasets
    pub dataset_keeper: Arc<Mutex<DatasetKeeper>>,
    // responsible for the the persistence layer
    pub persistor: Arc<Mutex<Persistor>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| InsightError::Lock(e.to_string()))
}

impl Database {
    pub fn new(mode: PersistenceMode) -> Result<Database> {
        let persistor = Persistor::new(&mode)?;
        info!(?mode, "database opened");
        Ok(Database {
            dataset_keeper: Arc::new(Mutex::new(DatasetKeeper::new())),
            persistor: Arc::new(Mutex::new(persistor)),
        })
    }
    // functions to access the owned keeper and persistor
    pub fn dataset_keeper(&self) -> Arc<Mutex<DatasetKeeper>> {
        Arc::clone(&self.dataset_keeper)
    }
    pub fn persistor(&self) -> Arc<Mutex<Persistor>> {
        Arc::clone(&self.persistor)
    }

    /// Adds a dataset and returns the ids of all datasets afterwards.
    pub fn add_dataset(&self, id: &str, kind: DatasetKind, records: Vec<Record>) -> Result<Vec<String>> {
        validate_id(id)?;
        if lock(&self.dataset_keeper)?.contains(id) || lock(&self.persistor)?.contains_dataset(id)? {
            return Err(InsightError::validation(format!("Dataset '{id}' already exists")));
        }
        let dataset = Dataset::new(id, kind, records)?;
        // a concurrent add of the same id may have won since the check above
        if lock(&self.persistor)?.persist_dataset(&dataset)? {
            return Err(InsightError::validation(format!("Dataset '{id}' already exists")));
        }
        let rows = dataset.row_count();
        lock(&self.dataset_keeper)?.keep(dataset);
        info!(id, %kind, rows, "dataset added");
        self.dataset_ids()
    }

    /// Removes a dataset from memory and storage.
    pub fn remove_dataset(&self, id: &str) -> Result<String> {
        validate_id(id)?;
        let in_memory = lock(&self.dataset_keeper)?.release(id).is_some();
        let in_storage = lock(&self.persistor)?.forget_dataset(id)?;
        if !in_memory && !in_storage {
            return Err(InsightError::NotFound(format!("Dataset '{id}' not found")));
        }
        info!(id, in_memory, in_storage, "dataset removed");
        Ok(id.to_string())
    }

    /// Loaded datasets followed by the persisted ones not loaded yet.
    /// Recomputed on every call.
    pub fn list_datasets(&self) -> Result<Vec<DatasetInfo>> {
        let mut infos: Vec<DatasetInfo> = lock(&self.dataset_keeper)?
            .iter()
            .map(|dataset| dataset.info())
            .collect();
        for info in lock(&self.persistor)?.dataset_infos()? {
            if !infos.iter().any(|known| known.id == info.id) {
                infos.push(info);
            }
        }
        Ok(infos)
    }
}

impl DatasetSource for Database {
    fn resolve_dataset(&self, id: &str) -> Result<Option<Arc<Dataset>>> {
        if let Some(dataset) = lock(&self.dataset_keeper)?.get(id) {
            return Ok(Some(dataset));
        }
        let restored = lock(&self.persistor)?.restore_dataset(id)?;
        Ok(match restored {
            Some(dataset) => {
                debug!(id, "dataset rehydrated from storage");
                Some(lock(&self.dataset_keeper)?.keep(dataset))
            }
            None => None,
        })
    }
    fn dataset_ids(&self) -> Result<Vec<String>> {
        Ok(self.list_datasets()?.into_iter().map(|info| info.id).collect())
    }
}
