// used for persistence
use rusqlite::{params, Connection, OptionalExtension};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::construct::{Dataset, DatasetInfo};
use crate::error::{InsightError, Result};
use crate::record::{DatasetKind, Record};

/// Where the persistor keeps its SQLite database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Private in-memory database, gone when the process ends.
    InMemory,
    /// File-backed database at the given path.
    File(String),
}

pub struct Persistor {
    connection: Connection,
}

impl Persistor {
    pub fn new(mode: &PersistenceMode) -> Result<Self> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        connection.execute_batch(
            "
            create table if not exists Dataset (
                Dataset_Identity text not null,
                Kind text not null,
                NumRows integer not null,
                AddedAt text not null,
                Checksum text not null,
                Records text not null,
                constraint unique_and_referenceable_Dataset_Identity primary key (
                    Dataset_Identity
                )
            );
            ",
        )?;
        Ok(Self { connection })
    }

    pub fn contains_dataset(&self, id: &str) -> Result<bool> {
        let found = self
            .connection
            .prepare_cached(
                "
                select 1
                    from Dataset
                    where Dataset_Identity = ?
            ",
            )?
            .query_row(params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Stores the dataset, returning true if the id was already persisted
    /// (in which case nothing is written).
    pub fn persist_dataset(&mut self, dataset: &Dataset) -> Result<bool> {
        if self.contains_dataset(dataset.id())? {
            return Ok(true);
        }
        let records = serde_json::to_string(dataset.records())?;
        let checksum = blake3::hash(records.as_bytes()).to_hex().to_string();
        self.connection
            .prepare_cached(
                "
                insert into Dataset (
                    Dataset_Identity,
                    Kind,
                    NumRows,
                    AddedAt,
                    Checksum,
                    Records
                ) values (?, ?, ?, ?, ?, ?)
            ",
            )?
            .execute(params![
                dataset.id(),
                dataset.kind().name(),
                dataset.row_count() as i64,
                dataset.added_at(),
                checksum,
                records
            ])?;
        debug!(id = dataset.id(), rows = dataset.row_count(), "dataset persisted");
        Ok(false)
    }

    /// Loads a persisted dataset back into memory.
    pub fn restore_dataset(&self, id: &str) -> Result<Option<Dataset>> {
        let row = self
            .connection
            .prepare_cached(
                "
                select Kind, AddedAt, Checksum, Records
                    from Dataset
                    where Dataset_Identity = ?
            ",
            )?
            .query_row(params![id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, DateTime<Utc>>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })
            .optional()?;
        let Some((kind, added_at, checksum, records)) = row else {
            return Ok(None);
        };
        let kind = DatasetKind::parse(&kind).ok_or_else(|| InsightError::DataCorruption {
            message: format!("dataset '{id}' has unknown kind '{kind}'"),
        })?;
        if blake3::hash(records.as_bytes()).to_hex().as_str() != checksum {
            warn!(id, "checksum mismatch on persisted dataset");
            return Err(InsightError::DataCorruption {
                message: format!("checksum mismatch for dataset '{id}'"),
            });
        }
        let values: Vec<serde_json::Value> = serde_json::from_str(&records)?;
        let mut restored = Vec::with_capacity(values.len());
        for value in values {
            let record = Record::from_json(kind, value).map_err(|e| InsightError::DataCorruption {
                message: format!("dataset '{id}': {e}"),
            })?;
            restored.push(record);
        }
        debug!(id, rows = restored.len(), "dataset restored");
        Ok(Some(Dataset::restore(id.to_string(), kind, added_at, restored)))
    }

    /// Metadata of every persisted dataset, ordered by the time it was added.
    pub fn dataset_infos(&self) -> Result<Vec<DatasetInfo>> {
        let mut statement = self.connection.prepare_cached(
            "
            select Dataset_Identity, Kind, NumRows
                from Dataset
                order by AddedAt, Dataset_Identity
        ",
        )?;
        let rows = statement.query_map([], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?))
        })?;
        let mut infos = Vec::new();
        for row in rows {
            let (id, kind, num_rows) = row?;
            match DatasetKind::parse(&kind) {
                Some(kind) => infos.push(DatasetInfo { id, kind, num_rows: num_rows as usize }),
                // skip rows that can never be restored
                None => warn!(id = %id, kind = %kind, "skipping persisted dataset of unknown kind"),
            }
        }
        Ok(infos)
    }

    /// Deletes a persisted dataset, returning true if one was removed.
    pub fn forget_dataset(&mut self, id: &str) -> Result<bool> {
        let removed = self
            .connection
            .prepare_cached(
                "
                delete from Dataset
                    where Dataset_Identity = ?
            ",
            )?
            .execute(params![id])?;
        Ok(removed > 0)
    }
}
