use serde::Deserialize;

use crate::error::Result;
use crate::persist::PersistenceMode;

/// Process settings: defaults, then an optional `insightdb.*` file, then
/// `INSIGHTDB_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind_address: String,
    /// `file` or `memory`
    pub persistence: String,
    pub database_path: String,
    pub log_filter: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from("insightdb")
    }

    pub fn load_from(file_stem: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("bind_address", "127.0.0.1:4321")?
            .set_default("persistence", "file")?
            .set_default("database_path", "insightdb.sqlite")?
            .set_default("log_filter", "info")?
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(config::Environment::with_prefix("INSIGHTDB"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn persistence_mode(&self) -> PersistenceMode {
        if self.persistence.eq_ignore_ascii_case("memory") {
            PersistenceMode::InMemory
        } else {
            PersistenceMode::File(self.database_path.clone())
        }
    }
}
