use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Invalid query: {0}")]
    Validation(String),
    #[error("Result too large: {rows} rows exceed the limit of {limit}, narrow the query")]
    ResultTooLarge { rows: usize, limit: usize },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, InsightError>;

impl InsightError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

// Helper conversions
impl From<rusqlite::Error> for InsightError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for InsightError {
    fn from(e: serde_json::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for InsightError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
