//! The query engine.
//!
//! A query runs in two phases. First the raw JSON is scanned for the first
//! qualified field (in WHERE, else GROUP, else COLUMNS); its prefix names the
//! dataset, which is resolved once (rehydrating it from storage if needed).
//! Then the query is validated against that loaded dataset and executed:
//! filter, transform, cardinality check, order, project.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::construct::{Dataset, DatasetSource};
use crate::error::{InsightError, Result};
use crate::filter::filter_dataset;
use crate::record::Row;
use crate::validate::{Query, Validator};

/// Largest number of rows a query may produce before ordering and projection.
pub const MAX_RESULT_ROWS: usize = 5000;

const FILTER_KEYS: [&str; 7] = ["IS", "LT", "GT", "EQ", "NOT", "OR", "AND"];

// first `<id>_...` key among the leaves of a WHERE tree, depth first
fn first_filter_field(key: &str, body: &Value) -> Option<String> {
    match (key, body) {
        ("AND" | "OR", Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|item| item.iter())
            .find_map(|(k, v)| first_filter_field(k, v)),
        ("NOT", Value::Object(inner)) => inner.iter().find_map(|(k, v)| first_filter_field(k, v)),
        (_, Value::Object(leaf)) if FILTER_KEYS.contains(&key) => {
            leaf.keys().find_map(|field| dataset_prefix(field))
        }
        _ => None,
    }
}

fn dataset_prefix(field: &str) -> Option<String> {
    field.split_once('_').map(|(id, _)| id.to_string())
}

/// The id of the dataset a raw query refers to, found syntactically.
pub fn bound_dataset_id(raw: &Value) -> Result<String> {
    let query = raw
        .as_object()
        .ok_or_else(|| InsightError::validation("Query must be an object"))?;

    let from_where = query
        .get("WHERE")
        .and_then(Value::as_object)
        .and_then(|filter| filter.iter().find_map(|(k, v)| first_filter_field(k, v)));
    let from_group = || {
        query
            .get("TRANSFORMATIONS")
            .and_then(|t| t.get("GROUP"))
            .and_then(Value::as_array)
            .and_then(|keys| keys.iter().filter_map(Value::as_str).find_map(dataset_prefix))
    };
    let from_columns = || {
        query
            .get("OPTIONS")
            .and_then(|o| o.get("COLUMNS"))
            .and_then(Value::as_array)
            .and_then(|columns| columns.iter().filter_map(Value::as_str).find_map(dataset_prefix))
    };

    from_where
        .or_else(from_group)
        .or_else(from_columns)
        .ok_or_else(|| InsightError::validation("Query does not reference any dataset field"))
}

/// Runs an already validated query against its dataset.
pub fn execute(dataset: &Dataset, query: &Query) -> Result<Vec<Row>> {
    if dataset.id() != query.dataset_id {
        return Err(InsightError::validation(format!(
            "Query bound to '{}' cannot run against '{}'",
            query.dataset_id,
            dataset.id()
        )));
    }
    let mut rows = filter_dataset(dataset, query.predicate.as_ref())?;
    if let Some(transform) = &query.transform {
        rows = transform.group_transform(rows)?;
    }
    if rows.len() > MAX_RESULT_ROWS {
        return Err(InsightError::ResultTooLarge { rows: rows.len(), limit: MAX_RESULT_ROWS });
    }
    let rows = query.options.order_rows(rows)?;
    query.options.select_columns(rows)
}

/// Evaluates queries against the datasets of a [`DatasetSource`].
pub struct Engine<'db> {
    source: &'db dyn DatasetSource,
}

impl<'db> Engine<'db> {
    pub fn new(source: &'db dyn DatasetSource) -> Self {
        Self { source }
    }

    /// Binds and validates `raw` without scanning any record.
    pub fn validate(&self, raw: &Value) -> Result<(Arc<Dataset>, Query)> {
        let id = bound_dataset_id(raw)?;
        // storage failures surface as validation errors at the query boundary
        let dataset = self
            .source
            .resolve_dataset(&id)
            .map_err(|e| {
                warn!(%id, error = %e, "dataset could not be resolved");
                InsightError::Validation(e.to_string())
            })?
            .ok_or_else(|| InsightError::validation(format!("Dataset '{id}' does not exist")))?;
        let query = Validator::new(&dataset).validate(raw)?;
        Ok((dataset, query))
    }

    pub fn perform_query(&self, raw: &Value) -> Result<Vec<Row>> {
        let (dataset, query) = self.validate(raw)?;
        let rows = execute(&dataset, &query)?;
        debug!(dataset = dataset.id(), rows = rows.len(), "query executed");
        Ok(rows)
    }
}

/// Validates and runs `raw` against `source`.
pub fn perform_query(source: &dyn DatasetSource, raw: &Value) -> Result<Vec<Row>> {
    Engine::new(source).perform_query(raw)
}
