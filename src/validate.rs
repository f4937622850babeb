//! Static validation of a JSON query against a bound dataset.
//!
//! The validator walks the raw query once, building the predicate tree,
//! the optional transformation and the options. Every structural problem is
//! reported as [`InsightError::Validation`] before any record is scanned.

use serde_json::{Map, Value};

use crate::construct::Dataset;
use crate::error::{InsightError, Result};
use crate::filter::{NumericOp, Pattern, Predicate, QualifiedField};
use crate::options::{Direction, Options, Order};
use crate::record::DatasetKind;
use crate::transform::{AggregateOp, Transform};

/// Deepest allowed nesting of AND/OR/NOT.
pub const MAX_NESTING_DEPTH: usize = 20;

const WHERE: &str = "WHERE";
const OPTIONS: &str = "OPTIONS";
const TRANSFORMATIONS: &str = "TRANSFORMATIONS";
const COLUMNS: &str = "COLUMNS";
const ORDER: &str = "ORDER";
const GROUP: &str = "GROUP";
const APPLY: &str = "APPLY";

/// A fully validated query, bound to one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub dataset_id: String,
    pub predicate: Option<Predicate>,
    pub options: Options,
    pub transform: Option<Transform>,
}

fn invalid(message: impl Into<String>) -> InsightError {
    InsightError::Validation(message.into())
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| invalid(format!("{what} must be an object")))
}

// the single entry of an object that must have exactly one key
fn single_entry<'a>(object: &'a Map<String, Value>, what: &str) -> Result<(&'a String, &'a Value)> {
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(invalid(format!("{what} must have exactly one key"))),
    }
}

fn string_array(value: &Value, what: &str) -> Result<Vec<String>> {
    let items = value.as_array().ok_or_else(|| invalid(format!("{what} must be an array")))?;
    if items.is_empty() {
        return Err(invalid(format!("{what} must not be empty")));
    }
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("{what} must only contain strings")))
        })
        .collect()
}

pub struct Validator<'d> {
    dataset_id: &'d str,
    kind: DatasetKind,
}

impl<'d> Validator<'d> {
    pub fn new(dataset: &'d Dataset) -> Self {
        Self { dataset_id: dataset.id(), kind: dataset.kind() }
    }

    /// Validates `raw` and returns the executable query.
    pub fn validate(&self, raw: &Value) -> Result<Query> {
        let query = as_object(raw, "Query")?;

        let expected_keys = if query.contains_key(TRANSFORMATIONS) { 3 } else { 2 };
        if query.len() != expected_keys {
            return Err(invalid(format!(
                "Query must have exactly {expected_keys} top-level keys, found {}",
                query.len()
            )));
        }

        let where_clause = query.get(WHERE).ok_or_else(|| invalid("Missing WHERE"))?;
        let predicate = self.handle_where(where_clause)?;

        let options = query.get(OPTIONS).ok_or_else(|| invalid("Missing OPTIONS"))?;
        let (columns, order) = self.handle_options(options)?;

        let transform = match query.get(TRANSFORMATIONS) {
            Some(transformations) => Some(self.handle_transformations(transformations)?),
            None => None,
        };

        match &transform {
            Some(transform) => {
                let available = transform.result_columns();
                if let Some(column) = columns.iter().find(|c| !available.contains(*c)) {
                    return Err(invalid(format!(
                        "Column '{column}' must be a GROUP key or an APPLY name"
                    )));
                }
            }
            None => {
                for column in &columns {
                    QualifiedField::parse(column, self.dataset_id, self.kind)?;
                }
            }
        }
        let options = Options::new(columns, order)?;

        // every node checks its own bindings once the whole query is known
        if let Some(predicate) = &predicate {
            predicate.validate_fields(self.dataset_id, self.kind)?;
        }
        if let Some(transform) = &transform {
            transform.validate_fields(self.dataset_id, self.kind)?;
        }

        Ok(Query {
            dataset_id: self.dataset_id.to_string(),
            predicate,
            options,
            transform,
        })
    }

    fn handle_where(&self, where_clause: &Value) -> Result<Option<Predicate>> {
        let filter = as_object(where_clause, WHERE)?;
        if filter.is_empty() {
            return Ok(None);
        }
        let (key, body) = single_entry(filter, WHERE)?;
        self.handle_filter(key, body, 0).map(Some)
    }

    fn handle_filter(&self, key: &str, body: &Value, depth: usize) -> Result<Predicate> {
        if depth > MAX_NESTING_DEPTH {
            return Err(invalid(format!(
                "Filters nest deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        match key {
            "AND" | "OR" => {
                let items = body
                    .as_array()
                    .ok_or_else(|| invalid(format!("{key} must be an array")))?;
                if items.is_empty() {
                    return Err(invalid(format!("{key} must contain at least one filter")));
                }
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    let (child_key, child_body) = single_entry(as_object(item, key)?, key)?;
                    children.push(self.handle_filter(child_key, child_body, depth + 1)?);
                }
                Ok(if key == "AND" { Predicate::And(children) } else { Predicate::Or(children) })
            }
            "NOT" => {
                let (child_key, child_body) = single_entry(as_object(body, key)?, key)?;
                let child = self.handle_filter(child_key, child_body, depth + 1)?;
                Ok(Predicate::Not(Box::new(child)))
            }
            "IS" => {
                let (field, pattern) = single_entry(as_object(body, key)?, key)?;
                let pattern = pattern
                    .as_str()
                    .ok_or_else(|| invalid(format!("IS value for '{field}' must be a string")))?;
                Ok(Predicate::Match {
                    field: QualifiedField::parse_text(field, self.dataset_id, self.kind)?,
                    pattern: Pattern::parse(pattern)?,
                })
            }
            "LT" | "GT" | "EQ" => {
                let (field, value) = single_entry(as_object(body, key)?, key)?;
                let value = value
                    .as_f64()
                    .ok_or_else(|| invalid(format!("{key} value for '{field}' must be a number")))?;
                let op = NumericOp::parse(key).ok_or_else(|| invalid(format!("Unknown comparator '{key}'")))?;
                Ok(Predicate::Compare {
                    op,
                    field: QualifiedField::parse_numeric(field, self.dataset_id, self.kind)?,
                    value,
                })
            }
            other => Err(invalid(format!("Unknown filter '{other}'"))),
        }
    }

    fn handle_options(&self, options: &Value) -> Result<(Vec<String>, Option<Order>)> {
        let options = as_object(options, OPTIONS)?;
        let columns = options.get(COLUMNS).ok_or_else(|| invalid("OPTIONS is missing COLUMNS"))?;
        let columns = string_array(columns, COLUMNS)?;

        let expected_keys = if options.contains_key(ORDER) { 2 } else { 1 };
        if options.len() != expected_keys {
            return Err(invalid("OPTIONS may only contain COLUMNS and ORDER"));
        }

        let order = match options.get(ORDER) {
            None => None,
            Some(Value::String(key)) => Some(Order::Single(key.clone())),
            Some(Value::Object(order)) => {
                if order.len() != 2 {
                    return Err(invalid("ORDER must have exactly the keys dir and keys"));
                }
                let dir = order
                    .get("dir")
                    .and_then(Value::as_str)
                    .and_then(Direction::parse)
                    .ok_or_else(|| invalid("ORDER dir must be UP or DOWN"))?;
                let keys = order.get("keys").ok_or_else(|| invalid("ORDER is missing keys"))?;
                let keys = string_array(keys, "ORDER keys")?;
                Some(Order::Multi { dir, keys })
            }
            Some(_) => return Err(invalid("ORDER must be a string or an object")),
        };
        // ORDER keys are checked against COLUMNS by Options::new
        Ok((columns, order))
    }

    fn handle_transformations(&self, transformations: &Value) -> Result<Transform> {
        let transformations = as_object(transformations, TRANSFORMATIONS)?;
        if transformations.len() != 2 {
            return Err(invalid("TRANSFORMATIONS must contain exactly GROUP and APPLY"));
        }
        let group = transformations
            .get(GROUP)
            .ok_or_else(|| invalid("TRANSFORMATIONS is missing GROUP"))?;
        let apply = transformations
            .get(APPLY)
            .ok_or_else(|| invalid("TRANSFORMATIONS is missing APPLY"))?
            .as_array()
            .ok_or_else(|| invalid("APPLY must be an array"))?;

        let mut transform = Transform::new();
        let keys = string_array(group, GROUP)?
            .iter()
            .map(|key| QualifiedField::parse(key, self.dataset_id, self.kind))
            .collect::<Result<Vec<_>>>()?;
        transform.set_group(keys)?;

        for rule in apply {
            let (name, body) = single_entry(as_object(rule, "APPLY rule")?, "APPLY rule")?;
            let (token, field) = single_entry(as_object(body, "APPLY body")?, "APPLY body")?;
            let op = AggregateOp::parse(token)
                .ok_or_else(|| invalid(format!("Unknown APPLY token '{token}'")))?;
            let field = field
                .as_str()
                .ok_or_else(|| invalid(format!("APPLY field for '{name}' must be a string")))?;
            let field = QualifiedField::parse(field, self.dataset_id, self.kind)?;
            transform.add_aggregate(name, op, field)?;
        }
        Ok(transform)
    }
}
