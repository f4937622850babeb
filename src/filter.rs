//! The WHERE clause: a tree of predicates evaluated against each record.

use lazy_static::lazy_static;
use regex::Regex;
// used for the set of matching record positions
use roaring::RoaringBitmap;

use crate::construct::Dataset;
use crate::error::{InsightError, Result};
use crate::record::{DatasetKind, FieldKind, Record, Row};

lazy_static! {
    // at most one leading and one trailing wildcard, none inside
    static ref WILDCARD_PATTERN: Regex = Regex::new(r"^\*?[^*]*\*?$").expect("valid regex");
}

// ------------- QualifiedField -------------
/// A `<datasetId>_<field>` reference that has been checked against a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedField {
    dataset: String,
    field: String,
    kind: FieldKind,
}

impl QualifiedField {
    /// Parses `key` and checks it names a field of `kind` in dataset `dataset_id`.
    pub fn parse(key: &str, dataset_id: &str, kind: DatasetKind) -> Result<Self> {
        let mut segments = key.split('_');
        let (Some(dataset), Some(field), None) = (segments.next(), segments.next(), segments.next()) else {
            return Err(InsightError::validation(format!("Malformed field '{key}'")));
        };
        if dataset != dataset_id {
            return Err(InsightError::validation(format!(
                "Field '{key}' references dataset '{dataset}', but the query is bound to '{dataset_id}'"
            )));
        }
        let field_kind = kind
            .field_kind(field)
            .ok_or_else(|| InsightError::validation(format!("Unknown field '{key}' for {kind}")))?;
        Ok(Self {
            dataset: dataset.to_string(),
            field: field.to_string(),
            kind: field_kind,
        })
    }
    pub fn parse_text(key: &str, dataset_id: &str, kind: DatasetKind) -> Result<Self> {
        let parsed = Self::parse(key, dataset_id, kind)?;
        if parsed.kind != FieldKind::Text {
            return Err(InsightError::validation(format!("Field '{key}' is not a string field")));
        }
        Ok(parsed)
    }
    pub fn parse_numeric(key: &str, dataset_id: &str, kind: DatasetKind) -> Result<Self> {
        let parsed = Self::parse(key, dataset_id, kind)?;
        if parsed.kind != FieldKind::Numeric {
            return Err(InsightError::validation(format!("Field '{key}' is not a numeric field")));
        }
        Ok(parsed)
    }
    pub fn dataset(&self) -> &str {
        &self.dataset
    }
    /// The unqualified field name.
    pub fn field(&self) -> &str {
        &self.field
    }
    pub fn kind(&self) -> FieldKind {
        self.kind
    }
    /// The column name this field has in a qualified row.
    pub fn column(&self) -> String {
        format!("{}_{}", self.dataset, self.field)
    }
    /// Re-checks the binding against a (possibly later) resolved dataset.
    pub fn validate(&self, dataset_id: &str, kind: DatasetKind) -> Result<()> {
        let reparsed = Self::parse(&self.column(), dataset_id, kind)?;
        if reparsed.kind != self.kind {
            return Err(InsightError::validation(format!(
                "Field '{}' changed type after binding",
                self.column()
            )));
        }
        Ok(())
    }
}

// ------------- Pattern -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    EndsWith,
    StartsWith,
    Contains,
}

/// An IS pattern with its wildcards stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    mode: MatchMode,
    needle: String,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self> {
        if !WILDCARD_PATTERN.is_match(raw) {
            return Err(InsightError::validation(format!(
                "Wildcards may only lead or trail the pattern '{raw}'"
            )));
        }
        let (leading, rest) = match raw.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (trailing, needle) = match rest.strip_suffix('*') {
            Some(needle) => (true, needle),
            None => (false, rest),
        };
        let mode = match (leading, trailing) {
            (false, false) => MatchMode::Exact,
            (true, false) => MatchMode::EndsWith,
            (false, true) => MatchMode::StartsWith,
            (true, true) => MatchMode::Contains,
        };
        Ok(Self { mode, needle: needle.to_string() })
    }
    pub fn mode(&self) -> MatchMode {
        self.mode
    }
    pub fn matches(&self, value: &str) -> bool {
        match self.mode {
            MatchMode::Exact => value == self.needle,
            MatchMode::EndsWith => value.ends_with(&self.needle),
            MatchMode::StartsWith => value.starts_with(&self.needle),
            MatchMode::Contains => value.contains(&self.needle),
        }
    }
}

// ------------- Predicate -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Eq,
    Lt,
    Gt,
}

impl NumericOp {
    pub fn parse(token: &str) -> Option<NumericOp> {
        match token {
            "EQ" => Some(NumericOp::Eq),
            "LT" => Some(NumericOp::Lt),
            "GT" => Some(NumericOp::Gt),
            _ => None,
        }
    }
    pub fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            NumericOp::Eq => left == right,
            NumericOp::Lt => left < right,
            NumericOp::Gt => left > right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { op: NumericOp, field: QualifiedField, value: f64 },
    Match { field: QualifiedField, pattern: Pattern },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Evaluates the predicate against one record. Logical nodes evaluate
    /// every child.
    pub fn matches(&self, record: &Record) -> Result<bool> {
        match self {
            Predicate::Compare { op, field, value } => {
                let stored = record.field(field.field())?.as_number();
                Ok(op.apply(stored, *value))
            }
            Predicate::Match { field, pattern } => {
                let stored = record.field(field.field())?.as_text();
                Ok(pattern.matches(&stored))
            }
            Predicate::And(children) => {
                let mut all = true;
                for child in children {
                    all &= child.matches(record)?;
                }
                Ok(all)
            }
            Predicate::Or(children) => {
                let mut any = false;
                for child in children {
                    any |= child.matches(record)?;
                }
                Ok(any)
            }
            Predicate::Not(child) => Ok(!child.matches(record)?),
        }
    }

    /// Re-checks every field binding and logical arity in the tree.
    pub fn validate_fields(&self, dataset_id: &str, kind: DatasetKind) -> Result<()> {
        match self {
            Predicate::Compare { field, .. } => {
                field.validate(dataset_id, kind)?;
                if field.kind() != FieldKind::Numeric {
                    return Err(InsightError::validation(format!(
                        "Field '{}' is not a numeric field",
                        field.column()
                    )));
                }
                Ok(())
            }
            Predicate::Match { field, .. } => {
                field.validate(dataset_id, kind)?;
                if field.kind() != FieldKind::Text {
                    return Err(InsightError::validation(format!(
                        "Field '{}' is not a string field",
                        field.column()
                    )));
                }
                Ok(())
            }
            Predicate::And(children) | Predicate::Or(children) => {
                if children.is_empty() {
                    return Err(InsightError::validation("Logical comparison needs at least one filter"));
                }
                children.iter().try_for_each(|child| child.validate_fields(dataset_id, kind))
            }
            Predicate::Not(child) => child.validate_fields(dataset_id, kind),
        }
    }
}

/// Positions of the records that satisfy `predicate` (all of them when
/// there is no predicate).
pub fn select(dataset: &Dataset, predicate: Option<&Predicate>) -> Result<RoaringBitmap> {
    let mut selection = RoaringBitmap::new();
    for (position, record) in dataset.records().iter().enumerate() {
        let keep = match predicate {
            Some(predicate) => predicate.matches(record)?,
            None => true,
        };
        if keep {
            let position = u32::try_from(position)
                .map_err(|_| InsightError::validation("Dataset too large to scan"))?;
            selection.insert(position);
        }
    }
    Ok(selection)
}

/// Scans the dataset once and materializes the matching records as
/// qualified rows, in record order.
pub fn filter_dataset(dataset: &Dataset, predicate: Option<&Predicate>) -> Result<Vec<Row>> {
    let selection = select(dataset, predicate)?;
    let records = dataset.records();
    let mut rows = Vec::with_capacity(selection.len() as usize);
    for position in selection.iter() {
        let record = records
            .get(position as usize)
            .ok_or_else(|| InsightError::validation("Selected record vanished during scan"))?;
        rows.push(record.to_qualified_row(dataset.id())?);
    }
    Ok(rows)
}
