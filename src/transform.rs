//! GROUP and APPLY: bucketing filtered rows and aggregating each bucket.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

// for decimal-accurate sums and rounding
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};

use crate::construct::OtherHasher;
use crate::error::{InsightError, Result};
use crate::filter::QualifiedField;
use crate::record::{DatasetKind, FieldKind, FieldValue, Row};

const PRECISION: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Max,
    Min,
    Avg,
    Sum,
    Count,
}

impl AggregateOp {
    pub fn parse(token: &str) -> Option<AggregateOp> {
        match token {
            "MAX" => Some(AggregateOp::Max),
            "MIN" => Some(AggregateOp::Min),
            "AVG" => Some(AggregateOp::Avg),
            "SUM" => Some(AggregateOp::Sum),
            "COUNT" => Some(AggregateOp::Count),
            _ => None,
        }
    }
    pub fn token(&self) -> &'static str {
        match self {
            AggregateOp::Max => "MAX",
            AggregateOp::Min => "MIN",
            AggregateOp::Avg => "AVG",
            AggregateOp::Sum => "SUM",
            AggregateOp::Count => "COUNT",
        }
    }
    /// COUNT works on any field, everything else needs numbers.
    pub fn accepts(&self, kind: FieldKind) -> bool {
        match self {
            AggregateOp::Count => true,
            _ => kind == FieldKind::Numeric,
        }
    }
}

/// One APPLY entry: `{name: {OP: field}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    name: String,
    op: AggregateOp,
    field: QualifiedField,
}

impl Aggregate {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn op(&self) -> AggregateOp {
        self.op
    }
    pub fn field(&self) -> &QualifiedField {
        &self.field
    }

    /// Computes the aggregate over one bucket.
    pub fn compute(&self, bucket: &[Row]) -> Result<FieldValue> {
        let column = self.field.column();
        let mut values = Vec::with_capacity(bucket.len());
        for row in bucket {
            let value = row.get(&column).ok_or_else(|| {
                InsightError::validation(format!("Column '{column}' missing while applying {}", self.name))
            })?;
            values.push(value);
        }
        match self.op {
            AggregateOp::Count => {
                let distinct: HashSet<&FieldValue, OtherHasher> = values.into_iter().collect();
                Ok(FieldValue::Number(distinct.len() as f64))
            }
            AggregateOp::Max | AggregateOp::Min => {
                let mut numbers = values.iter().map(|v| v.as_number());
                let first = numbers.next().ok_or_else(|| {
                    InsightError::validation(format!("Cannot apply {} to an empty group", self.op.token()))
                })?;
                let extreme = numbers.fold(first, |acc, n| match self.op {
                    AggregateOp::Max if n > acc => n,
                    AggregateOp::Min if n < acc => n,
                    _ => acc,
                });
                Ok(FieldValue::Number(extreme))
            }
            AggregateOp::Sum => {
                let total: f64 = values.iter().map(|v| v.as_number()).sum();
                Ok(FieldValue::Number(round(to_decimal(total)?)?))
            }
            AggregateOp::Avg => {
                if values.is_empty() {
                    return Err(InsightError::validation("Cannot apply AVG to an empty group"));
                }
                let mut total = BigDecimal::from(0);
                for value in &values {
                    total += to_decimal(value.as_number())?;
                }
                let average = total / BigDecimal::from(values.len() as u64);
                Ok(FieldValue::Number(round(average)?))
            }
        }
    }
}

// parsed from the shortest round-trip form, so 0.1 stays 0.1
fn to_decimal(n: f64) -> Result<BigDecimal> {
    if !n.is_finite() {
        return Err(InsightError::validation(format!("Cannot aggregate non-finite value {n}")));
    }
    BigDecimal::from_str(&n.to_string())
        .map_err(|e| InsightError::validation(format!("Cannot aggregate value {n}: {e}")))
}

// two decimals, half away from zero
fn round(value: BigDecimal) -> Result<f64> {
    value
        .with_scale_round(PRECISION, RoundingMode::HalfUp)
        .to_f64()
        .ok_or_else(|| InsightError::validation("Aggregate out of range"))
}

// ------------- Transform -------------
/// GROUP keys plus APPLY aggregates of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transform {
    group: Vec<QualifiedField>,
    aggregates: Vec<Aggregate>,
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_group(&mut self, keys: Vec<QualifiedField>) -> Result<()> {
        if keys.is_empty() {
            return Err(InsightError::validation("GROUP must list at least one key"));
        }
        self.group = keys;
        Ok(())
    }

    pub fn add_aggregate(&mut self, name: &str, op: AggregateOp, field: QualifiedField) -> Result<()> {
        if name.is_empty() || name.contains('_') {
            return Err(InsightError::validation(format!(
                "APPLY name '{name}' must be non-empty and contain no underscore"
            )));
        }
        if self.aggregates.iter().any(|a| a.name == name) {
            return Err(InsightError::validation(format!("Duplicate APPLY name '{name}'")));
        }
        if !op.accepts(field.kind()) {
            return Err(InsightError::validation(format!(
                "{} requires a numeric field, got '{}'",
                op.token(),
                field.column()
            )));
        }
        self.aggregates.push(Aggregate { name: name.to_string(), op, field });
        Ok(())
    }

    pub fn group(&self) -> &[QualifiedField] {
        &self.group
    }
    pub fn aggregates(&self) -> &[Aggregate] {
        &self.aggregates
    }

    /// The only columns available after the transformation: group keys then
    /// aggregate names.
    pub fn result_columns(&self) -> Vec<String> {
        self.group
            .iter()
            .map(QualifiedField::column)
            .chain(self.aggregates.iter().map(|a| a.name.clone()))
            .collect()
    }

    pub fn validate_fields(&self, dataset_id: &str, kind: DatasetKind) -> Result<()> {
        if self.group.is_empty() {
            return Err(InsightError::validation("GROUP must list at least one key"));
        }
        for key in &self.group {
            key.validate(dataset_id, kind)?;
        }
        for aggregate in &self.aggregates {
            aggregate.field.validate(dataset_id, kind)?;
            if !aggregate.op.accepts(aggregate.field.kind()) {
                return Err(InsightError::validation(format!(
                    "{} requires a numeric field, got '{}'",
                    aggregate.op.token(),
                    aggregate.field.column()
                )));
            }
        }
        Ok(())
    }

    /// Buckets rows by their group values (first-seen order) and emits one
    /// row per bucket.
    pub fn group_transform(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        let columns: Vec<String> = self.group.iter().map(QualifiedField::column).collect();
        let mut index: HashMap<String, usize, OtherHasher> = HashMap::default();
        let mut buckets: Vec<Vec<Row>> = Vec::new();
        for row in rows {
            let mut key = String::new();
            for column in &columns {
                let value = row.get(column).ok_or_else(|| {
                    InsightError::validation(format!("Column '{column}' missing while grouping"))
                })?;
                key.push_str(&value.to_string());
            }
            match index.get(&key) {
                Some(&at) => buckets[at].push(row),
                None => {
                    index.insert(key, buckets.len());
                    buckets.push(vec![row]);
                }
            }
        }

        let mut transformed = Vec::with_capacity(buckets.len());
        for bucket in &buckets {
            let first = &bucket[0];
            let mut out = Row::with_capacity(columns.len() + self.aggregates.len());
            for column in &columns {
                if let Some(value) = first.get(column) {
                    out.insert(column.clone(), value.clone());
                }
            }
            for aggregate in &self.aggregates {
                out.insert(aggregate.name.clone(), aggregate.compute(bucket)?);
            }
            transformed.push(out);
        }
        Ok(transformed)
    }
}
