//! OPTIONS: column projection and ordering of the final rows.

use std::cmp::Ordering;

use crate::error::{InsightError, Result};
use crate::record::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn parse(token: &str) -> Option<Direction> {
        match token {
            "UP" => Some(Direction::Up),
            "DOWN" => Some(Direction::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Order {
    /// Ascending by one column.
    Single(String),
    /// Lexicographic over `keys`; `Down` inverts every key comparison.
    Multi { dir: Direction, keys: Vec<String> },
}

impl Order {
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Order::Single(key) => vec![key.as_str()],
            Order::Multi { keys, .. } => keys.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    columns: Vec<String>,
    order: Option<Order>,
}

impl Options {
    pub fn new(columns: Vec<String>, order: Option<Order>) -> Result<Self> {
        if columns.is_empty() {
            return Err(InsightError::validation("COLUMNS must list at least one column"));
        }
        if let Some(order) = &order {
            if let Order::Multi { keys, .. } = order {
                if keys.is_empty() {
                    return Err(InsightError::validation("ORDER keys must not be empty"));
                }
            }
            for key in order.keys() {
                if !columns.iter().any(|c| c == key) {
                    return Err(InsightError::validation(format!("ORDER key '{key}' is not in COLUMNS")));
                }
            }
        }
        Ok(Self { columns, order })
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    /// Sorts rows (stable) according to ORDER; without ORDER rows keep their
    /// upstream order.
    pub fn order_rows(&self, mut rows: Vec<Row>) -> Result<Vec<Row>> {
        let Some(order) = &self.order else {
            return Ok(rows);
        };
        let keys = order.keys();
        for row in &rows {
            if let Some(missing) = keys.iter().find(|key| !row.contains(key)) {
                return Err(InsightError::validation(format!("Cannot order by missing column '{missing}'")));
            }
        }
        let direction = match order {
            Order::Single(_) => Direction::Up,
            Order::Multi { dir, .. } => *dir,
        };
        rows.sort_by(|a, b| compare_rows(a, b, &keys, direction));
        Ok(rows)
    }

    /// Projects every row down to COLUMNS, in declared order.
    pub fn select_columns(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut selected = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut projected = Row::with_capacity(self.columns.len());
            for column in &self.columns {
                let value = row
                    .get(column)
                    .ok_or_else(|| InsightError::validation(format!("Column '{column}' is not in the result")))?;
                projected.insert(column.clone(), value.clone());
            }
            selected.push(projected);
        }
        Ok(selected)
    }
}

fn compare_rows(a: &Row, b: &Row, keys: &[&str], direction: Direction) -> Ordering {
    for key in keys {
        // presence was checked before sorting
        let ordering = match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) => x.cmp(y),
            _ => Ordering::Equal,
        };
        let ordering = match direction {
            Direction::Up => ordering,
            Direction::Down => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
