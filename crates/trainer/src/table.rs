//! In-memory row-oriented table
//!
//! Cells are dynamically typed [`Value`]s; a column's type is whatever its
//! non-null cells hold. Tables are created fresh per run and every transform
//! returns or rewrites a table owned by the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{PipelineError, Result};

/// A single table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Missing values: explicit nulls and NaN floats
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Null or the empty string
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Text(s) => s.is_empty(),
            other => other.is_null(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the cell; text is not coerced
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    /// The zero of this value's type, used by null filling
    pub fn zero_like(&self) -> Value {
        match self {
            Value::Bool(_) => Value::Bool(false),
            Value::Float(_) => Value::Float(0.0),
            Value::Text(_) => Value::Text(String::new()),
            Value::Int(_) | Value::Null => Value::Int(0),
        }
    }

    /// Key used for equality joins; nulls produce no key and never match
    pub fn join_key(&self) -> Option<JoinValue> {
        match self {
            Value::Null => None,
            Value::Float(v) if v.is_nan() => None,
            Value::Bool(b) => Some(JoinValue::Bool(*b)),
            Value::Int(v) => Some(JoinValue::Int(*v)),
            Value::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Some(JoinValue::Int(*v as i64)),
            Value::Float(v) => Some(JoinValue::Float(v.to_bits())),
            Value::Text(s) => Some(JoinValue::Text(s.clone())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Hashable projection of a non-null [`Value`].
///
/// Integral floats compare equal to integers, so `7` and `7.0` join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JoinValue {
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

/// Row-oriented table with named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from column names and rows, checking row widths
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(PipelineError::Schema(format!(
                "row {} has {} cells but the table has {} columns",
                idx,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of a column that must exist
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::Schema(format!("missing column `{name}`")))
    }

    /// All cells of a column, in row order
    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Append a column, or overwrite it in place if the name already exists
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(PipelineError::Schema(format!(
                "column `{}` has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Keep only the rows for which `keep` returns true
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Rows at the given positions, in the given order
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// New table holding the named columns in the given order
    pub fn select(&self, names: &[&str]) -> Result<Table> {
        let missing: Vec<&str> = names.iter().copied().filter(|n| !self.has_column(n)).collect();
        if !missing.is_empty() {
            return Err(PipelineError::Schema(format!(
                "missing columns: {}",
                missing.join(", ")
            )));
        }

        let indices: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        Ok(Table {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Zero value for a column, taken from its first non-null cell
    fn column_zero(&self, idx: usize) -> Value {
        self.rows
            .iter()
            .map(|row| &row[idx])
            .find(|v| !v.is_null())
            .map_or(Value::Int(0), Value::zero_like)
    }

    /// Replace every null with the zero of its column's type.
    ///
    /// Columns listed in `protected` keep their nulls. Returns the number of
    /// cells filled.
    pub fn fill_nulls(&mut self, protected: &[&str]) -> usize {
        let mut filled = 0;

        for idx in 0..self.columns.len() {
            if protected.contains(&self.columns[idx].as_str()) {
                continue;
            }

            let zero = self.column_zero(idx);
            for row in self.rows.iter_mut() {
                if row[idx].is_null() {
                    row[idx] = zero.clone();
                    filled += 1;
                }
            }
        }

        filled
    }

    /// Count of null cells across the table
    pub fn null_count(&self) -> usize {
        self.rows.iter().flatten().filter(|v| v.is_null()).count()
    }
}
