//! Query result and bind value types shared by the cache and executors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A bind parameter or a single cell of a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl SqlValue {
    /// Render the value as plain JSON, the way rows are handed to callers
    ///
    /// Bytes become lowercase hex, timestamps RFC 3339 strings. Non-finite
    /// floats have no JSON form and render as `null`.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Bytes(b) => Value::String(hex::encode(b)),
            SqlValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            SqlValue::Json(v) => v.clone(),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Column metadata of a result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as reported by the database
    pub name: String,
    /// Database type name (e.g. `int4`, `text`)
    pub type_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Result of executing one statement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column metadata, in select-list order
    pub columns: Vec<Column>,
    /// Rows, each with one value per column
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows affected, for statements that report it
    pub rows_affected: Option<u64>,
}

impl QueryResult {
    /// Create a row-returning result
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: None,
        }
    }

    /// Create a result for a statement that only reports affected rows
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(rows_affected),
        }
    }

    /// Number of rows in the result
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Render rows as a JSON array of objects keyed by column name
    pub fn to_json_records(&self) -> Value {
        let records = self
            .rows
            .iter()
            .map(|row| {
                let mut record = Map::with_capacity(self.columns.len());
                for (column, value) in self.columns.iter().zip(row) {
                    record.insert(column.name.clone(), value.to_json());
                }
                Value::Object(record)
            })
            .collect();
        Value::Array(records)
    }
}
