//! Contract for the attribute store receiving one row per category.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Column type of an attribute table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// Double precision float.
    DoublePrecision,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    DateTime,
    /// Character string of bounded width.
    Varchar(u32),
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::BigInteger => f.write_str("bigint"),
            Self::DoublePrecision => f.write_str("double precision"),
            Self::Date => f.write_str("date"),
            Self::Time => f.write_str("time"),
            Self::DateTime => f.write_str("datetime"),
            Self::Varchar(width) => write!(f, "varchar({width})"),
        }
    }
}

/// One column of an attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefn {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
}

/// Layout of an attribute table. The key column comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Name of the integer category column.
    pub key_column: String,
    /// Attribute columns after the key column.
    pub columns: Vec<ColumnDefn>,
}

/// Value bound into an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// SQL `NULL`.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
}

/// Failure reported by an [`AttributeStore`].
#[derive(Debug, Error)]
#[error("failed to {operation} for table <{table}>")]
pub struct StoreError {
    /// Operation that failed, e.g. `create table`.
    pub operation: &'static str,
    /// Table being written.
    pub table: String,
    /// Backend failure.
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

impl StoreError {
    /// Wrap a backend error.
    pub fn new(
        operation: &'static str,
        table: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            table: table.into(),
            source: source.into(),
        }
    }
}

/// Destination of attribute rows.
pub trait AttributeStore {
    /// Create a table for `schema`.
    fn create_table(&mut self, schema: &TableSchema) -> Result<(), StoreError>;

    /// Open a transaction covering subsequent inserts into `table`.
    fn begin(&mut self, table: &str) -> Result<(), StoreError>;

    /// Insert one row keyed by `cat`; `values` align with the schema columns.
    fn insert_row(
        &mut self,
        table: &str,
        cat: i64,
        values: &[AttributeValue],
    ) -> Result<(), StoreError>;

    /// Commit the open transaction.
    fn commit(&mut self, table: &str) -> Result<(), StoreError>;

    /// Create a unique index on the key column. Fails on duplicate keys.
    fn create_category_index(&mut self, table: &str, key_column: &str) -> Result<(), StoreError>;
}
