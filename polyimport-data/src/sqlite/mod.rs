//! SQLite attribute store.
//!
//! Tables are created from the pipeline's [`TableSchema`] with the key column
//! first. Inserts for a table run inside an explicit `BEGIN`/`COMMIT` pair
//! opened by [`AttributeStore::begin`]; the unique key index is created after
//! all rows are written so duplicate keys surface as an index failure.
#![forbid(unsafe_code)]

mod primitives;

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use polyimport_core::{AttributeStore, AttributeValue, ColumnType, StoreError, TableSchema};
use rusqlite::{Connection, Error as SqliteError, params_from_iter, types::Value as SqlValue};
use thiserror::Error;

/// Errors raised by [`SqliteAttributeStore`].
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Failed to create the parent directory for the database file.
    #[error("failed to create parent directory for {path:?}")]
    CreateDirectory {
        /// Database path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A statement failed to prepare or execute.
    #[error("SQLite statement failed: {statement}")]
    Statement {
        /// The SQL text.
        statement: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A row was written to a table this store did not create.
    #[error("table <{table}> was not created by this store")]
    UnknownTable {
        /// Table name.
        table: String,
    },
    /// `begin` was called while another table's transaction is open.
    #[error("transaction for table <{open}> is still open")]
    TransactionOpen {
        /// Table owning the open transaction.
        open: String,
    },
    /// `commit` was called without a matching `begin`.
    #[error("no open transaction for table <{table}>")]
    NoTransaction {
        /// Table named in the commit.
        table: String,
    },
    /// A row does not have one value per schema column.
    #[error("row for table <{table}> has {found} values, expected {expected}")]
    RowWidth {
        /// Table name.
        table: String,
        /// Number of schema columns.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },
    /// Serializing primitive coordinates or categories to JSON failed.
    #[error("failed to serialize primitive {index}")]
    Serialize {
        /// Position of the primitive in the written slice.
        index: usize,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
}

/// [`AttributeStore`] writing to a SQLite database.
#[derive(Debug)]
pub struct SqliteAttributeStore {
    connection: Connection,
    schemas: HashMap<String, TableSchema>,
    open_transaction: Option<String>,
}

impl SqliteAttributeStore {
    /// Open or create a database file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::CreateDirectory`] or
    /// [`SqliteStoreError::Open`].
    pub fn open(path: &Utf8Path) -> Result<Self, SqliteStoreError> {
        polyimport_fs::ensure_parent_dir(path).map_err(|source| {
            SqliteStoreError::CreateDirectory {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let connection =
            Connection::open(path.as_std_path()).map_err(|source| SqliteStoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Opened attribute database {path}");
        Ok(Self::with_connection(connection))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Open`] when SQLite cannot allocate it.
    pub fn in_memory() -> Result<Self, SqliteStoreError> {
        let connection = Connection::open_in_memory().map_err(|source| SqliteStoreError::Open {
            path: Utf8PathBuf::from(":memory:"),
            source,
        })?;
        Ok(Self::with_connection(connection))
    }

    fn with_connection(connection: Connection) -> Self {
        Self {
            connection,
            schemas: HashMap::new(),
            open_transaction: None,
        }
    }

    /// The underlying connection, for queries outside the store contract.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    fn execute(&self, statement: &str) -> Result<(), SqliteStoreError> {
        self.connection
            .execute_batch(statement)
            .map_err(|source| SqliteStoreError::Statement {
                statement: statement.to_owned(),
                source,
            })
    }

    fn create(&mut self, schema: &TableSchema) -> Result<(), SqliteStoreError> {
        let mut columns = vec![format!("{} integer", quote(&schema.key_column))];
        columns.extend(schema.columns.iter().map(|column| {
            format!("{} {}", quote(&column.name), sql_type(column.column_type))
        }));
        self.execute(&format!(
            "CREATE TABLE {} ({})",
            quote(&schema.name),
            columns.join(", ")
        ))?;
        self.schemas.insert(schema.name.clone(), schema.clone());
        Ok(())
    }

    fn begin_table(&mut self, table: &str) -> Result<(), SqliteStoreError> {
        if let Some(open) = &self.open_transaction {
            return Err(SqliteStoreError::TransactionOpen { open: open.clone() });
        }
        self.execute("BEGIN")?;
        self.open_transaction = Some(table.to_owned());
        Ok(())
    }

    fn insert(
        &self,
        table: &str,
        cat: i64,
        values: &[AttributeValue],
    ) -> Result<(), SqliteStoreError> {
        let schema = self
            .schemas
            .get(table)
            .ok_or_else(|| SqliteStoreError::UnknownTable {
                table: table.to_owned(),
            })?;
        if values.len() != schema.columns.len() {
            return Err(SqliteStoreError::RowWidth {
                table: table.to_owned(),
                expected: schema.columns.len(),
                found: values.len(),
            });
        }
        let names = std::iter::once(quote(&schema.key_column))
            .chain(schema.columns.iter().map(|column| quote(&column.name)))
            .collect::<Vec<_>>();
        let placeholders = (1..=names.len())
            .map(|n| format!("?{n}"))
            .collect::<Vec<_>>();
        let statement = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table),
            names.join(", "),
            placeholders.join(", ")
        );
        let params = std::iter::once(SqlValue::Integer(cat)).chain(values.iter().map(sql_value));
        self.connection
            .prepare_cached(&statement)
            .and_then(|mut prepared| prepared.execute(params_from_iter(params)))
            .map(|_| ())
            .map_err(|source| SqliteStoreError::Statement { statement, source })
    }

    fn commit_table(&mut self, table: &str) -> Result<(), SqliteStoreError> {
        if self.open_transaction.as_deref() != Some(table) {
            return Err(SqliteStoreError::NoTransaction {
                table: table.to_owned(),
            });
        }
        self.execute("COMMIT")?;
        self.open_transaction = None;
        Ok(())
    }

    fn index(&self, table: &str, key_column: &str) -> Result<(), SqliteStoreError> {
        self.execute(&format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            quote(&format!("{table}_{key_column}")),
            quote(table),
            quote(key_column)
        ))
    }
}

/// Quote an identifier, doubling embedded quotes.
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// SQLite has one integer storage class; 64-bit keys need no wider type.
fn sql_type(column_type: ColumnType) -> String {
    match column_type {
        ColumnType::BigInteger => ColumnType::Integer.to_string(),
        other => other.to_string(),
    }
}

fn sql_value(value: &AttributeValue) -> SqlValue {
    match value {
        AttributeValue::Null => SqlValue::Null,
        AttributeValue::Integer(int) => SqlValue::Integer(*int),
        AttributeValue::Real(real) => SqlValue::Real(*real),
        AttributeValue::Text(text) => SqlValue::Text(text.clone()),
    }
}

impl AttributeStore for SqliteAttributeStore {
    fn create_table(&mut self, schema: &TableSchema) -> Result<(), StoreError> {
        self.create(schema)
            .map_err(|err| StoreError::new("create table", &schema.name, err))
    }

    fn begin(&mut self, table: &str) -> Result<(), StoreError> {
        self.begin_table(table)
            .map_err(|err| StoreError::new("begin transaction", table, err))
    }

    fn insert_row(
        &mut self,
        table: &str,
        cat: i64,
        values: &[AttributeValue],
    ) -> Result<(), StoreError> {
        self.insert(table, cat, values)
            .map_err(|err| StoreError::new("insert row", table, err))
    }

    fn commit(&mut self, table: &str) -> Result<(), StoreError> {
        self.commit_table(table)
            .map_err(|err| StoreError::new("commit transaction", table, err))
    }

    fn create_category_index(&mut self, table: &str, key_column: &str) -> Result<(), StoreError> {
        self.index(table, key_column)
            .map_err(|err| StoreError::new("create index", table, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyimport_core::ColumnDefn;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> SqliteAttributeStore {
        SqliteAttributeStore::in_memory().expect("in-memory database")
    }

    #[fixture]
    fn schema() -> TableSchema {
        TableSchema {
            name: "parcels".into(),
            key_column: "cat".into(),
            columns: vec![
                ColumnDefn {
                    name: "zone".into(),
                    column_type: ColumnType::Varchar(8),
                },
                ColumnDefn {
                    name: "area".into(),
                    column_type: ColumnType::DoublePrecision,
                },
                ColumnDefn {
                    name: "owner".into(),
                    column_type: ColumnType::BigInteger,
                },
            ],
        }
    }

    fn write_rows(store: &mut SqliteAttributeStore, rows: &[(i64, &str)]) -> Result<(), StoreError> {
        store.begin("parcels")?;
        for (cat, zone) in rows {
            store.insert_row(
                "parcels",
                *cat,
                &[
                    AttributeValue::Text((*zone).to_owned()),
                    AttributeValue::Real(1.5),
                    AttributeValue::Null,
                ],
            )?;
        }
        store.commit("parcels")
    }

    #[rstest]
    fn writes_rows_and_indexes_keys(mut store: SqliteAttributeStore, schema: TableSchema) {
        store.create_table(&schema).expect("create");
        write_rows(&mut store, &[(1, "R1"), (2, "C2")]).expect("rows");
        store
            .create_category_index("parcels", "cat")
            .expect("index");

        let rows: Vec<(i64, String, f64, Option<i64>)> = store
            .connection()
            .prepare("SELECT cat, zone, area, owner FROM parcels ORDER BY cat")
            .and_then(|mut statement| {
                statement
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
                    .collect()
            })
            .expect("query");
        assert_eq!(
            rows,
            vec![(1, "R1".into(), 1.5, None), (2, "C2".into(), 1.5, None)]
        );
    }

    #[rstest]
    fn duplicate_keys_fail_the_index(mut store: SqliteAttributeStore, schema: TableSchema) {
        store.create_table(&schema).expect("create");
        write_rows(&mut store, &[(4, "R1"), (4, "R2")]).expect("rows");
        let error = store
            .create_category_index("parcels", "cat")
            .expect_err("duplicate keys");
        assert_eq!(error.operation, "create index");
        assert_eq!(error.table, "parcels");
    }

    #[rstest]
    fn rejects_misuse_of_transactions(mut store: SqliteAttributeStore, schema: TableSchema) {
        store.create_table(&schema).expect("create");
        assert!(store.commit("parcels").is_err());
        store.begin("parcels").expect("begin");
        assert!(store.begin("other").is_err());
        assert!(store.insert_row("other", 1, &[]).is_err());
        assert!(store.insert_row("parcels", 1, &[]).is_err());
        store.commit("parcels").expect("commit");
    }

    #[rstest]
    fn quotes_identifiers(mut store: SqliteAttributeStore) {
        let schema = TableSchema {
            name: "odd \"name\"".into(),
            key_column: "cat".into(),
            columns: vec![ColumnDefn {
                name: "order".into(),
                column_type: ColumnType::Integer,
            }],
        };
        store.create_table(&schema).expect("create");
        store.begin("odd \"name\"").expect("begin");
        store
            .insert_row("odd \"name\"", 1, &[AttributeValue::Integer(3)])
            .expect("insert");
        store.commit("odd \"name\"").expect("commit");
        let value: i64 = store
            .connection()
            .query_row("SELECT \"order\" FROM \"odd \"\"name\"\"\"", [], |row| row.get(0))
            .expect("query");
        assert_eq!(value, 3);
    }

    #[rstest]
    #[case(ColumnType::BigInteger, "integer")]
    #[case(ColumnType::DoublePrecision, "double precision")]
    #[case(ColumnType::Varchar(12), "varchar(12)")]
    fn renders_column_types(#[case] column_type: ColumnType, #[case] expected: &str) {
        assert_eq!(sql_type(column_type), expected);
    }
}
