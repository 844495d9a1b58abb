//! Persistence of the final vector primitives next to the attribute tables.

use polyimport_core::Primitive;
use rusqlite::Transaction;
use serde_json::to_string;

use super::{SqliteAttributeStore, SqliteStoreError, quote};

impl SqliteAttributeStore {
    /// Replace `table` with one row per primitive.
    ///
    /// Rows hold the primitive kind, its vertices as a JSON array of
    /// `[x, y]` pairs and its category links as a JSON array of
    /// `{"field", "cat"}` objects. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::TransactionOpen`] while an attribute
    /// transaction is open, [`SqliteStoreError::Serialize`] when a primitive
    /// cannot be encoded and [`SqliteStoreError::Statement`] for SQLite
    /// failures.
    pub fn persist_primitives(
        &mut self,
        table: &str,
        primitives: &[Primitive],
    ) -> Result<usize, SqliteStoreError> {
        if let Some(open) = &self.open_transaction {
            return Err(SqliteStoreError::TransactionOpen { open: open.clone() });
        }
        let transaction = self
            .connection
            .transaction()
            .map_err(|source| statement_error("BEGIN", source))?;
        create_schema(&transaction, table)?;
        let written = persist_rows(&transaction, table, primitives)?;
        transaction
            .commit()
            .map_err(|source| statement_error("COMMIT", source))?;
        Ok(written)
    }
}

fn statement_error(statement: &str, source: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Statement {
        statement: statement.to_owned(),
        source,
    }
}

fn create_schema(transaction: &Transaction<'_>, table: &str) -> Result<(), SqliteStoreError> {
    let statement = format!(
        "DROP TABLE IF EXISTS {name};
         CREATE TABLE {name} (
            id INTEGER PRIMARY KEY,
            kind TEXT NOT NULL,
            coordinates TEXT NOT NULL,
            categories TEXT NOT NULL
         )",
        name = quote(table)
    );
    transaction
        .execute_batch(&statement)
        .map_err(|source| statement_error(&statement, source))
}

fn persist_rows(
    transaction: &Transaction<'_>,
    table: &str,
    primitives: &[Primitive],
) -> Result<usize, SqliteStoreError> {
    let statement = format!(
        "INSERT INTO {} (kind, coordinates, categories) VALUES (?1, ?2, ?3)",
        quote(table)
    );
    let mut insert = transaction
        .prepare(&statement)
        .map_err(|source| statement_error(&statement, source))?;
    for (index, primitive) in primitives.iter().enumerate() {
        let coordinates: Vec<[f64; 2]> = primitive.coords.0.iter().map(|c| [c.x, c.y]).collect();
        let coordinates = to_string(&coordinates)
            .map_err(|source| SqliteStoreError::Serialize { index, source })?;
        let categories = to_string(&primitive.cats)
            .map_err(|source| SqliteStoreError::Serialize { index, source })?;
        insert
            .execute((primitive.kind.as_str(), coordinates, categories))
            .map_err(|source| statement_error(&statement, source))?;
    }
    Ok(primitives.len())
}
