//! Table registry.
//!
//! Tables are shared with readers through `Rc`. A writer that appends while a
//! cursor still holds the previous `Rc` gets a private copy, so open cursors
//! keep seeing the rows they started with.

use crate::column_store::ColumnTable;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::reader::{Catalog, TableReader};
use strata_core::schema::TableSchema;
use strata_core::{Error, Result, RowId, Value};
use tracing::debug;

/// Registry of in-memory tables keyed by lower-cased name.
#[derive(Default)]
pub struct MemoryEngine {
    tables: BTreeMap<String, Rc<ColumnTable>>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table.
    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        let key = schema.name().to_ascii_lowercase();
        if self.tables.contains_key(&key) {
            return Err(Error::storage(format!(
                "Table already exists: {}",
                schema.name()
            )));
        }
        debug!(table = schema.name(), "create table");
        self.tables.insert(key, Rc::new(ColumnTable::new(schema)));
        Ok(())
    }

    /// Drops a table.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        match self.tables.remove(&name.to_ascii_lowercase()) {
            Some(_) => Ok(()),
            None => Err(Error::storage(format!("Table not found: {}", name))),
        }
    }

    /// Renames a table.
    pub fn rename_table(&mut self, from: &str, to: &str) -> Result<()> {
        let to_key = to.to_ascii_lowercase();
        if self.tables.contains_key(&to_key) {
            return Err(Error::storage(format!("Table already exists: {}", to)));
        }
        let mut table = self
            .tables
            .remove(&from.to_ascii_lowercase())
            .ok_or_else(|| Error::storage(format!("Table not found: {}", from)))?;
        Rc::make_mut(&mut table).rename(to);
        debug!(from, to, "rename table");
        self.tables.insert(to_key, table);
        Ok(())
    }

    /// Appends a row to the named table.
    pub fn append(&mut self, table: &str, values: Vec<Value>) -> Result<RowId> {
        self.table_mut(table)
            .ok_or_else(|| Error::storage(format!("Table not found: {}", table)))?
            .append(values)
    }

    /// Gets a writable table.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut ColumnTable> {
        self.tables
            .get_mut(&name.to_ascii_lowercase())
            .map(Rc::make_mut)
    }

    /// Checks if a table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    /// Returns all table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.values().map(|t| t.name()).collect()
    }
}

impl Catalog for MemoryEngine {
    fn table(&self, name: &str) -> Option<Rc<dyn TableReader>> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .map(|t| t.clone() as Rc<dyn TableReader>)
    }
}
