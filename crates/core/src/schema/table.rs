//! Table definition and builder.

use super::column::ColumnMeta;
use super::metadata::RecordMetadata;
use crate::error::{Error, Result};
use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// Partitioning scheme of a timestamped table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PartitionBy {
    /// Single partition.
    #[default]
    None,
    /// One partition per calendar day.
    Day,
    /// One partition per calendar month.
    Month,
    /// One partition per calendar year.
    Year,
}

impl PartitionBy {
    /// Parses a partition keyword, ignoring case.
    pub fn from_name(name: &str) -> Option<PartitionBy> {
        if name.eq_ignore_ascii_case("none") {
            Some(PartitionBy::None)
        } else if name.eq_ignore_ascii_case("day") {
            Some(PartitionBy::Day)
        } else if name.eq_ignore_ascii_case("month") {
            Some(PartitionBy::Month)
        } else if name.eq_ignore_ascii_case("year") {
            Some(PartitionBy::Year)
        } else {
            None
        }
    }
}

/// A table definition.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableSchema {
    /// Table name.
    name: String,
    /// Column definitions.
    columns: Vec<ColumnMeta>,
    /// Designated timestamp column.
    timestamp_index: Option<usize>,
    /// Partitioning scheme.
    partition_by: PartitionBy,
}

impl TableSchema {
    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Gets a column by name, ignoring case.
    pub fn get_column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Returns the partitioning scheme.
    #[inline]
    pub fn partition_by(&self) -> PartitionBy {
        self.partition_by
    }

    /// Returns a copy of this schema under a new name.
    pub fn renamed(&self, name: impl Into<String>) -> TableSchema {
        TableSchema {
            name: name.into(),
            ..self.clone()
        }
    }
}

impl RecordMetadata for TableSchema {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_type(&self, index: usize) -> DataType {
        self.columns[index].data_type()
    }

    fn column_name(&self, index: usize) -> &str {
        self.columns[index].name()
    }

    fn column_index_quiet(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
    }

    fn is_indexed(&self, index: usize) -> bool {
        self.columns[index].is_indexed()
    }

    fn bucket_count(&self, index: usize) -> usize {
        self.columns[index].get_bucket_count()
    }

    fn timestamp_index(&self) -> Option<usize> {
        self.timestamp_index
    }
}

/// Builder for table definitions.
pub struct TableSchemaBuilder {
    name: String,
    columns: Vec<ColumnMeta>,
    timestamp: Option<String>,
    partition_by: PartitionBy,
}

impl TableSchemaBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            timestamp: None,
            partition_by: PartitionBy::None,
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let first = match name.chars().next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a plain column.
    pub fn add_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.add(ColumnMeta::new(name, data_type))
    }

    /// Adds an indexed column with a distinct value count hint.
    pub fn add_indexed(
        self,
        name: impl Into<String>,
        data_type: DataType,
        bucket_count: usize,
    ) -> Result<Self> {
        self.add(
            ColumnMeta::new(name, data_type)
                .indexed(true)
                .bucket_count(bucket_count),
        )
    }

    /// Adds a fully specified column.
    pub fn add(mut self, column: ColumnMeta) -> Result<Self> {
        Self::check_naming_rules(column.name())?;
        if self
            .columns
            .iter()
            .any(|c| c.name().eq_ignore_ascii_case(column.name()))
        {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                column.name()
            )));
        }
        if column.is_indexed() && !column.data_type().is_indexable() {
            return Err(Error::invalid_schema(format!(
                "Column is not indexable: {}",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Designates the timestamp column.
    pub fn timestamp(mut self, name: impl Into<String>) -> Self {
        self.timestamp = Some(name.into());
        self
    }

    /// Sets the partitioning scheme.
    pub fn partition_by(mut self, partition_by: PartitionBy) -> Self {
        self.partition_by = partition_by;
        self
    }

    /// Builds the table definition.
    pub fn build(self) -> Result<TableSchema> {
        let columns: Vec<ColumnMeta> = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with_index(i))
            .collect();

        let timestamp_index = match &self.timestamp {
            None => None,
            Some(ts) => {
                let column = columns
                    .iter()
                    .find(|c| c.name().eq_ignore_ascii_case(ts))
                    .ok_or_else(|| Error::invalid_schema(format!("Column not found: {}", ts)))?;
                if column.data_type() != DataType::Timestamp {
                    return Err(Error::invalid_schema(format!(
                        "Designated timestamp must be TIMESTAMP: {}",
                        ts
                    )));
                }
                Some(column.index())
            }
        };

        if self.partition_by != PartitionBy::None && timestamp_index.is_none() {
            return Err(Error::invalid_schema(
                "Partitioning requires a designated timestamp",
            ));
        }

        Ok(TableSchema {
            name: self.name,
            columns,
            timestamp_index,
            partition_by: self.partition_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builder() {
        let table = TableSchemaBuilder::new("trades")
            .unwrap()
            .add_indexed("sym", DataType::Symbol, 4)
            .unwrap()
            .add_column("price", DataType::Double)
            .unwrap()
            .add_column("ts", DataType::Timestamp)
            .unwrap()
            .timestamp("ts")
            .partition_by(PartitionBy::Day)
            .build()
            .unwrap();

        assert_eq!(table.name(), "trades");
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.timestamp_index(), Some(2));
        assert!(table.is_indexed(0));
        assert_eq!(table.bucket_count(0), 4);
        assert_eq!(table.column_index_quiet("PRICE"), Some(1));
        assert_eq!(table.column_index_quiet("missing"), None);
    }

    #[test]
    fn test_invalid_column_name() {
        let result = TableSchemaBuilder::new("t")
            .unwrap()
            .add_column("123invalid", DataType::Int);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_column() {
        let result = TableSchemaBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Long)
            .unwrap()
            .add_column("ID", DataType::Long);
        assert!(result.is_err());
    }

    #[test]
    fn test_timestamp_must_be_timestamp() {
        let result = TableSchemaBuilder::new("t")
            .unwrap()
            .add_column("d", DataType::Date)
            .unwrap()
            .timestamp("d")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_partition_requires_timestamp() {
        let result = TableSchemaBuilder::new("t")
            .unwrap()
            .add_column("x", DataType::Int)
            .unwrap()
            .partition_by(PartitionBy::Month)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_double_is_not_indexable() {
        let result = TableSchemaBuilder::new("t")
            .unwrap()
            .add_indexed("x", DataType::Double, 0);
        assert!(result.is_err());
    }
}
