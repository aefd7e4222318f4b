//! Models of the DDL statements.

use super::{ModelId, OrderedMap};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use strata_core::schema::{ColumnMeta, PartitionBy, RecordMetadata, TableSchema, TableSchemaBuilder};
use strata_core::{DataType, Error, Result};

/// One column of a `CREATE TABLE` field list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTableColumn {
    pub name: String,
    pub position: usize,
    pub data_type: DataType,
    pub indexed: bool,
    pub index_block_size: usize,
}

/// `cast(col as type [count n])` of a `CREATE TABLE ... AS` statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnCastModel {
    pub name: String,
    pub position: usize,
    pub data_type: DataType,
    pub type_position: usize,
    /// Distinct value hint of a symbol column.
    pub count: Option<usize>,
}

/// `index(col [block size n])` that names a column of the source query.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingIndex {
    position: usize,
    block_size: usize,
}

/// `CREATE TABLE name (...)` or `CREATE TABLE name AS (select ...)`.
#[derive(Clone, Debug)]
pub struct CreateTableModel {
    pub name: String,
    pub name_position: usize,
    pub columns: Vec<CreateTableColumn>,
    pub casts: OrderedMap<ColumnCastModel>,
    /// Source query of `AS (...)`.
    pub query: Option<ModelId>,
    pub timestamp: Option<(String, usize)>,
    pub partition_by: PartitionBy,
    pub record_hint: Option<usize>,
    indexes: OrderedMap<PendingIndex>,
}

impl CreateTableModel {
    /// Creates a model for table `name`.
    pub fn new(name: impl Into<String>, name_position: usize) -> Self {
        Self {
            name: name.into(),
            name_position,
            columns: Vec::new(),
            casts: OrderedMap::default(),
            query: None,
            timestamp: None,
            partition_by: PartitionBy::None,
            record_hint: None,
            indexes: OrderedMap::default(),
        }
    }

    /// Appends a column. Returns false when the name is taken.
    pub fn add_column(&mut self, name: &str, position: usize, data_type: DataType, block_size: usize) -> bool {
        if self.column_index(name).is_some() {
            return false;
        }
        self.columns.push(CreateTableColumn {
            name: name.to_string(),
            position,
            data_type,
            indexed: false,
            index_block_size: block_size,
        });
        true
    }

    /// Position of a field list column, ignoring case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Marks the field list column at `index` as indexed.
    pub fn set_index_flags(&mut self, index: usize, indexed: bool, block_size: usize) {
        let column = &mut self.columns[index];
        column.indexed = indexed;
        column.index_block_size = block_size;
    }

    /// Requests an index on a column of the source query.
    pub fn add_query_index(&mut self, name: &str, position: usize, block_size: usize) {
        self.indexes.insert(
            name.to_ascii_lowercase(),
            PendingIndex {
                position,
                block_size,
            },
        );
    }

    /// Adds a cast. Returns false when the column already has one.
    pub fn add_cast(&mut self, cast: ColumnCastModel) -> bool {
        let key = cast.name.to_ascii_lowercase();
        if self.casts.contains_key(&key) {
            return false;
        }
        self.casts.insert(key, cast);
        true
    }

    /// Builds the table schema. `source` describes the result of the
    /// `AS (...)` query and is ignored for field list statements.
    pub fn to_schema(&self, source: Option<&dyn RecordMetadata>) -> Result<TableSchema> {
        let mut columns: Vec<ColumnMeta> = Vec::new();
        match source {
            Some(meta) if self.query.is_some() => {
                for cast in self.casts.values() {
                    if meta.column_index_quiet(&cast.name).is_none() {
                        return Err(Error::invalid_column(cast.position, &cast.name));
                    }
                }
                for (name, index) in &self.indexes {
                    if meta.column_index_quiet(name).is_none() {
                        return Err(Error::invalid_column(index.position, name));
                    }
                }
                for i in 0..meta.column_count() {
                    let name = meta.column_name(i);
                    let key = name.to_ascii_lowercase();
                    let mut column = match self.casts.get(&key) {
                        Some(cast) => ColumnMeta::new(name, cast.data_type)
                            .bucket_count(cast.count.unwrap_or(0)),
                        None => ColumnMeta::new(name, meta.column_type(i)),
                    };
                    if let Some(index) = self.indexes.get(&key) {
                        if !column.data_type().is_indexable() {
                            return Err(Error::parse(index.position, "indexes are supported only for SYMBOL, STRING, INT and LONG"));
                        }
                        column = column
                            .indexed(true)
                            .index_block_size(index.block_size.next_power_of_two());
                    }
                    columns.push(column);
                }
            }
            _ => {
                for c in &self.columns {
                    columns.push(
                        ColumnMeta::new(c.name.as_str(), c.data_type)
                            .indexed(c.indexed)
                            .index_block_size(c.index_block_size.next_power_of_two()),
                    );
                }
            }
        }

        if let Some((ts, position)) = &self.timestamp {
            match columns.iter().find(|c| c.name().eq_ignore_ascii_case(ts)) {
                None => return Err(Error::invalid_column(*position, ts)),
                Some(c) if c.data_type() != DataType::Timestamp => {
                    return Err(Error::parse(*position, "TIMESTAMP column expected"))
                }
                Some(_) => {}
            }
        }

        let mut builder = TableSchemaBuilder::new(self.name.as_str())?;
        for column in columns {
            builder = builder.add(column)?;
        }
        if let Some((ts, _)) = &self.timestamp {
            builder = builder.timestamp(ts.as_str());
        }
        builder.partition_by(self.partition_by).build()
    }
}

/// `RENAME TABLE from TO to`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameTableModel {
    pub from: String,
    pub from_position: usize,
    pub to: String,
    pub to_position: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_list_schema() {
        let mut model = CreateTableModel::new("quotes", 13);
        assert!(model.add_column("sym", 20, DataType::Symbol, 256));
        assert!(model.add_column("ts", 31, DataType::Timestamp, 256));
        assert!(!model.add_column("SYM", 40, DataType::Int, 256));
        model.set_index_flags(0, true, 100);
        model.timestamp = Some(("ts".into(), 60));
        model.partition_by = PartitionBy::Day;

        let schema = model.to_schema(None).unwrap();
        assert_eq!(schema.timestamp_index(), Some(1));
        assert!(schema.is_indexed(0));
        assert_eq!(schema.columns()[0].get_index_block_size(), 128);
    }

    #[test]
    fn test_timestamp_must_exist() {
        let mut model = CreateTableModel::new("t", 13);
        model.add_column("x", 16, DataType::Int, 256);
        model.timestamp = Some(("ts".into(), 30));
        let err = model.to_schema(None).unwrap_err();
        assert_eq!(err.position(), Some(30));

        model.timestamp = Some(("x".into(), 30));
        assert!(model.to_schema(None).is_err());
    }

    #[test]
    fn test_casts_over_query_metadata() {
        let source = TableSchemaBuilder::new("src")
            .unwrap()
            .add_column("a", DataType::String)
            .unwrap()
            .add_column("b", DataType::Long)
            .unwrap()
            .build()
            .unwrap();

        let mut model = CreateTableModel::new("dst", 13);
        model.query = Some(crate::model::ModelArena::new().alloc());
        assert!(model.add_cast(ColumnCastModel {
            name: "a".into(),
            position: 40,
            data_type: DataType::Symbol,
            type_position: 45,
            count: Some(30),
        }));
        assert!(!model.add_cast(ColumnCastModel {
            name: "A".into(),
            position: 60,
            data_type: DataType::String,
            type_position: 65,
            count: None,
        }));
        model.add_query_index("a", 70, 64);

        let schema = model.to_schema(Some(&source)).unwrap();
        assert_eq!(schema.column_type(0), DataType::Symbol);
        assert_eq!(schema.bucket_count(0), 30);
        assert!(schema.is_indexed(0));
        assert_eq!(schema.column_type(1), DataType::Long);

        model.add_query_index("zz", 90, 64);
        assert_eq!(model.to_schema(Some(&source)).unwrap_err().position(), Some(90));
    }
}
