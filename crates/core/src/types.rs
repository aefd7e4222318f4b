//! Column data types.

/// Column types understood by the compiler and the storage layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    /// true/false
    Boolean,
    /// 8-bit signed integer
    Byte,
    /// 16-bit signed integer
    Short,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
    /// Dictionary-encoded string
    Symbol,
    /// Milliseconds since epoch
    Date,
    /// Microseconds since epoch
    Timestamp,
    /// Opaque bytes
    Binary,
}

impl DataType {
    /// All types, in declaration order.
    pub const ALL: [DataType; 12] = [
        DataType::Boolean,
        DataType::Byte,
        DataType::Short,
        DataType::Int,
        DataType::Long,
        DataType::Float,
        DataType::Double,
        DataType::String,
        DataType::Symbol,
        DataType::Date,
        DataType::Timestamp,
        DataType::Binary,
    ];

    /// Returns the SQL name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Byte => "BYTE",
            DataType::Short => "SHORT",
            DataType::Int => "INT",
            DataType::Long => "LONG",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::String => "STRING",
            DataType::Symbol => "SYMBOL",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Binary => "BINARY",
        }
    }

    /// Looks up a type by its SQL name, ignoring case.
    pub fn from_name(name: &str) -> Option<DataType> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Returns whether arithmetic applies to this type.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Byte
                | DataType::Short
                | DataType::Int
                | DataType::Long
                | DataType::Float
                | DataType::Double
        )
    }

    /// Returns whether this type can carry a bitmap index.
    pub fn is_indexable(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Long | DataType::String | DataType::Symbol
        )
    }

    /// Returns whether values of this type are strings at runtime.
    pub fn is_textual(&self) -> bool {
        matches!(self, DataType::String | DataType::Symbol)
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
