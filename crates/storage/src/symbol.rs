//! Symbol dictionaries for indexed and SYMBOL columns.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;
use strata_core::reader::{SymbolTable, VALUE_IS_NULL, VALUE_NOT_FOUND};

/// Append-only value dictionary. Keys are dense and start at 0.
#[derive(Clone, Debug, Default)]
pub struct SymbolMap {
    keys: HashMap<String, i32>,
    values: Vec<String>,
}

impl SymbolMap {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key of `value`, adding it when unseen.
    pub fn put(&mut self, value: Option<&str>) -> i32 {
        let value = match value {
            None => return VALUE_IS_NULL,
            Some(v) => v,
        };
        if let Some(&key) = self.keys.get(value) {
            return key;
        }
        let key = self.values.len() as i32;
        self.values.push(value.to_string());
        self.keys.insert(value.to_string(), key);
        key
    }
}

impl SymbolTable for SymbolMap {
    fn key_of(&self, value: &str) -> i32 {
        self.keys.get(value).copied().unwrap_or(VALUE_NOT_FOUND)
    }

    fn value_of(&self, key: i32) -> Option<&str> {
        if key < 0 {
            return None;
        }
        self.values.get(key as usize).map(|s| s.as_str())
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_is_idempotent() {
        let mut map = SymbolMap::new();
        assert_eq!(map.put(Some("A")), 0);
        assert_eq!(map.put(Some("B")), 1);
        assert_eq!(map.put(Some("A")), 0);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_lookup() {
        let mut map = SymbolMap::new();
        map.put(Some("x"));
        assert_eq!(map.key_of("x"), 0);
        assert_eq!(map.key_of("y"), VALUE_NOT_FOUND);
        assert_eq!(map.value_of(0), Some("x"));
        assert_eq!(map.value_of(VALUE_IS_NULL), None);
    }

    #[test]
    fn test_null_key() {
        let mut map = SymbolMap::new();
        assert_eq!(map.put(None), VALUE_IS_NULL);
        assert!(map.is_empty());
    }
}
