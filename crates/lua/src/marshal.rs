//! Marshalling helpers for reading Lua tables back into Rust
//!
//! The cache loader and the script host both consume tables of strings;
//! these helpers walk them as unordered maps, ordered lists, or single
//! fields with a typed missing-field error.

use std::collections::BTreeMap;

use mlua::Table;

use crate::{Error, Result};

/// Walk a table as an unordered `{string → string}` mapping.
///
/// Non-string keys and values are interpreter errors, matching what the
/// cache format promises.
pub fn table_to_string_map(table: &Table) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for pair in table.clone().pairs::<String, String>() {
        let (key, value) = pair?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Walk a list-shaped table as an ordered sequence of strings.
pub fn table_to_string_list(table: &Table) -> Result<Vec<String>> {
    let mut list = Vec::new();
    for value in table.clone().sequence_values::<String>() {
        list.push(value?);
    }
    Ok(list)
}

/// Read a required string field from a table.
pub fn get_string_field(table: &Table, key: &str) -> Result<String> {
    match table.get::<Option<String>>(key)? {
        Some(value) => Ok(value),
        None => Err(Error::MissingField(key.to_string())),
    }
}

/// Read an optional string field from a table.
pub fn opt_string_field(table: &Table, key: &str) -> Result<Option<String>> {
    Ok(table.get::<Option<String>>(key)?)
}

/// Read a required integer field from a table.
pub fn get_integer_field(table: &Table, key: &str) -> Result<i64> {
    match table.get::<Option<i64>>(key)? {
        Some(value) => Ok(value),
        None => Err(Error::MissingField(key.to_string())),
    }
}
