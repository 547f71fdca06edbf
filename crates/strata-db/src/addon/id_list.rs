//! Id-list add-on
//!
//! Stores a list of numeric identifiers as a single delimiter-joined text
//! column: `[1, 2, 3]` is written as `"1-2-3"` and split back on read.
//! Null entries are filtered before joining. The field opts out of
//! default insert/read mapping so the default row mapper never touches
//! the joined representation.

use serde_json::Value as JsonValue;

use crate::addon::FieldAddOn;
use crate::descriptor::FieldDescriptor;
use crate::error::{DataError, DataResult};
use crate::value::{ColumnType, FieldValue};

const SEPARATOR: char = '-';

/// Handler for fields tagged `id-list`
#[derive(Debug, Default)]
pub struct IdListAddOn;

impl IdListAddOn {
    pub fn new() -> Self {
        Self
    }

    /// Join the non-null ids with the separator
    fn join_ids(ids: &[JsonValue]) -> DataResult<String> {
        let mut parts = Vec::with_capacity(ids.len());
        for id in ids {
            if id.is_null() {
                continue;
            }
            let id = id.as_i64().ok_or_else(|| {
                DataError::Mapping(format!("id-list entries must be integers, got {id}"))
            })?;
            parts.push(id.to_string());
        }
        Ok(parts.join(&SEPARATOR.to_string()))
    }
}

impl FieldAddOn for IdListAddOn {
    fn tag(&self) -> &'static str {
        "id-list"
    }

    fn column_type(&self, _field: &FieldDescriptor) -> ColumnType {
        ColumnType::Text
    }

    fn include_in_insert(&self) -> bool {
        false
    }

    fn include_in_read(&self) -> bool {
        false
    }

    fn encode(&self, value: &JsonValue) -> DataResult<FieldValue> {
        match value {
            JsonValue::Null => Ok(FieldValue::Null),
            JsonValue::Array(ids) => Ok(FieldValue::Text(Self::join_ids(ids)?)),
            other => Err(DataError::Mapping(format!(
                "id-list field expects a list of ids, got {other}"
            ))),
        }
    }

    fn decode(&self, stored: &FieldValue) -> DataResult<JsonValue> {
        match stored {
            FieldValue::Null => Ok(JsonValue::Array(Vec::new())),
            FieldValue::Text(joined) => {
                let mut ids = Vec::new();
                for part in joined.split(SEPARATOR).filter(|p| !p.is_empty()) {
                    let id: i64 = part.parse().map_err(|_| {
                        DataError::Mapping(format!(
                            "stored id-list contains a non-numeric entry '{part}'"
                        ))
                    })?;
                    ids.push(JsonValue::from(id));
                }
                Ok(JsonValue::Array(ids))
            }
            other => Err(DataError::Mapping(format!(
                "id-list column holds a non-text value: {other:?}"
            ))),
        }
    }
}
