//! Embedded document backend
//!
//! An in-process document store: one collection of JSON documents per
//! table, filtered by evaluating the condition tree directly against
//! each document. Rows live in memory for the lifetime of the backend,
//! which makes this the execution target for tests and for callers that
//! want document semantics without an external server.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use crate::backends::{ColumnValue, Row, SelectColumn, StorageBackend};
use crate::descriptor::TableDescriptor;
use crate::error::{DataError, DataResult};
use crate::query::{OrderDirection, QueryOptions, WhereNode};
use crate::value::{ColumnType, Document, FieldValue};

#[derive(Default)]
struct Collection {
    docs: Vec<Document>,
    next_id: i64,
}

/// In-process document-oriented storage
#[derive(Default)]
pub struct DocumentBackend {
    collections: RwLock<HashMap<String, Collection>>,
}

impl DocumentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DataResult<std::sync::RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| DataError::Backend("document store lock poisoned".to_string()))
    }

    fn write(&self) -> DataResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| DataError::Backend("document store lock poisoned".to_string()))
    }

    fn project(doc: &Document, select: &[SelectColumn]) -> DataResult<Row> {
        let mut row = Row::with_capacity(select.len());
        for col in select {
            let stored = doc.get(&col.name).unwrap_or(&JsonValue::Null);
            row.insert(col.name.clone(), FieldValue::from_json(col.ty, stored)?);
        }
        Ok(row)
    }

    fn sort_docs(docs: &mut [&Document], order_by: &[(String, OrderDirection)]) {
        docs.sort_by(|a, b| {
            for (column, direction) in order_by {
                let left = a.get(column).unwrap_or(&JsonValue::Null);
                let right = b.get(column).unwrap_or(&JsonValue::Null);
                let ord = json_cmp(left, right);
                if ord != std::cmp::Ordering::Equal {
                    return match direction {
                        OrderDirection::Asc => ord,
                        OrderDirection::Desc => ord.reverse(),
                    };
                }
            }
            std::cmp::Ordering::Equal
        });
    }
}

fn json_cmp(left: &JsonValue, right: &JsonValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (left, right) {
        (JsonValue::Null, JsonValue::Null) => Ordering::Equal,
        (JsonValue::Null, _) => Ordering::Less,
        (_, JsonValue::Null) => Ordering::Greater,
        _ => {
            if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            } else if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
                a.cmp(b)
            } else if let (Some(a), Some(b)) = (left.as_bool(), right.as_bool()) {
                a.cmp(&b)
            } else {
                Ordering::Equal
            }
        }
    }
}

#[async_trait]
impl StorageBackend for DocumentBackend {
    async fn insert_row(
        &self,
        desc: &TableDescriptor,
        values: Vec<ColumnValue>,
        returning: &[SelectColumn],
    ) -> DataResult<Row> {
        // a document collection addresses rows by id, so the model must
        // declare one
        let id_field = desc.id_field().ok_or_else(|| {
            DataError::Mapping(format!(
                "table '{}' has no id field, required by the document backend",
                desc.table()
            ))
        })?;

        let mut doc = Document::new();
        for cv in values {
            doc.insert(cv.column, cv.value.to_json());
        }

        let mut collections = self.write()?;
        let collection = collections.entry(desc.table().to_string()).or_default();

        let id_missing = doc
            .get(id_field.column)
            .map_or(true, JsonValue::is_null);
        if id_missing {
            let generated = match id_field.column_type {
                ColumnType::BigInt | ColumnType::Integer => {
                    collection.next_id += 1;
                    JsonValue::from(collection.next_id)
                }
                ColumnType::Uuid => JsonValue::String(Uuid::new_v4().to_string()),
                other => {
                    return Err(DataError::Mapping(format!(
                        "cannot generate an id of type {other:?} for table '{}'",
                        desc.table()
                    )))
                }
            };
            doc.insert(id_field.column.to_string(), generated);
        } else if let Some(id) = doc.get(id_field.column).and_then(JsonValue::as_i64) {
            // keep the sequence ahead of explicitly supplied integer ids
            collection.next_id = collection.next_id.max(id);
        }

        debug!(table = desc.table(), "document insert");
        collection.docs.push(doc);
        let stored = collection.docs.last().ok_or_else(|| {
            DataError::Backend("document store lost the inserted row".to_string())
        })?;
        Self::project(stored, returning)
    }

    async fn fetch_rows(
        &self,
        desc: &TableDescriptor,
        select: &[SelectColumn],
        filter: &WhereNode,
        options: &QueryOptions,
    ) -> DataResult<Vec<Row>> {
        let collections = self.read()?;
        let Some(collection) = collections.get(desc.table()) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&Document> = collection
            .docs
            .iter()
            .filter(|doc| filter.matches(doc))
            .collect();
        if !options.order_by.is_empty() {
            Self::sort_docs(&mut matched, &options.order_by);
        }
        if let Some(limit) = options.limit {
            matched.truncate(limit as usize);
        }

        matched
            .into_iter()
            .map(|doc| Self::project(doc, select))
            .collect()
    }

    async fn count_rows(&self, desc: &TableDescriptor, filter: &WhereNode) -> DataResult<u64> {
        let collections = self.read()?;
        let Some(collection) = collections.get(desc.table()) else {
            return Ok(0);
        };
        Ok(collection
            .docs
            .iter()
            .filter(|doc| filter.matches(doc))
            .count() as u64)
    }

    async fn update_rows(
        &self,
        desc: &TableDescriptor,
        assignments: Vec<ColumnValue>,
        filter: &WhereNode,
    ) -> DataResult<u64> {
        let mut collections = self.write()?;
        let Some(collection) = collections.get_mut(desc.table()) else {
            return Ok(0);
        };

        let mut affected = 0;
        for doc in collection.docs.iter_mut() {
            if !filter.matches(doc) {
                continue;
            }
            for cv in &assignments {
                doc.insert(cv.column.clone(), cv.value.to_json());
            }
            affected += 1;
        }
        debug!(table = desc.table(), affected, "document update");
        Ok(affected)
    }

    async fn delete_rows(&self, desc: &TableDescriptor, filter: &WhereNode) -> DataResult<u64> {
        let mut collections = self.write()?;
        let Some(collection) = collections.get_mut(desc.table()) else {
            return Ok(0);
        };
        let before = collection.docs.len();
        collection.docs.retain(|doc| !filter.matches(doc));
        let removed = (before - collection.docs.len()) as u64;
        debug!(table = desc.table(), removed, "document delete");
        Ok(removed)
    }

    async fn create_table(&self, desc: &TableDescriptor, drop_existing: bool) -> DataResult<()> {
        let mut collections = self.write()?;
        if drop_existing {
            collections.remove(desc.table());
        }
        collections.entry(desc.table().to_string()).or_default();
        Ok(())
    }

    async fn drop_table(&self, desc: &TableDescriptor) -> DataResult<()> {
        self.write()?.remove(desc.table());
        Ok(())
    }

    async fn clean_table(&self, desc: &TableDescriptor) -> DataResult<()> {
        if let Some(collection) = self.write()?.get_mut(desc.table()) {
            collection.docs.clear();
        }
        Ok(())
    }
}
