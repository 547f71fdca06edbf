//! Data access engine
//!
//! The public CRUD surface. The engine resolves model metadata, assembles
//! per-call options, fuses condition trees, and routes field values
//! through the add-on registry before delegating the single round trip to
//! the configured backend. Mapping, validation, and query-construction
//! problems are raised here, before any statement executes.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use crate::addon::AddOnRegistry;
use crate::backends::{
    ColumnValue, DocumentBackend, PostgresBackend, Row, SelectColumn, StorageBackend,
};
use crate::config::{BackendKind, DataConfig};
use crate::descriptor::{Record, TableDescriptor};
use crate::error::{DataError, DataResult};
use crate::query::{CompareOp, QueryCondition, QueryOptions, WhereNode};
use crate::value::{Document, FieldValue};

/// A lookup key for id-addressed operations: either a literal value
/// checked against the declared id type, or an already-built condition,
/// which is exempt from the kind check.
#[derive(Debug, Clone)]
pub enum Key {
    Value(FieldValue),
    Condition(WhereNode),
}

impl From<FieldValue> for Key {
    fn from(value: FieldValue) -> Self {
        Key::Value(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Value(FieldValue::Int(value))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Value(FieldValue::BigInt(value))
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Value(FieldValue::Text(value.to_string()))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Value(FieldValue::Text(value))
    }
}

impl From<Uuid> for Key {
    fn from(value: Uuid) -> Self {
        Key::Value(FieldValue::Uuid(value))
    }
}

impl From<WhereNode> for Key {
    fn from(node: WhereNode) -> Self {
        Key::Condition(node)
    }
}

impl From<QueryCondition> for Key {
    fn from(cond: QueryCondition) -> Self {
        Key::Condition(WhereNode::Condition(cond))
    }
}

/// The uniform CRUD surface over one configured storage backend
pub struct DataAccess {
    backend: Arc<dyn StorageBackend>,
    addons: Arc<AddOnRegistry>,
}

impl DataAccess {
    /// Construct the engine for the backend the configuration selects.
    /// An unknown selection fails here, before any connection is made.
    pub async fn connect(config: &DataConfig) -> DataResult<Self> {
        let addons = Arc::new(AddOnRegistry::with_defaults()?);
        let backend: Arc<dyn StorageBackend> = match config.backend_kind()? {
            BackendKind::Postgres => {
                Arc::new(PostgresBackend::connect(config.url(), addons.clone()).await?)
            }
            BackendKind::Document => Arc::new(DocumentBackend::new()),
        };
        Ok(Self { backend, addons })
    }

    /// Construct the engine over an explicit backend and registry
    pub fn with_backend(backend: Arc<dyn StorageBackend>, addons: Arc<AddOnRegistry>) -> Self {
        Self { backend, addons }
    }

    /// The add-on registry this engine consults
    pub fn add_ons(&self) -> &AddOnRegistry {
        &self.addons
    }

    // ---- insert ----------------------------------------------------------

    /// Insert one model and return it as stored, generated keys included
    pub async fn insert<T: Record>(&self, data: T) -> DataResult<T> {
        self.insert_with_options(data, QueryOptions::new()).await
    }

    /// Insert with per-call options (check functions run before the
    /// statement executes)
    pub async fn insert_with_options<T: Record>(
        &self,
        data: T,
        options: QueryOptions,
    ) -> DataResult<T> {
        let desc = T::descriptor();
        debug!(table = desc.table(), "insert");
        let doc = data.to_document()?;
        options.run_checks(&doc, &options.filter_columns)?;
        let values = self.encode_document(desc, &doc, &[], false)?;
        let returning = self.select_columns(desc)?;
        let row = self.backend.insert_row(desc, values, &returning).await?;
        self.hydrate(row)
    }

    /// Insert each element in order. Not atomic: a failure partway
    /// through leaves the prior elements committed.
    pub async fn insert_multiple<T: Record>(&self, data: Vec<T>) -> DataResult<Vec<T>> {
        let mut out = Vec::with_capacity(data.len());
        for elem in data {
            out.push(self.insert(elem).await?);
        }
        Ok(out)
    }

    /// Deserialize a JSON payload into the model type, then insert it
    pub async fn insert_with_json<T: Record>(&self, payload: &str) -> DataResult<T> {
        let data: T = serde_json::from_str(payload)?;
        self.insert(data).await
    }

    // ---- update ----------------------------------------------------------

    /// Update the row addressed by `key`, writing every declared column
    pub async fn update<T: Record, K: Into<Key>>(&self, data: &T, key: K) -> DataResult<u64> {
        let columns: Vec<String> = T::descriptor()
            .fields()
            .iter()
            .map(|f| f.column.to_string())
            .collect();
        self.update_columns(data, key, columns).await
    }

    /// Update the row addressed by `key`, writing only the named columns
    pub async fn update_columns<T: Record, K: Into<Key>>(
        &self,
        data: &T,
        key: K,
        columns: Vec<String>,
    ) -> DataResult<u64> {
        let key = key.into();
        let mut options = QueryOptions::new().filter_columns(columns);
        if let Key::Value(value) = &key {
            options = options.transmit_key(value.clone());
        }
        let options = options.condition(self.table_id_condition::<T, _>(key)?);
        self.update_where(data, options).await
    }

    /// Update every row matching the fused conditions; fails fast when
    /// no condition was supplied.
    pub async fn update_where<T: Record>(
        &self,
        data: &T,
        options: QueryOptions,
    ) -> DataResult<u64> {
        let desc = T::descriptor();
        debug!(table = desc.table(), "update");
        let filter = self.condition_fusion_or_empty(&options, true)?;
        let doc = data.to_document()?;
        options.run_checks(&doc, &options.filter_columns)?;
        let assignments = self.encode_document(desc, &doc, &options.filter_columns, true)?;
        if assignments.is_empty() {
            return Ok(0);
        }
        self.backend.update_rows(desc, assignments, &filter).await
    }

    /// Partial update by id: only the columns present in the raw payload
    /// are written, regardless of the deserialized object's other fields.
    pub async fn update_with_json<T: Record, K: Into<Key>>(
        &self,
        key: K,
        payload: &str,
    ) -> DataResult<u64> {
        let key = key.into();
        let mut options = QueryOptions::new();
        if let Key::Value(value) = &key {
            options = options.transmit_key(value.clone());
        }
        let options = options.condition(self.table_id_condition::<T, _>(key)?);
        self.update_where_with_json::<T>(payload, options).await
    }

    /// Partial update with caller-supplied conditions. The payload is
    /// deserialized to validate it, and independently walked for its
    /// top-level keys to build the column allow-list.
    pub async fn update_where_with_json<T: Record>(
        &self,
        payload: &str,
        options: QueryOptions,
    ) -> DataResult<u64> {
        if options.conditions.is_empty() {
            return Err(DataError::QueryConstruction(
                "update requested without any condition".to_string(),
            ));
        }
        let data: T = serde_json::from_str(payload)?;
        let raw: JsonValue = serde_json::from_str(payload)?;
        let columns: Vec<String> = raw
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        let options = options.filter_columns(columns);
        self.update_where(&data, options).await
    }

    // ---- read ------------------------------------------------------------

    /// Fetch one row by id
    pub async fn get<T: Record, K: Into<Key>>(&self, key: K) -> DataResult<Option<T>> {
        self.get_with_options(key, QueryOptions::new()).await
    }

    /// Fetch one row by id with extra options (e.g. include soft-deleted)
    pub async fn get_with_options<T: Record, K: Into<Key>>(
        &self,
        key: K,
        options: QueryOptions,
    ) -> DataResult<Option<T>> {
        let options = options.condition(self.table_id_condition::<T, _>(key)?);
        self.get_where(options).await
    }

    /// Fetch every row
    pub async fn gets<T: Record>(&self) -> DataResult<Vec<T>> {
        self.gets_where(QueryOptions::new()).await
    }

    /// Fetch the first matching row, or `None` when nothing matches.
    /// Zero matches is success, never an error. With multiple matches
    /// and no caller-supplied ordering, which row comes first is
    /// undefined.
    pub async fn get_where<T: Record>(&self, options: QueryOptions) -> DataResult<Option<T>> {
        let options = options.limit(1);
        let mut rows = self.gets_where(options).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    /// Fetch every matching row; zero conditions means a full scan
    pub async fn gets_where<T: Record>(&self, options: QueryOptions) -> DataResult<Vec<T>> {
        let desc = T::descriptor();
        debug!(table = desc.table(), "select");
        let fused = self.condition_fusion_or_empty(&options, false)?;
        let filter = Self::visible_filter(desc, fused, &options);
        let select = self.select_columns(desc)?;
        let rows = self
            .backend
            .fetch_rows(desc, &select, &filter, &options)
            .await?;
        rows.into_iter().map(|row| self.hydrate(row)).collect()
    }

    /// Count rows matching the id key
    pub async fn count<T: Record, K: Into<Key>>(&self, key: K) -> DataResult<u64> {
        let options = QueryOptions::new().condition(self.table_id_condition::<T, _>(key)?);
        self.count_where::<T>(options).await
    }

    /// Count matching rows; zero conditions counts the whole table
    pub async fn count_where<T: Record>(&self, options: QueryOptions) -> DataResult<u64> {
        let desc = T::descriptor();
        let fused = self.condition_fusion_or_empty(&options, false)?;
        let filter = Self::visible_filter(desc, fused, &options);
        self.backend.count_rows(desc, &filter).await
    }

    // ---- delete ----------------------------------------------------------

    /// Delete the row addressed by `key`. Models with a soft-delete
    /// marker are flagged and persist; models without one are removed
    /// irreversibly.
    pub async fn delete<T: Record, K: Into<Key>>(&self, key: K) -> DataResult<u64> {
        let options = QueryOptions::new().condition(self.table_id_condition::<T, _>(key)?);
        self.delete_where::<T>(options).await
    }

    /// Delete every row matching the fused conditions; fails fast when
    /// no condition was supplied. Soft/hard dispatch follows the
    /// descriptor's delete marker.
    pub async fn delete_where<T: Record>(&self, options: QueryOptions) -> DataResult<u64> {
        let desc = T::descriptor();
        match desc.delete_marker() {
            Some(_) => self.delete_soft_where::<T>(options).await,
            None => self.delete_hard_where::<T>(options).await,
        }
    }

    /// Remove matching rows outright, marker or not
    pub async fn delete_hard_where<T: Record>(&self, options: QueryOptions) -> DataResult<u64> {
        let desc = T::descriptor();
        debug!(table = desc.table(), "hard delete");
        let filter = self.condition_fusion_or_empty(&options, true)?;
        self.backend.delete_rows(desc, &filter).await
    }

    /// Flag matching rows as deleted; rows not yet flagged count as
    /// affected
    pub async fn delete_soft_where<T: Record>(&self, options: QueryOptions) -> DataResult<u64> {
        let desc = T::descriptor();
        debug!(table = desc.table(), "soft delete");
        let marker = self.require_marker(desc)?;
        let fused = self.condition_fusion_or_empty(&options, true)?;
        let filter = WhereNode::And(vec![fused, WhereNode::eq(marker, false)]);
        let assignments = vec![ColumnValue::new(marker, FieldValue::Bool(true))];
        self.backend.update_rows(desc, assignments, &filter).await
    }

    /// Reverse a soft delete on the row addressed by `key`
    pub async fn unset_delete<T: Record, K: Into<Key>>(&self, key: K) -> DataResult<u64> {
        let options = QueryOptions::new().condition(self.table_id_condition::<T, _>(key)?);
        self.unset_delete_where::<T>(options).await
    }

    /// Reverse a soft delete on every matching row
    pub async fn unset_delete_where<T: Record>(&self, options: QueryOptions) -> DataResult<u64> {
        let desc = T::descriptor();
        let marker = self.require_marker(desc)?;
        let fused = self.condition_fusion_or_empty(&options, true)?;
        let filter = WhereNode::And(vec![fused, WhereNode::eq(marker, true)]);
        let assignments = vec![ColumnValue::new(marker, FieldValue::Bool(false))];
        self.backend.update_rows(desc, assignments, &filter).await
    }

    // ---- schema ----------------------------------------------------------

    /// Create the model's table; `create_drop_table` in the options
    /// drops an existing one first
    pub async fn create_table<T: Record>(&self, options: QueryOptions) -> DataResult<()> {
        self.backend
            .create_table(T::descriptor(), options.create_drop_table)
            .await
    }

    /// Drop the model's table
    pub async fn drop_table<T: Record>(&self) -> DataResult<()> {
        self.backend.drop_table(T::descriptor()).await
    }

    /// Remove every row of the model's table, keeping the table
    pub async fn clean_all<T: Record>(&self) -> DataResult<()> {
        self.backend.clean_table(T::descriptor()).await
    }

    // ---- metadata and condition plumbing ---------------------------------

    /// Build the id equality condition for a key. Fails with a mapping
    /// error when the type declares no id, the key is absent, or the
    /// key's runtime kind differs from the declared id storage kind. A
    /// key that already is a condition passes through unchecked.
    pub fn table_id_condition<T: Record, K: Into<Key>>(&self, key: K) -> DataResult<WhereNode> {
        let desc = T::descriptor();
        let id = desc.id_field().ok_or_else(|| {
            DataError::Mapping(format!(
                "type mapped to '{}' declares no id field",
                desc.table()
            ))
        })?;
        match key.into() {
            Key::Condition(node) => Ok(node),
            Key::Value(value) => {
                if value.is_null() {
                    return Err(DataError::Mapping(format!(
                        "id key for '{}' is absent",
                        desc.table()
                    )));
                }
                match value.kind() {
                    Some(kind) if kind == id.column_type => {
                        Ok(WhereNode::Condition(QueryCondition {
                            column: id.column.to_string(),
                            op: CompareOp::Eq,
                            value,
                        }))
                    }
                    kind => Err(DataError::Mapping(format!(
                        "id key of kind {kind:?} does not match declared id type {:?} for '{}'",
                        id.column_type,
                        desc.table()
                    ))),
                }
            }
        }
    }

    /// Merge the accumulated conditions into one predicate: zero
    /// conditions yields the always-true empty tree, or fails when the
    /// caller requested fail-fast; many conditions AND-combine.
    pub fn condition_fusion_or_empty(
        &self,
        options: &QueryOptions,
        throw_if_empty: bool,
    ) -> DataResult<WhereNode> {
        match options.conditions.len() {
            0 => {
                if throw_if_empty {
                    Err(DataError::QueryConstruction(
                        "operation requested without any condition".to_string(),
                    ))
                } else {
                    Ok(WhereNode::empty())
                }
            }
            1 => Ok(options.conditions[0].clone()),
            _ => Ok(WhereNode::And(options.conditions.clone())),
        }
    }

    // ---- internals -------------------------------------------------------

    fn require_marker(&self, desc: &TableDescriptor) -> DataResult<&'static str> {
        desc.delete_marker().map(|f| f.column).ok_or_else(|| {
            DataError::Mapping(format!(
                "type mapped to '{}' declares no delete marker",
                desc.table()
            ))
        })
    }

    /// Default read filter: soft-deleted rows stay invisible unless the
    /// caller opted in
    fn visible_filter(
        desc: &TableDescriptor,
        fused: WhereNode,
        options: &QueryOptions,
    ) -> WhereNode {
        match desc.delete_marker() {
            Some(marker) if !options.include_deleted => {
                WhereNode::And(vec![fused, WhereNode::eq(marker.column, false)])
            }
            _ => fused,
        }
    }

    /// Result projection for the descriptor, routing add-on governed
    /// columns through their handler for the reference and the type
    fn select_columns(&self, desc: &TableDescriptor) -> DataResult<Vec<SelectColumn>> {
        desc.fields()
            .iter()
            .map(|field| {
                let (expr, ty) = match self.addons.handler_for(field)? {
                    Some(handler) => (
                        handler.query_column(desc.table(), field.column),
                        handler.column_type(field),
                    ),
                    None => (field.column.to_string(), field.column_type),
                };
                Ok(SelectColumn {
                    expr,
                    name: field.column.to_string(),
                    ty,
                })
            })
            .collect()
    }

    /// Encode a model document into column assignments. Fields outside a
    /// non-empty allow-list are skipped, the id is skipped on update and
    /// left to the backend when null on insert, and fields excluded from
    /// default mapping go through their handler's encode.
    fn encode_document(
        &self,
        desc: &TableDescriptor,
        doc: &Document,
        allow: &[String],
        for_update: bool,
    ) -> DataResult<Vec<ColumnValue>> {
        let mut out = Vec::new();
        for field in desc.fields() {
            if field.is_id && for_update {
                continue;
            }
            if !allow.is_empty() && !allow.iter().any(|c| c == field.column) {
                continue;
            }
            let json = doc.get(field.column).cloned().unwrap_or(JsonValue::Null);
            let value = match self.addons.handler_for(field)? {
                Some(handler) if !handler.include_in_insert() => handler.encode(&json)?,
                Some(handler) => FieldValue::from_json(handler.column_type(field), &json)?,
                None => FieldValue::from_json(field.column_type, &json)?,
            };
            if field.is_id && value.is_null() {
                continue;
            }
            out.push(ColumnValue::new(field.column, value));
        }
        Ok(out)
    }

    /// Map one stored row back into a model, consulting the add-on
    /// registry for fields excluded from default read mapping
    fn hydrate<T: Record>(&self, row: Row) -> DataResult<T> {
        let desc = T::descriptor();
        let mut doc = Document::new();
        for field in desc.fields() {
            let stored = row.get(field.column).cloned().unwrap_or(FieldValue::Null);
            let json = match self.addons.handler_for(field)? {
                Some(handler) if !handler.include_in_read() => handler.decode(&stored)?,
                _ => stored.to_json(),
            };
            doc.insert(field.column.to_string(), json);
        }
        T::from_document(doc)
    }
}
