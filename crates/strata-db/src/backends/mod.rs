//! Storage backends
//!
//! The engine assembles a request (descriptor, encoded column values,
//! fused condition tree, per-call options) and hands it to a
//! [`StorageBackend`] for the single round trip. One implementation
//! targets relational storage through sqlx/PostgreSQL, the other an
//! embedded document store. Backends execute; they never decide mapping
//! policy.

pub mod document;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::descriptor::TableDescriptor;
use crate::error::DataResult;
use crate::query::{QueryOptions, WhereNode};
use crate::value::{ColumnType, FieldValue};

pub use document::DocumentBackend;
pub use postgres::PostgresBackend;

/// One fetched row, keyed by result column name
pub type Row = HashMap<String, FieldValue>;

/// One encoded column assignment for an insert or update
#[derive(Debug, Clone)]
pub struct ColumnValue {
    pub column: String,
    pub value: FieldValue,
}

impl ColumnValue {
    pub fn new(column: impl Into<String>, value: FieldValue) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// One column of a result projection: the reference to emit into the
/// query, the name it comes back under, and the type to decode it as.
#[derive(Debug, Clone)]
pub struct SelectColumn {
    pub expr: String,
    pub name: String,
    pub ty: ColumnType,
}

/// Abstract execution surface for one storage flavor
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert one row and return it as stored, including generated keys
    async fn insert_row(
        &self,
        desc: &TableDescriptor,
        values: Vec<ColumnValue>,
        returning: &[SelectColumn],
    ) -> DataResult<Row>;

    /// Fetch all rows matching the filter, honoring limit and ordering
    async fn fetch_rows(
        &self,
        desc: &TableDescriptor,
        select: &[SelectColumn],
        filter: &WhereNode,
        options: &QueryOptions,
    ) -> DataResult<Vec<Row>>;

    /// Count rows matching the filter
    async fn count_rows(&self, desc: &TableDescriptor, filter: &WhereNode) -> DataResult<u64>;

    /// Apply the assignments to every matching row, returning the
    /// affected count
    async fn update_rows(
        &self,
        desc: &TableDescriptor,
        assignments: Vec<ColumnValue>,
        filter: &WhereNode,
    ) -> DataResult<u64>;

    /// Remove every matching row, returning the removed count
    async fn delete_rows(&self, desc: &TableDescriptor, filter: &WhereNode) -> DataResult<u64>;

    /// Create the table/collection for the descriptor, optionally
    /// dropping an existing one first
    async fn create_table(&self, desc: &TableDescriptor, drop_existing: bool) -> DataResult<()>;

    /// Drop the table/collection
    async fn drop_table(&self, desc: &TableDescriptor) -> DataResult<()>;

    /// Remove every row while keeping the table/collection
    async fn clean_table(&self, desc: &TableDescriptor) -> DataResult<()>;
}
