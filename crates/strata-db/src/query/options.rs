//! Per-call query options
//!
//! `QueryOptions` is the explicit, additive configuration a caller hands
//! to one engine operation: one field per recognized option kind instead
//! of a dynamically typed bag. Conditions and filter columns accumulate
//! in insertion order; a later limit replaces an earlier one. Options are
//! per-call values and own no external resource.

use std::fmt;
use std::sync::Arc;

use crate::error::DataResult;
use crate::query::condition::WhereNode;
use crate::value::{Document, FieldValue};

/// Sort direction for a caller-supplied ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Visibility predicate run against the outgoing document and the
/// effective column allow-list before a mutating statement executes.
pub type CheckFunction = Arc<dyn Fn(&Document, &[String]) -> DataResult<()> + Send + Sync>;

/// Additive option collection for one engine call
#[derive(Clone, Default)]
pub struct QueryOptions {
    pub(crate) conditions: Vec<WhereNode>,
    pub(crate) filter_columns: Vec<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) transmit_keys: Vec<FieldValue>,
    pub(crate) checks: Vec<CheckFunction>,
    pub(crate) create_drop_table: bool,
    pub(crate) include_deleted: bool,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one condition; conditions accumulate and are AND-fused by the
    /// operations that require a single effective predicate.
    pub fn condition(mut self, condition: WhereNode) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Restrict writes to the named column
    pub fn filter_column(mut self, column: impl Into<String>) -> Self {
        self.filter_columns.push(column.into());
        self
    }

    /// Restrict writes to the named columns
    pub fn filter_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Cap the number of returned rows; a later limit wins
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Carry an identity value through to downstream hooks
    pub fn transmit_key(mut self, key: impl Into<FieldValue>) -> Self {
        self.transmit_keys.push(key.into());
        self
    }

    /// Attach a visibility predicate run before mutating statements
    pub fn check(mut self, check: CheckFunction) -> Self {
        self.checks.push(check);
        self
    }

    /// Emit a DROP TABLE before table creation
    pub fn create_drop_table(mut self) -> Self {
        self.create_drop_table = true;
        self
    }

    /// Read soft-deleted rows as well
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Caller-supplied ordering; never implied by the engine
    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    /// Conditions accumulated so far, in insertion order
    pub fn conditions(&self) -> &[WhereNode] {
        &self.conditions
    }

    /// Identity values carried for downstream hooks
    pub fn transmit_keys(&self) -> &[FieldValue] {
        &self.transmit_keys
    }

    /// Effective row cap, if any
    pub fn effective_limit(&self) -> Option<u64> {
        self.limit
    }

    pub(crate) fn run_checks(&self, doc: &Document, columns: &[String]) -> DataResult<()> {
        for check in &self.checks {
            check(doc, columns)?;
        }
        Ok(())
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("conditions", &self.conditions)
            .field("filter_columns", &self.filter_columns)
            .field("limit", &self.limit)
            .field("transmit_keys", &self.transmit_keys)
            .field("checks", &self.checks.len())
            .field("create_drop_table", &self.create_drop_table)
            .field("include_deleted", &self.include_deleted)
            .field("order_by", &self.order_by)
            .finish()
    }
}
