//! # strata-db: descriptor-driven data access
//!
//! A generic persistence layer: CRUD operations against relational or
//! document-oriented storage through one uniform API. Model types carry a
//! startup-derived descriptor instead of per-type SQL; queries are built
//! from a boolean condition tree whose placeholder order always matches
//! its value-binding order; individual fields can opt out of default
//! mapping through registered add-on handlers.

pub mod addon;
pub mod backends;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod query;
pub mod schema;
pub mod value;

#[cfg(test)]
mod tests;

// Re-export the core surface
pub use addon::{AddOnRegistry, FieldAddOn, IdListAddOn};
pub use backends::{ColumnValue, DocumentBackend, PostgresBackend, Row, SelectColumn, StorageBackend};
pub use config::{BackendKind, DataConfig};
pub use descriptor::{FieldDescriptor, Record, TableDescriptor};
pub use engine::{DataAccess, Key};
pub use error::{DataError, DataResult};
pub use query::{
    CheckFunction, CompareOp, OrderDirection, ParamCursor, QueryCondition, QueryOptions, WhereNode,
};
pub use value::{ColumnType, Document, FieldValue};
