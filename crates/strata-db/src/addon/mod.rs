//! Per-field mapping add-ons
//!
//! An add-on handler overrides the default storage mapping for every
//! field tagged with its marker: it owns the column's storage type, its
//! encode/decode wire representation, the column reference used in query
//! generation, and the column definition used in schema generation. A
//! field may opt out of default insert/read mapping entirely, in which
//! case the engine routes its values through the handler and the default
//! row mapper never touches it.
//!
//! Handlers are registered once at startup, one handler per tag; a second
//! registration for the same tag is a registration-time failure, never a
//! runtime ambiguity.

pub mod id_list;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::descriptor::FieldDescriptor;
use crate::error::{DataError, DataResult};
use crate::value::{ColumnType, FieldValue};

pub use id_list::IdListAddOn;

/// Capability interface implemented by every field add-on
pub trait FieldAddOn: Send + Sync {
    /// The marker tag this handler governs
    fn tag(&self) -> &'static str;

    /// Storage column type for a field governed by this handler
    fn column_type(&self, field: &FieldDescriptor) -> ColumnType;

    /// Whether the field participates in default insert mapping. When
    /// false the engine calls [`FieldAddOn::encode`] instead.
    fn include_in_insert(&self) -> bool {
        true
    }

    /// Whether the field participates in default read mapping. When
    /// false the engine calls [`FieldAddOn::decode`] instead.
    fn include_in_read(&self) -> bool {
        true
    }

    /// Encode an in-memory field value into its storable parameter
    fn encode(&self, value: &JsonValue) -> DataResult<FieldValue>;

    /// Decode a stored column value back into the field's wire form
    fn decode(&self, stored: &FieldValue) -> DataResult<JsonValue>;

    /// Column reference emitted into generated queries
    fn query_column(&self, table: &str, column: &str) -> String {
        format!("{table}.{column}")
    }

    /// Column definition emitted into generated schema
    fn column_definition(&self, field: &FieldDescriptor) -> String {
        format!("{} {}", field.column, self.column_type(field).sql_type())
    }
}

/// Startup-populated registry mapping marker tags to handlers
#[derive(Default)]
pub struct AddOnRegistry {
    handlers: HashMap<&'static str, Arc<dyn FieldAddOn>>,
}

impl AddOnRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the handlers this crate ships
    pub fn with_defaults() -> DataResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(IdListAddOn::new()))?;
        Ok(registry)
    }

    /// Register a handler. Exactly one handler per tag; a duplicate tag
    /// fails here, at startup.
    pub fn register(&mut self, handler: Arc<dyn FieldAddOn>) -> DataResult<()> {
        let tag = handler.tag();
        if self.handlers.contains_key(tag) {
            return Err(DataError::Mapping(format!(
                "add-on handler already registered for tag '{tag}'"
            )));
        }
        self.handlers.insert(tag, handler);
        Ok(())
    }

    /// Look up the handler for a tag
    pub fn get(&self, tag: &str) -> Option<Arc<dyn FieldAddOn>> {
        self.handlers.get(tag).cloned()
    }

    /// Look up the handler a field descriptor requires
    pub fn handler_for(&self, field: &FieldDescriptor) -> DataResult<Option<Arc<dyn FieldAddOn>>> {
        match field.add_on {
            None => Ok(None),
            Some(tag) => self.get(tag).map(Some).ok_or_else(|| {
                DataError::Mapping(format!(
                    "field '{}' requires add-on '{tag}' but no handler is registered",
                    field.column
                ))
            }),
        }
    }

    /// Registered tags, for diagnostics
    pub fn tags(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}
