//! Model descriptors
//!
//! A [`TableDescriptor`] is the startup-derived metadata for one model
//! type: storage table, declared fields with their column types, the id
//! field, and the optional soft-delete marker. Descriptors are built once
//! (normally inside a `once_cell::sync::Lazy` static) and shared read-only
//! for the process lifetime; the engine never introspects a model at
//! request time.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{DataError, DataResult};
use crate::value::{ColumnType, Document};

/// Per-field storage metadata
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Storage column name, identical to the serde field name
    pub column: &'static str,
    /// Declared storage type of the column
    pub column_type: ColumnType,
    /// Whether the column accepts NULL
    pub nullable: bool,
    /// Whether this field is the model's unique id
    pub is_id: bool,
    /// Whether this field is the soft-delete marker
    pub is_delete_marker: bool,
    /// Tag of the add-on handler governing this field, if any
    pub add_on: Option<&'static str>,
}

/// Startup-derived metadata for one model type
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    table: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl TableDescriptor {
    /// Start building a descriptor for the given storage table
    pub fn builder(table: &'static str) -> TableDescriptorBuilder {
        TableDescriptorBuilder {
            table,
            fields: Vec::new(),
        }
    }

    /// Storage table / collection name
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Declared fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// The id field, if the model declares one
    pub fn id_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_id)
    }

    /// The soft-delete marker field, if the model declares one
    pub fn delete_marker(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_delete_marker)
    }

    /// Look up a field by column name
    pub fn field(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.column == column)
    }
}

/// Builder used by `Record` implementations to declare their descriptor
pub struct TableDescriptorBuilder {
    table: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl TableDescriptorBuilder {
    /// Declare the unique id field
    pub fn id(mut self, column: &'static str, column_type: ColumnType) -> Self {
        assert!(
            !self.fields.iter().any(|f| f.is_id),
            "table '{}' declares more than one id field",
            self.table
        );
        self.fields.push(FieldDescriptor {
            column,
            column_type,
            nullable: false,
            is_id: true,
            is_delete_marker: false,
            add_on: None,
        });
        self
    }

    /// Declare a plain non-null column
    pub fn column(mut self, column: &'static str, column_type: ColumnType) -> Self {
        self.fields.push(FieldDescriptor {
            column,
            column_type,
            nullable: false,
            is_id: false,
            is_delete_marker: false,
            add_on: None,
        });
        self
    }

    /// Declare a nullable column
    pub fn nullable(mut self, column: &'static str, column_type: ColumnType) -> Self {
        self.fields.push(FieldDescriptor {
            column,
            column_type,
            nullable: true,
            is_id: false,
            is_delete_marker: false,
            add_on: None,
        });
        self
    }

    /// Declare the boolean soft-delete marker column
    pub fn delete_marker(mut self, column: &'static str) -> Self {
        assert!(
            !self.fields.iter().any(|f| f.is_delete_marker),
            "table '{}' declares more than one delete marker",
            self.table
        );
        self.fields.push(FieldDescriptor {
            column,
            column_type: ColumnType::Boolean,
            nullable: false,
            is_id: false,
            is_delete_marker: true,
            add_on: None,
        });
        self
    }

    /// Declare a column governed by a registered add-on handler.
    ///
    /// The handler registered under `tag` owns the column's storage type
    /// and its wire representation; `column_type` here records the
    /// in-memory kind for documentation purposes only.
    pub fn add_on(mut self, column: &'static str, tag: &'static str) -> Self {
        self.fields.push(FieldDescriptor {
            column,
            // storage type is resolved through the handler at use sites
            column_type: ColumnType::Text,
            nullable: true,
            is_id: false,
            is_delete_marker: false,
            add_on: Some(tag),
        });
        self
    }

    /// Finish the descriptor
    pub fn build(self) -> TableDescriptor {
        assert!(
            !self.fields.is_empty(),
            "table '{}' declares no fields",
            self.table
        );
        TableDescriptor {
            table: self.table,
            fields: self.fields,
        }
    }
}

/// A model type mapped one-to-one to a storage table or collection.
///
/// Implementations provide the descriptor; serialization to and from the
/// JSON wire form comes for free through serde and is what the engine
/// uses to move field values in and out of storage.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + Debug {
    /// The startup-derived descriptor for this model type
    fn descriptor() -> &'static TableDescriptor;

    /// Serialize this model into its JSON document form
    fn to_document(&self) -> DataResult<Document> {
        match serde_json::to_value(self) {
            Ok(JsonValue::Object(map)) => Ok(map),
            Ok(other) => Err(DataError::Mapping(format!(
                "model for table '{}' serialized to non-object JSON: {other}",
                Self::descriptor().table()
            ))),
            Err(err) => Err(DataError::Mapping(format!(
                "model for table '{}' failed to serialize: {err}",
                Self::descriptor().table()
            ))),
        }
    }

    /// Deserialize a model from its JSON document form
    fn from_document(doc: Document) -> DataResult<Self> {
        serde_json::from_value(JsonValue::Object(doc)).map_err(|err| {
            DataError::Validation(format!(
                "row for table '{}' failed to deserialize: {err}",
                Self::descriptor().table()
            ))
        })
    }
}
