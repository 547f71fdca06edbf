//! Schema generation
//!
//! Table DDL derived from a descriptor. Add-on governed columns take
//! their definition from the registered handler; everything else maps
//! straight from the declared column type. Migration sequencing is not
//! handled here: by the time an operation runs, storage shape is assumed
//! to match the descriptor.

use crate::addon::AddOnRegistry;
use crate::descriptor::{FieldDescriptor, TableDescriptor};
use crate::error::DataResult;
use crate::value::ColumnType;

/// CREATE TABLE text for a descriptor, optionally preceded by a drop
pub fn create_table_sql(
    desc: &TableDescriptor,
    registry: &AddOnRegistry,
    drop_existing: bool,
) -> DataResult<String> {
    let mut sql = String::new();
    if drop_existing {
        sql.push_str(&drop_table_sql(desc));
        sql.push_str(";\n");
    }
    sql.push_str("CREATE TABLE IF NOT EXISTS ");
    sql.push_str(desc.table());
    sql.push_str(" (");
    for (i, field) in desc.fields().iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        match registry.handler_for(field)? {
            Some(handler) => sql.push_str(&handler.column_definition(field)),
            None => sql.push_str(&column_definition(field)),
        }
    }
    sql.push(')');
    Ok(sql)
}

/// DROP TABLE text for a descriptor
pub fn drop_table_sql(desc: &TableDescriptor) -> String {
    format!("DROP TABLE IF EXISTS {}", desc.table())
}

/// Row-removal text that keeps the table itself
pub fn clean_table_sql(desc: &TableDescriptor) -> String {
    format!("DELETE FROM {}", desc.table())
}

fn column_definition(field: &FieldDescriptor) -> String {
    if field.is_id {
        let ty = match field.column_type {
            ColumnType::BigInt => "BIGSERIAL",
            ColumnType::Integer => "SERIAL",
            other => other.sql_type(),
        };
        return format!("{} {} PRIMARY KEY", field.column, ty);
    }
    if field.is_delete_marker {
        return format!("{} BOOLEAN NOT NULL DEFAULT FALSE", field.column);
    }
    let mut def = format!("{} {}", field.column, field.column_type.sql_type());
    if !field.nullable {
        def.push_str(" NOT NULL");
    }
    def
}
