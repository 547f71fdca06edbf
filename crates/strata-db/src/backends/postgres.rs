//! Relational backend over sqlx/PostgreSQL
//!
//! Turns the engine's assembled requests into single SQL statements.
//! Placeholder text comes from the condition tree's generation pass and
//! values from its injection pass, both driven by one shared cursor, so
//! parameter positions always line up. Connections are checked out of
//! the pool per statement and released on every exit path by sqlx.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row as SqlxRow};
use tracing::debug;

use crate::addon::AddOnRegistry;
use crate::backends::{ColumnValue, Row, SelectColumn, StorageBackend};
use crate::descriptor::TableDescriptor;
use crate::error::{DataError, DataResult};
use crate::query::{ParamCursor, QueryOptions, WhereNode};
use crate::schema;
use crate::value::{bind_value, ColumnType, FieldValue};

/// PostgreSQL-backed storage
pub struct PostgresBackend {
    pool: Pool<Postgres>,
    addons: Arc<AddOnRegistry>,
}

impl PostgresBackend {
    /// Connect a pool to the given database URL
    pub async fn connect(url: &str, addons: Arc<AddOnRegistry>) -> DataResult<Self> {
        let pool = PgPoolOptions::new()
            .connect(url)
            .await
            .map_err(|e| DataError::Backend(format!("failed to connect to PostgreSQL: {e}")))?;
        Ok(Self { pool, addons })
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: Pool<Postgres>, addons: Arc<AddOnRegistry>) -> Self {
        Self { pool, addons }
    }

    fn decode_row(row: &PgRow, select: &[SelectColumn]) -> DataResult<Row> {
        let mut out = Row::with_capacity(select.len());
        for (index, col) in select.iter().enumerate() {
            out.insert(col.name.clone(), decode_column(row, index, col.ty)?);
        }
        Ok(out)
    }

    fn push_where(sql: &mut String, filter: &WhereNode, cursor: &mut ParamCursor) {
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            filter.generate(sql, cursor);
        }
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn insert_row(
        &self,
        desc: &TableDescriptor,
        values: Vec<ColumnValue>,
        returning: &[SelectColumn],
    ) -> DataResult<Row> {
        let mut cursor = ParamCursor::new();
        let mut sql = format!("INSERT INTO {}", desc.table());
        if values.is_empty() {
            sql.push_str(" DEFAULT VALUES");
        } else {
            sql.push_str(" (");
            for (i, cv) in values.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&cv.column);
            }
            sql.push_str(") VALUES (");
            for i in 0..values.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&cursor.placeholder());
            }
            sql.push(')');
        }
        sql.push_str(" RETURNING ");
        for (i, col) in returning.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&col.expr);
        }

        debug!(table = desc.table(), "sql insert");
        let mut query = sqlx::query(&sql);
        for cv in &values {
            query = bind_value(query, &cv.value);
        }
        let row = query.fetch_one(&self.pool).await?;
        Self::decode_row(&row, returning)
    }

    async fn fetch_rows(
        &self,
        desc: &TableDescriptor,
        select: &[SelectColumn],
        filter: &WhereNode,
        options: &QueryOptions,
    ) -> DataResult<Vec<Row>> {
        let mut cursor = ParamCursor::new();
        let mut sql = String::from("SELECT ");
        for (i, col) in select.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&col.expr);
        }
        sql.push_str(" FROM ");
        sql.push_str(desc.table());
        Self::push_where(&mut sql, filter, &mut cursor);
        for (i, (column, direction)) in options.order_by.iter().enumerate() {
            sql.push_str(if i == 0 { " ORDER BY " } else { ", " });
            sql.push_str(column);
            sql.push(' ');
            sql.push_str(&direction.to_string());
        }
        if let Some(limit) = options.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut params = Vec::new();
        filter.inject(&mut params);
        debug!(table = desc.table(), params = params.len(), "sql select");

        let mut query = sqlx::query(&sql);
        for param in &params {
            query = bind_value(query, param);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| Self::decode_row(row, select)).collect()
    }

    async fn count_rows(&self, desc: &TableDescriptor, filter: &WhereNode) -> DataResult<u64> {
        let mut cursor = ParamCursor::new();
        let mut sql = format!("SELECT COUNT(*) FROM {}", desc.table());
        Self::push_where(&mut sql, filter, &mut cursor);

        let mut params = Vec::new();
        filter.inject(&mut params);

        let mut query = sqlx::query(&sql);
        for param in &params {
            query = bind_value(query, param);
        }
        let row = query.fetch_one(&self.pool).await?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| DataError::Backend(format!("count decode failed: {e}")))?;
        Ok(count as u64)
    }

    async fn update_rows(
        &self,
        desc: &TableDescriptor,
        assignments: Vec<ColumnValue>,
        filter: &WhereNode,
    ) -> DataResult<u64> {
        if assignments.is_empty() {
            return Ok(0);
        }
        // one cursor spans SET assignments and the WHERE tree so binding
        // order matches placeholder order across the whole statement
        let mut cursor = ParamCursor::new();
        let mut sql = format!("UPDATE {} SET ", desc.table());
        for (i, cv) in assignments.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&cv.column);
            sql.push_str(" = ");
            sql.push_str(&cursor.placeholder());
        }
        Self::push_where(&mut sql, filter, &mut cursor);

        debug!(table = desc.table(), "sql update");
        let mut query = sqlx::query(&sql);
        for cv in &assignments {
            query = bind_value(query, &cv.value);
        }
        let mut params = Vec::new();
        filter.inject(&mut params);
        for param in &params {
            query = bind_value(query, param);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_rows(&self, desc: &TableDescriptor, filter: &WhereNode) -> DataResult<u64> {
        let mut cursor = ParamCursor::new();
        let mut sql = format!("DELETE FROM {}", desc.table());
        Self::push_where(&mut sql, filter, &mut cursor);

        let mut params = Vec::new();
        filter.inject(&mut params);

        debug!(table = desc.table(), "sql delete");
        let mut query = sqlx::query(&sql);
        for param in &params {
            query = bind_value(query, param);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn create_table(&self, desc: &TableDescriptor, drop_existing: bool) -> DataResult<()> {
        let sql = schema::create_table_sql(desc, &self.addons, drop_existing)?;
        for statement in sql.split(";\n").filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn drop_table(&self, desc: &TableDescriptor) -> DataResult<()> {
        sqlx::query(&schema::drop_table_sql(desc))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clean_table(&self, desc: &TableDescriptor) -> DataResult<()> {
        sqlx::query(&schema::clean_table_sql(desc))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decode_column(row: &PgRow, index: usize, ty: ColumnType) -> DataResult<FieldValue> {
    let fail = |e: sqlx::Error| DataError::Backend(format!("column {index} decode failed: {e}"));
    let value = match ty {
        ColumnType::Boolean => row
            .try_get::<Option<bool>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Bool),
        ColumnType::SmallInt => row
            .try_get::<Option<i16>, _>(index)
            .map_err(fail)?
            .map(FieldValue::SmallInt),
        ColumnType::Integer => row
            .try_get::<Option<i32>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Int),
        ColumnType::BigInt => row
            .try_get::<Option<i64>, _>(index)
            .map_err(fail)?
            .map(FieldValue::BigInt),
        ColumnType::Float => row
            .try_get::<Option<f32>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Float),
        ColumnType::Double => row
            .try_get::<Option<f64>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Double),
        ColumnType::Text => row
            .try_get::<Option<String>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Text),
        ColumnType::Bytes => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Bytes),
        ColumnType::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Uuid),
        ColumnType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Timestamp),
        ColumnType::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Date),
        ColumnType::Time => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Time),
        ColumnType::Enumerated => row
            .try_get::<Option<String>, _>(index)
            .map_err(fail)?
            .map(FieldValue::Enum),
    };
    Ok(value.unwrap_or(FieldValue::Null))
}
