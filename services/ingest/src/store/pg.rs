use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{Filter, Record, RecordId, Store, Table, Value};
use crate::config::IngestConfig;
use crate::error::StoreError;

/// Postgres-backed store. Every table has a serial/identity `id` column.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &IngestConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.db_url)
            .await?;
        Ok(Self { pool })
    }
}

/// NULL goes in as a literal so Postgres infers the column type.
fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Null => {
            builder.push("NULL");
        }
        Value::Int(v) => {
            builder.push_bind(*v);
        }
        Value::Float(v) => {
            builder.push_bind(*v);
        }
        Value::Text(v) => {
            builder.push_bind(v.clone());
        }
        Value::Date(v) => {
            builder.push_bind(*v);
        }
    }
}

pub(crate) fn select_query(table: Table, filters: &[Filter]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT id::bigint FROM ");
    builder.push(table.as_str());
    for (i, filter) in filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::Eq(column, Value::Null) | Filter::IsNull(column) => {
                builder.push(*column).push(" IS NULL");
            }
            Filter::Eq(column, value) => {
                builder.push(*column).push(" = ");
                push_value(&mut builder, value);
            }
        }
    }
    builder.push(" ORDER BY id LIMIT 1");
    builder
}

pub(crate) fn insert_query(record: &Record) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("INSERT INTO ");
    builder.push(record.table.as_str());
    if record.columns.is_empty() {
        builder.push(" DEFAULT VALUES");
    } else {
        builder.push(" (");
        let mut names = builder.separated(", ");
        for (column, _) in &record.columns {
            names.push(*column);
        }
        builder.push(") VALUES (");
        for (i, (_, value)) in record.columns.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            push_value(&mut builder, value);
        }
        builder.push(")");
    }
    builder.push(" RETURNING id::bigint");
    builder
}

#[async_trait]
impl Store for PgStore {
    async fn find_one(&self, table: Table, filters: &[Filter]) -> Result<Option<RecordId>, StoreError> {
        let mut builder = select_query(table, filters);
        tracing::debug!(sql = builder.sql(), "find_one");
        let row: Option<(i64,)> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn insert(&self, record: Record) -> Result<Option<RecordId>, StoreError> {
        let mut builder = insert_query(&record);
        tracing::debug!(sql = builder.sql(), "insert");
        let row: Option<(Option<i64>,)> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) => StoreError::Rejected {
                    table: record.table,
                    reason: db.to_string(),
                },
                other => StoreError::Database(other),
            })?;
        Ok(row.and_then(|(id,)| id))
    }
}
