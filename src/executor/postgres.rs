//! Postgres query store.
//!
//! Binds every parameter as text and decodes each column by its Postgres
//! type into JSON, keeping the column order of the result set.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::{QueryStore, RawRow};
use crate::error::StoreError;

pub struct PgQueryStore {
    pool: PgPool,
}

impl PgQueryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueryStore for PgQueryStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn run_query(&self, sql: &str, params: &[String]) -> Result<Vec<RawRow>, StoreError> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = query.bind(value.as_str());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(classify)?;
        rows.iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)
    }
}

fn decode_row(row: &PgRow) -> Result<RawRow, sqlx::Error> {
    let mut out = RawRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_info().name())?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name {
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => Value::String(row.try_get(idx)?),
        "INT2" => json!(row.try_get::<i16, _>(idx)?),
        "INT4" => json!(row.try_get::<i32, _>(idx)?),
        "INT8" => json!(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => float(f64::from(row.try_get::<f32, _>(idx)?)),
        "FLOAT8" => float(row.try_get::<f64, _>(idx)?),
        "NUMERIC" => decimal(row.try_get::<Decimal, _>(idx)?),
        "BOOL" => Value::Bool(row.try_get(idx)?),
        "DATE" => Value::String(row.try_get::<chrono::NaiveDate, _>(idx)?.to_string()),
        "TIMESTAMP" => Value::String(
            row.try_get::<chrono::NaiveDateTime, _>(idx)?
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ),
        "TIMESTAMPTZ" => Value::String(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)?
                .to_rfc3339(),
        ),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx)?,
        "UUID" => Value::String(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        other => match row.try_get::<String, _>(idx) {
            Ok(text) => Value::String(text),
            Err(_) => {
                debug!("Column {} has undecodable type {}; returning null", idx, other);
                Value::Null
            }
        },
    };
    Ok(value)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn decimal(value: Decimal) -> Value {
    match value.to_f64().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(value.to_string()),
    }
}

/// SQLSTATE class 42 (syntax / access rule) and 22 (data exception) mean
/// the query itself is bad; everything else is the store.
fn classify(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            if code.starts_with("42") || code.starts_with("22") {
                StoreError::Rejected(format!("{} ({})", db.message(), code))
            } else {
                StoreError::Unavailable(error.to_string())
            }
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Rejected(error.to_string()),
        _ => StoreError::Unavailable(error.to_string()),
    }
}
