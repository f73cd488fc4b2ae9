use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use shared::{domain::ZoneId, protocol::Document};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, QueryBuilder, Row, Sqlite,
};

use crate::{DocumentStore, ListingQuery, QueryField, StoreError};

/// SQLite-backed document store, used as a local mirror of the remote collection.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database opens a fresh, empty database.
        let max_connections = if sqlite_path(database_url).is_none() { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        let _: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    pub async fn upsert_document(
        &self,
        collection: &str,
        document: &Document,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(&document.fields).map_err(|source| {
            StoreError::Corrupt {
                id: document.id.clone(),
                source,
            }
        })?;
        sqlx::query(
            "INSERT INTO documents (collection, id, created_at_us, zone_id, condo_id, property_type_id, status, body)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET
                created_at_us = excluded.created_at_us,
                zone_id = excluded.zone_id,
                condo_id = excluded.condo_id,
                property_type_id = excluded.property_type_id,
                status = excluded.status,
                body = excluded.body",
        )
        .bind(collection)
        .bind(document.id.as_str())
        .bind(document.created_at.timestamp_micros())
        .bind(QueryField::ZoneId.extract(&document.fields))
        .bind(QueryField::CondoId.extract(&document.fields))
        .bind(QueryField::PropertyTypeId.extract(&document.fields))
        .bind(QueryField::Status.extract(&document.fields))
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn put_zone_aggregate(
        &self,
        zone_id: &ZoneId,
        aggregate: &Value,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(aggregate).map_err(|source| StoreError::Corrupt {
            id: zone_id.to_string(),
            source,
        })?;
        sqlx::query(
            "INSERT INTO zone_aggregates (zone_id, body, updated_at_us) VALUES (?, ?, ?)
             ON CONFLICT(zone_id) DO UPDATE SET body = excluded.body, updated_at_us = excluded.updated_at_us",
        )
        .bind(zone_id.as_str())
        .bind(body)
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_documents(&self, collection: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn decode_body(id: &str, body: &str) -> Result<Value, StoreError> {
    serde_json::from_str(body).map_err(|source| StoreError::Corrupt {
        id: id.to_string(),
        source,
    })
}

#[async_trait]
impl DocumentStore for Storage {
    async fn query(&self, query: &ListingQuery) -> Result<Vec<Document>, StoreError> {
        query.validate()?;

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, created_at_us, body FROM documents WHERE collection = ");
        builder.push_bind(query.collection.clone());
        for filter in &query.filters {
            builder
                .push(" AND ")
                .push(filter.field.column())
                .push(" = ")
                .push_bind(filter.value.clone());
        }
        if let Some(position) = &query.start_after {
            let created_at_us = position.created_at.timestamp_micros();
            builder
                .push(" AND (created_at_us < ")
                .push_bind(created_at_us)
                .push(" OR (created_at_us = ")
                .push_bind(created_at_us)
                .push(" AND id < ")
                .push_bind(position.id.clone())
                .push("))");
        }
        builder
            .push(" ORDER BY created_at_us DESC, id DESC LIMIT ")
            .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| -> Result<Document, StoreError> {
                let id: String = row.get(0);
                let created_at_us: i64 = row.get(1);
                let body: String = row.get(2);
                let created_at = DateTime::<Utc>::from_timestamp_micros(created_at_us).ok_or_else(|| {
                    StoreError::MalformedQuery(format!(
                        "document {id} has out-of-range timestamp {created_at_us}"
                    ))
                })?;
                let fields = decode_body(&id, &body)?;
                Ok(Document {
                    id,
                    created_at,
                    fields,
                })
            })
            .collect()
    }

    async fn zone_ids(&self) -> Result<Vec<ZoneId>, StoreError> {
        let rows = sqlx::query("SELECT zone_id FROM zone_aggregates ORDER BY zone_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ZoneId::new(row.get::<String, _>(0)))
            .collect())
    }

    async fn zone_aggregate(&self, zone_id: &ZoneId) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT body FROM zone_aggregates WHERE zone_id = ?")
            .bind(zone_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| decode_body(zone_id.as_str(), &row.get::<String, _>(0)))
            .transpose()
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<(), StoreError> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).map_err(|err| {
        StoreError::Unavailable(format!(
            "failed to create parent directory '{}' for database url '{database_url}': {err}",
            parent.display()
        ))
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}
