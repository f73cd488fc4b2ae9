//! Document store access for listing documents and zone aggregates.
//!
//! The store itself is external; this crate only speaks its query contract: one collection,
//! ordered by creation time descending (document id breaks ties), equality filters, a
//! start-after position and a limit.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    domain::{PublicationStatus, ZoneId},
    protocol::Document,
};
use thiserror::Error;

mod memory;
mod remote;
mod sqlite;

pub use memory::MemoryStore;
pub use remote::RemoteStore;
pub use sqlite::Storage;

pub const DEFAULT_LISTING_COLLECTION: &str = "properties";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("malformed query: {0}")]
    MalformedQuery(String),
    #[error("sqlite backend error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("sqlite migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("stored document {id} is not valid json: {source}")]
    Corrupt {
        id: String,
        source: serde_json::Error,
    },
}

/// Fields the store indexes for equality filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryField {
    ZoneId,
    CondoId,
    PropertyTypeId,
    Status,
}

impl QueryField {
    /// Name of the field inside a stored document.
    pub fn document_field(self) -> &'static str {
        match self {
            Self::ZoneId => "zoneId",
            Self::CondoId => "condoId",
            Self::PropertyTypeId => "propertyTypeId",
            Self::Status => "status",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::ZoneId => "zone_id",
            Self::CondoId => "condo_id",
            Self::PropertyTypeId => "property_type_id",
            Self::Status => "status",
        }
    }

    fn extract(self, fields: &Value) -> Option<String> {
        let alias = match self {
            Self::ZoneId => "zone_id",
            Self::CondoId => "condo_id",
            Self::PropertyTypeId => "property_type_id",
            Self::Status => "publicationStatus",
        };
        [self.document_field(), alias]
            .iter()
            .find_map(|name| fields.get(*name))
            .and_then(|value| match value {
                Value::String(text) => Some(self.normalize(text)),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
    }

    /// Status values are indexed and filtered in their canonical spelling, so a listing written
    /// as `publicado` matches a filter on `published`.
    fn normalize(self, value: &str) -> String {
        match self {
            Self::Status => PublicationStatus::parse(value)
                .map(|status| status.as_str().to_string())
                .unwrap_or_else(|| value.to_string()),
            _ => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: QueryField,
    pub value: String,
}

impl FieldFilter {
    pub fn eq(field: QueryField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: field.normalize(&value.into()),
        }
    }

    fn matches(&self, document: &Document) -> bool {
        self.field.extract(&document.fields).as_deref() == Some(self.value.as_str())
    }
}

/// Index position of the last document of the previous page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StartAfter {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

impl StartAfter {
    pub fn of(document: &Document) -> Self {
        Self {
            created_at: document.created_at,
            id: document.id.clone(),
        }
    }

    fn precedes(&self, document: &Document) -> bool {
        index_order(&self.created_at, &self.id, &document.created_at, &document.id)
            == Ordering::Less
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingQuery {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub start_after: Option<StartAfter>,
    pub limit: usize,
}

impl ListingQuery {
    pub fn new(collection: impl Into<String>, limit: usize) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            start_after: None,
            limit,
        }
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn start_after(mut self, position: Option<StartAfter>) -> Self {
        self.start_after = position;
        self
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.collection.trim().is_empty() {
            return Err(StoreError::MalformedQuery("collection must not be empty".into()));
        }
        if self.limit == 0 {
            return Err(StoreError::MalformedQuery("limit must be positive".into()));
        }
        Ok(())
    }

    fn admits(&self, document: &Document) -> bool {
        self.filters.iter().all(|filter| filter.matches(document))
            && self
                .start_after
                .as_ref()
                .map_or(true, |position| position.precedes(document))
    }
}

/// Store index order: newest first, then descending document id.
pub fn index_order(
    a_created: &DateTime<Utc>,
    a_id: &str,
    b_created: &DateTime<Utc>,
    b_id: &str,
) -> Ordering {
    b_created.cmp(a_created).then_with(|| b_id.cmp(a_id))
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(&self, query: &ListingQuery) -> Result<Vec<Document>, StoreError>;
    async fn zone_ids(&self) -> Result<Vec<ZoneId>, StoreError>;
    async fn zone_aggregate(&self, zone_id: &ZoneId) -> Result<Option<Value>, StoreError>;
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
