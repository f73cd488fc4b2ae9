//! Cursor-based incremental fetching of published listings.

use std::{fmt::Write as _, sync::Arc};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{
    domain::{CondoId, PropertyTypeId, PublicationStatus, ZoneId},
    filters::FilterState,
    listing::ListingRecord,
};
use storage::{DocumentStore, FieldFilter, ListingQuery, QueryField, StartAfter};
use tracing::{debug, warn};

use crate::error::FetchError;

/// The part of a filter selection pushed down to the store as equality filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct QueryScope {
    pub zone_id: Option<ZoneId>,
    pub condo_id: Option<CondoId>,
    pub property_type_id: Option<PropertyTypeId>,
}

impl QueryScope {
    pub fn from_filters(filters: &FilterState) -> Self {
        Self {
            zone_id: filters.zone_id.clone(),
            condo_id: filters.condo_id.clone(),
            property_type_id: filters.property_type_id.clone(),
        }
    }

    /// Stable digest identifying this scope; embedded in every cursor issued under it.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        digest[..16].iter().fold(String::with_capacity(32), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
    }

    fn field_filters(&self) -> Vec<FieldFilter> {
        let mut filters = vec![FieldFilter::eq(
            QueryField::Status,
            PublicationStatus::Published.as_str(),
        )];
        if let Some(zone_id) = &self.zone_id {
            filters.push(FieldFilter::eq(QueryField::ZoneId, zone_id.as_str()));
        }
        if let Some(condo_id) = &self.condo_id {
            filters.push(FieldFilter::eq(QueryField::CondoId, condo_id.as_str()));
        }
        if let Some(property_type_id) = &self.property_type_id {
            filters.push(FieldFilter::eq(
                QueryField::PropertyTypeId,
                property_type_id.as_str(),
            ));
        }
        filters
    }
}

/// Opaque continuation token: the store position of the last record of a page plus the scope
/// it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    scope: String,
    position: StartAfter,
}

/// Timestamps keep full nanosecond precision; stores compare positions at that precision.
#[derive(Serialize, Deserialize)]
struct CursorToken {
    s: String,
    t: i64,
    n: u32,
    i: String,
}

impl Cursor {
    pub fn scope_fingerprint(&self) -> &str {
        &self.scope
    }

    pub fn is_for(&self, scope: &QueryScope) -> bool {
        self.scope == scope.fingerprint()
    }

    pub fn to_token(&self) -> String {
        let token = CursorToken {
            s: self.scope.clone(),
            t: self.position.created_at.timestamp(),
            n: self.position.created_at.timestamp_subsec_nanos(),
            i: self.position.id.clone(),
        };
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&token).unwrap_or_default())
    }

    pub fn from_token(token: &str) -> Result<Self, FetchError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|err| FetchError::InvalidCursor(err.to_string()))?;
        let token: CursorToken = serde_json::from_slice(&bytes)
            .map_err(|err| FetchError::InvalidCursor(err.to_string()))?;
        let created_at = DateTime::<Utc>::from_timestamp(token.t, token.n).ok_or_else(|| {
            FetchError::InvalidCursor(format!("timestamp {}.{:09} out of range", token.t, token.n))
        })?;
        Ok(Self {
            scope: token.s,
            position: StartAfter {
                created_at,
                id: token.i,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub records: Vec<ListingRecord>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

impl ListingPage {
    pub fn exhausted() -> Self {
        Self {
            records: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Result of one page request. On failure `page` is empty with `has_more == false` and the
/// cause is in `error`.
#[derive(Debug)]
pub struct PageFetch {
    pub page: ListingPage,
    pub error: Option<FetchError>,
}

impl PageFetch {
    fn failed(error: FetchError) -> Self {
        Self {
            page: ListingPage::exhausted(),
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<ListingPage, FetchError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.page),
        }
    }
}

pub struct PaginatedFetcher {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl PaginatedFetcher {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Fetches the page following `cursor` (or the first page), newest first.
    ///
    /// One extra document is requested to learn whether another page exists. Failures are
    /// never retried here.
    pub async fn fetch_page(
        &self,
        scope: &QueryScope,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> PageFetch {
        if page_size == 0 {
            return PageFetch::failed(FetchError::EmptyPageSize);
        }
        let fingerprint = scope.fingerprint();
        if let Some(cursor) = cursor {
            if cursor.scope != fingerprint {
                warn!(
                    cursor_scope = %cursor.scope,
                    scope = %fingerprint,
                    "refusing cursor issued for another query scope"
                );
                return PageFetch::failed(FetchError::CursorScopeMismatch);
            }
        }

        let mut query = ListingQuery::new(self.collection.clone(), page_size + 1)
            .start_after(cursor.map(|cursor| cursor.position.clone()));
        for filter in scope.field_filters() {
            query = query.filter(filter);
        }

        let mut documents = match self.store.query(&query).await {
            Ok(documents) => documents,
            Err(err) => {
                warn!(collection = %self.collection, error = %err, "listing page fetch failed");
                return PageFetch::failed(err.into());
            }
        };

        let has_more = documents.len() > page_size;
        documents.truncate(page_size);
        let next_cursor = if has_more {
            documents.last().map(|last| Cursor {
                scope: fingerprint,
                position: StartAfter::of(last),
            })
        } else {
            None
        };

        let records: Vec<ListingRecord> = documents
            .iter()
            .filter_map(|document| match ListingRecord::from_document(document) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(document = %document.id, error = %err, "skipping malformed listing document");
                    None
                }
            })
            .filter(ListingRecord::is_published)
            .collect();

        debug!(
            collection = %self.collection,
            requested = page_size,
            returned = records.len(),
            has_more,
            "listing page fetched"
        );

        PageFetch {
            page: ListingPage {
                records,
                next_cursor,
                has_more,
            },
            error: None,
        }
    }
}

#[cfg(test)]
#[path = "tests/fetcher_tests.rs"]
mod tests;
