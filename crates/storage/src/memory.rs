use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use shared::{domain::ZoneId, protocol::Document};
use tokio::sync::RwLock;

use crate::{index_order, DocumentStore, ListingQuery, StoreError};

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<String, Vec<Document>>,
    zones: BTreeMap<ZoneId, Value>,
    offline: Option<String>,
}

/// In-process document store with the same ordering and filter semantics as the remote one.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document, keeping the collection in index order.
    pub async fn insert(&self, collection: &str, document: Document) {
        let mut state = self.state.write().await;
        let documents = state.collections.entry(collection.to_string()).or_default();
        documents.retain(|existing| existing.id != document.id);
        documents.push(document);
        documents.sort_by(|a, b| index_order(&a.created_at, &a.id, &b.created_at, &b.id));
    }

    pub async fn put_zone_aggregate(&self, zone_id: ZoneId, aggregate: Value) {
        self.state.write().await.zones.insert(zone_id, aggregate);
    }

    /// Makes every call fail with [`StoreError::Unavailable`] until cleared with `None`.
    pub async fn set_offline(&self, reason: Option<String>) {
        self.state.write().await.offline = reason;
    }

    fn ensure_online(state: &MemoryState) -> Result<(), StoreError> {
        match &state.offline {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, query: &ListingQuery) -> Result<Vec<Document>, StoreError> {
        query.validate()?;
        let state = self.state.read().await;
        Self::ensure_online(&state)?;
        Ok(state
            .collections
            .get(&query.collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| query.admits(document))
                    .take(query.limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn zone_ids(&self) -> Result<Vec<ZoneId>, StoreError> {
        let state = self.state.read().await;
        Self::ensure_online(&state)?;
        Ok(state.zones.keys().cloned().collect())
    }

    async fn zone_aggregate(&self, zone_id: &ZoneId) -> Result<Option<Value>, StoreError> {
        let state = self.state.read().await;
        Self::ensure_online(&state)?;
        Ok(state.zones.get(zone_id).cloned())
    }
}
