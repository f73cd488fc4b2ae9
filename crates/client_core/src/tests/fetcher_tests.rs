use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{domain::ZoneId, protocol::Document};
use storage::{StoreError, DEFAULT_LISTING_COLLECTION};

use super::*;
use crate::test_support::{listing_doc, memory_store};

fn fetcher(store: Arc<dyn DocumentStore>) -> PaginatedFetcher {
    PaginatedFetcher::new(store, DEFAULT_LISTING_COLLECTION)
}

fn ids(page: &ListingPage) -> Vec<String> {
    page.records
        .iter()
        .map(|record| record.id.as_str().to_string())
        .collect()
}

#[tokio::test]
async fn twenty_three_records_paginate_as_ten_ten_three() {
    let documents = (0..23)
        .map(|n| listing_doc(&format!("l{n:02}"), n, json!({})))
        .collect();
    let fetcher = fetcher(memory_store(documents).await);
    let scope = QueryScope::default();

    let first = fetcher.fetch_page(&scope, None, 10).await.into_result().expect("page 1");
    assert_eq!(first.records.len(), 10);
    assert!(first.has_more);
    let c1 = first.next_cursor.clone().expect("cursor 1");

    let second = fetcher
        .fetch_page(&scope, Some(&c1), 10)
        .await
        .into_result()
        .expect("page 2");
    assert_eq!(second.records.len(), 10);
    assert!(second.has_more);
    let c2 = second.next_cursor.clone().expect("cursor 2");

    let third = fetcher
        .fetch_page(&scope, Some(&c2), 10)
        .await
        .into_result()
        .expect("page 3");
    assert_eq!(third.records.len(), 3);
    assert!(!third.has_more);
    assert!(third.next_cursor.is_none());

    let all: Vec<_> = [first, second, third]
        .iter()
        .flat_map(|page| page.records.clone())
        .collect();
    let unique: HashSet<_> = all.iter().map(|record| record.id.clone()).collect();
    assert_eq!(unique.len(), 23);
    assert!(all
        .windows(2)
        .all(|pair| pair[0].created_at > pair[1].created_at));
}

#[tokio::test]
async fn pagination_is_complete_with_timestamp_ties() {
    let documents = (0..9)
        .map(|n| listing_doc(&format!("t{n}"), n / 3, json!({})))
        .collect();
    let fetcher = fetcher(memory_store(documents).await);
    let scope = QueryScope::default();

    let mut seen = Vec::new();
    let mut cursor: Option<Cursor> = None;
    loop {
        let page = fetcher
            .fetch_page(&scope, cursor.as_ref(), 2)
            .await
            .into_result()
            .expect("page");
        seen.extend(ids(&page));
        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }

    assert_eq!(
        seen,
        vec!["t8", "t7", "t6", "t5", "t4", "t3", "t2", "t1", "t0"]
    );
}

#[tokio::test]
async fn only_published_records_in_scope_are_returned() {
    let documents = vec![
        listing_doc("a", 1, json!({"zoneId": "norte"})),
        listing_doc("b", 2, json!({"zoneId": "norte", "status": "draft"})),
        listing_doc("c", 3, json!({"zoneId": "sur"})),
    ];
    let fetcher = fetcher(memory_store(documents).await);
    let scope = QueryScope {
        zone_id: Some(ZoneId::new("norte")),
        ..QueryScope::default()
    };

    let page = fetcher.fetch_page(&scope, None, 10).await.into_result().expect("page");
    assert_eq!(ids(&page), vec!["a"]);
}

#[tokio::test]
async fn localized_published_statuses_are_all_fetched() {
    let documents = vec![
        listing_doc("en", 3, json!({"status": "published"})),
        listing_doc("es", 2, json!({"status": "publicado"})),
        listing_doc("legacy", 1, json!({"status": "active"})),
        listing_doc("draft", 0, json!({"status": "borrador"})),
    ];
    let fetcher = fetcher(memory_store(documents).await);

    let page = fetcher
        .fetch_page(&QueryScope::default(), None, 10)
        .await
        .into_result()
        .expect("page");
    assert_eq!(ids(&page), vec!["en", "es", "legacy"]);
}

struct UnfilteredStore {
    documents: Vec<Document>,
}

#[async_trait]
impl DocumentStore for UnfilteredStore {
    async fn query(&self, query: &ListingQuery) -> Result<Vec<Document>, StoreError> {
        Ok(self.documents.iter().take(query.limit).cloned().collect())
    }

    async fn zone_ids(&self) -> Result<Vec<ZoneId>, StoreError> {
        Ok(Vec::new())
    }

    async fn zone_aggregate(&self, _zone_id: &ZoneId) -> Result<Option<Value>, StoreError> {
        Ok(None)
    }
}

#[tokio::test]
async fn unpublished_records_are_dropped_even_if_the_store_ignores_the_filter() {
    let store = UnfilteredStore {
        documents: vec![
            listing_doc("b", 2, json!({"status": "archived"})),
            listing_doc("a", 1, json!({})),
        ],
    };
    let fetcher = fetcher(Arc::new(store));

    let page = fetcher
        .fetch_page(&QueryScope::default(), None, 10)
        .await
        .into_result()
        .expect("page");
    assert_eq!(ids(&page), vec!["a"]);
}

#[tokio::test]
async fn malformed_documents_are_skipped_without_losing_position() {
    let documents = vec![
        listing_doc("d", 4, json!({})),
        listing_doc("c", 3, json!({"price": "call us"})),
        listing_doc("b", 2, json!({})),
        listing_doc("a", 1, json!({})),
    ];
    let fetcher = fetcher(memory_store(documents).await);
    let scope = QueryScope::default();

    let first = fetcher.fetch_page(&scope, None, 2).await.into_result().expect("page 1");
    assert_eq!(ids(&first), vec!["d"]);
    assert!(first.has_more);

    let second = fetcher
        .fetch_page(&scope, first.next_cursor.as_ref(), 2)
        .await
        .into_result()
        .expect("page 2");
    assert_eq!(ids(&second), vec!["b", "a"]);
    assert!(!second.has_more);
}

#[tokio::test]
async fn store_failure_yields_empty_exhausted_page_and_surfaces_error() {
    let store = memory_store(vec![listing_doc("a", 1, json!({}))]).await;
    store.set_offline(Some("connection reset".into())).await;
    let fetcher = fetcher(store);

    let fetch = fetcher.fetch_page(&QueryScope::default(), None, 10).await;

    assert!(fetch.page.records.is_empty());
    assert!(!fetch.page.has_more);
    assert!(fetch.page.next_cursor.is_none());
    assert!(matches!(
        fetch.error,
        Some(FetchError::Store(StoreError::Unavailable(_)))
    ));
}

#[tokio::test]
async fn cursor_from_another_scope_is_refused() {
    let documents = (0..5)
        .map(|n| listing_doc(&format!("l{n}"), n, json!({"zoneId": "norte"})))
        .collect();
    let fetcher = fetcher(memory_store(documents).await);
    let norte = QueryScope {
        zone_id: Some(ZoneId::new("norte")),
        ..QueryScope::default()
    };

    let first = fetcher.fetch_page(&norte, None, 2).await.into_result().expect("page");
    let cursor = first.next_cursor.expect("cursor");

    let fetch = fetcher.fetch_page(&QueryScope::default(), Some(&cursor), 2).await;
    assert!(matches!(fetch.error, Some(FetchError::CursorScopeMismatch)));
    assert!(fetch.page.records.is_empty());
}

#[tokio::test]
async fn cursor_survives_token_encoding() {
    let documents = (0..4)
        .map(|n| listing_doc(&format!("l{n}"), n, json!({})))
        .collect();
    let fetcher = fetcher(memory_store(documents).await);
    let scope = QueryScope::default();

    let first = fetcher.fetch_page(&scope, None, 2).await.into_result().expect("page");
    let token = first.next_cursor.expect("cursor").to_token();
    let restored = Cursor::from_token(&token).expect("decode");
    assert!(restored.is_for(&scope));

    let second = fetcher
        .fetch_page(&scope, Some(&restored), 2)
        .await
        .into_result()
        .expect("page 2");
    assert_eq!(ids(&second), vec!["l1", "l0"]);

    assert!(matches!(
        Cursor::from_token("not a cursor"),
        Err(FetchError::InvalidCursor(_))
    ));
}

#[tokio::test]
async fn token_cursor_keeps_sub_microsecond_order() {
    let at = |id: &str, nanos: i64| {
        let mut document = listing_doc(id, 0, json!({}));
        document.created_at += chrono::Duration::nanoseconds(nanos);
        document
    };
    let fetcher = fetcher(memory_store(vec![at("early", 100), at("late", 500)]).await);
    let scope = QueryScope::default();

    let first = fetcher.fetch_page(&scope, None, 1).await.into_result().expect("page");
    assert_eq!(ids(&first), vec!["late"]);
    let token = first.next_cursor.expect("cursor").to_token();
    let restored = Cursor::from_token(&token).expect("decode");

    let second = fetcher
        .fetch_page(&scope, Some(&restored), 1)
        .await
        .into_result()
        .expect("page 2");
    assert_eq!(ids(&second), vec!["early"]);
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let fetcher = fetcher(memory_store(Vec::new()).await);
    let fetch = fetcher.fetch_page(&QueryScope::default(), None, 0).await;
    assert!(matches!(fetch.error, Some(FetchError::EmptyPageSize)));
}
