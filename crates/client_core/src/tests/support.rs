//! Fixtures shared by the client_core test modules.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use shared::{
    domain::{CondoId, LatLng, ListingId, PropertyTypeId},
    listing::{CondoAggregate, ListingRecord, PropertySummary},
    protocol::Document,
};
use storage::{MemoryStore, DEFAULT_LISTING_COLLECTION};

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Listing document created `minutes` after the fixture epoch. `overrides` replaces fields.
pub fn listing_doc(id: &str, minutes: i64, overrides: Value) -> Document {
    let mut fields = json!({
        "title": format!("Listing {id}"),
        "zoneId": "centro",
        "zoneName": "Centro",
        "propertyTypeId": "apartment",
        "offer": "rent",
        "status": "published",
        "price": 10_000,
        "bedrooms": 2,
        "bathrooms": 1,
        "parking": 1,
        "featured": false,
        "preSale": false,
    });
    if let (Some(base), Value::Object(extra)) = (fields.as_object_mut(), overrides) {
        for (key, value) in extra {
            base.insert(key, value);
        }
    }
    Document {
        id: id.to_string(),
        created_at: epoch() + Duration::minutes(minutes),
        fields,
    }
}

pub fn record(id: &str, minutes: i64, overrides: Value) -> ListingRecord {
    ListingRecord::from_document(&listing_doc(id, minutes, overrides)).expect("fixture listing")
}

pub async fn memory_store(documents: Vec<Document>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for document in documents {
        store.insert(DEFAULT_LISTING_COLLECTION, document).await;
    }
    store
}

pub fn summary(id: &str, price: i64, bedrooms: u32) -> PropertySummary {
    PropertySummary {
        listing_id: ListingId::new(id),
        property_type_id: PropertyTypeId::new("apartment"),
        price,
        bedrooms,
        bathrooms: 1,
        parking: 1,
        thumbnail: Some(format!("{id}.jpg")),
        pre_sale: false,
        furnished: None,
        pets_allowed: None,
    }
}

pub fn condo(id: &str, lat: f64, lng: f64, rentals: Vec<PropertySummary>) -> CondoAggregate {
    CondoAggregate {
        condo_id: CondoId::new(id),
        name: format!("Condo {id}"),
        location: LatLng::new(lat, lng),
        rentals,
        sales: Vec::new(),
        min_price: None,
        max_price: None,
    }
}
