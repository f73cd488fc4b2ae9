use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CondoId, LatLng, ListingId, ListingOffer, PropertyTypeId, PublicationStatus, ZoneId,
};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AreaMetrics {
    pub built_m2: f64,
    pub lot_m2: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Amenities {
    pub furnished: bool,
    pub pets_allowed: bool,
    pub pool: bool,
    pub gym: bool,
    pub security: bool,
    pub elevator: bool,
}

/// Published listing as fetched from the store. Never mutated after fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: ListingId,
    pub title: String,
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub condo_id: Option<CondoId>,
    pub condo_name: Option<String>,
    pub property_type_id: PropertyTypeId,
    pub offer: ListingOffer,
    pub price: i64,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub parking: u32,
    pub area: AreaMetrics,
    pub amenities: Amenities,
    pub pre_sale: bool,
    pub status: PublicationStatus,
    pub created_at: DateTime<Utc>,
    pub images: Vec<String>,
    pub featured: bool,
}

impl ListingRecord {
    pub fn is_published(&self) -> bool {
        self.status == PublicationStatus::Published
    }
}

/// Pre-summarized listing carried inside a condo aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub listing_id: ListingId,
    pub property_type_id: PropertyTypeId,
    pub price: i64,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub parking: u32,
    pub thumbnail: Option<String>,
    pub pre_sale: bool,
    /// Older aggregates omit the rent-only amenities; `None` never excludes.
    pub furnished: Option<bool>,
    pub pets_allowed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondoAggregate {
    pub condo_id: CondoId,
    pub name: String,
    pub location: LatLng,
    pub rentals: Vec<PropertySummary>,
    pub sales: Vec<PropertySummary>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
}

impl CondoAggregate {
    pub fn has_known_location(&self) -> bool {
        !self.location.is_unknown()
    }

    /// Every summary tagged with the offer it was listed under.
    pub fn summaries(&self) -> impl Iterator<Item = (ListingOffer, &PropertySummary)> {
        self.rentals
            .iter()
            .map(|summary| (ListingOffer::Rent, summary))
            .chain(self.sales.iter().map(|summary| (ListingOffer::Sale, summary)))
    }
}

/// One aggregate document per geographic zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneAggregate {
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub condos: Vec<CondoAggregate>,
}
