//! Pure facet evaluation shared by the list view and the map markers.
//!
//! Gates run in a fixed order: publication status, transaction type, the zone / condo /
//! property-type equalities, availability, the "at least" count buckets, price, and finally
//! the rent-only amenities. Sorting happens once, on the final candidate set.

use std::cmp::Ordering;

use shared::{
    domain::{
        Availability, CondoId, ListingOffer, PropertyTypeId, SortOrder, TransactionType, ZoneId,
    },
    filters::FilterState,
    listing::{ListingRecord, PropertySummary},
};

use crate::config::FacetThresholds;

/// Anything the facet gates can be evaluated against.
pub trait FacetSubject {
    fn is_published(&self) -> bool;
    fn offer(&self) -> ListingOffer;
    fn zone_id(&self) -> Option<&ZoneId>;
    fn condo_id(&self) -> Option<&CondoId>;
    fn property_type_id(&self) -> &PropertyTypeId;
    fn pre_sale(&self) -> bool;
    fn bedrooms(&self) -> u32;
    fn bathrooms(&self) -> u32;
    fn parking(&self) -> u32;
    fn price(&self) -> i64;
    /// `None` when the source does not record the amenity; unknown never excludes.
    fn furnished(&self) -> Option<bool>;
    fn pets_allowed(&self) -> Option<bool>;
}

impl FacetSubject for ListingRecord {
    fn is_published(&self) -> bool {
        ListingRecord::is_published(self)
    }

    fn offer(&self) -> ListingOffer {
        self.offer
    }

    fn zone_id(&self) -> Option<&ZoneId> {
        Some(&self.zone_id)
    }

    fn condo_id(&self) -> Option<&CondoId> {
        self.condo_id.as_ref()
    }

    fn property_type_id(&self) -> &PropertyTypeId {
        &self.property_type_id
    }

    fn pre_sale(&self) -> bool {
        self.pre_sale
    }

    fn bedrooms(&self) -> u32 {
        self.bedrooms
    }

    fn bathrooms(&self) -> u32 {
        self.bathrooms
    }

    fn parking(&self) -> u32 {
        self.parking
    }

    fn price(&self) -> i64 {
        self.price
    }

    fn furnished(&self) -> Option<bool> {
        Some(self.amenities.furnished)
    }

    fn pets_allowed(&self) -> Option<bool> {
        Some(self.amenities.pets_allowed)
    }
}

/// A condo summary viewed in the context of the aggregate that carries it.
#[derive(Debug, Clone, Copy)]
pub struct SummaryFacets<'a> {
    pub offer: ListingOffer,
    pub zone_id: &'a ZoneId,
    pub condo_id: &'a CondoId,
    pub summary: &'a PropertySummary,
}

impl FacetSubject for SummaryFacets<'_> {
    fn is_published(&self) -> bool {
        // Aggregates are rebuilt from published listings only.
        true
    }

    fn offer(&self) -> ListingOffer {
        self.offer
    }

    fn zone_id(&self) -> Option<&ZoneId> {
        Some(self.zone_id)
    }

    fn condo_id(&self) -> Option<&CondoId> {
        Some(self.condo_id)
    }

    fn property_type_id(&self) -> &PropertyTypeId {
        &self.summary.property_type_id
    }

    fn pre_sale(&self) -> bool {
        self.summary.pre_sale
    }

    fn bedrooms(&self) -> u32 {
        self.summary.bedrooms
    }

    fn bathrooms(&self) -> u32 {
        self.summary.bathrooms
    }

    fn parking(&self) -> u32 {
        self.summary.parking
    }

    fn price(&self) -> i64 {
        self.summary.price
    }

    fn furnished(&self) -> Option<bool> {
        self.summary.furnished
    }

    fn pets_allowed(&self) -> Option<bool> {
        self.summary.pets_allowed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityGate {
    Zone,
    Condo,
    PropertyType,
}

/// Which gates a pipeline runs. The map skips the condo gate: a selected condo is shown as
/// the selected marker rather than by hiding every other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSet {
    pub condo: bool,
}

impl GateSet {
    pub const LIST: GateSet = GateSet { condo: true };
    pub const MAP: GateSet = GateSet { condo: false };
}

#[derive(Debug, Clone)]
pub struct FacetEvaluator {
    thresholds: FacetThresholds,
    equality_order: [EqualityGate; 3],
}

impl Default for FacetEvaluator {
    fn default() -> Self {
        Self::new(FacetThresholds::default())
    }
}

fn at_least(count: u32, selected: Option<u32>, top_floor: u32) -> bool {
    match selected {
        None => true,
        Some(selected) => count >= selected.min(top_floor.max(1)),
    }
}

fn amenity(value: Option<bool>, wanted: Option<bool>) -> bool {
    match (wanted, value) {
        (None, _) | (_, None) => true,
        (Some(wanted), Some(value)) => wanted == value,
    }
}

impl FacetEvaluator {
    pub fn new(thresholds: FacetThresholds) -> Self {
        Self {
            thresholds,
            equality_order: [EqualityGate::Zone, EqualityGate::Condo, EqualityGate::PropertyType],
        }
    }

    pub fn with_equality_order(mut self, order: [EqualityGate; 3]) -> Self {
        self.equality_order = order;
        self
    }

    pub fn thresholds(&self) -> FacetThresholds {
        self.thresholds
    }

    /// Filters then sorts `records`. Deterministic and order-preserving within sort ties.
    pub fn evaluate(&self, records: &[ListingRecord], filters: &FilterState) -> Vec<ListingRecord> {
        let mut matched: Vec<ListingRecord> = records
            .iter()
            .filter(|record| self.matches(*record, filters, GateSet::LIST))
            .cloned()
            .collect();
        sort_listings(&mut matched, filters.sort_order);
        matched
    }

    pub fn matches<T: FacetSubject + ?Sized>(
        &self,
        item: &T,
        filters: &FilterState,
        gates: GateSet,
    ) -> bool {
        if !item.is_published() {
            return false;
        }

        let offer = item.offer();
        let transaction_ok = match filters.transaction_type {
            TransactionType::None => true,
            TransactionType::Rent => offer.is_rentable(),
            TransactionType::Buy => offer.is_for_sale(),
        };
        if !transaction_ok {
            return false;
        }

        for gate in self.equality_order {
            let ok = match gate {
                EqualityGate::Zone => filters
                    .zone_id
                    .as_ref()
                    .map_or(true, |zone| item.zone_id() == Some(zone)),
                EqualityGate::Condo => {
                    !gates.condo
                        || filters
                            .condo_id
                            .as_ref()
                            .map_or(true, |condo| item.condo_id() == Some(condo))
                }
                EqualityGate::PropertyType => filters
                    .property_type_id
                    .as_ref()
                    .map_or(true, |kind| item.property_type_id() == kind),
            };
            if !ok {
                return false;
            }
        }

        if filters.transaction_type == TransactionType::Buy {
            let availability_ok = match filters.availability {
                Availability::Unconstrained => true,
                Availability::Immediate => !item.pre_sale(),
                Availability::PreSale => item.pre_sale(),
            };
            if !availability_ok {
                return false;
            }
        }

        let thresholds = self.thresholds;
        if !at_least(item.bedrooms(), filters.bedrooms_at_least, thresholds.bedrooms_top)
            || !at_least(item.bathrooms(), filters.bathrooms_at_least, thresholds.bathrooms_top)
            || !at_least(item.parking(), filters.parking_at_least, thresholds.parking_top)
        {
            return false;
        }

        if !filters.price_range.contains(item.price()) {
            return false;
        }

        if filters.transaction_type == TransactionType::Rent
            && !(amenity(item.furnished(), filters.furnished)
                && amenity(item.pets_allowed(), filters.pets_allowed))
        {
            return false;
        }

        true
    }
}

/// Featured listings first, then `order` within each tier. Stable.
pub fn sort_listings(records: &mut [ListingRecord], order: SortOrder) {
    records.sort_by(|a, b| {
        b.featured.cmp(&a.featured).then_with(|| match order {
            SortOrder::Relevance => Ordering::Equal,
            SortOrder::Newest => b.created_at.cmp(&a.created_at),
            SortOrder::PriceAscending => a.price.cmp(&b.price),
            SortOrder::PriceDescending => b.price.cmp(&a.price),
        })
    });
}

#[cfg(test)]
#[path = "tests/facets_tests.rs"]
mod tests;
