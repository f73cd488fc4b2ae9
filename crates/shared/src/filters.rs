use serde::{Deserialize, Serialize};

use crate::domain::{
    Availability, CondoId, Currency, PropertyTypeId, SortOrder, TransactionType, ZoneId,
};

/// Sentinel for an open-ended upper price bound.
pub const PRICE_UNBOUNDED: i64 = i64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: i64,
    pub max: i64,
}

impl Default for PriceRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: PRICE_UNBOUNDED,
        }
    }
}

impl PriceRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn lower_bound(&self) -> Option<i64> {
        (self.min > 0).then_some(self.min)
    }

    pub fn upper_bound(&self) -> Option<i64> {
        (self.max < PRICE_UNBOUNDED).then_some(self.max)
    }

    pub fn is_constrained(&self) -> bool {
        self.lower_bound().is_some() || self.upper_bound().is_some()
    }

    /// Inclusive bounds actually applied to prices.
    ///
    /// Two independent edits can leave the lower bound above the upper one. The range is then
    /// widened to span both values instead of matching nothing.
    pub fn resolved(&self) -> (Option<i64>, Option<i64>) {
        match (self.lower_bound(), self.upper_bound()) {
            (Some(lower), Some(upper)) if lower > upper => (Some(upper), Some(lower)),
            bounds => bounds,
        }
    }

    pub fn contains(&self, price: i64) -> bool {
        let (lower, upper) = self.resolved();
        lower.map_or(true, |lower| price >= lower) && upper.map_or(true, |upper| price <= upper)
    }
}

/// Active facet selection for one browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterState {
    pub transaction_type: TransactionType,
    pub zone_id: Option<ZoneId>,
    pub condo_id: Option<CondoId>,
    pub property_type_id: Option<PropertyTypeId>,
    pub price_range: PriceRange,
    pub bedrooms_at_least: Option<u32>,
    pub bathrooms_at_least: Option<u32>,
    pub parking_at_least: Option<u32>,
    pub furnished: Option<bool>,
    pub pets_allowed: Option<bool>,
    pub availability: Availability,
    pub currency: Currency,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    TransactionType,
    Zone,
    Condo,
    PropertyType,
    PriceRange,
    Bedrooms,
    Bathrooms,
    Parking,
    Furnished,
    PetsAllowed,
    Availability,
    Currency,
    SortOrder,
}

impl FilterField {
    /// Fields that only change how results are shown, never which results match.
    pub fn is_presentation(self) -> bool {
        matches!(self, Self::Currency | Self::SortOrder)
    }

    /// Fields pushed down to the store query; changing one restarts pagination.
    pub fn is_query_scope(self) -> bool {
        matches!(self, Self::Zone | Self::Condo | Self::PropertyType)
    }
}

/// Single-field edit issued by one UI surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FilterUpdate {
    TransactionType(TransactionType),
    Zone(Option<ZoneId>),
    Condo(Option<CondoId>),
    PropertyType(Option<PropertyTypeId>),
    PriceMin(i64),
    PriceMax(i64),
    Bedrooms(Option<u32>),
    Bathrooms(Option<u32>),
    Parking(Option<u32>),
    Furnished(Option<bool>),
    PetsAllowed(Option<bool>),
    Availability(Availability),
    Currency(Currency),
    SortOrder(SortOrder),
}

fn assign<T: PartialEq>(
    slot: &mut T,
    value: T,
    field: FilterField,
    changed: &mut Vec<FilterField>,
) {
    if *slot != value {
        *slot = value;
        if !changed.contains(&field) {
            changed.push(field);
        }
    }
}

impl FilterState {
    /// Applies `update` together with the fields it drags along and returns every field whose
    /// value changed.
    pub fn apply(&mut self, update: FilterUpdate) -> Vec<FilterField> {
        let mut changed = Vec::new();
        match update {
            FilterUpdate::TransactionType(value) => {
                assign(
                    &mut self.transaction_type,
                    value,
                    FilterField::TransactionType,
                    &mut changed,
                );
                if value != TransactionType::Buy {
                    assign(
                        &mut self.availability,
                        Availability::Unconstrained,
                        FilterField::Availability,
                        &mut changed,
                    );
                }
                if value != TransactionType::Rent {
                    assign(&mut self.furnished, None, FilterField::Furnished, &mut changed);
                    assign(
                        &mut self.pets_allowed,
                        None,
                        FilterField::PetsAllowed,
                        &mut changed,
                    );
                }
            }
            FilterUpdate::Zone(value) => {
                let zone_changed = self.zone_id != value;
                assign(&mut self.zone_id, value, FilterField::Zone, &mut changed);
                if zone_changed {
                    assign(&mut self.condo_id, None, FilterField::Condo, &mut changed);
                }
            }
            FilterUpdate::Condo(value) => {
                assign(&mut self.condo_id, value, FilterField::Condo, &mut changed)
            }
            FilterUpdate::PropertyType(value) => assign(
                &mut self.property_type_id,
                value,
                FilterField::PropertyType,
                &mut changed,
            ),
            FilterUpdate::PriceMin(value) => assign(
                &mut self.price_range.min,
                value.max(0),
                FilterField::PriceRange,
                &mut changed,
            ),
            FilterUpdate::PriceMax(value) => assign(
                &mut self.price_range.max,
                value.max(0),
                FilterField::PriceRange,
                &mut changed,
            ),
            FilterUpdate::Bedrooms(value) => assign(
                &mut self.bedrooms_at_least,
                value,
                FilterField::Bedrooms,
                &mut changed,
            ),
            FilterUpdate::Bathrooms(value) => assign(
                &mut self.bathrooms_at_least,
                value,
                FilterField::Bathrooms,
                &mut changed,
            ),
            FilterUpdate::Parking(value) => assign(
                &mut self.parking_at_least,
                value,
                FilterField::Parking,
                &mut changed,
            ),
            FilterUpdate::Furnished(value) => {
                assign(&mut self.furnished, value, FilterField::Furnished, &mut changed)
            }
            FilterUpdate::PetsAllowed(value) => assign(
                &mut self.pets_allowed,
                value,
                FilterField::PetsAllowed,
                &mut changed,
            ),
            FilterUpdate::Availability(value) => assign(
                &mut self.availability,
                value,
                FilterField::Availability,
                &mut changed,
            ),
            FilterUpdate::Currency(value) => {
                assign(&mut self.currency, value, FilterField::Currency, &mut changed)
            }
            FilterUpdate::SortOrder(value) => {
                assign(&mut self.sort_order, value, FilterField::SortOrder, &mut changed)
            }
        }
        changed
    }

    /// Fields in which `self` and `other` differ.
    pub fn diff(&self, other: &FilterState) -> Vec<FilterField> {
        let mut fields = Vec::new();
        let mut check = |differs: bool, field: FilterField| {
            if differs {
                fields.push(field);
            }
        };
        check(
            self.transaction_type != other.transaction_type,
            FilterField::TransactionType,
        );
        check(self.zone_id != other.zone_id, FilterField::Zone);
        check(self.condo_id != other.condo_id, FilterField::Condo);
        check(
            self.property_type_id != other.property_type_id,
            FilterField::PropertyType,
        );
        check(self.price_range != other.price_range, FilterField::PriceRange);
        check(
            self.bedrooms_at_least != other.bedrooms_at_least,
            FilterField::Bedrooms,
        );
        check(
            self.bathrooms_at_least != other.bathrooms_at_least,
            FilterField::Bathrooms,
        );
        check(
            self.parking_at_least != other.parking_at_least,
            FilterField::Parking,
        );
        check(self.furnished != other.furnished, FilterField::Furnished);
        check(self.pets_allowed != other.pets_allowed, FilterField::PetsAllowed);
        check(self.availability != other.availability, FilterField::Availability);
        check(self.currency != other.currency, FilterField::Currency);
        check(self.sort_order != other.sort_order, FilterField::SortOrder);
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_to_rent_resets_availability_in_the_same_change() {
        let mut state = FilterState {
            transaction_type: TransactionType::Buy,
            availability: Availability::PreSale,
            ..FilterState::default()
        };

        let changed = state.apply(FilterUpdate::TransactionType(TransactionType::Rent));

        assert_eq!(state.availability, Availability::Unconstrained);
        assert_eq!(
            changed,
            vec![FilterField::TransactionType, FilterField::Availability]
        );
    }

    #[test]
    fn switching_to_buy_clears_rent_only_facets() {
        let mut state = FilterState {
            transaction_type: TransactionType::Rent,
            furnished: Some(true),
            pets_allowed: Some(false),
            ..FilterState::default()
        };

        state.apply(FilterUpdate::TransactionType(TransactionType::Buy));

        assert_eq!(state.furnished, None);
        assert_eq!(state.pets_allowed, None);
    }

    #[test]
    fn changing_zone_drops_condo_from_previous_zone() {
        let mut state = FilterState {
            zone_id: Some(ZoneId::new("north")),
            condo_id: Some(CondoId::new("tower-a")),
            ..FilterState::default()
        };

        let changed = state.apply(FilterUpdate::Zone(Some(ZoneId::new("south"))));

        assert_eq!(state.condo_id, None);
        assert_eq!(changed, vec![FilterField::Zone, FilterField::Condo]);
    }

    #[test]
    fn setting_same_value_reports_no_change() {
        let mut state = FilterState::default();
        assert!(state.apply(FilterUpdate::Bedrooms(None)).is_empty());
    }

    #[test]
    fn inverted_price_range_is_widened() {
        let range = PriceRange::new(9_000, 3_000);
        assert_eq!(range.resolved(), (Some(3_000), Some(9_000)));
        assert!(range.contains(3_000));
        assert!(range.contains(9_000));
        assert!(!range.contains(9_001));
    }

    #[test]
    fn unbounded_range_matches_everything() {
        let range = PriceRange::default();
        assert!(!range.is_constrained());
        assert!(range.contains(0));
        assert!(range.contains(i64::MAX - 1));
    }
}
