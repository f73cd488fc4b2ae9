//! Applied-filter badge count and the one-line description shown above results.

use shared::{
    domain::{Availability, TransactionType},
    filters::FilterState,
};

use crate::format::PriceFormatter;

/// Number of result-affecting facets that differ from their defaults. Currency and sort order
/// never count. A constrained price range counts once.
pub fn applied_filter_count(filters: &FilterState) -> usize {
    [
        filters.transaction_type != TransactionType::None,
        filters.zone_id.is_some(),
        filters.condo_id.is_some(),
        filters.property_type_id.is_some(),
        filters.price_range.is_constrained(),
        filters.bedrooms_at_least.is_some(),
        filters.bathrooms_at_least.is_some(),
        filters.parking_at_least.is_some(),
        filters.furnished.is_some(),
        filters.pets_allowed.is_some(),
        filters.availability != Availability::Unconstrained,
    ]
    .into_iter()
    .filter(|applied| *applied)
    .count()
}

/// Display names for the foreign keys in a filter selection. Missing names fall back to ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryNames<'a> {
    pub zone: Option<&'a str>,
    pub condo: Option<&'a str>,
}

fn plural(count: u32, one: &str, many: &str) -> String {
    format!("{count}+ {}", if count == 1 { one } else { many })
}

pub fn describe(filters: &FilterState, names: SummaryNames<'_>, formatter: &PriceFormatter) -> String {
    let mut parts: Vec<String> = Vec::new();
    match filters.transaction_type {
        TransactionType::None => {}
        TransactionType::Rent => parts.push("For rent".into()),
        TransactionType::Buy => parts.push("For sale".into()),
    }
    match filters.availability {
        Availability::Unconstrained => {}
        Availability::Immediate => parts.push("Ready to move in".into()),
        Availability::PreSale => parts.push("Pre-sale".into()),
    }
    if let Some(zone_id) = &filters.zone_id {
        parts.push(names.zone.unwrap_or(zone_id.as_str()).to_string());
    }
    if let Some(condo_id) = &filters.condo_id {
        parts.push(names.condo.unwrap_or(condo_id.as_str()).to_string());
    }
    if let Some(kind) = &filters.property_type_id {
        parts.push(kind.as_str().replace('_', " "));
    }

    let currency = filters.currency;
    match filters.price_range.resolved() {
        (Some(low), Some(high)) => parts.push(formatter.range_label(low, high, currency)),
        (Some(low), None) => parts.push(format!("from {}", formatter.label(low, currency))),
        (None, Some(high)) => parts.push(format!("up to {}", formatter.label(high, currency))),
        (None, None) => {}
    }

    if let Some(count) = filters.bedrooms_at_least {
        parts.push(plural(count, "bedroom", "bedrooms"));
    }
    if let Some(count) = filters.bathrooms_at_least {
        parts.push(plural(count, "bathroom", "bathrooms"));
    }
    if let Some(count) = filters.parking_at_least {
        parts.push(plural(count, "parking spot", "parking spots"));
    }
    match filters.furnished {
        Some(true) => parts.push("Furnished".into()),
        Some(false) => parts.push("Unfurnished".into()),
        None => {}
    }
    match filters.pets_allowed {
        Some(true) => parts.push("Pets allowed".into()),
        Some(false) => parts.push("No pets".into()),
        None => {}
    }

    if parts.is_empty() {
        "All listings".into()
    } else {
        parts.join(" · ")
    }
}

#[cfg(test)]
#[path = "tests/summary_tests.rs"]
mod tests;
