use std::collections::HashSet;

use serde::Serialize;
use shared::{
    domain::{CondoId, Currency, LatLng, ZoneId},
    filters::FilterState,
    listing::{CondoAggregate, PropertySummary},
};

use super::surface::{MarkerHandle, MarkerSpec};
use crate::{
    facets::{FacetEvaluator, GateSet, SummaryFacets},
    format::PriceFormatter,
};

/// Per-condo marker state owned by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerViewState {
    pub condo_id: CondoId,
    pub zone_id: ZoneId,
    pub name: String,
    pub position: LatLng,
    /// Distinct listings in this condo passing the current filters.
    pub matching: usize,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub label: String,
    pub selected: bool,
    pub handle: Option<MarkerHandle>,
}

impl MarkerViewState {
    /// Empty condos stay off the map unless they are the current selection.
    pub fn is_visible(&self) -> bool {
        self.matching > 0 || self.selected
    }

    pub fn spec(&self) -> MarkerSpec {
        MarkerSpec {
            condo_id: self.condo_id.clone(),
            position: self.position,
            label: self.label.clone(),
            count: self.matching,
            selected: self.selected,
        }
    }

    pub(crate) fn relabel(&mut self, formatter: &PriceFormatter, currency: Currency) {
        self.label = marker_label(formatter, self.min_price, self.max_price, currency);
    }
}

pub(crate) fn marker_label(
    formatter: &PriceFormatter,
    min: Option<i64>,
    max: Option<i64>,
    currency: Currency,
) -> String {
    match (min, max) {
        (Some(min), Some(max)) => formatter.range_label(min, max, currency),
        _ => String::new(),
    }
}

/// Summaries of `condo` passing `filters`, each listing once even when it is offered for both
/// rent and sale.
pub fn matching_summaries<'a>(
    evaluator: &FacetEvaluator,
    filters: &FilterState,
    zone_id: &'a ZoneId,
    condo: &'a CondoAggregate,
) -> Vec<&'a PropertySummary> {
    let mut seen = HashSet::new();
    condo
        .summaries()
        .filter(|(offer, summary)| {
            let facets = SummaryFacets {
                offer: *offer,
                zone_id,
                condo_id: &condo.condo_id,
                summary,
            };
            evaluator.matches(&facets, filters, GateSet::MAP)
        })
        .filter(|(_, summary)| seen.insert(summary.listing_id.clone()))
        .map(|(_, summary)| summary)
        .collect()
}

pub(crate) fn build_marker(
    evaluator: &FacetEvaluator,
    formatter: &PriceFormatter,
    filters: &FilterState,
    zone_id: &ZoneId,
    condo: &CondoAggregate,
    selected: bool,
) -> MarkerViewState {
    let matching = matching_summaries(evaluator, filters, zone_id, condo);
    let min_price = matching.iter().map(|summary| summary.price).min();
    let max_price = matching.iter().map(|summary| summary.price).max();
    MarkerViewState {
        condo_id: condo.condo_id.clone(),
        zone_id: zone_id.clone(),
        name: condo.name.clone(),
        position: condo.location,
        matching: matching.len(),
        min_price,
        max_price,
        label: marker_label(formatter, min_price, max_price, filters.currency),
        selected,
        handle: None,
    }
}
