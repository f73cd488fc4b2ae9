//! Initial filter selection from deep-link query parameters.
//!
//! `t=renta|compra` picks the transaction type and `preventa=true|false` picks the sale
//! availability. Unknown parameters and values are ignored.

use shared::{
    domain::{Availability, TransactionType},
    filters::{FilterState, FilterUpdate},
};
use tracing::debug;
use url::{form_urlencoded, Url};

fn parse_transaction(value: &str) -> Option<TransactionType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "renta" | "rent" => Some(TransactionType::Rent),
        "compra" | "buy" | "venta" => Some(TransactionType::Buy),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "si" | "sí" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Updates to apply, in order, for the given query pairs.
pub fn seed_updates<I, K, V>(pairs: I) -> Vec<FilterUpdate>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut transaction = None;
    let mut pre_sale = None;
    for (key, value) in pairs {
        match key.as_ref() {
            "t" => transaction = parse_transaction(value.as_ref()).or(transaction),
            "preventa" => pre_sale = parse_bool(value.as_ref()).or(pre_sale),
            other => debug!(param = other, "ignoring unknown seed parameter"),
        }
    }

    // Pre-sale only exists for purchases, so asking for it implies buy.
    if pre_sale == Some(true) && transaction.is_none() {
        transaction = Some(TransactionType::Buy);
    }

    let mut updates = Vec::new();
    if let Some(transaction) = transaction {
        updates.push(FilterUpdate::TransactionType(transaction));
    }
    if transaction == Some(TransactionType::Buy) {
        match pre_sale {
            Some(true) => updates.push(FilterUpdate::Availability(Availability::PreSale)),
            Some(false) => updates.push(FilterUpdate::Availability(Availability::Immediate)),
            None => {}
        }
    }
    updates
}

/// Accepts either a bare query string (`t=renta&preventa=false`, optional leading `?`) or a
/// full URL.
pub fn seed_updates_from_str(input: &str) -> Vec<FilterUpdate> {
    let trimmed = input.trim();
    match Url::parse(trimmed) {
        Ok(url) => seed_updates_from_url(&url),
        Err(_) => {
            let query = trimmed.strip_prefix('?').unwrap_or(trimmed);
            seed_updates(form_urlencoded::parse(query.as_bytes()))
        }
    }
}

pub fn seed_updates_from_url(url: &Url) -> Vec<FilterUpdate> {
    seed_updates(url.query_pairs())
}

/// Default state with the seed applied.
pub fn seed_filters(input: &str) -> FilterState {
    let mut state = FilterState::default();
    for update in seed_updates_from_str(input) {
        state.apply(update);
    }
    state
}

#[cfg(test)]
#[path = "tests/seed_tests.rs"]
mod tests;
