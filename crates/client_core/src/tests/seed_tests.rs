use super::*;

#[test]
fn transaction_param_selects_rent_or_buy() {
    assert_eq!(
        seed_filters("t=renta").transaction_type,
        TransactionType::Rent
    );
    assert_eq!(
        seed_filters("?t=compra").transaction_type,
        TransactionType::Buy
    );
    assert_eq!(seed_filters("t=other"), FilterState::default());
}

#[test]
fn pre_sale_implies_buy() {
    let state = seed_filters("preventa=true");
    assert_eq!(state.transaction_type, TransactionType::Buy);
    assert_eq!(state.availability, Availability::PreSale);
}

#[test]
fn pre_sale_false_means_immediate_under_buy_only() {
    let buy = seed_filters("t=compra&preventa=false");
    assert_eq!(buy.availability, Availability::Immediate);

    let rent = seed_filters("t=renta&preventa=false");
    assert_eq!(rent.transaction_type, TransactionType::Rent);
    assert_eq!(rent.availability, Availability::Unconstrained);

    let rent_pre_sale = seed_filters("t=renta&preventa=true");
    assert_eq!(rent_pre_sale.availability, Availability::Unconstrained);
}

#[test]
fn full_urls_are_accepted() {
    let state = seed_filters("https://example.test/propiedades?t=compra&preventa=true&page=2");
    assert_eq!(state.transaction_type, TransactionType::Buy);
    assert_eq!(state.availability, Availability::PreSale);
}
