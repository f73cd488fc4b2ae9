//! Price labels for list cards and map markers.

use shared::domain::Currency;

use crate::config::CurrencySettings;

const UNIT_SUFFIXES: [&str; 3] = ["K", "M", "B"];

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn trim_decimal(value: f64) -> String {
    let rounded = round_tenths(value);
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.1}")
    }
}

/// `950`, `9.5K`, `2.3M`. Negative amounts are clamped to zero.
///
/// The unit is picked after rounding, so `999_950` reads `1M` rather than `1000K`.
pub fn compact_amount(amount: f64) -> String {
    let amount = amount.max(0.0);
    if amount.round() < 1_000.0 {
        return format!("{amount:.0}");
    }
    let mut scaled = amount / 1_000.0;
    let mut unit = 0;
    while unit + 1 < UNIT_SUFFIXES.len() && round_tenths(scaled) >= 1_000.0 {
        scaled /= 1_000.0;
        unit += 1;
    }
    format!("{}{}", trim_decimal(scaled), UNIT_SUFFIXES[unit])
}

#[derive(Debug, Clone)]
pub struct PriceFormatter {
    settings: CurrencySettings,
}

impl PriceFormatter {
    pub fn new(settings: CurrencySettings) -> Self {
        Self { settings }
    }

    pub fn code(&self, currency: Currency) -> &str {
        match currency {
            Currency::Local => &self.settings.local_code,
            Currency::Foreign => &self.settings.foreign_code,
        }
    }

    /// Converts a stored (local) price into the display currency.
    pub fn convert(&self, price: i64, currency: Currency) -> f64 {
        match currency {
            Currency::Local => price as f64,
            Currency::Foreign => price as f64 * self.settings.foreign_per_local,
        }
    }

    pub fn label(&self, price: i64, currency: Currency) -> String {
        format!(
            "${} {}",
            compact_amount(self.convert(price, currency)),
            self.code(currency)
        )
    }

    /// Marker label for the matching prices of one condo. Equal bounds collapse to one price.
    pub fn range_label(&self, min: i64, max: i64, currency: Currency) -> String {
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        let low_text = compact_amount(self.convert(low, currency));
        let high_text = compact_amount(self.convert(high, currency));
        if low_text == high_text {
            format!("${low_text} {}", self.code(currency))
        } else {
            format!("${low_text} - ${high_text} {}", self.code(currency))
        }
    }
}

impl Default for PriceFormatter {
    fn default() -> Self {
        Self::new(CurrencySettings::default())
    }
}
