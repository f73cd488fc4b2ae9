use std::{fs, path::Path};

use serde::Deserialize;
use shared::domain::LatLng;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "marketplace.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Floors of the top "N or more" bucket for each count facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FacetThresholds {
    pub bedrooms_top: u32,
    pub bathrooms_top: u32,
    pub parking_top: u32,
}

impl Default for FacetThresholds {
    fn default() -> Self {
        Self {
            bedrooms_top: 3,
            bathrooms_top: 2,
            parking_top: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CurrencySettings {
    pub local_code: String,
    pub foreign_code: String,
    /// Foreign units per local unit.
    pub foreign_per_local: f64,
}

impl Default for CurrencySettings {
    fn default() -> Self {
        Self {
            local_code: "MXN".into(),
            foreign_code: "USD".into(),
            foreign_per_local: 0.055,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    pub access_token: Option<String>,
    pub fly_duration_ms: u64,
    pub resize_settle_ms: u64,
    pub focus_zoom: f64,
    pub default_center: LatLng,
    pub default_zoom: f64,
    /// Camera positions closer than this (degrees) count as unmoved.
    pub camera_epsilon: f64,
    pub mobile_breakpoint_px: u32,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            access_token: None,
            fly_duration_ms: 800,
            resize_settle_ms: 250,
            focus_zoom: 15.0,
            default_center: LatLng::new(20.6597, -103.3496),
            default_zoom: 11.0,
            camera_epsilon: 1e-6,
            mobile_breakpoint_px: 768,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub remote_store_url: Option<String>,
    pub listing_collection: String,
    pub page_size: usize,
    pub show_more_increment: usize,
    pub max_pages_per_request: usize,
    pub facets: FacetThresholds,
    pub currency: CurrencySettings,
    pub map: MapSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/listings.db".into(),
            remote_store_url: None,
            listing_collection: storage::DEFAULT_LISTING_COLLECTION.into(),
            page_size: 12,
            show_more_increment: 12,
            max_pages_per_request: 5,
            facets: FacetThresholds::default(),
            currency: CurrencySettings::default(),
            map: MapSettings::default(),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!(key, value = %raw, "ignoring unparsable settings override"),
        }
    }
}

impl Settings {
    /// Defaults, then `path` (or `marketplace.toml` when present), then `APP__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_SETTINGS_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_SETTINGS_FILE))?
            }
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("APP__DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("APP__REMOTE_STORE_URL") {
            self.remote_store_url = Some(v).filter(|v| !v.trim().is_empty());
        }
        if let Some(v) = lookup("APP__LISTING_COLLECTION") {
            self.listing_collection = v;
        }
        if let Some(v) = lookup("MAP_ACCESS_TOKEN") {
            self.map.access_token = Some(v);
        }
        if let Some(v) = lookup("APP__MAP_ACCESS_TOKEN") {
            self.map.access_token = Some(v);
        }

        override_parsed(&lookup, "APP__PAGE_SIZE", &mut self.page_size);
        override_parsed(&lookup, "APP__SHOW_MORE_INCREMENT", &mut self.show_more_increment);
        override_parsed(&lookup, "APP__MAX_PAGES_PER_REQUEST", &mut self.max_pages_per_request);
        override_parsed(&lookup, "APP__BEDROOMS_TOP", &mut self.facets.bedrooms_top);
        override_parsed(&lookup, "APP__BATHROOMS_TOP", &mut self.facets.bathrooms_top);
        override_parsed(&lookup, "APP__PARKING_TOP", &mut self.facets.parking_top);
        override_parsed(&lookup, "APP__FOREIGN_PER_LOCAL", &mut self.currency.foreign_per_local);
        override_parsed(&lookup, "APP__FLY_DURATION_MS", &mut self.map.fly_duration_ms);
        override_parsed(&lookup, "APP__RESIZE_SETTLE_MS", &mut self.map.resize_settle_ms);
        override_parsed(&lookup, "APP__FOCUS_ZOOM", &mut self.map.focus_zoom);
        override_parsed(&lookup, "APP__MOBILE_BREAKPOINT_PX", &mut self.map.mobile_breakpoint_px);
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.page_size == 0 {
            return Err(SettingsError::Invalid {
                key: "page_size",
                reason: "must be positive".into(),
            });
        }
        if self.show_more_increment == 0 {
            return Err(SettingsError::Invalid {
                key: "show_more_increment",
                reason: "must be positive".into(),
            });
        }
        if self.max_pages_per_request == 0 {
            return Err(SettingsError::Invalid {
                key: "max_pages_per_request",
                reason: "must be positive".into(),
            });
        }
        if !(self.currency.foreign_per_local.is_finite() && self.currency.foreign_per_local > 0.0) {
            return Err(SettingsError::Invalid {
                key: "currency.foreign_per_local",
                reason: format!("expected a positive rate, got {}", self.currency.foreign_per_local),
            });
        }
        if self.listing_collection.trim().is_empty() {
            return Err(SettingsError::Invalid {
                key: "listing_collection",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
