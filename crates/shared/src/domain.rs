use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(ListingId);
id_newtype!(ZoneId);
id_newtype!(CondoId);
id_newtype!(PropertyTypeId);

/// Transaction facet selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    None,
    Rent,
    Buy,
}

/// How a listing is offered. `RentAndSale` listings match both rent and buy searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingOffer {
    Rent,
    Sale,
    RentAndSale,
}

impl ListingOffer {
    pub fn is_rentable(self) -> bool {
        matches!(self, Self::Rent | Self::RentAndSale)
    }

    pub fn is_for_sale(self) -> bool {
        matches!(self, Self::Sale | Self::RentAndSale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Unconstrained,
    Immediate,
    PreSale,
}

/// Display currency. Stored prices are always in the local base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    #[default]
    Local,
    Foreign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
    Published,
    Draft,
    Archived,
}

impl PublicationStatus {
    /// Accepts the spellings the admin surfaces have written over time.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "published" | "publicado" | "publicada" | "active" => Some(Self::Published),
            "draft" | "borrador" | "pending" => Some(Self::Draft),
            "archived" | "archivado" | "inactive" | "sold" | "rented" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Canonical spelling used by store indexes and equality filters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Draft => "draft",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Arrival order.
    #[default]
    Relevance,
    Newest,
    PriceAscending,
    PriceDescending,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// `(0, 0)` is how the aggregate store marks a condo without a known location.
    pub fn is_unknown(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }

    pub fn approx_eq(&self, other: &LatLng, epsilon: f64) -> bool {
        (self.lat - other.lat).abs() <= epsilon && (self.lng - other.lng).abs() <= epsilon
    }

    pub fn centroid<'a>(points: impl IntoIterator<Item = &'a LatLng>) -> Option<LatLng> {
        let (mut lat, mut lng, mut count) = (0.0, 0.0, 0usize);
        for point in points {
            lat += point.lat;
            lng += point.lng;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some(LatLng::new(lat / count as f64, lng / count as f64))
    }
}
