//! Boundary between the loosely-typed document store and the typed core.
//!
//! Store documents are JSON objects written by several admin surfaces over time, so field names
//! and value encodings drift (camelCase vs snake_case, numbers stored as strings, localized
//! enum values). Everything is coerced here; the rest of the workspace only sees the typed
//! shapes from [`crate::listing`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{
        CondoId, LatLng, ListingId, ListingOffer, PropertyTypeId, PublicationStatus, ZoneId,
    },
    error::BoundaryError,
    listing::{
        Amenities, AreaMetrics, CondoAggregate, ListingRecord, PropertySummary, ZoneAggregate,
    },
};

/// Raw store document. `created_at` is the store's index key and is kept outside `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub fields: Value,
}

/// Payload emitted when a condo marker is clicked on a constrained viewport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondoTrayPayload {
    pub condo_id: CondoId,
    pub condo_name: String,
    pub properties: Vec<PropertySummary>,
}

/// A zone aggregate plus the condo entries that could not be coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneDecode {
    pub aggregate: ZoneAggregate,
    pub rejected: Vec<BoundaryError>,
}

struct Fields<'a> {
    document: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn of(document: &'a str, value: &'a Value) -> Result<Self, BoundaryError> {
        let map = value.as_object().ok_or_else(|| BoundaryError::NotAnObject {
            document: document.to_string(),
        })?;
        Ok(Self { document, map })
    }

    fn raw(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .find_map(|name| self.map.get(*name))
            .filter(|value| !value.is_null())
    }

    fn missing(&self, field: &'static str) -> BoundaryError {
        BoundaryError::MissingField {
            document: self.document.to_string(),
            field,
        }
    }

    fn invalid(&self, field: &'static str, value: &Value) -> BoundaryError {
        BoundaryError::InvalidField {
            document: self.document.to_string(),
            field,
            value: value.to_string(),
        }
    }

    fn opt_str(&self, field: &'static str, names: &[&str]) -> Result<Option<String>, BoundaryError> {
        match self.raw(names) {
            None => Ok(None),
            Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.trim().to_string())),
            Some(Value::Number(number)) => Ok(Some(number.to_string())),
            Some(other) => Err(self.invalid(field, other)),
        }
    }

    fn str(&self, field: &'static str, names: &[&str]) -> Result<String, BoundaryError> {
        self.opt_str(field, names)?
            .ok_or_else(|| self.missing(field))
    }

    fn opt_i64(&self, field: &'static str, names: &[&str]) -> Result<Option<i64>, BoundaryError> {
        let Some(value) = self.raw(names) else {
            return Ok(None);
        };
        coerce_i64(value)
            .map(Some)
            .ok_or_else(|| self.invalid(field, value))
    }

    fn i64(&self, field: &'static str, names: &[&str]) -> Result<i64, BoundaryError> {
        self.opt_i64(field, names)?
            .ok_or_else(|| self.missing(field))
    }

    fn count(&self, field: &'static str, names: &[&str]) -> Result<u32, BoundaryError> {
        let Some(value) = self.raw(names) else {
            return Ok(0);
        };
        coerce_i64(value)
            .and_then(|number| u32::try_from(number).ok())
            .ok_or_else(|| self.invalid(field, value))
    }

    fn opt_f64(&self, field: &'static str, names: &[&str]) -> Result<Option<f64>, BoundaryError> {
        let Some(value) = self.raw(names) else {
            return Ok(None);
        };
        coerce_f64(value)
            .map(Some)
            .ok_or_else(|| self.invalid(field, value))
    }

    fn opt_bool(&self, field: &'static str, names: &[&str]) -> Result<Option<bool>, BoundaryError> {
        let Some(value) = self.raw(names) else {
            return Ok(None);
        };
        coerce_bool(value)
            .map(Some)
            .ok_or_else(|| self.invalid(field, value))
    }

    fn flag(&self, field: &'static str, names: &[&str]) -> Result<bool, BoundaryError> {
        Ok(self.opt_bool(field, names)?.unwrap_or(false))
    }

    fn strings(&self, names: &[&str]) -> Vec<String> {
        match self.raw(names) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) if !text.is_empty() => Some(text.clone()),
                    Value::Object(map) => map
                        .get("url")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect(),
            Some(Value::String(text)) if !text.is_empty() => vec![text.clone()],
            _ => Vec::new(),
        }
    }

    fn array(&self, names: &[&str]) -> &'a [Value] {
        match self.raw(names) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        }
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.round() as i64)),
        Value::String(text) => {
            let cleaned: String = text
                .chars()
                .filter(|ch| !matches!(ch, ',' | '$' | ' ' | '_'))
                .collect();
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| cleaned.parse::<f64>().ok().map(|float| float.round() as i64))
        }
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|n| n != 0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "si" | "sí" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_offer(text: &str) -> Option<ListingOffer> {
    match text.trim().to_ascii_lowercase().as_str() {
        "rent" | "renta" | "rental" => Some(ListingOffer::Rent),
        "sale" | "sell" | "venta" | "compra" | "buy" => Some(ListingOffer::Sale),
        "both" | "rent_and_sale" | "ambos" | "renta_venta" | "renta/venta" => {
            Some(ListingOffer::RentAndSale)
        }
        _ => None,
    }
}

impl ListingRecord {
    pub fn from_document(document: &Document) -> Result<Self, BoundaryError> {
        let fields = Fields::of(&document.id, &document.fields)?;

        let offer_text = fields.str("offer", &["offer", "transactionType", "transaction_type"])?;
        let offer = parse_offer(&offer_text).ok_or_else(|| BoundaryError::InvalidField {
            document: document.id.clone(),
            field: "offer",
            value: offer_text.clone(),
        })?;

        let status_text = fields.str("status", &["status", "publicationStatus"])?;
        let status = PublicationStatus::parse(&status_text).ok_or_else(|| BoundaryError::InvalidField {
            document: document.id.clone(),
            field: "status",
            value: status_text.clone(),
        })?;

        let amenities = Amenities {
            furnished: fields.flag("furnished", &["furnished", "isFurnished", "amueblado"])?,
            pets_allowed: fields.flag("pets_allowed", &["petsAllowed", "pets_allowed", "mascotas"])?,
            pool: fields.flag("pool", &["pool", "alberca"])?,
            gym: fields.flag("gym", &["gym"])?,
            security: fields.flag("security", &["security", "seguridad"])?,
            elevator: fields.flag("elevator", &["elevator", "elevador"])?,
        };

        Ok(Self {
            id: ListingId::new(document.id.clone()),
            title: fields
                .opt_str("title", &["title", "name"])?
                .unwrap_or_default(),
            zone_id: ZoneId::new(fields.str("zone_id", &["zoneId", "zone_id"])?),
            zone_name: fields
                .opt_str("zone_name", &["zoneName", "zone_name"])?
                .unwrap_or_default(),
            condo_id: fields
                .opt_str("condo_id", &["condoId", "condo_id"])?
                .map(CondoId::new),
            condo_name: fields.opt_str("condo_name", &["condoName", "condo_name"])?,
            property_type_id: PropertyTypeId::new(
                fields.str("property_type_id", &["propertyTypeId", "property_type_id", "type"])?,
            ),
            offer,
            price: fields.i64("price", &["price", "precio"])?,
            bedrooms: fields.count("bedrooms", &["bedrooms", "recamaras"])?,
            bathrooms: fields.count("bathrooms", &["bathrooms", "banos"])?,
            parking: fields.count("parking", &["parking", "parkingSpots", "estacionamientos"])?,
            area: AreaMetrics {
                built_m2: fields
                    .opt_f64("built_m2", &["builtArea", "built_m2", "m2"])?
                    .unwrap_or_default(),
                lot_m2: fields.opt_f64("lot_m2", &["lotArea", "lot_m2"])?,
            },
            amenities,
            pre_sale: fields.flag("pre_sale", &["preSale", "pre_sale", "preventa"])?,
            status,
            created_at: document.created_at,
            images: fields.strings(&["images", "imageUrls", "photos"]),
            featured: fields.flag("featured", &["featured", "destacado"])?,
        })
    }
}

impl PropertySummary {
    fn from_value(document: &str, value: &Value) -> Result<Self, BoundaryError> {
        let fields = Fields::of(document, value)?;
        let thumbnail = fields
            .opt_str("thumbnail", &["thumbnail", "image"])?
            .or_else(|| fields.strings(&["images"]).into_iter().next());
        Ok(Self {
            listing_id: ListingId::new(fields.str("listing_id", &["id", "listingId", "propertyId"])?),
            property_type_id: PropertyTypeId::new(
                fields.str("property_type_id", &["propertyTypeId", "type"])?,
            ),
            price: fields.i64("price", &["price", "precio"])?,
            bedrooms: fields.count("bedrooms", &["bedrooms", "recamaras"])?,
            bathrooms: fields.count("bathrooms", &["bathrooms", "banos"])?,
            parking: fields.count("parking", &["parking", "parkingSpots", "estacionamientos"])?,
            thumbnail,
            pre_sale: fields.flag("pre_sale", &["preSale", "pre_sale", "preventa"])?,
            furnished: fields.opt_bool("furnished", &["furnished", "isFurnished"])?,
            pets_allowed: fields.opt_bool("pets_allowed", &["petsAllowed", "pets_allowed"])?,
        })
    }
}

impl CondoAggregate {
    fn from_value(zone: &str, value: &Value) -> Result<Self, BoundaryError> {
        let provisional = Fields::of(zone, value)?;
        let condo_id = provisional.str("condo_id", &["condoId", "condo_id", "id"])?;
        let document = format!("{zone}/{condo_id}");
        let fields = Fields::of(&document, value)?;

        let (lat, lng) = match fields.raw(&["coordinates", "location"]) {
            Some(nested) => {
                let nested = Fields::of(&document, nested)?;
                (
                    nested.opt_f64("lat", &["lat", "latitude"])?,
                    nested.opt_f64("lng", &["lng", "lon", "longitude"])?,
                )
            }
            None => (
                fields.opt_f64("lat", &["lat", "latitude"])?,
                fields.opt_f64("lng", &["lng", "lon", "longitude"])?,
            ),
        };

        let summaries = |names: &[&str]| -> Result<Vec<PropertySummary>, BoundaryError> {
            fields
                .array(names)
                .iter()
                .map(|item| PropertySummary::from_value(&document, item))
                .collect()
        };

        Ok(Self {
            condo_id: CondoId::new(condo_id),
            name: fields.opt_str("name", &["name", "condoName"])?.unwrap_or_default(),
            location: LatLng::new(lat.unwrap_or_default(), lng.unwrap_or_default()),
            rentals: summaries(&["rentals", "rentProperties", "propertiesRent"])?,
            sales: summaries(&["sales", "saleProperties", "propertiesSale"])?,
            min_price: fields.opt_i64("min_price", &["minPrice", "min_price"])?,
            max_price: fields.opt_i64("max_price", &["maxPrice", "max_price"])?,
        })
    }
}

impl ZoneAggregate {
    /// Coerces a zone aggregate. Malformed condo entries are dropped and reported in
    /// [`ZoneDecode::rejected`]; only a malformed envelope fails the whole document.
    pub fn from_document(zone_id: &ZoneId, value: &Value) -> Result<ZoneDecode, BoundaryError> {
        let fields = Fields::of(zone_id.as_str(), value)?;
        let mut condos = Vec::new();
        let mut rejected = Vec::new();
        for entry in fields.array(&["condos", "condominiums"]) {
            match CondoAggregate::from_value(zone_id.as_str(), entry) {
                Ok(condo) => condos.push(condo),
                Err(err) => rejected.push(err),
            }
        }
        Ok(ZoneDecode {
            aggregate: ZoneAggregate {
                zone_id: zone_id.clone(),
                zone_name: fields
                    .opt_str("zone_name", &["zoneName", "name"])?
                    .unwrap_or_default(),
                condos,
            },
            rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn document(fields: Value) -> Document {
        Document {
            id: "listing-1".into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            fields,
        }
    }

    #[test]
    fn coerces_loosely_typed_listing_fields() {
        let record = ListingRecord::from_document(&document(json!({
            "zoneId": "centro",
            "zoneName": "Centro",
            "propertyTypeId": "apartment",
            "transactionType": "renta",
            "status": "publicado",
            "price": "15,500",
            "bedrooms": 2.0,
            "bathrooms": "1",
            "isFurnished": "si",
            "preventa": false,
            "images": ["a.jpg", {"url": "b.jpg"}]
        })))
        .expect("coerce");

        assert_eq!(record.offer, ListingOffer::Rent);
        assert_eq!(record.status, PublicationStatus::Published);
        assert_eq!(record.price, 15_500);
        assert_eq!(record.bedrooms, 2);
        assert_eq!(record.parking, 0);
        assert!(record.amenities.furnished);
        assert_eq!(record.images, vec!["a.jpg", "b.jpg"]);
        assert_eq!(record.condo_id, None);
    }

    #[test]
    fn rejects_listing_without_price() {
        let err = ListingRecord::from_document(&document(json!({
            "zoneId": "centro",
            "propertyTypeId": "house",
            "offer": "sale",
            "status": "published"
        })))
        .expect_err("missing price");

        assert_eq!(
            err,
            BoundaryError::MissingField {
                document: "listing-1".into(),
                field: "price"
            }
        );
    }

    #[test]
    fn rejects_unknown_offer_value() {
        let err = ListingRecord::from_document(&document(json!({
            "zoneId": "centro",
            "propertyTypeId": "house",
            "offer": "swap",
            "status": "published",
            "price": 10
        })))
        .expect_err("bad offer");

        assert!(matches!(err, BoundaryError::InvalidField { field: "offer", .. }));
    }

    #[test]
    fn zone_aggregate_keeps_valid_condos_and_reports_rejects() {
        let zone = ZoneId::new("norte");
        let decoded = ZoneAggregate::from_document(
            &zone,
            &json!({
                "zoneName": "Norte",
                "condos": [
                    {
                        "condoId": "torre-a",
                        "name": "Torre A",
                        "coordinates": {"lat": 20.6, "lng": -103.4},
                        "rentProperties": [
                            {"id": "p1", "type": "apartment", "price": 12000, "bedrooms": 2}
                        ],
                        "saleProperties": []
                    },
                    {"name": "missing id"}
                ]
            }),
        )
        .expect("decode");

        assert_eq!(decoded.aggregate.zone_name, "Norte");
        assert_eq!(decoded.aggregate.condos.len(), 1);
        assert_eq!(decoded.aggregate.condos[0].rentals[0].price, 12_000);
        assert_eq!(decoded.rejected.len(), 1);
    }
}
