use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use shared::{
    domain::{LatLng, ListingOffer, ZoneId},
    listing::{ListingRecord, ZoneAggregate},
    protocol::Document,
};
use storage::{Storage, DEFAULT_LISTING_COLLECTION};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/listings.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Imports a JSON array of listing documents.
    ImportListings {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_LISTING_COLLECTION)]
        collection: String,
    },
    /// Imports one zone aggregate document.
    ImportZone { zone_id: String, file: PathBuf },
    /// Writes a deterministic demo catalogue plus matching zone aggregates.
    SeedDemo {
        #[arg(long, default_value_t = 60)]
        listings: usize,
        #[arg(long, default_value = DEFAULT_LISTING_COLLECTION)]
        collection: String,
    },
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Splits the store envelope (`id`, `createdAt`) out of an exported listing object.
fn into_document(index: usize, value: Value) -> Result<Document> {
    let Value::Object(mut fields) = value else {
        bail!("entry {index} is not an object");
    };
    let id = match fields.remove("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => bail!("entry {index} has no id"),
    };
    let created_at = match fields
        .remove("createdAt")
        .or_else(|| fields.remove("created_at"))
    {
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(&text)
            .with_context(|| format!("listing {id} has an invalid createdAt"))?
            .with_timezone(&Utc),
        Some(Value::Number(millis)) => millis
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .with_context(|| format!("listing {id} has an invalid createdAt"))?,
        _ => Utc::now(),
    };
    Ok(Document {
        id,
        created_at,
        fields: Value::Object(fields),
    })
}

async fn import_listings(storage: &Storage, file: &Path, collection: &str) -> Result<()> {
    let Value::Array(entries) = read_json(file)? else {
        bail!("{} must contain a JSON array", file.display());
    };
    let mut malformed = 0usize;
    for (index, entry) in entries.into_iter().enumerate() {
        let document = into_document(index, entry)?;
        // Stored as-is; the fetcher skips documents it cannot coerce.
        if let Err(err) = ListingRecord::from_document(&document) {
            warn!(id = %document.id, error = %err, "listing will be skipped by clients");
            malformed += 1;
        }
        storage.upsert_document(collection, &document).await?;
    }
    let total = storage.count_documents(collection).await?;
    info!(collection, total, malformed, "import complete");
    println!("{collection}: {total} documents ({malformed} malformed)");
    Ok(())
}

async fn import_zone(storage: &Storage, zone_id: &str, file: &Path) -> Result<()> {
    let zone_id = ZoneId::new(zone_id);
    let aggregate = read_json(file)?;
    let decoded = ZoneAggregate::from_document(&zone_id, &aggregate)
        .with_context(|| format!("{} is not a zone aggregate", file.display()))?;
    for err in &decoded.rejected {
        warn!(zone = %zone_id, error = %err, "condo entry will be skipped by clients");
    }
    storage.put_zone_aggregate(&zone_id, &aggregate).await?;
    println!(
        "{zone_id}: {} condos ({} rejected)",
        decoded.aggregate.condos.len(),
        decoded.rejected.len()
    );
    Ok(())
}

struct DemoZone {
    id: &'static str,
    name: &'static str,
    center: LatLng,
}

const DEMO_ZONES: [DemoZone; 3] = [
    DemoZone {
        id: "centro",
        name: "Centro",
        center: LatLng::new(20.6767, -103.3475),
    },
    DemoZone {
        id: "providencia",
        name: "Providencia",
        center: LatLng::new(20.6940, -103.3900),
    },
    DemoZone {
        id: "zapopan",
        name: "Zapopan",
        center: LatLng::new(20.7214, -103.3918),
    },
];

const DEMO_CONDOS: [(&str, &str, f64); 2] = [("torre-a", "Torre A", 0.004), ("torre-b", "Torre B", -0.004)];
const DEMO_TYPES: [&str; 3] = ["apartment", "house", "studio"];

struct DemoListing {
    id: String,
    zone: usize,
    /// Index into `DEMO_CONDOS`; every third listing is standalone.
    condo: Option<usize>,
    offer: ListingOffer,
    published: bool,
    fields: Value,
    summary: Value,
}

fn demo_listing(index: usize, base: DateTime<Utc>) -> (DemoListing, DateTime<Utc>) {
    let zone = index % DEMO_ZONES.len();
    let condo = Some((index / DEMO_ZONES.len()) % 3).filter(|slot| *slot < DEMO_CONDOS.len());
    let offer = match index % 4 {
        0 | 1 => ListingOffer::Rent,
        2 => ListingOffer::Sale,
        _ => ListingOffer::RentAndSale,
    };
    let price = if offer.is_rentable() {
        9_000 + (index * 731 % 20) as i64 * 500
    } else {
        1_500_000 + (index * 7_919 % 40) as i64 * 75_000
    };
    let property_type = DEMO_TYPES[(index / 2) % DEMO_TYPES.len()];
    let bedrooms = 1 + index % 4;
    let bathrooms = 1 + index % 3;
    let parking = index % 3;
    let furnished = index % 2 == 0;
    let pets_allowed = index % 5 != 0;
    let pre_sale = offer.is_for_sale() && index % 3 == 0;
    let published = index % 10 != 9;
    let id = uuid::Uuid::new_v4().to_string();
    let thumbnail = format!("https://img.example.invalid/{id}/0.jpg");

    let offer_text = match offer {
        ListingOffer::Rent => "rent",
        ListingOffer::Sale => "sale",
        ListingOffer::RentAndSale => "both",
    };
    let status = if published { "published" } else { "draft" };
    let featured = index % 7 == 0;
    let built_m2 = 45 + index % 8 * 15;

    let demo_zone = &DEMO_ZONES[zone];
    let mut fields = json!({
        "title": format!("{} {} in {}", bedrooms, property_type, demo_zone.name),
        "zoneId": demo_zone.id,
        "zoneName": demo_zone.name,
        "propertyTypeId": property_type,
        "offer": offer_text,
        "status": status,
        "price": price,
        "bedrooms": bedrooms,
        "bathrooms": bathrooms,
        "parking": parking,
        "builtArea": built_m2,
        "furnished": furnished,
        "petsAllowed": pets_allowed,
        "preSale": pre_sale,
        "featured": featured,
        "images": [thumbnail.clone()],
    });
    if let (Some(slot), Value::Object(map)) = (condo, &mut fields) {
        let (suffix, name, _) = DEMO_CONDOS[slot];
        map.insert("condoId".into(), json!(format!("{}-{suffix}", demo_zone.id)));
        map.insert("condoName".into(), json!(name));
    }
    let summary = json!({
        "id": id,
        "propertyTypeId": property_type,
        "price": price,
        "bedrooms": bedrooms,
        "bathrooms": bathrooms,
        "parking": parking,
        "thumbnail": thumbnail,
        "preSale": pre_sale,
        "furnished": furnished,
        "petsAllowed": pets_allowed,
    });
    let created_at = base + Duration::hours(index as i64);
    (
        DemoListing {
            id,
            zone,
            condo,
            offer,
            published,
            fields,
            summary,
        },
        created_at,
    )
}

fn demo_aggregate(zone: usize, listings: &[DemoListing]) -> Value {
    let demo_zone = &DEMO_ZONES[zone];
    let condos: Vec<Value> = DEMO_CONDOS
        .iter()
        .enumerate()
        .map(|(slot, (suffix, name, offset))| {
            let members: Vec<&DemoListing> = listings
                .iter()
                .filter(|listing| listing.published && listing.zone == zone && listing.condo == Some(slot))
                .collect();
            let pick = |keep: fn(ListingOffer) -> bool| -> Vec<Value> {
                members
                    .iter()
                    .filter(|listing| keep(listing.offer))
                    .map(|listing| listing.summary.clone())
                    .collect()
            };
            let prices = members
                .iter()
                .filter_map(|listing| listing.summary.get("price").and_then(Value::as_i64));
            let (min, max) = prices.fold((None::<i64>, None::<i64>), |(min, max), price| {
                (
                    Some(min.map_or(price, |m| m.min(price))),
                    Some(max.map_or(price, |m| m.max(price))),
                )
            });
            json!({
                "condoId": format!("{}-{suffix}", demo_zone.id),
                "name": name,
                "coordinates": {
                    "lat": demo_zone.center.lat + offset,
                    "lng": demo_zone.center.lng - offset,
                },
                "rentals": pick(ListingOffer::is_rentable),
                "sales": pick(ListingOffer::is_for_sale),
                "minPrice": min,
                "maxPrice": max,
            })
        })
        .collect();
    json!({ "zoneName": demo_zone.name, "condos": condos })
}

async fn seed_demo(storage: &Storage, count: usize, collection: &str) -> Result<()> {
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .context("invalid seed epoch")?;
    let mut listings = Vec::with_capacity(count);
    for index in 0..count {
        let (listing, created_at) = demo_listing(index, base);
        let document = Document {
            id: listing.id.clone(),
            created_at,
            fields: listing.fields.clone(),
        };
        storage.upsert_document(collection, &document).await?;
        listings.push(listing);
    }
    for zone in 0..DEMO_ZONES.len() {
        let aggregate = demo_aggregate(zone, &listings);
        storage
            .put_zone_aggregate(&ZoneId::new(DEMO_ZONES[zone].id), &aggregate)
            .await?;
    }
    info!(collection, listings = count, zones = DEMO_ZONES.len(), "demo catalogue written");
    println!("{collection}: {count} listings across {} zones", DEMO_ZONES.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;

    match cli.command {
        Command::ImportListings { file, collection } => {
            import_listings(&storage, &file, &collection).await?;
        }
        Command::ImportZone { zone_id, file } => {
            import_zone(&storage, &zone_id, &file).await?;
        }
        Command::SeedDemo {
            listings,
            collection,
        } => {
            seed_demo(&storage, listings, &collection).await?;
        }
    }

    Ok(())
}
