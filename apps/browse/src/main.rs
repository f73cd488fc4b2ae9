use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use client_core::{
    format::PriceFormatter,
    map::{Camera, MarkerSpec},
    seed::seed_updates_from_str,
    FacetEvaluator, FilterStore, HeadlessSurface, ListView, MarkerReconciler, Settings,
    ViewCoordinator, ViewEvent,
};
use shared::{
    domain::{CondoId, Currency, PropertyTypeId, SortOrder, ZoneId},
    filters::{FilterState, FilterUpdate},
    protocol::CondoTrayPayload,
};
use storage::{DocumentStore, RemoteStore, Storage};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Relevance,
    Newest,
    PriceAsc,
    PriceDesc,
}

impl From<SortArg> for SortOrder {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Relevance => SortOrder::Relevance,
            SortArg::Newest => SortOrder::Newest,
            SortArg::PriceAsc => SortOrder::PriceAscending,
            SortArg::PriceDesc => SortOrder::PriceDescending,
        }
    }
}

/// Runs one search against a listing store and prints the list, summary and map markers.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file (defaults to ./marketplace.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    database_url: Option<String>,
    /// Query a remote HTTP store instead of the local SQLite mirror.
    #[arg(long)]
    remote_url: Option<String>,
    /// Deep link or query string, e.g. `t=compra&preventa=true`.
    #[arg(long, default_value = "")]
    seed: String,
    #[arg(long)]
    zone: Option<String>,
    #[arg(long)]
    condo: Option<String>,
    #[arg(long = "type")]
    property_type: Option<String>,
    #[arg(long)]
    min_price: Option<i64>,
    #[arg(long)]
    max_price: Option<i64>,
    #[arg(long)]
    bedrooms: Option<u32>,
    #[arg(long)]
    bathrooms: Option<u32>,
    #[arg(long)]
    parking: Option<u32>,
    #[arg(long)]
    furnished: Option<bool>,
    #[arg(long)]
    pets: Option<bool>,
    #[arg(long, value_enum)]
    sort: Option<SortArg>,
    /// Show prices in the foreign currency.
    #[arg(long)]
    foreign: bool,
    /// Number of "show more" steps after the first page.
    #[arg(long, default_value_t = 0)]
    show_more: usize,
    /// Simulate a click on this condo marker.
    #[arg(long)]
    click: Option<String>,
    /// Viewport width in pixels; below the mobile breakpoint clicks open the tray.
    #[arg(long, default_value_t = 1280)]
    width: u32,
    #[arg(long)]
    json: bool,
}

impl Args {
    fn filter_updates(&self) -> Vec<FilterUpdate> {
        let mut updates = seed_updates_from_str(&self.seed);
        if let Some(zone) = &self.zone {
            updates.push(FilterUpdate::Zone(Some(ZoneId::new(zone))));
        }
        if let Some(condo) = &self.condo {
            updates.push(FilterUpdate::Condo(Some(CondoId::new(condo))));
        }
        if let Some(kind) = &self.property_type {
            updates.push(FilterUpdate::PropertyType(Some(PropertyTypeId::new(kind))));
        }
        if let Some(min) = self.min_price {
            updates.push(FilterUpdate::PriceMin(min));
        }
        if let Some(max) = self.max_price {
            updates.push(FilterUpdate::PriceMax(max));
        }
        updates.extend([
            self.bedrooms.map(|n| FilterUpdate::Bedrooms(Some(n))),
            self.bathrooms.map(|n| FilterUpdate::Bathrooms(Some(n))),
            self.parking.map(|n| FilterUpdate::Parking(Some(n))),
            self.furnished.map(|v| FilterUpdate::Furnished(Some(v))),
            self.pets.map(|v| FilterUpdate::PetsAllowed(Some(v))),
            self.sort.map(|sort| FilterUpdate::SortOrder(sort.into())),
        ]
        .into_iter()
        .flatten());
        if self.foreign {
            updates.push(FilterUpdate::Currency(Currency::Foreign));
        }
        updates
    }
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn DocumentStore>> {
    if let Some(url) = &settings.remote_store_url {
        let store = RemoteStore::parse(url).with_context(|| format!("invalid remote url {url}"))?;
        info!(%url, "using remote listing store");
        return Ok(Arc::new(store));
    }
    let storage = Storage::new(&settings.database_url)
        .await
        .with_context(|| format!("failed to open {}", settings.database_url))?;
    info!(database_url = %settings.database_url, "using local listing mirror");
    Ok(Arc::new(storage))
}

fn print_list(view: &ListView, formatter: &PriceFormatter, currency: Currency) {
    println!("{} ({} filters)", view.summary, view.applied_filters);
    println!("status: {:?}", view.status);
    if let Some(error) = &view.error {
        println!("error: {error}");
    }
    for record in &view.listings {
        println!(
            "{marker} {id:<24} {price:>16}  {bed}bd {bath}ba {park}pk  {zone}  {title}",
            marker = if record.featured { "*" } else { " " },
            id = record.id.as_str(),
            price = formatter.label(record.price, currency),
            bed = record.bedrooms,
            bath = record.bathrooms,
            park = record.parking,
            zone = record.zone_name,
            title = record.title,
        );
    }
    if view.can_show_more {
        println!("... more available ({} loaded matches)", view.loaded_matches);
    }
}

fn print_markers(markers: &[MarkerSpec]) {
    println!("markers: {}", markers.len());
    for marker in markers {
        println!(
            "{sel} {id:<20} {count:>3}  {label}  ({:.5}, {:.5})",
            marker.position.lat,
            marker.position.lng,
            sel = if marker.selected { ">" } else { " " },
            id = marker.condo_id.as_str(),
            count = marker.count,
            label = marker.label,
        );
    }
}

fn print_tray(tray: &CondoTrayPayload) {
    println!("tray: {} ({} properties)", tray.condo_name, tray.properties.len());
    for summary in &tray.properties {
        println!(
            "  {} {} {}bd",
            summary.listing_id, summary.price, summary.bedrooms
        );
    }
}

/// Drains pending view events and keeps the last tray. Lagging only drops older events.
fn latest_tray(events: &mut broadcast::Receiver<ViewEvent>) -> Option<CondoTrayPayload> {
    let mut tray = None;
    loop {
        match events.try_recv() {
            Ok(ViewEvent::Tray(payload)) => tray = Some(payload),
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => debug!(skipped, "view events lagged"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    tray
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;
    if let Some(url) = &args.database_url {
        settings.database_url = url.clone();
    }
    if let Some(url) = &args.remote_url {
        settings.remote_store_url = Some(url.clone());
    }

    let store = open_store(&settings).await?;
    let mut initial = FilterState::default();
    for update in args.filter_updates() {
        initial.apply(update);
    }
    let currency = initial.currency;
    let filters = Arc::new(FilterStore::with_initial(initial));

    let camera = Camera::new(settings.map.default_center, settings.map.default_zoom);
    let reconciler = MarkerReconciler::new(
        settings.map.clone(),
        FacetEvaluator::new(settings.facets),
        PriceFormatter::new(settings.currency.clone()),
        Ok(HeadlessSurface::new(camera)),
    );
    let formatter = PriceFormatter::new(settings.currency.clone());
    let fly = Duration::from_millis(settings.map.fly_duration_ms);
    let settle = Duration::from_millis(settings.map.resize_settle_ms);
    let coordinator = ViewCoordinator::new(settings, filters, store, reconciler);
    let mut events = coordinator.subscribe_events();

    let zones = coordinator.load_map_data().await;
    info!(zones, "map ready");

    let mut now = Instant::now();
    coordinator.on_container_resized(args.width, now);
    now += settle;
    coordinator.tick(now).await;

    let mut view = coordinator.refresh().await;
    for _ in 0..args.show_more {
        view = coordinator.show_more().await;
    }

    if let Some(condo) = &args.click {
        coordinator.on_marker_click(&CondoId::new(condo), now).await;
        now += fly;
        coordinator.tick(now).await;
        view = coordinator.list_view();
    }

    let tray = latest_tray(&mut events);
    let markers: Vec<MarkerSpec> =
        coordinator.with_map(|map| map.visible_markers().map(|marker| marker.spec()).collect());

    if args.json {
        let output = serde_json::json!({
            "list": view,
            "markers": markers,
            "tray": tray,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_list(&view, &formatter, currency);
    print_markers(&markers);
    if let Some(tray) = &tray {
        print_tray(tray);
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
