//! Composition root tying the filter store to the listing list and the map.
//!
//! Filter notifications arrive synchronously. The subscriber only does bookkeeping: it bumps the
//! list generation when the query scope changed, re-evaluates buffered records otherwise, and
//! forwards the change to the marker reconciler. Store I/O happens in [`ViewCoordinator::refresh`],
//! and a response is applied only if its generation is still current.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Instant,
};

use futures::future::join_all;
use serde::Serialize;
use shared::{
    domain::{CondoId, ZoneId},
    filters::{FilterState, FilterUpdate},
    listing::{ListingRecord, ZoneAggregate},
    protocol::CondoTrayPayload,
};
use storage::DocumentStore;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    facets::{sort_listings, FacetEvaluator},
    fetcher::{Cursor, PaginatedFetcher, QueryScope},
    filter_store::{FilterChange, FilterStore, SubscriptionId},
    format::PriceFormatter,
    map::{MapSurface, MarkerReconciler, MarkerSpec, ReconcilerEffect, ViewportMode},
    summary::{applied_filter_count, describe, SummaryNames},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    /// Nothing has been requested yet.
    Idle,
    Loading,
    /// The query finished and nothing matched.
    Empty,
    Ready,
    Failed,
}

/// What the list surface renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListView {
    pub generation: u64,
    pub status: ViewStatus,
    pub listings: Vec<ListingRecord>,
    /// Matching records loaded so far, including those beyond the visible window.
    pub loaded_matches: usize,
    pub can_show_more: bool,
    pub applied_filters: usize,
    pub summary: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ViewEvent {
    List(ListView),
    Markers(Vec<MarkerSpec>),
    Tray(CondoTrayPayload),
    MapUnavailable(String),
}

struct ListState {
    generation: u64,
    scope: QueryScope,
    filters: FilterState,
    buffer: Vec<ListingRecord>,
    matches: Vec<ListingRecord>,
    cursor: Option<Cursor>,
    requested: bool,
    exhausted: bool,
    in_flight: bool,
    window: usize,
    status: ViewStatus,
    error: Option<String>,
}

impl ListState {
    fn new(filters: FilterState, window: usize) -> Self {
        Self {
            generation: 0,
            scope: QueryScope::from_filters(&filters),
            filters,
            buffer: Vec::new(),
            matches: Vec::new(),
            cursor: None,
            requested: false,
            exhausted: false,
            in_flight: false,
            window,
            status: ViewStatus::Idle,
            error: None,
        }
    }

    fn restart(&mut self, filters: FilterState, window: usize) {
        self.generation += 1;
        self.scope = QueryScope::from_filters(&filters);
        self.filters = filters;
        self.buffer.clear();
        self.matches.clear();
        self.cursor = None;
        self.requested = false;
        self.exhausted = false;
        self.in_flight = false;
        self.window = window;
        self.status = ViewStatus::Loading;
        self.error = None;
    }

    fn needs_fetch(&self) -> bool {
        self.error.is_none() && !self.exhausted && self.matches.len() < self.window
    }

    fn settle_status(&mut self) {
        self.status = if self.error.is_some() {
            ViewStatus::Failed
        } else if self.in_flight {
            ViewStatus::Loading
        } else if !self.matches.is_empty() {
            ViewStatus::Ready
        } else if self.exhausted {
            ViewStatus::Empty
        } else if self.requested {
            // Scanned pages held no matches but more remain behind "show more".
            ViewStatus::Ready
        } else {
            self.status
        };
    }
}

#[derive(Default)]
struct DisplayNames {
    zones: HashMap<ZoneId, String>,
    condos: HashMap<CondoId, String>,
}

struct FetchTicket {
    generation: u64,
    scope: QueryScope,
    cursor: Option<Cursor>,
}

pub struct ViewCoordinator<M: MapSurface + 'static> {
    settings: Settings,
    filters: Arc<FilterStore>,
    fetcher: PaginatedFetcher,
    evaluator: FacetEvaluator,
    formatter: PriceFormatter,
    list: Mutex<ListState>,
    map: Mutex<MarkerReconciler<M>>,
    names: Mutex<DisplayNames>,
    events: broadcast::Sender<ViewEvent>,
    subscription: Mutex<Option<SubscriptionId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<M: MapSurface + 'static> ViewCoordinator<M> {
    pub fn new(
        settings: Settings,
        filters: Arc<FilterStore>,
        store: Arc<dyn DocumentStore>,
        reconciler: MarkerReconciler<M>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let evaluator = FacetEvaluator::new(settings.facets);
        let formatter = PriceFormatter::new(settings.currency.clone());
        let fetcher = PaginatedFetcher::new(store, settings.listing_collection.clone());
        let initial = filters.get();

        let coordinator = Arc::new(Self {
            list: Mutex::new(ListState::new(initial.clone(), settings.page_size)),
            map: Mutex::new(reconciler),
            names: Mutex::new(DisplayNames::default()),
            settings,
            filters: filters.clone(),
            fetcher,
            evaluator,
            formatter,
            events,
            subscription: Mutex::new(None),
        });
        let seeded = initial.diff(&FilterState::default());
        lock(&coordinator.map).on_filters_changed(&initial, &seeded);

        let weak: Weak<Self> = Arc::downgrade(&coordinator);
        let id = filters.subscribe(move |change| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.on_filter_change(change);
            }
        });
        *lock(&coordinator.subscription) = Some(id);
        coordinator
    }

    pub fn filters(&self) -> &Arc<FilterStore> {
        &self.filters
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    /// Runs `f` against the reconciler while holding its lock.
    pub fn with_map<R>(&self, f: impl FnOnce(&MarkerReconciler<M>) -> R) -> R {
        f(&lock(&self.map))
    }

    pub fn list_view(&self) -> ListView {
        let list = lock(&self.list);
        self.render(&list)
    }

    /// Writes one filter edit and brings the list up to date.
    pub async fn apply(&self, update: FilterUpdate) -> ListView {
        self.filters.set(update);
        self.refresh().await
    }

    pub async fn reset(&self) -> ListView {
        self.filters.reset();
        self.refresh().await
    }

    /// Grows the visible window by the configured increment, fetching only if the buffered
    /// matches run out.
    pub async fn show_more(&self) -> ListView {
        {
            let mut list = lock(&self.list);
            list.window += self.settings.show_more_increment;
            debug!(window = list.window, "show more");
        }
        self.refresh().await
    }

    /// Fetches pages until the visible window is filled, the results are exhausted, a fetch
    /// fails, or the per-call page limit is reached. Responses that arrive after the selection
    /// moved on are dropped.
    pub async fn refresh(&self) -> ListView {
        for _ in 0..self.settings.max_pages_per_request.max(1) {
            let ticket = {
                let mut list = lock(&self.list);
                if list.in_flight || !list.needs_fetch() {
                    break;
                }
                list.in_flight = true;
                list.requested = true;
                list.status = ViewStatus::Loading;
                FetchTicket {
                    generation: list.generation,
                    scope: list.scope.clone(),
                    cursor: list.cursor.clone(),
                }
            };
            debug!(generation = ticket.generation, "listing fetch issued");

            let fetch = self
                .fetcher
                .fetch_page(&ticket.scope, ticket.cursor.as_ref(), self.settings.page_size)
                .await;

            let mut list = lock(&self.list);
            if list.generation != ticket.generation {
                debug!(
                    stale = ticket.generation,
                    current = list.generation,
                    "discarding stale listing page"
                );
                break;
            }
            list.in_flight = false;
            match fetch.into_result() {
                Ok(page) => {
                    debug!(
                        generation = ticket.generation,
                        records = page.records.len(),
                        has_more = page.has_more,
                        "listing fetch complete"
                    );
                    list.buffer.extend(page.records);
                    list.cursor = page.next_cursor;
                    list.exhausted = !page.has_more;
                    list.matches = self.evaluator.evaluate(&list.buffer, &list.filters);
                }
                Err(err) => {
                    warn!(error = %err, "listing fetch failed");
                    list.error = Some(err.user_message().to_string());
                    list.exhausted = true;
                }
            }
            list.settle_status();
        }

        let view = {
            let mut list = lock(&self.list);
            if !list.in_flight {
                list.settle_status();
            }
            self.render(&list)
        };
        let _ = self.events.send(ViewEvent::List(view.clone()));
        view
    }

    /// Loads every zone aggregate concurrently and hands them to the map. Zones that fail to
    /// load or decode are skipped.
    pub async fn load_map_data(&self) -> usize {
        let store = self.fetcher.store().clone();
        let zone_ids = match store.zone_ids().await {
            Ok(zone_ids) => zone_ids,
            Err(err) => {
                warn!(error = %err, "zone list unavailable; map stays empty");
                return 0;
            }
        };

        let reads = zone_ids.iter().map(|zone_id| {
            let store = store.clone();
            async move { (zone_id, store.zone_aggregate(zone_id).await) }
        });
        let mut zones = Vec::new();
        for (zone_id, result) in join_all(reads).await {
            match result {
                Ok(Some(value)) => match ZoneAggregate::from_document(zone_id, &value) {
                    Ok(decoded) => {
                        for rejected in &decoded.rejected {
                            warn!(zone = %zone_id, error = %rejected, "skipping malformed condo");
                        }
                        zones.push(decoded.aggregate);
                    }
                    Err(err) => warn!(zone = %zone_id, error = %err, "skipping malformed zone"),
                },
                Ok(None) => debug!(zone = %zone_id, "zone has no aggregate"),
                Err(err) => warn!(zone = %zone_id, error = %err, "zone aggregate read failed"),
            }
        }

        {
            let mut names = lock(&self.names);
            for zone in &zones {
                names
                    .zones
                    .insert(zone.zone_id.clone(), zone.zone_name.clone());
                for condo in &zone.condos {
                    names
                        .condos
                        .insert(condo.condo_id.clone(), condo.name.clone());
                }
            }
        }

        let loaded = zones.len();
        info!(zones = loaded, "map data loaded");
        lock(&self.map).load_aggregates(zones);
        self.publish_markers();
        loaded
    }

    pub async fn on_marker_click(&self, condo_id: &CondoId, now: Instant) {
        lock(&self.map).on_marker_click(condo_id, now);
        self.tick(now).await;
    }

    pub fn on_user_camera_moved(&self) {
        lock(&self.map).on_user_camera_moved();
    }

    pub fn on_container_resized(&self, width_px: u32, now: Instant) {
        let mode = ViewportMode::for_width(width_px, self.settings.map.mobile_breakpoint_px);
        let mut map = lock(&self.map);
        map.set_viewport_mode(mode);
        map.on_container_resized(now);
    }

    /// Advances map transitions and applies whatever they produced.
    pub async fn tick(&self, now: Instant) {
        let effects = lock(&self.map).tick(now);
        let mut filters_changed = false;
        for effect in effects {
            match effect {
                ReconcilerEffect::ApplyCondoFilter(condo_id) => {
                    self.filters.set(FilterUpdate::Condo(condo_id));
                    filters_changed = true;
                }
                ReconcilerEffect::ShowTray(payload) => {
                    let _ = self.events.send(ViewEvent::Tray(payload));
                }
                ReconcilerEffect::MapUnavailable(err) => {
                    let _ = self.events.send(ViewEvent::MapUnavailable(err.to_string()));
                }
            }
        }
        self.publish_markers();
        if filters_changed {
            self.refresh().await;
        }
    }

    fn on_filter_change(&self, change: &FilterChange) {
        if change.is_empty() {
            return;
        }
        debug!(revision = change.revision, fields = ?change.fields, "filters changed");

        {
            let mut list = lock(&self.list);
            let retry = change.affects_results() && list.error.is_some();
            if change.affects_query_scope() || retry {
                list.restart(change.state.clone(), self.settings.page_size);
                debug!(generation = list.generation, "query scope changed; pagination restarted");
            } else {
                list.filters = change.state.clone();
                if change.affects_results() {
                    list.window = self.settings.page_size;
                    list.matches = self.evaluator.evaluate(&list.buffer, &list.filters);
                } else {
                    let order = list.filters.sort_order;
                    sort_listings(&mut list.matches, order);
                }
                if !list.in_flight {
                    list.settle_status();
                }
            }
            let view = self.render(&list);
            let _ = self.events.send(ViewEvent::List(view));
        }

        lock(&self.map).on_filters_changed(&change.state, &change.fields);
        self.publish_markers();
    }

    fn publish_markers(&self) {
        let markers: Vec<MarkerSpec> = lock(&self.map)
            .visible_markers()
            .map(|marker| marker.spec())
            .collect();
        let _ = self.events.send(ViewEvent::Markers(markers));
    }

    fn render(&self, list: &ListState) -> ListView {
        let names = lock(&self.names);
        let zone = list
            .filters
            .zone_id
            .as_ref()
            .and_then(|zone_id| names.zones.get(zone_id))
            .map(String::as_str);
        let condo = list
            .filters
            .condo_id
            .as_ref()
            .and_then(|condo_id| names.condos.get(condo_id))
            .map(String::as_str);

        ListView {
            generation: list.generation,
            status: list.status,
            listings: list.matches.iter().take(list.window).cloned().collect(),
            loaded_matches: list.matches.len(),
            can_show_more: list.matches.len() > list.window || !list.exhausted,
            applied_filters: applied_filter_count(&list.filters),
            summary: describe(&list.filters, SummaryNames { zone, condo }, &self.formatter),
            error: list.error.clone(),
        }
    }
}

impl<M: MapSurface + 'static> Drop for ViewCoordinator<M> {
    fn drop(&mut self) {
        if let Some(id) = lock(&self.subscription).take() {
            self.filters.unsubscribe(id);
        }
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
