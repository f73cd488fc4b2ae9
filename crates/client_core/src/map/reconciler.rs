//! Marker set and camera sequencing for the map view.
//!
//! The reconciler is a state machine driven by UI events plus an explicit clock. Nothing in here
//! sleeps: timed transitions (marker flights, resize settling) finish on the first `tick` at or
//! after their deadline, so a lost animation callback can never wedge the camera guards.
//!
//! Business effects (toggling the condo filter, opening the mobile tray) are returned from
//! `tick` instead of being applied here. The caller owns the filter store and feeds the
//! resulting change back through `on_filters_changed`.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use serde::Serialize;
use shared::{
    domain::{CondoId, LatLng, ZoneId},
    filters::{FilterField, FilterState},
    listing::{CondoAggregate, ZoneAggregate},
    protocol::CondoTrayPayload,
};
use tracing::{debug, error, info, warn};

use super::{
    camera::{Camera, CameraIntent, CameraState},
    markers::{build_marker, matching_summaries, MarkerViewState},
    surface::MapSurface,
};
use crate::{
    config::MapSettings, error::MapInitError, facets::FacetEvaluator, format::PriceFormatter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewportMode {
    Desktop,
    Mobile,
}

impl ViewportMode {
    pub fn for_width(width_px: u32, breakpoint_px: u32) -> Self {
        if width_px < breakpoint_px {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerPhase {
    /// Map is up but no aggregates have been loaded yet.
    Uninitialized,
    /// Map initialization failed. Terminal.
    Failed,
    Idle,
    AnimatingToMarker {
        target: CondoId,
        started: Instant,
        destination: Camera,
    },
    Resizing {
        last_resize: Instant,
        before: Camera,
    },
}

impl ReconcilerPhase {
    pub fn in_transition(&self) -> bool {
        matches!(self, Self::AnimatingToMarker { .. } | Self::Resizing { .. })
    }
}

/// Work the caller must perform on the reconciler's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerEffect {
    /// Desktop marker click settled: write the condo filter.
    ApplyCondoFilter(Option<CondoId>),
    /// Mobile marker click settled: open the condo tray.
    ShowTray(CondoTrayPayload),
    /// Map initialization failed. Emitted exactly once.
    MapUnavailable(MapInitError),
}

/// Checks the settings a real SDK needs before handing them to `open`.
pub fn connect_surface<M: MapSurface>(
    settings: &MapSettings,
    open: impl FnOnce(&str) -> Result<M, MapInitError>,
) -> Result<M, MapInitError> {
    match settings.access_token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => open(token),
        _ => Err(MapInitError::MissingAccessToken),
    }
}

pub struct MarkerReconciler<M: MapSurface> {
    settings: MapSettings,
    evaluator: FacetEvaluator,
    formatter: PriceFormatter,
    surface: Option<M>,
    init_error: Option<MapInitError>,
    failure_reported: bool,
    phase: ReconcilerPhase,
    intent: CameraIntent,
    user_interacted: bool,
    viewport: ViewportMode,
    filters: FilterState,
    zones: BTreeMap<ZoneId, ZoneAggregate>,
    markers: BTreeMap<CondoId, MarkerViewState>,
    selected: Option<CondoId>,
    fallback_camera: Option<Camera>,
    rebuild_pending: bool,
    relabel_pending: bool,
    reframe_pending: bool,
    effects: Vec<ReconcilerEffect>,
}

impl<M: MapSurface> MarkerReconciler<M> {
    pub fn new(
        settings: MapSettings,
        evaluator: FacetEvaluator,
        formatter: PriceFormatter,
        surface: Result<M, MapInitError>,
    ) -> Self {
        let (surface, init_error, phase) = match surface {
            Ok(surface) => (Some(surface), None, ReconcilerPhase::Uninitialized),
            Err(err) => {
                error!(error = %err, "map initialization failed; map view disabled");
                (None, Some(err), ReconcilerPhase::Failed)
            }
        };
        Self {
            settings,
            evaluator,
            formatter,
            surface,
            init_error,
            failure_reported: false,
            phase,
            intent: CameraIntent::Programmatic,
            user_interacted: false,
            viewport: ViewportMode::Desktop,
            filters: FilterState::default(),
            zones: BTreeMap::new(),
            markers: BTreeMap::new(),
            selected: None,
            fallback_camera: None,
            rebuild_pending: false,
            relabel_pending: false,
            reframe_pending: true,
            effects: Vec::new(),
        }
    }

    pub fn phase(&self) -> &ReconcilerPhase {
        &self.phase
    }

    pub fn intent(&self) -> &CameraIntent {
        &self.intent
    }

    pub fn init_error(&self) -> Option<&MapInitError> {
        self.init_error.as_ref()
    }

    pub fn viewport(&self) -> ViewportMode {
        self.viewport
    }

    pub fn selected(&self) -> Option<&CondoId> {
        self.selected.as_ref()
    }

    pub fn is_rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    pub fn surface(&self) -> Option<&M> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut M> {
        self.surface.as_mut()
    }

    /// All known condo markers, visible or not, ordered by condo id.
    pub fn markers(&self) -> impl Iterator<Item = &MarkerViewState> {
        self.markers.values()
    }

    pub fn visible_markers(&self) -> impl Iterator<Item = &MarkerViewState> {
        self.markers.values().filter(|marker| marker.is_visible())
    }

    pub fn marker(&self, condo_id: &CondoId) -> Option<&MarkerViewState> {
        self.markers.get(condo_id)
    }

    pub fn camera_state(&self) -> Option<CameraState> {
        let surface = self.surface.as_ref()?;
        Some(CameraState {
            camera: surface.camera(),
            intent: self.intent.clone(),
            user_interacted: self.user_interacted,
            focused: match &self.intent {
                CameraIntent::Focused(condo_id) => Some(condo_id.clone()),
                _ => None,
            },
            transition_in_progress: self.phase.in_transition(),
        })
    }

    /// Replaces the aggregate data. The first load moves the machine out of `Uninitialized`.
    pub fn load_aggregates(&mut self, zones: impl IntoIterator<Item = ZoneAggregate>) {
        if self.phase == ReconcilerPhase::Failed {
            return;
        }
        self.zones = zones
            .into_iter()
            .map(|zone| (zone.zone_id.clone(), zone))
            .collect();
        info!(zones = self.zones.len(), "map aggregates loaded");
        if self.phase == ReconcilerPhase::Uninitialized {
            self.phase = ReconcilerPhase::Idle;
        }
        self.request_rebuild();
    }

    pub fn on_filters_changed(&mut self, state: &FilterState, fields: &[FilterField]) {
        self.filters = state.clone();
        if self.phase == ReconcilerPhase::Failed || fields.is_empty() {
            return;
        }

        let zone_changed = fields.contains(&FilterField::Zone);
        if fields.contains(&FilterField::Condo) && self.viewport == ViewportMode::Desktop {
            self.follow_condo_filter(zone_changed);
        }
        if zone_changed && self.intent == CameraIntent::Programmatic {
            self.reframe_pending = true;
        }

        if fields.iter().all(|field| field.is_presentation()) {
            self.relabel_pending = true;
            self.run_pending();
        } else {
            self.request_rebuild();
        }
    }

    fn follow_condo_filter(&mut self, zone_changed: bool) {
        let wanted = self.filters.condo_id.clone();
        if wanted == self.selected {
            return;
        }
        debug!(condo = ?wanted, "selection follows condo filter");
        match wanted {
            Some(condo_id) => {
                self.intent = CameraIntent::Focused(condo_id.clone());
                self.selected = Some(condo_id);
            }
            None => {
                self.selected = None;
                if matches!(self.intent, CameraIntent::Focused(_)) {
                    self.intent = if zone_changed && !self.user_interacted {
                        CameraIntent::Programmatic
                    } else {
                        CameraIntent::UserMoved
                    };
                }
            }
        }
    }

    pub fn on_marker_click(&mut self, condo_id: &CondoId, now: Instant) {
        match &self.phase {
            ReconcilerPhase::Failed | ReconcilerPhase::Uninitialized => return,
            ReconcilerPhase::AnimatingToMarker { target, .. } => {
                debug!(clicked = %condo_id, flying_to = %target, "click ignored during flight");
                return;
            }
            ReconcilerPhase::Idle | ReconcilerPhase::Resizing { .. } => {}
        }

        let Some(position) = self
            .markers
            .get(condo_id)
            .filter(|marker| marker.is_visible())
            .map(|marker| marker.position)
        else {
            warn!(condo = %condo_id, "click on unknown marker ignored");
            return;
        };

        if self.viewport == ViewportMode::Desktop && self.selected.as_ref() == Some(condo_id) {
            debug!(condo = %condo_id, "marker deselected");
            self.selected = None;
            self.intent = CameraIntent::UserMoved;
            self.effects.push(ReconcilerEffect::ApplyCondoFilter(None));
            self.restyle_selection();
            return;
        }

        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let destination = Camera::new(position, self.settings.focus_zoom);
        self.fallback_camera = Some(surface.camera());
        surface.fly_to(
            destination,
            Duration::from_millis(self.settings.fly_duration_ms),
        );
        debug!(condo = %condo_id, "flying to marker");

        self.intent = CameraIntent::Focused(condo_id.clone());
        self.phase = ReconcilerPhase::AnimatingToMarker {
            target: condo_id.clone(),
            started: now,
            destination,
        };
        // Mobile clicks only open the tray; selection exists on desktop alone.
        if self.viewport == ViewportMode::Desktop {
            self.selected = Some(condo_id.clone());
            self.restyle_selection();
        }
    }

    /// The user panned or zoomed. Movement reported mid-flight comes from the flight itself.
    pub fn on_user_camera_moved(&mut self) {
        let current = match (&self.phase, self.surface.as_ref()) {
            (ReconcilerPhase::AnimatingToMarker { .. }, _)
            | (ReconcilerPhase::Failed, _)
            | (_, None) => return,
            (_, Some(surface)) => surface.camera(),
        };
        self.intent = CameraIntent::UserMoved;
        self.user_interacted = true;
        if let ReconcilerPhase::Resizing { before, .. } = &mut self.phase {
            *before = current;
        }
    }

    pub fn on_container_resized(&mut self, now: Instant) {
        if self.phase == ReconcilerPhase::Failed {
            return;
        }
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let before = surface.camera();
        surface.resize();

        // A flight owns the camera until it lands; its completion corrects any drift.
        if let ReconcilerPhase::Resizing { last_resize, .. } = &mut self.phase {
            *last_resize = now;
        } else if self.phase == ReconcilerPhase::Idle {
            self.phase = ReconcilerPhase::Resizing {
                last_resize: now,
                before,
            };
        }
    }

    pub fn set_viewport_mode(&mut self, mode: ViewportMode) {
        if mode == self.viewport {
            return;
        }
        info!(?mode, "viewport mode changed");
        self.viewport = mode;
        if mode == ViewportMode::Mobile && self.selected.take().is_some() {
            if matches!(self.intent, CameraIntent::Focused(_)) {
                self.intent = CameraIntent::UserMoved;
            }
            if self.filters.condo_id.is_some() {
                self.effects.push(ReconcilerEffect::ApplyCondoFilter(None));
            }
            self.restyle_selection();
        }
    }

    /// Advances timed transitions to `now` and returns the effects produced since the last
    /// call.
    pub fn tick(&mut self, now: Instant) -> Vec<ReconcilerEffect> {
        if let Some(err) = &self.init_error {
            if !self.failure_reported {
                self.failure_reported = true;
                self.effects.push(ReconcilerEffect::MapUnavailable(err.clone()));
            }
        }

        match self.phase.clone() {
            ReconcilerPhase::AnimatingToMarker {
                target,
                started,
                destination,
            } if now.saturating_duration_since(started)
                >= Duration::from_millis(self.settings.fly_duration_ms) =>
            {
                self.finish_flight(target, destination);
            }
            ReconcilerPhase::Resizing {
                last_resize,
                before,
            } if now.saturating_duration_since(last_resize)
                >= Duration::from_millis(self.settings.resize_settle_ms) =>
            {
                self.finish_resize(before);
            }
            _ => {}
        }

        self.run_pending();
        std::mem::take(&mut self.effects)
    }

    fn finish_flight(&mut self, target: CondoId, destination: Camera) {
        self.phase = ReconcilerPhase::Idle;
        if let Some(surface) = self.surface.as_mut() {
            if !surface
                .camera()
                .approx_eq(&destination, self.settings.camera_epsilon)
            {
                debug!(condo = %target, "flight interrupted; snapping to destination");
                surface.jump_to(destination);
            }
        }

        match self.viewport {
            ViewportMode::Desktop => {
                if self.selected.as_ref() == Some(&target) {
                    self.effects
                        .push(ReconcilerEffect::ApplyCondoFilter(Some(target)));
                }
            }
            ViewportMode::Mobile => {
                if let Some(payload) = self.tray_payload(&target) {
                    self.effects.push(ReconcilerEffect::ShowTray(payload));
                }
            }
        }
    }

    fn finish_resize(&mut self, before: Camera) {
        self.phase = ReconcilerPhase::Idle;
        let epsilon = self.settings.camera_epsilon;
        let correction = {
            let Some(surface) = self.surface.as_ref() else {
                return;
            };
            let current = surface.camera();
            if current.approx_eq(&before, epsilon) {
                return;
            }
            match &self.intent {
                CameraIntent::Focused(condo_id) => self
                    .markers
                    .get(condo_id)
                    .map(|marker| Camera::new(marker.position, current.zoom))
                    .unwrap_or(before),
                CameraIntent::UserMoved => before,
                CameraIntent::Programmatic => Camera::new(self.visible_centroid(), current.zoom),
            }
        };
        debug!(intent = ?self.intent, "correcting camera drift after resize");
        if let Some(surface) = self.surface.as_mut() {
            surface.jump_to(correction);
        }
    }

    fn request_rebuild(&mut self) {
        self.rebuild_pending = true;
        self.run_pending();
    }

    fn run_pending(&mut self) {
        if self.phase != ReconcilerPhase::Idle {
            if self.rebuild_pending && self.phase.in_transition() {
                debug!("marker rebuild deferred until transition settles");
            }
            return;
        }
        if self.rebuild_pending {
            self.rebuild();
        } else if self.relabel_pending {
            self.relabel();
        }
    }

    fn rebuild(&mut self) {
        self.rebuild_pending = false;
        self.relabel_pending = false;
        let Some(surface) = self.surface.as_mut() else {
            return;
        };

        let mut next = BTreeMap::new();
        for zone in self.zones.values() {
            for condo in zone.condos.iter().filter(|condo| condo.has_known_location()) {
                let selected = self.selected.as_ref() == Some(&condo.condo_id);
                let marker = build_marker(
                    &self.evaluator,
                    &self.formatter,
                    &self.filters,
                    &zone.zone_id,
                    condo,
                    selected,
                );
                next.insert(condo.condo_id.clone(), marker);
            }
        }

        for (condo_id, previous) in std::mem::take(&mut self.markers) {
            if let Some(handle) = previous.handle {
                match next.get_mut(&condo_id) {
                    Some(marker) if marker.is_visible() => marker.handle = Some(handle),
                    _ => surface.remove_marker(handle),
                }
            }
        }
        for marker in next.values_mut() {
            match (marker.is_visible(), marker.handle) {
                (true, Some(handle)) => surface.update_marker(handle, &marker.spec()),
                (true, None) => marker.handle = Some(surface.add_marker(&marker.spec())),
                (false, _) => {}
            }
        }
        self.markers = next;
        debug!(
            total = self.markers.len(),
            visible = self.visible_markers().count(),
            "markers rebuilt"
        );

        self.settle_camera_after_rebuild();
    }

    fn settle_camera_after_rebuild(&mut self) {
        if let Some(condo_id) = self.selected.clone() {
            if !self.markers.contains_key(&condo_id) {
                warn!(condo = %condo_id, "selected marker vanished; restoring previous camera");
                self.selected = None;
                self.intent = CameraIntent::UserMoved;
                if let (Some(fallback), Some(surface)) =
                    (self.fallback_camera.take(), self.surface.as_mut())
                {
                    surface.jump_to(fallback);
                }
                return;
            }
        }

        let epsilon = self.settings.camera_epsilon;
        let target = match &self.intent {
            CameraIntent::Focused(condo_id) => self
                .markers
                .get(condo_id)
                .map(|marker| Camera::new(marker.position, self.settings.focus_zoom)),
            CameraIntent::Programmatic if self.reframe_pending => {
                let zoom = if self.visible_markers().next().is_some() {
                    self.settings.focus_zoom.min(self.settings.default_zoom + 2.0)
                } else {
                    self.settings.default_zoom
                };
                Some(Camera::new(self.visible_centroid(), zoom))
            }
            CameraIntent::Programmatic | CameraIntent::UserMoved => None,
        };
        self.reframe_pending = false;

        if let (Some(target), Some(surface)) = (target, self.surface.as_mut()) {
            if !surface.camera().approx_eq(&target, epsilon) {
                surface.jump_to(target);
            }
        }
    }

    fn relabel(&mut self) {
        self.relabel_pending = false;
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        for marker in self.markers.values_mut() {
            marker.relabel(&self.formatter, self.filters.currency);
            if let Some(handle) = marker.handle {
                surface.update_marker(handle, &marker.spec());
            }
        }
    }

    fn restyle_selection(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        for marker in self.markers.values_mut() {
            let selected = self.selected.as_ref() == Some(&marker.condo_id);
            if marker.selected == selected {
                continue;
            }
            marker.selected = selected;
            match (marker.is_visible(), marker.handle) {
                (true, Some(handle)) => surface.update_marker(handle, &marker.spec()),
                (true, None) => marker.handle = Some(surface.add_marker(&marker.spec())),
                (false, Some(handle)) => {
                    surface.remove_marker(handle);
                    marker.handle = None;
                }
                (false, None) => {}
            }
        }
    }

    fn visible_centroid(&self) -> LatLng {
        LatLng::centroid(self.visible_markers().map(|marker| &marker.position))
            .unwrap_or(self.settings.default_center)
    }

    fn condo(&self, condo_id: &CondoId) -> Option<(&ZoneId, &CondoAggregate)> {
        self.zones.values().find_map(|zone| {
            zone.condos
                .iter()
                .find(|condo| &condo.condo_id == condo_id)
                .map(|condo| (&zone.zone_id, condo))
        })
    }

    fn tray_payload(&self, condo_id: &CondoId) -> Option<CondoTrayPayload> {
        let (zone_id, condo) = self.condo(condo_id)?;
        let properties = matching_summaries(&self.evaluator, &self.filters, zone_id, condo)
            .into_iter()
            .cloned()
            .collect();
        Some(CondoTrayPayload {
            condo_id: condo.condo_id.clone(),
            condo_name: condo.name.clone(),
            properties,
        })
    }
}

#[cfg(test)]
#[path = "../tests/reconciler_tests.rs"]
mod tests;
