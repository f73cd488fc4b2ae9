use shared::{
    domain::{Currency, TransactionType},
    filters::FilterUpdate,
};

use super::*;
use crate::{
    map::surface::{HeadlessSurface, SurfaceCall},
    test_support::{condo, summary},
};

const FLY: Duration = Duration::from_millis(800);
const SETTLE: Duration = Duration::from_millis(250);

fn centro() -> ZoneAggregate {
    ZoneAggregate {
        zone_id: ZoneId::new("centro"),
        zone_name: "Centro".into(),
        condos: vec![
            condo("a", 20.0, -103.0, vec![summary("a1", 10_000, 2)]),
            condo("b", 21.0, -104.0, vec![summary("b1", 20_000, 3)]),
            condo("empty", 20.5, -103.5, Vec::new()),
            condo("nowhere", 0.0, 0.0, vec![summary("n1", 5_000, 1)]),
        ],
    }
}

fn norte() -> ZoneAggregate {
    ZoneAggregate {
        zone_id: ZoneId::new("norte"),
        zone_name: "Norte".into(),
        condos: vec![condo("c", 25.0, -100.0, vec![summary("c1", 12_000, 2)])],
    }
}

fn start_camera() -> Camera {
    let settings = MapSettings::default();
    Camera::new(settings.default_center, settings.default_zoom)
}

fn reconciler_with(surface: HeadlessSurface) -> MarkerReconciler<HeadlessSurface> {
    let mut reconciler = MarkerReconciler::new(
        MapSettings::default(),
        FacetEvaluator::default(),
        PriceFormatter::default(),
        Ok(surface),
    );
    reconciler.load_aggregates([centro()]);
    reconciler
}

fn loaded() -> MarkerReconciler<HeadlessSurface> {
    reconciler_with(HeadlessSurface::new(start_camera()))
}

fn camera(reconciler: &MarkerReconciler<HeadlessSurface>) -> Camera {
    reconciler.surface().expect("surface").camera()
}

fn id(value: &str) -> CondoId {
    CondoId::new(value)
}

/// Applies `update` to `state` and feeds the change to the reconciler.
fn change(
    reconciler: &mut MarkerReconciler<HeadlessSurface>,
    state: &mut FilterState,
    update: FilterUpdate,
) {
    let fields = state.apply(update);
    reconciler.on_filters_changed(state, &fields);
}

fn visible_ids(reconciler: &MarkerReconciler<HeadlessSurface>) -> Vec<String> {
    reconciler
        .visible_markers()
        .map(|marker| marker.condo_id.to_string())
        .collect()
}

#[test]
fn failed_init_is_terminal_and_reported_once() {
    let mut reconciler = MarkerReconciler::<HeadlessSurface>::new(
        MapSettings::default(),
        FacetEvaluator::default(),
        PriceFormatter::default(),
        Err(MapInitError::MissingAccessToken),
    );
    let now = Instant::now();

    assert_eq!(
        reconciler.tick(now),
        vec![ReconcilerEffect::MapUnavailable(MapInitError::MissingAccessToken)]
    );
    assert!(reconciler.tick(now).is_empty());

    reconciler.load_aggregates([centro()]);
    reconciler.on_marker_click(&id("a"), now);
    reconciler.on_container_resized(now);
    assert_eq!(reconciler.phase(), &ReconcilerPhase::Failed);
    assert_eq!(reconciler.markers().count(), 0);
    assert!(reconciler.tick(now + FLY).is_empty());
}

#[test]
fn connecting_without_a_token_fails() {
    let settings = MapSettings::default();
    let result = connect_surface(&settings, |_| Ok(HeadlessSurface::new(start_camera())));
    assert_eq!(result.err(), Some(MapInitError::MissingAccessToken));

    let settings = MapSettings {
        access_token: Some("pk.test".into()),
        ..MapSettings::default()
    };
    let result = connect_surface(&settings, |token| {
        assert_eq!(token, "pk.test");
        Ok(HeadlessSurface::new(start_camera()))
    });
    assert!(result.is_ok());
}

#[test]
fn markers_wait_for_aggregates() {
    let mut reconciler = MarkerReconciler::new(
        MapSettings::default(),
        FacetEvaluator::default(),
        PriceFormatter::default(),
        Ok(HeadlessSurface::new(start_camera())),
    );
    let mut state = FilterState::default();
    change(&mut reconciler, &mut state, FilterUpdate::Bedrooms(Some(3)));
    assert_eq!(reconciler.phase(), &ReconcilerPhase::Uninitialized);
    assert_eq!(reconciler.markers().count(), 0);

    reconciler.load_aggregates([centro()]);
    assert_eq!(reconciler.phase(), &ReconcilerPhase::Idle);
    assert_eq!(visible_ids(&reconciler), vec!["b"]);
}

#[test]
fn first_load_frames_visible_markers_and_skips_unknown_locations() {
    let reconciler = loaded();

    assert_eq!(visible_ids(&reconciler), vec!["a", "b"]);
    assert!(reconciler.marker(&id("nowhere")).is_none());
    assert_eq!(reconciler.marker(&id("empty")).map(|m| m.matching), Some(0));
    assert_eq!(reconciler.surface().expect("surface").marker_count(), 2);

    let framed = camera(&reconciler);
    assert!(framed.center.approx_eq(&LatLng::new(20.5, -103.5), 1e-9));
    assert_eq!(framed.zoom, 13.0);
}

#[test]
fn dual_listings_are_counted_once() {
    let mut dual = condo("dual", 20.0, -103.0, vec![summary("d1", 15_000, 2)]);
    dual.sales.push(summary("d1", 3_000_000, 2));

    let mut reconciler = MarkerReconciler::new(
        MapSettings::default(),
        FacetEvaluator::default(),
        PriceFormatter::default(),
        Ok(HeadlessSurface::new(start_camera())),
    );
    reconciler.load_aggregates([ZoneAggregate {
        zone_id: ZoneId::new("centro"),
        zone_name: "Centro".into(),
        condos: vec![dual],
    }]);

    let marker = reconciler.marker(&id("dual")).expect("marker");
    assert_eq!(marker.matching, 1);

    let mut state = FilterState::default();
    change(
        &mut reconciler,
        &mut state,
        FilterUpdate::TransactionType(TransactionType::Buy),
    );
    let marker = reconciler.marker(&id("dual")).expect("marker");
    assert_eq!((marker.matching, marker.min_price), (1, Some(3_000_000)));
}

#[test]
fn user_moved_camera_survives_rebuilds() {
    let mut reconciler = loaded();
    reconciler.load_aggregates([centro(), norte()]);
    let panned = Camera::new(LatLng::new(19.0, -100.0), 12.0);
    reconciler.surface_mut().expect("surface").pan_to(panned);
    reconciler.on_user_camera_moved();

    let mut state = FilterState::default();
    change(
        &mut reconciler,
        &mut state,
        FilterUpdate::Zone(Some(ZoneId::new("norte"))),
    );
    change(&mut reconciler, &mut state, FilterUpdate::Bedrooms(Some(2)));

    assert_eq!(visible_ids(&reconciler), vec!["c"]);
    assert_eq!(camera(&reconciler), panned);
    assert_eq!(reconciler.intent(), &CameraIntent::UserMoved);
}

#[test]
fn programmatic_camera_reframes_on_zone_change() {
    let mut reconciler = loaded();
    reconciler.load_aggregates([centro(), norte()]);

    let mut state = FilterState::default();
    change(
        &mut reconciler,
        &mut state,
        FilterUpdate::Zone(Some(ZoneId::new("norte"))),
    );

    assert_eq!(visible_ids(&reconciler), vec!["c"]);
    assert!(camera(&reconciler)
        .center
        .approx_eq(&LatLng::new(25.0, -100.0), 1e-9));
}

#[test]
fn click_flies_then_applies_condo_filter_after_the_duration() {
    let mut reconciler = loaded();
    let t0 = Instant::now();

    reconciler.on_marker_click(&id("a"), t0);
    assert!(matches!(
        reconciler.phase(),
        ReconcilerPhase::AnimatingToMarker { .. }
    ));
    assert_eq!(reconciler.intent(), &CameraIntent::Focused(id("a")));
    assert!(reconciler.tick(t0 + Duration::from_millis(100)).is_empty());

    let effects = reconciler.tick(t0 + FLY);
    assert_eq!(effects, vec![ReconcilerEffect::ApplyCondoFilter(Some(id("a")))]);
    assert_eq!(reconciler.phase(), &ReconcilerPhase::Idle);
    assert_eq!(
        camera(&reconciler),
        Camera::new(LatLng::new(20.0, -103.0), 15.0)
    );
}

#[test]
fn clicks_during_a_flight_are_ignored() {
    let mut reconciler = loaded();
    reconciler.surface_mut().expect("surface").clear_calls();
    let t0 = Instant::now();

    reconciler.on_marker_click(&id("a"), t0);
    reconciler.on_marker_click(&id("a"), t0 + Duration::from_millis(10));
    reconciler.on_marker_click(&id("b"), t0 + Duration::from_millis(20));

    let flights = reconciler
        .surface()
        .expect("surface")
        .calls()
        .iter()
        .filter(|call| matches!(call, SurfaceCall::FlyTo(_)))
        .count();
    assert_eq!(flights, 1);
    assert_eq!(reconciler.selected(), Some(&id("a")));
}

#[test]
fn rebuild_is_deferred_until_the_flight_lands() {
    let mut reconciler = loaded();
    let mut state = FilterState::default();
    let t0 = Instant::now();

    reconciler.on_marker_click(&id("a"), t0);
    change(&mut reconciler, &mut state, FilterUpdate::Bedrooms(Some(3)));
    assert!(reconciler.is_rebuild_pending());
    assert_eq!(reconciler.marker(&id("a")).map(|m| m.matching), Some(1));

    reconciler.tick(t0 + FLY);
    assert!(!reconciler.is_rebuild_pending());
    let a = reconciler.marker(&id("a")).expect("a");
    assert_eq!(a.matching, 0);
    assert!(a.is_visible(), "selected marker stays visible with zero matches");
    assert_eq!(reconciler.marker(&id("b")).map(|m| m.matching), Some(1));
}

#[test]
fn selection_is_exclusive() {
    let mut reconciler = loaded();
    let mut state = FilterState::default();
    let t0 = Instant::now();

    reconciler.on_marker_click(&id("a"), t0);
    for effect in reconciler.tick(t0 + FLY) {
        if let ReconcilerEffect::ApplyCondoFilter(condo_id) = effect {
            change(&mut reconciler, &mut state, FilterUpdate::Condo(condo_id));
        }
    }
    let t1 = t0 + FLY * 2;
    reconciler.on_marker_click(&id("b"), t1);
    reconciler.tick(t1 + FLY);

    let selected: Vec<_> = reconciler
        .markers()
        .filter(|marker| marker.selected)
        .map(|marker| marker.condo_id.to_string())
        .collect();
    assert_eq!(selected, vec!["b"]);
    let drawn_selected = reconciler
        .surface()
        .expect("surface")
        .markers()
        .filter(|(_, spec)| spec.selected)
        .count();
    assert_eq!(drawn_selected, 1);
}

#[test]
fn clicking_the_selected_marker_deselects_it() {
    let mut reconciler = loaded();
    let t0 = Instant::now();
    reconciler.on_marker_click(&id("a"), t0);
    reconciler.tick(t0 + FLY);

    let before = camera(&reconciler);
    reconciler.on_marker_click(&id("a"), t0 + FLY * 2);
    assert_eq!(
        reconciler.tick(t0 + FLY * 2),
        vec![ReconcilerEffect::ApplyCondoFilter(None)]
    );
    assert_eq!(reconciler.selected(), None);
    assert_eq!(reconciler.intent(), &CameraIntent::UserMoved);
    assert_eq!(camera(&reconciler), before);
}

#[test]
fn mobile_click_opens_the_tray_instead_of_filtering() {
    let mut reconciler = loaded();
    reconciler.set_viewport_mode(ViewportMode::Mobile);
    let t0 = Instant::now();

    reconciler.on_marker_click(&id("a"), t0);
    let effects = reconciler.tick(t0 + FLY);

    assert_eq!(
        effects,
        vec![ReconcilerEffect::ShowTray(CondoTrayPayload {
            condo_id: id("a"),
            condo_name: "Condo a".into(),
            properties: vec![summary("a1", 10_000, 2)],
        })]
    );
}

#[test]
fn mobile_click_leaves_no_selection_behind_for_desktop() {
    let mut reconciler = loaded();
    reconciler.set_viewport_mode(ViewportMode::Mobile);
    let t0 = Instant::now();
    reconciler.on_marker_click(&id("a"), t0);
    let effects = reconciler.tick(t0 + FLY);
    assert!(matches!(effects.as_slice(), [ReconcilerEffect::ShowTray(_)]));
    assert_eq!(reconciler.selected(), None);
    assert!(reconciler.markers().all(|marker| !marker.selected));

    reconciler.set_viewport_mode(ViewportMode::Desktop);
    let t1 = t0 + FLY * 2;
    reconciler.on_marker_click(&id("a"), t1);
    assert!(matches!(
        reconciler.phase(),
        ReconcilerPhase::AnimatingToMarker { .. }
    ));
    assert_eq!(
        reconciler.tick(t1 + FLY),
        vec![ReconcilerEffect::ApplyCondoFilter(Some(id("a")))]
    );
    assert_eq!(reconciler.selected(), Some(&id("a")));
}

#[test]
fn entering_mobile_mode_clears_the_selection() {
    let mut reconciler = loaded();
    let mut state = FilterState::default();
    change(&mut reconciler, &mut state, FilterUpdate::Condo(Some(id("a"))));
    assert_eq!(reconciler.selected(), Some(&id("a")));

    reconciler.set_viewport_mode(ViewportMode::Mobile);
    assert_eq!(reconciler.selected(), None);
    assert!(reconciler.markers().all(|marker| !marker.selected));
    assert_eq!(
        reconciler.tick(Instant::now()),
        vec![ReconcilerEffect::ApplyCondoFilter(None)]
    );
}

#[test]
fn resize_restores_a_user_moved_camera_after_settling() {
    let mut reconciler =
        reconciler_with(HeadlessSurface::new(start_camera()).with_resize_drift(LatLng::new(0.5, 0.5)));
    let panned = Camera::new(LatLng::new(19.0, -100.0), 12.0);
    reconciler.surface_mut().expect("surface").pan_to(panned);
    reconciler.on_user_camera_moved();
    let t0 = Instant::now();

    reconciler.on_container_resized(t0);
    assert_ne!(camera(&reconciler), panned);
    reconciler.tick(t0 + Duration::from_millis(100));
    assert!(matches!(reconciler.phase(), ReconcilerPhase::Resizing { .. }));

    reconciler.tick(t0 + SETTLE);
    assert_eq!(reconciler.phase(), &ReconcilerPhase::Idle);
    assert_eq!(camera(&reconciler), panned);
}

#[test]
fn repeated_resizes_restart_the_settle_interval() {
    let mut reconciler =
        reconciler_with(HeadlessSurface::new(start_camera()).with_resize_drift(LatLng::new(0.5, 0.5)));
    let t0 = Instant::now();

    reconciler.on_container_resized(t0);
    reconciler.on_container_resized(t0 + Duration::from_millis(200));
    reconciler.tick(t0 + SETTLE);
    assert!(matches!(reconciler.phase(), ReconcilerPhase::Resizing { .. }));

    reconciler.tick(t0 + Duration::from_millis(200) + SETTLE);
    assert_eq!(reconciler.phase(), &ReconcilerPhase::Idle);
}

#[test]
fn resize_recenters_on_the_focused_marker() {
    let mut reconciler =
        reconciler_with(HeadlessSurface::new(start_camera()).with_resize_drift(LatLng::new(0.5, 0.5)));
    let t0 = Instant::now();
    reconciler.on_marker_click(&id("a"), t0);
    reconciler.tick(t0 + FLY);

    let t1 = t0 + FLY * 2;
    reconciler.on_container_resized(t1);
    reconciler.tick(t1 + SETTLE);
    assert_eq!(
        camera(&reconciler),
        Camera::new(LatLng::new(20.0, -103.0), 15.0)
    );
}

#[test]
fn resize_under_programmatic_intent_returns_to_the_marker_centroid() {
    let mut reconciler =
        reconciler_with(HeadlessSurface::new(start_camera()).with_resize_drift(LatLng::new(0.5, 0.5)));
    let t0 = Instant::now();

    reconciler.on_container_resized(t0);
    reconciler.tick(t0 + SETTLE);
    assert!(camera(&reconciler)
        .center
        .approx_eq(&LatLng::new(20.5, -103.5), 1e-9));
}

#[test]
fn resize_during_a_flight_is_corrected_when_it_lands() {
    let mut reconciler =
        reconciler_with(HeadlessSurface::new(start_camera()).with_resize_drift(LatLng::new(0.5, 0.5)));
    let t0 = Instant::now();
    reconciler.on_marker_click(&id("a"), t0);

    reconciler.on_container_resized(t0 + Duration::from_millis(100));
    assert!(matches!(
        reconciler.phase(),
        ReconcilerPhase::AnimatingToMarker { .. }
    ));

    reconciler.tick(t0 + FLY);
    assert_eq!(reconciler.phase(), &ReconcilerPhase::Idle);
    assert_eq!(
        camera(&reconciler),
        Camera::new(LatLng::new(20.0, -103.0), 15.0)
    );
}

#[test]
fn flights_are_time_boxed() {
    let mut reconciler = loaded();
    let t0 = Instant::now();
    reconciler.on_marker_click(&id("b"), t0);

    reconciler.tick(t0 + FLY - Duration::from_millis(1));
    assert!(reconciler
        .camera_state()
        .expect("camera")
        .transition_in_progress);

    let effects = reconciler.tick(t0 + Duration::from_secs(30));
    assert_eq!(effects, vec![ReconcilerEffect::ApplyCondoFilter(Some(id("b")))]);
    assert!(!reconciler
        .camera_state()
        .expect("camera")
        .transition_in_progress);
}

#[test]
fn currency_change_relabels_without_rebuilding() {
    let mut reconciler = loaded();
    reconciler.surface_mut().expect("surface").clear_calls();
    let mut state = FilterState::default();

    change(
        &mut reconciler,
        &mut state,
        FilterUpdate::Currency(Currency::Foreign),
    );

    let calls = reconciler.surface().expect("surface").calls();
    assert_eq!(calls.len(), 2);
    assert!(calls
        .iter()
        .all(|call| matches!(call, SurfaceCall::Update(_))));
    assert_eq!(
        reconciler.marker(&id("a")).map(|m| m.label.as_str()),
        Some("$550 USD")
    );
}

#[test]
fn vanished_selection_falls_back_to_the_previous_camera() {
    let mut reconciler = loaded();
    let before_click = camera(&reconciler);
    let t0 = Instant::now();
    reconciler.on_marker_click(&id("a"), t0);
    reconciler.tick(t0 + FLY);

    let mut remaining = centro();
    remaining.condos.retain(|condo| condo.condo_id != id("a"));
    reconciler.load_aggregates([remaining]);

    assert_eq!(reconciler.selected(), None);
    assert_eq!(camera(&reconciler), before_click);
    assert_eq!(visible_ids(&reconciler), vec!["b"]);
}

#[test]
fn viewport_mode_follows_the_breakpoint() {
    assert_eq!(ViewportMode::for_width(500, 768), ViewportMode::Mobile);
    assert_eq!(ViewportMode::for_width(768, 768), ViewportMode::Desktop);
}
