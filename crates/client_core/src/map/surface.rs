//! The imperative map SDK boundary and a headless implementation of it.

use std::{collections::BTreeMap, time::Duration};

use serde::Serialize;
use shared::domain::{CondoId, LatLng};

use super::camera::Camera;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerHandle(pub u64);

/// Everything the SDK needs to draw one condo marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSpec {
    pub condo_id: CondoId,
    pub position: LatLng,
    pub label: String,
    pub count: usize,
    pub selected: bool,
}

pub trait MapSurface: Send {
    fn add_marker(&mut self, spec: &MarkerSpec) -> MarkerHandle;
    fn update_marker(&mut self, handle: MarkerHandle, spec: &MarkerSpec);
    fn remove_marker(&mut self, handle: MarkerHandle);
    /// Starts an animated flight. The SDK may still be moving when this returns.
    fn fly_to(&mut self, camera: Camera, duration: Duration);
    fn jump_to(&mut self, camera: Camera);
    /// Re-measures the container after a layout change.
    fn resize(&mut self);
    fn camera(&self) -> Camera;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SurfaceCall {
    Add(MarkerHandle),
    Update(MarkerHandle),
    Remove(MarkerHandle),
    FlyTo(Camera),
    JumpTo(Camera),
    Resize,
}

/// In-process surface used by the CLI and tests. Flights land immediately.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    camera: Camera,
    markers: BTreeMap<MarkerHandle, MarkerSpec>,
    next_handle: u64,
    resize_drift: Option<LatLng>,
    calls: Vec<SurfaceCall>,
}

impl HeadlessSurface {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            markers: BTreeMap::new(),
            next_handle: 1,
            resize_drift: None,
            calls: Vec::new(),
        }
    }

    /// Every later `resize` shifts the center by `offset`, the way a real SDK re-anchors the
    /// viewport when its container changes size.
    pub fn with_resize_drift(mut self, offset: LatLng) -> Self {
        self.resize_drift = Some(offset);
        self
    }

    /// Moves the camera as a user drag would, without going through the engine.
    pub fn pan_to(&mut self, camera: Camera) {
        self.camera = camera;
    }

    pub fn markers(&self) -> impl Iterator<Item = (&MarkerHandle, &MarkerSpec)> {
        self.markers.iter()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker_for(&self, condo_id: &CondoId) -> Option<&MarkerSpec> {
        self.markers.values().find(|spec| &spec.condo_id == condo_id)
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl MapSurface for HeadlessSurface {
    fn add_marker(&mut self, spec: &MarkerSpec) -> MarkerHandle {
        let handle = MarkerHandle(self.next_handle);
        self.next_handle += 1;
        self.markers.insert(handle, spec.clone());
        self.calls.push(SurfaceCall::Add(handle));
        handle
    }

    fn update_marker(&mut self, handle: MarkerHandle, spec: &MarkerSpec) {
        if let Some(existing) = self.markers.get_mut(&handle) {
            *existing = spec.clone();
        }
        self.calls.push(SurfaceCall::Update(handle));
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        self.markers.remove(&handle);
        self.calls.push(SurfaceCall::Remove(handle));
    }

    fn fly_to(&mut self, camera: Camera, _duration: Duration) {
        self.camera = camera;
        self.calls.push(SurfaceCall::FlyTo(camera));
    }

    fn jump_to(&mut self, camera: Camera) {
        self.camera = camera;
        self.calls.push(SurfaceCall::JumpTo(camera));
    }

    fn resize(&mut self) {
        if let Some(offset) = self.resize_drift {
            self.camera.center = LatLng::new(
                self.camera.center.lat + offset.lat,
                self.camera.center.lng + offset.lng,
            );
        }
        self.calls.push(SurfaceCall::Resize);
    }

    fn camera(&self) -> Camera {
        self.camera
    }
}
