//! Map marker layer: the SDK boundary, marker state and the camera state machine.

pub mod camera;
pub mod markers;
pub mod reconciler;
pub mod surface;

pub use camera::{Camera, CameraIntent, CameraState};
pub use markers::{matching_summaries, MarkerViewState};
pub use reconciler::{
    connect_surface, MarkerReconciler, ReconcilerEffect, ReconcilerPhase, ViewportMode,
};
pub use surface::{HeadlessSurface, MapSurface, MarkerHandle, MarkerSpec, SurfaceCall};
