use serde::{Deserialize, Serialize};
use shared::domain::{CondoId, LatLng};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub center: LatLng,
    pub zoom: f64,
}

impl Camera {
    pub const fn new(center: LatLng, zoom: f64) -> Self {
        Self { center, zoom }
    }

    pub fn approx_eq(&self, other: &Camera, epsilon: f64) -> bool {
        self.center.approx_eq(&other.center, epsilon) && (self.zoom - other.zoom).abs() <= epsilon
    }
}

/// Who last decided where the camera points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraIntent {
    /// The engine frames results; zone changes re-center on the visible markers.
    Programmatic,
    /// The user panned or zoomed; the camera is left exactly where it is.
    UserMoved,
    /// A marker is focused; the camera follows it across rebuilds and resizes.
    Focused(CondoId),
}

/// Read-only view of the camera and the guards around it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraState {
    pub camera: Camera,
    pub intent: CameraIntent,
    pub user_interacted: bool,
    pub focused: Option<CondoId>,
    pub transition_in_progress: bool,
}
