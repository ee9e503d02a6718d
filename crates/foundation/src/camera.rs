use serde::{Deserialize, Serialize};

use crate::bounds::LngLat;

/// Animation durations (milliseconds).
pub mod duration {
    pub const FAST: u32 = 300;
    pub const NORMAL: u32 = 600;
    pub const SLOW: u32 = 1000;
    pub const FLY: u32 = 2000;
}

/// Default padding around fitted bounds (pixels).
pub const DEFAULT_FIT_PADDING_PX: f64 = 50.0;

/// Camera parameters as the engine consumes them. Absent fields keep the
/// engine's current value.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<LngLat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
}

/// A partial viewport used as a camera move target.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraTarget {
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub zoom: Option<f64>,
    #[serde(default)]
    pub pitch: Option<f64>,
    #[serde(default)]
    pub bearing: Option<f64>,
}

impl CameraTarget {
    pub fn center(lng: f64, lat: f64) -> Self {
        Self {
            longitude: Some(lng),
            latitude: Some(lat),
            ..Self::default()
        }
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    /// The center is only moved when both longitude and latitude are given.
    pub fn to_camera_options(&self) -> CameraOptions {
        let center = match (self.longitude, self.latitude) {
            (Some(lng), Some(lat)) => Some(LngLat::new(lng, lat)),
            _ => None,
        };
        CameraOptions {
            center,
            zoom: self.zoom,
            pitch: self.pitch,
            bearing: self.bearing,
        }
    }
}

/// How the camera reaches its target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Instantaneous.
    Jump,
    Ease { duration_ms: u32 },
    /// Zoom-out/zoom-in "flight" path.
    Fly { duration_ms: u32 },
}

impl Transition {
    pub fn ease() -> Self {
        Transition::Ease {
            duration_ms: duration::NORMAL,
        }
    }

    pub fn fly() -> Self {
        Transition::Fly {
            duration_ms: duration::FLY,
        }
    }

    pub fn duration_ms(&self) -> u32 {
        match self {
            Transition::Jump => 0,
            Transition::Ease { duration_ms } | Transition::Fly { duration_ms } => *duration_ms,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FitBoundsOptions {
    pub padding_px: f64,
    pub duration_ms: u32,
}

impl Default for FitBoundsOptions {
    fn default() -> Self {
        Self {
            padding_px: DEFAULT_FIT_PADDING_PX,
            duration_ms: duration::NORMAL,
        }
    }
}
