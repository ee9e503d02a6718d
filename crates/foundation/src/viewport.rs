use serde::{Deserialize, Serialize};

use crate::bounds::LngLat;
use crate::camera::CameraOptions;

/// Upper bound of camera tilt (degrees).
pub const MAX_PITCH_DEG: f64 = 60.0;
/// Upper bound of camera rotation (degrees).
pub const MAX_BEARING_DEG: f64 = 360.0;

/// Camera state the engine shows: center, zoom, tilt and rotation.
///
/// Immutable value; a new viewport replaces the old one.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
}

/// World view used when no viewport is configured.
pub const DEFAULT_VIEWPORT: Viewport = Viewport {
    longitude: 0.0,
    latitude: 20.0,
    zoom: 1.5,
    pitch: Some(0.0),
    bearing: Some(0.0),
};

impl Viewport {
    pub const fn new(longitude: f64, latitude: f64, zoom: f64) -> Self {
        Self {
            longitude,
            latitude,
            zoom,
            pitch: None,
            bearing: None,
        }
    }

    pub const fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub const fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn center(&self) -> LngLat {
        LngLat::new(self.longitude, self.latitude)
    }

    /// Camera parameters for constructing or moving the engine.
    pub fn to_camera_options(&self) -> CameraOptions {
        CameraOptions {
            center: Some(self.center()),
            zoom: Some(self.zoom),
            pitch: self.pitch,
            bearing: self.bearing,
        }
    }

    /// Rebuilds a viewport from the values an engine reports for its camera.
    pub fn from_engine_state(center: LngLat, zoom: f64, pitch: f64, bearing: f64) -> Self {
        Self {
            longitude: center.lng,
            latitude: center.lat,
            zoom,
            pitch: Some(pitch),
            bearing: Some(bearing),
        }
    }

    pub fn validate(&self, zoom: ZoomRange) -> Result<(), ViewportError> {
        validate_viewport(self, zoom)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        DEFAULT_VIEWPORT
    }
}

/// Inclusive zoom bounds.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub const WORLD: ZoomRange = ZoomRange {
        min: 0.0,
        max: 22.0,
    };

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, zoom: f64) -> bool {
        (self.min..=self.max).contains(&zoom)
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self::WORLD
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewportError {
    Longitude(f64),
    Latitude(f64),
    Zoom { value: f64, min: f64, max: f64 },
    Pitch(f64),
    Bearing(f64),
}

impl std::fmt::Display for ViewportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewportError::Longitude(v) => {
                write!(f, "invalid longitude: {v}. must be between -180 and 180")
            }
            ViewportError::Latitude(v) => {
                write!(f, "invalid latitude: {v}. must be between -90 and 90")
            }
            ViewportError::Zoom { value, min, max } => {
                write!(f, "invalid zoom: {value}. must be between {min} and {max}")
            }
            ViewportError::Pitch(v) => {
                write!(f, "invalid pitch: {v}. must be between 0 and {MAX_PITCH_DEG}")
            }
            ViewportError::Bearing(v) => {
                write!(f, "invalid bearing: {v}. must be between 0 and {MAX_BEARING_DEG}")
            }
        }
    }
}

impl std::error::Error for ViewportError {}

/// Checks every viewport field against its allowed range.
///
/// Non-finite values are always rejected: the range checks are written so that
/// a NaN never compares as "inside".
pub fn validate_viewport(viewport: &Viewport, zoom: ZoomRange) -> Result<(), ViewportError> {
    if !(-180.0..=180.0).contains(&viewport.longitude) {
        return Err(ViewportError::Longitude(viewport.longitude));
    }
    if !(-90.0..=90.0).contains(&viewport.latitude) {
        return Err(ViewportError::Latitude(viewport.latitude));
    }
    if !zoom.contains(viewport.zoom) {
        return Err(ViewportError::Zoom {
            value: viewport.zoom,
            min: zoom.min,
            max: zoom.max,
        });
    }
    if let Some(pitch) = viewport.pitch {
        if !(0.0..=MAX_PITCH_DEG).contains(&pitch) {
            return Err(ViewportError::Pitch(pitch));
        }
    }
    if let Some(bearing) = viewport.bearing {
        if !(0.0..=MAX_BEARING_DEG).contains(&bearing) {
            return Err(ViewportError::Bearing(bearing));
        }
    }
    Ok(())
}
