use foundation::{CameraOptions, LngLatBounds, Viewport, ZoomRange};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

pub const ACCESS_TOKEN_ENV: &str = "MAPBOX_ACCESS_TOKEN";
pub const STYLE_ENV: &str = "MAPBOX_STYLE";

pub const STYLE_URL_PREFIX: &str = "mapbox://";
pub const DEFAULT_STYLE: &str = "mapbox://styles/mapbox/streets-v12";

/// Named style presets and the style URLs they resolve to.
pub const STYLE_PRESETS: [(&str, &str); 8] = [
    ("streets-v12", "mapbox://styles/mapbox/streets-v12"),
    ("outdoors-v12", "mapbox://styles/mapbox/outdoors-v12"),
    ("light-v11", "mapbox://styles/mapbox/light-v11"),
    ("dark-v11", "mapbox://styles/mapbox/dark-v11"),
    ("satellite-v9", "mapbox://styles/mapbox/satellite-v9"),
    ("satellite-streets-v12", "mapbox://styles/mapbox/satellite-streets-v12"),
    ("navigation-day-v1", "mapbox://styles/mapbox/navigation-day-v1"),
    ("navigation-night-v1", "mapbox://styles/mapbox/navigation-night-v1"),
];

/// Full style URLs pass through; preset names are looked up; anything else
/// falls back to the streets style.
pub fn resolve_style(style: &str) -> String {
    if style.starts_with(STYLE_URL_PREFIX) {
        return style.to_string();
    }
    STYLE_PRESETS
        .iter()
        .find(|(name, _)| *name == style)
        .map(|(_, url)| url.to_string())
        .unwrap_or_else(|| DEFAULT_STYLE.to_string())
}

/// Public tokens start with `pk.` and are longer than 20 characters.
pub fn is_plausible_token(token: &str) -> bool {
    token.starts_with("pk.") && token.len() > 20
}

/// Screen corner for the logo and controls.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub fn as_str(self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomLeft => "bottom-left",
            Corner::BottomRight => "bottom-right",
        }
    }
}

fn default_style() -> String {
    DEFAULT_STYLE.to_string()
}

fn default_min_zoom() -> f64 {
    ZoomRange::WORLD.min
}

fn default_max_zoom() -> f64 {
    ZoomRange::WORLD.max
}

fn default_true() -> bool {
    true
}

fn default_logo_position() -> Corner {
    Corner::BottomLeft
}

/// Everything needed to construct an engine instance.
///
/// Two configs that compare equal describe the same engine; the binding
/// rebuilds the engine only when the config changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub access_token: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub initial_viewport: Viewport,
    #[serde(default = "default_min_zoom")]
    pub min_zoom: f64,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bounds: Option<LngLatBounds>,
    #[serde(default = "default_true")]
    pub interactive: bool,
    #[serde(default = "default_true")]
    pub attribution_control: bool,
    #[serde(default = "default_logo_position")]
    pub logo_position: Corner,
}

impl EngineConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            style: default_style(),
            initial_viewport: Viewport::default(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            max_bounds: None,
            interactive: true,
            attribution_control: true,
            logo_position: default_logo_position(),
        }
    }

    /// Reads the credential and style preset from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup(ACCESS_TOKEN_ENV)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingAccessToken)?;
        let mut config = Self::new(token);
        if let Some(style) = lookup(STYLE_ENV).filter(|s| !s.trim().is_empty()) {
            config.style = style.trim().to_string();
        }
        Ok(config)
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.initial_viewport = viewport;
        self
    }

    pub fn with_zoom_range(mut self, min: f64, max: f64) -> Self {
        self.min_zoom = min;
        self.max_zoom = max;
        self
    }

    pub fn zoom_range(&self) -> ZoomRange {
        ZoomRange::new(self.min_zoom, self.max_zoom)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token.trim().is_empty() {
            return Err(ConfigError::MissingAccessToken);
        }
        if !(self.min_zoom.is_finite() && self.max_zoom.is_finite() && self.min_zoom <= self.max_zoom)
        {
            return Err(ConfigError::InvalidZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        self.initial_viewport.validate(self.zoom_range())?;
        if !is_plausible_token(&self.access_token) {
            warn!("access token does not look like a public token");
        }
        Ok(())
    }

    /// Resolved construction parameters handed to the backend.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            access_token: self.access_token.clone(),
            style_url: resolve_style(&self.style),
            camera: self.initial_viewport.to_camera_options(),
            zoom: self.zoom_range(),
            max_bounds: self.max_bounds,
            interactive: self.interactive,
            attribution_control: self.attribution_control,
            logo_position: self.logo_position,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub access_token: String,
    pub style_url: String,
    pub camera: CameraOptions,
    pub zoom: ZoomRange,
    pub max_bounds: Option<LngLatBounds>,
    pub interactive: bool,
    pub attribution_control: bool,
    pub logo_position: Corner,
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::Viewport;
    use pretty_assertions::assert_eq;

    const TOKEN: &str = "pk.eyJ1IjoidGVzdCIsImEiOiJjbGFiYyJ9.abc";

    #[test]
    fn presets_resolve_and_urls_pass_through() {
        assert_eq!(resolve_style("dark-v11"), "mapbox://styles/mapbox/dark-v11");
        assert_eq!(
            resolve_style("mapbox://styles/acme/custom"),
            "mapbox://styles/acme/custom"
        );
        assert_eq!(resolve_style("no-such-style"), DEFAULT_STYLE);
    }

    #[test]
    fn token_plausibility() {
        assert!(is_plausible_token(TOKEN));
        assert!(!is_plausible_token("pk.short"));
        assert!(!is_plausible_token("sk.eyJ1IjoidGVzdCIsImEiOiJjbGFiYyJ9"));
    }

    #[test]
    fn from_lookup_requires_token() {
        let err = EngineConfig::from_lookup(|_| None).unwrap_err();
        assert_eq!(err, ConfigError::MissingAccessToken);

        let config = EngineConfig::from_lookup(|key| match key {
            ACCESS_TOKEN_ENV => Some(format!(" {TOKEN} ")),
            STYLE_ENV => Some("light-v11".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.access_token, TOKEN);
        assert_eq!(config.style, "light-v11");
        assert_eq!(config.logo_position, Corner::BottomLeft);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_value(serde_json::json!({
            "accessToken": TOKEN,
            "initialViewport": { "longitude": 2.35, "latitude": 48.85, "zoom": 5.0 },
            "logoPosition": "top-left"
        }))
        .unwrap();
        assert_eq!(config.style, DEFAULT_STYLE);
        assert_eq!(config.zoom_range(), ZoomRange::WORLD);
        assert!(config.interactive);
        assert_eq!(config.logo_position, Corner::TopLeft);
        assert_eq!(config.initial_viewport, Viewport::new(2.35, 48.85, 5.0));
    }

    #[test]
    fn validation_uses_configured_zoom_bounds() {
        let config = EngineConfig::new(TOKEN)
            .with_zoom_range(2.0, 10.0)
            .with_viewport(Viewport::new(0.0, 0.0, 1.0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidViewport(_))
        ));

        let inverted = EngineConfig::new(TOKEN).with_zoom_range(10.0, 2.0);
        assert_eq!(
            inverted.validate(),
            Err(ConfigError::InvalidZoomRange { min: 10.0, max: 2.0 })
        );

        assert_eq!(EngineConfig::new("   ").validate(), Err(ConfigError::MissingAccessToken));
        assert_eq!(EngineConfig::new(TOKEN).validate(), Ok(()));
    }

    #[test]
    fn engine_options_resolve_style() {
        let options = EngineConfig::new(TOKEN).with_style("satellite-v9").engine_options();
        assert_eq!(options.style_url, "mapbox://styles/mapbox/satellite-v9");
        assert_eq!(options.camera.zoom, Some(1.5));
    }
}
