use serde::{Deserialize, Serialize};

use crate::config::Corner;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Control {
    Navigation,
    Geolocate,
    Fullscreen,
    Scale,
}

impl Control {
    pub fn as_str(self) -> &'static str {
        match self {
            Control::Navigation => "navigation",
            Control::Geolocate => "geolocate",
            Control::Fullscreen => "fullscreen",
            Control::Scale => "scale",
        }
    }
}

fn yes() -> bool {
    true
}

/// Which built-in controls to show. The scale bar always sits bottom-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsConfig {
    #[serde(default = "yes")]
    pub show_navigation: bool,
    #[serde(default)]
    pub show_geolocate: bool,
    #[serde(default)]
    pub show_fullscreen: bool,
    #[serde(default = "yes")]
    pub show_scale: bool,
    #[serde(default)]
    pub position: Corner,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            show_navigation: true,
            show_geolocate: false,
            show_fullscreen: false,
            show_scale: true,
            position: Corner::TopRight,
        }
    }
}

impl ControlsConfig {
    pub fn placements(&self) -> Vec<(Control, Corner)> {
        let mut out = Vec::new();
        if self.show_navigation {
            out.push((Control::Navigation, self.position));
        }
        if self.show_geolocate {
            out.push((Control::Geolocate, self.position));
        }
        if self.show_fullscreen {
            out.push((Control::Fullscreen, self.position));
        }
        if self.show_scale {
            out.push((Control::Scale, Corner::BottomLeft));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_shows_navigation_and_scale() {
        assert_eq!(
            ControlsConfig::default().placements(),
            vec![
                (Control::Navigation, Corner::TopRight),
                (Control::Scale, Corner::BottomLeft),
            ]
        );
    }

    #[test]
    fn scale_ignores_position() {
        let config: ControlsConfig = serde_json::from_value(serde_json::json!({
            "showGeolocate": true,
            "position": "top-left"
        }))
        .unwrap();
        assert_eq!(
            config.placements(),
            vec![
                (Control::Navigation, Corner::TopLeft),
                (Control::Geolocate, Corner::TopLeft),
                (Control::Scale, Corner::BottomLeft),
            ]
        );
    }
}
