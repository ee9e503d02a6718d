use serde::{Deserialize, Serialize};

/// Layout property controlling whether a layer is drawn.
pub const VISIBILITY: &str = "visibility";

pub const FILL_COLOR: &str = "fill-color";
pub const FILL_OPACITY: &str = "fill-opacity";

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    None,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Visible => "visible",
            Visibility::None => "none",
        }
    }

    /// Reads a layout value; anything other than `"none"` counts as visible,
    /// which is how the engine treats an unset property.
    pub fn from_layout_value(v: Option<&serde_json::Value>) -> Self {
        match v.and_then(|v| v.as_str()) {
            Some("none") => Visibility::None,
            _ => Visibility::Visible,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Visibility::Visible => Visibility::None,
            Visibility::None => Visibility::Visible,
        }
    }

    pub fn to_value(self) -> serde_json::Value {
        serde_json::Value::String(self.as_str().to_string())
    }
}

impl From<bool> for Visibility {
    fn from(visible: bool) -> Self {
        if visible {
            Visibility::Visible
        } else {
            Visibility::None
        }
    }
}
