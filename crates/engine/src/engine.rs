use foundation::{CameraOptions, FitBoundsOptions, LngLatBounds, Transition, Viewport};
use layers::{Expression, LayerSpec, SourceSpec};
use runtime::SignalSender;
use serde_json::Value;

use crate::config::{Corner, EngineOptions};
use crate::controls::Control;
use crate::error::EngineError;
use crate::interaction::{InteractionHandler, InteractionKind};

/// Lifecycle notifications an engine instance pushes to its binding.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    /// The style finished its first load; the instance is usable.
    Ready,
    /// Style data changed (initial load or a later style edit).
    StyleData,
    Error {
        message: Option<String>,
        code: Option<String>,
    },
}

/// Capabilities every rendering engine offers.
///
/// Source and layer ids share one namespace per engine. Layers draw in
/// insertion order unless placed before an existing layer.
pub trait MapEngine {
    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, source: &SourceSpec) -> Result<(), EngineError>;
    /// Fails while any layer still references the source.
    fn remove_source(&mut self, id: &str) -> Result<(), EngineError>;

    fn has_layer(&self, id: &str) -> bool;
    fn add_layer(&mut self, layer: &LayerSpec, before: Option<&str>) -> Result<(), EngineError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError>;
    /// Current style layers, bottom to top.
    fn style_layer_ids(&self) -> Vec<String>;
    fn is_style_loaded(&self) -> bool;

    fn set_filter(&mut self, layer_id: &str, filter: Option<&Expression>)
    -> Result<(), EngineError>;
    fn set_paint_property(
        &mut self,
        layer_id: &str,
        name: &str,
        value: &Value,
    ) -> Result<(), EngineError>;
    fn set_layout_property(
        &mut self,
        layer_id: &str,
        name: &str,
        value: &Value,
    ) -> Result<(), EngineError>;
    fn layout_property(&self, layer_id: &str, name: &str) -> Option<Value>;

    fn camera(&self) -> Viewport;
    fn move_camera(&mut self, target: &CameraOptions, transition: Transition);
    fn fit_bounds(&mut self, bounds: &LngLatBounds, options: &FitBoundsOptions);

    fn on(&mut self, kind: InteractionKind, handler: &InteractionHandler);
    /// Unregisters the handler registered with the same `Rc`.
    fn off(&mut self, kind: InteractionKind, handler: &InteractionHandler);

    fn add_control(&mut self, control: Control, position: Corner);
    fn remove_control(&mut self, control: Control);

    /// Releases every engine resource. Called exactly once per instance.
    fn destroy(&mut self);
}

/// Constructs engine instances bound to a display surface.
pub trait EngineBackend {
    type Container: Clone + PartialEq + std::fmt::Debug;
    type Engine: MapEngine;

    fn create(
        &mut self,
        container: &Self::Container,
        options: &EngineOptions,
        signals: SignalSender<EngineSignal>,
    ) -> Result<Self::Engine, String>;
}
