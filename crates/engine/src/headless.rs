//! In-memory engine with no rendering.
//!
//! Enforces the same source/layer rules a real engine does and records every
//! call in a journal. The backend handle stays shared with each instance it
//! creates so callers can drive lifecycle signals and pointer events.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use foundation::{CameraOptions, FitBoundsOptions, LngLatBounds, Transition, Viewport};
use layers::{Expression, LayerSpec, LayerType, SourceSpec};
use runtime::SignalSender;
use serde_json::Value;
use tracing::debug;

use crate::config::{Corner, EngineOptions};
use crate::controls::Control;
use crate::engine::{EngineBackend, EngineSignal, MapEngine};
use crate::error::EngineError;
use crate::interaction::{InteractionEvent, InteractionHandler, InteractionKind};

pub const BASE_SOURCE_ID: &str = "composite";

#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    Construct { instance: u32, style_url: String },
    AddSource(String),
    RemoveSource(String),
    AddLayer { id: String, before: Option<String> },
    RemoveLayer(String),
    SetFilter(String),
    SetPaint { layer: String, name: String },
    SetLayout { layer: String, name: String },
    On(InteractionKind),
    Off(InteractionKind),
    AddControl(Control, Corner),
    RemoveControl(Control),
    MoveCamera(Transition),
    FitBounds(LngLatBounds),
    Destroy { instance: u32 },
}

#[derive(Default)]
struct HeadlessState {
    journal: Vec<EngineOp>,
    constructed: u32,
    destroyed: u32,
    live: u32,
    sources: BTreeMap<String, SourceSpec>,
    layers: Vec<LayerSpec>,
    style_loaded: bool,
    handlers: Vec<(InteractionKind, InteractionHandler)>,
    controls: Vec<(Control, Corner)>,
    camera: Viewport,
    signals: Option<SignalSender<EngineSignal>>,
    fail_next_construction: Option<String>,
    last_options: Option<EngineOptions>,
}

impl HeadlessState {
    fn reset_style(&mut self) {
        self.sources.clear();
        self.sources.insert(
            BASE_SOURCE_ID.to_string(),
            SourceSpec::vector(BASE_SOURCE_ID, "mapbox://mapbox.mapbox-streets-v8"),
        );
        self.layers = base_layers();
        self.style_loaded = false;
        self.handlers.clear();
        self.controls.clear();
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut LayerSpec, EngineError> {
        self.layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))
    }
}

/// Layers of the stand-in base style, bottom to top.
fn base_layers() -> Vec<LayerSpec> {
    vec![
        LayerSpec::new("background", LayerType::Background, ""),
        LayerSpec::new("land", LayerType::Fill, BASE_SOURCE_ID).with_source_layer("landuse"),
        LayerSpec::new("water", LayerType::Fill, BASE_SOURCE_ID).with_source_layer("water"),
        LayerSpec::new("road-primary", LayerType::Line, BASE_SOURCE_ID).with_source_layer("road"),
        LayerSpec::new("admin-0-boundary", LayerType::Line, BASE_SOURCE_ID)
            .with_source_layer("admin"),
        LayerSpec::new("settlement-major-label", LayerType::Symbol, BASE_SOURCE_ID)
            .with_source_layer("place_label"),
        LayerSpec::new("country-label", LayerType::Symbol, BASE_SOURCE_ID)
            .with_source_layer("place_label"),
    ]
}

fn apply_camera(viewport: &mut Viewport, options: &CameraOptions) {
    if let Some(center) = options.center {
        viewport.longitude = center.lng;
        viewport.latitude = center.lat;
    }
    if let Some(zoom) = options.zoom {
        viewport.zoom = zoom;
    }
    if options.pitch.is_some() {
        viewport.pitch = options.pitch;
    }
    if options.bearing.is_some() {
        viewport.bearing = options.bearing;
    }
}

#[derive(Clone, Default)]
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, signal: EngineSignal) -> bool {
        let sender = self.state.borrow().signals.clone();
        sender.is_some_and(|s| s.emit(signal))
    }

    /// Marks the style loaded and reports the instance ready.
    pub fn emit_ready(&self) -> bool {
        self.state.borrow_mut().style_loaded = true;
        self.emit(EngineSignal::Ready)
    }

    pub fn emit_style_data(&self) -> bool {
        self.state.borrow_mut().style_loaded = true;
        self.emit(EngineSignal::StyleData)
    }

    pub fn emit_error(&self, message: Option<&str>, code: Option<&str>) -> bool {
        self.emit(EngineSignal::Error {
            message: message.map(str::to_string),
            code: code.map(str::to_string),
        })
    }

    pub fn set_style_loaded(&self, loaded: bool) {
        self.state.borrow_mut().style_loaded = loaded;
    }

    pub fn fail_next_construction(&self, message: impl Into<String>) {
        self.state.borrow_mut().fail_next_construction = Some(message.into());
    }

    /// Delivers an event to every handler registered for its kind. Returns
    /// how many handlers ran.
    pub fn dispatch(&self, event: &InteractionEvent) -> usize {
        let handlers: Vec<InteractionHandler> = self
            .state
            .borrow()
            .handlers
            .iter()
            .filter(|(k, _)| *k == event.kind)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn journal(&self) -> Vec<EngineOp> {
        self.state.borrow().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.borrow_mut().journal.clear();
    }

    pub fn constructed(&self) -> u32 {
        self.state.borrow().constructed
    }

    pub fn destroyed(&self) -> u32 {
        self.state.borrow().destroyed
    }

    pub fn live_instances(&self) -> u32 {
        self.state.borrow().live
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.state.borrow().sources.keys().cloned().collect()
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.state.borrow().layers.iter().map(|l| l.id.clone()).collect()
    }

    pub fn layer(&self, id: &str) -> Option<LayerSpec> {
        self.state.borrow().layers.iter().find(|l| l.id == id).cloned()
    }

    pub fn handler_count(&self, kind: InteractionKind) -> usize {
        self.state
            .borrow()
            .handlers
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn controls(&self) -> Vec<(Control, Corner)> {
        self.state.borrow().controls.clone()
    }

    pub fn camera(&self) -> Viewport {
        self.state.borrow().camera
    }

    pub fn last_options(&self) -> Option<EngineOptions> {
        self.state.borrow().last_options.clone()
    }
}

impl EngineBackend for HeadlessBackend {
    type Container = String;
    type Engine = HeadlessEngine;

    fn create(
        &mut self,
        container: &String,
        options: &EngineOptions,
        signals: SignalSender<EngineSignal>,
    ) -> Result<HeadlessEngine, String> {
        let mut s = self.state.borrow_mut();
        if let Some(message) = s.fail_next_construction.take() {
            return Err(message);
        }
        s.reset_style();
        s.constructed += 1;
        s.live += 1;
        let instance = s.constructed;
        s.camera = Viewport::default();
        apply_camera(&mut s.camera, &options.camera);
        s.signals = Some(signals);
        s.last_options = Some(options.clone());
        s.journal.push(EngineOp::Construct {
            instance,
            style_url: options.style_url.clone(),
        });
        debug!(instance, container = %container, "headless engine constructed");
        Ok(HeadlessEngine {
            state: self.state.clone(),
            instance,
            destroyed: false,
        })
    }
}

pub struct HeadlessEngine {
    state: Rc<RefCell<HeadlessState>>,
    instance: u32,
    destroyed: bool,
}

impl HeadlessEngine {
    pub fn instance(&self) -> u32 {
        self.instance
    }

    fn live(&self) -> Result<std::cell::RefMut<'_, HeadlessState>, EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        Ok(self.state.borrow_mut())
    }
}

impl std::fmt::Debug for HeadlessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessEngine")
            .field("instance", &self.instance)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl MapEngine for HeadlessEngine {
    fn has_source(&self, id: &str) -> bool {
        !self.destroyed && self.state.borrow().sources.contains_key(id)
    }

    fn add_source(&mut self, source: &SourceSpec) -> Result<(), EngineError> {
        let mut s = self.live()?;
        if s.sources.contains_key(&source.id) {
            return Err(EngineError::DuplicateSource(source.id.clone()));
        }
        s.sources.insert(source.id.clone(), source.clone());
        s.journal.push(EngineOp::AddSource(source.id.clone()));
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineError> {
        let mut s = self.live()?;
        if !s.sources.contains_key(id) {
            return Err(EngineError::UnknownSource(id.to_string()));
        }
        let users: Vec<String> = s
            .layers
            .iter()
            .filter(|l| l.source == id)
            .map(|l| l.id.clone())
            .collect();
        if !users.is_empty() {
            return Err(EngineError::SourceInUse {
                source: id.to_string(),
                layers: users,
            });
        }
        s.sources.remove(id);
        s.journal.push(EngineOp::RemoveSource(id.to_string()));
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        !self.destroyed && self.state.borrow().layers.iter().any(|l| l.id == id)
    }

    fn add_layer(&mut self, layer: &LayerSpec, before: Option<&str>) -> Result<(), EngineError> {
        let mut s = self.live()?;
        if s.layers.iter().any(|l| l.id == layer.id) {
            return Err(EngineError::DuplicateLayer(layer.id.clone()));
        }
        if layer.layer_type != LayerType::Background && !s.sources.contains_key(&layer.source) {
            return Err(EngineError::UnknownSource(layer.source.clone()));
        }
        if let Some(filter) = &layer.filter {
            filter
                .validate_known()
                .map_err(|e| EngineError::InvalidExpression {
                    layer: layer.id.clone(),
                    message: e.to_string(),
                })?;
        }
        let index = match before {
            Some(anchor) => s
                .layers
                .iter()
                .position(|l| l.id == anchor)
                .ok_or_else(|| EngineError::UnknownLayer(anchor.to_string()))?,
            None => s.layers.len(),
        };
        s.layers.insert(index, layer.clone());
        s.journal.push(EngineOp::AddLayer {
            id: layer.id.clone(),
            before: before.map(str::to_string),
        });
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError> {
        let mut s = self.live()?;
        let index = s
            .layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))?;
        s.layers.remove(index);
        s.journal.push(EngineOp::RemoveLayer(id.to_string()));
        Ok(())
    }

    fn style_layer_ids(&self) -> Vec<String> {
        if self.destroyed {
            return Vec::new();
        }
        self.state.borrow().layers.iter().map(|l| l.id.clone()).collect()
    }

    fn is_style_loaded(&self) -> bool {
        !self.destroyed && self.state.borrow().style_loaded
    }

    fn set_filter(
        &mut self,
        layer_id: &str,
        filter: Option<&Expression>,
    ) -> Result<(), EngineError> {
        let mut s = self.live()?;
        if let Some(filter) = filter {
            filter
                .validate_known()
                .map_err(|e| EngineError::InvalidExpression {
                    layer: layer_id.to_string(),
                    message: e.to_string(),
                })?;
        }
        s.layer_mut(layer_id)?.filter = filter.cloned();
        s.journal.push(EngineOp::SetFilter(layer_id.to_string()));
        Ok(())
    }

    fn set_paint_property(
        &mut self,
        layer_id: &str,
        name: &str,
        value: &Value,
    ) -> Result<(), EngineError> {
        let mut s = self.live()?;
        s.layer_mut(layer_id)?
            .paint
            .get_or_insert_with(Default::default)
            .insert(name.to_string(), value.clone());
        s.journal.push(EngineOp::SetPaint {
            layer: layer_id.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    fn set_layout_property(
        &mut self,
        layer_id: &str,
        name: &str,
        value: &Value,
    ) -> Result<(), EngineError> {
        let mut s = self.live()?;
        s.layer_mut(layer_id)?
            .layout
            .get_or_insert_with(Default::default)
            .insert(name.to_string(), value.clone());
        s.journal.push(EngineOp::SetLayout {
            layer: layer_id.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    fn layout_property(&self, layer_id: &str, name: &str) -> Option<Value> {
        if self.destroyed {
            return None;
        }
        let s = self.state.borrow();
        let layer = s.layers.iter().find(|l| l.id == layer_id)?;
        layer.layout.as_ref()?.get(name).cloned()
    }

    fn camera(&self) -> Viewport {
        self.state.borrow().camera
    }

    fn move_camera(&mut self, target: &CameraOptions, transition: Transition) {
        let Ok(mut s) = self.live() else { return };
        apply_camera(&mut s.camera, target);
        s.journal.push(EngineOp::MoveCamera(transition));
    }

    fn fit_bounds(&mut self, bounds: &LngLatBounds, _options: &FitBoundsOptions) {
        let Ok(mut s) = self.live() else { return };
        let center = bounds.center();
        s.camera.longitude = center.lng;
        s.camera.latitude = center.lat;
        s.journal.push(EngineOp::FitBounds(*bounds));
    }

    fn on(&mut self, kind: InteractionKind, handler: &InteractionHandler) {
        let Ok(mut s) = self.live() else { return };
        s.handlers.push((kind, handler.clone()));
        s.journal.push(EngineOp::On(kind));
    }

    fn off(&mut self, kind: InteractionKind, handler: &InteractionHandler) {
        let Ok(mut s) = self.live() else { return };
        s.handlers.retain(|(k, h)| {
            !(*k == kind && std::ptr::addr_eq(Rc::as_ptr(h), Rc::as_ptr(handler)))
        });
        s.journal.push(EngineOp::Off(kind));
    }

    fn add_control(&mut self, control: Control, position: Corner) {
        let Ok(mut s) = self.live() else { return };
        if s.controls.iter().any(|(c, _)| *c == control) {
            return;
        }
        s.controls.push((control, position));
        s.journal.push(EngineOp::AddControl(control, position));
    }

    fn remove_control(&mut self, control: Control) {
        let Ok(mut s) = self.live() else { return };
        s.controls.retain(|(c, _)| *c != control);
        s.journal.push(EngineOp::RemoveControl(control));
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let mut s = self.state.borrow_mut();
        s.destroyed += 1;
        s.live = s.live.saturating_sub(1);
        if s.constructed == self.instance {
            s.reset_style();
            s.signals = None;
        }
        s.journal.push(EngineOp::Destroy {
            instance: self.instance,
        });
        debug!(instance = self.instance, "headless engine destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layers::GeoJsonData;
    use pretty_assertions::assert_eq;
    use runtime::SignalBus;
    use serde_json::json;

    fn engine() -> (HeadlessBackend, HeadlessEngine, SignalBus<EngineSignal>) {
        let mut backend = HeadlessBackend::new();
        let bus = SignalBus::new();
        let options = crate::EngineConfig::new("pk.test").engine_options();
        let engine = backend
            .create(&"map".to_string(), &options, bus.sender())
            .unwrap();
        (backend, engine, bus)
    }

    fn points() -> SourceSpec {
        SourceSpec::geojson("points", GeoJsonData::Url("/data/points.geojson".into()))
    }

    #[test]
    fn rejects_duplicates_and_dangling_references() {
        let (_backend, mut engine, _bus) = engine();
        engine.add_source(&points()).unwrap();
        assert_eq!(
            engine.add_source(&points()),
            Err(EngineError::DuplicateSource("points".into()))
        );

        let orphan = LayerSpec::new("orphan", LayerType::Circle, "missing");
        assert_eq!(
            engine.add_layer(&orphan, None),
            Err(EngineError::UnknownSource("missing".into()))
        );

        let circles = LayerSpec::new("circles", LayerType::Circle, "points");
        assert_eq!(
            engine.add_layer(&circles, Some("nope")),
            Err(EngineError::UnknownLayer("nope".into()))
        );
        engine.add_layer(&circles, None).unwrap();
        assert_eq!(
            engine.add_layer(&circles, None),
            Err(EngineError::DuplicateLayer("circles".into()))
        );
    }

    #[test]
    fn source_in_use_cannot_be_removed() {
        let (_backend, mut engine, _bus) = engine();
        engine.add_source(&points()).unwrap();
        engine
            .add_layer(&LayerSpec::new("circles", LayerType::Circle, "points"), None)
            .unwrap();
        assert_eq!(
            engine.remove_source("points"),
            Err(EngineError::SourceInUse {
                source: "points".into(),
                layers: vec!["circles".into()],
            })
        );
        engine.remove_layer("circles").unwrap();
        engine.remove_source("points").unwrap();
        assert!(!engine.has_source("points"));
    }

    #[test]
    fn before_inserts_below_anchor() {
        let (backend, mut engine, _bus) = engine();
        engine.add_source(&points()).unwrap();
        engine
            .add_layer(
                &LayerSpec::new("circles", LayerType::Circle, "points"),
                Some("settlement-major-label"),
            )
            .unwrap();
        let ids = backend.layer_ids();
        let at = |id: &str| ids.iter().position(|l| l == id).unwrap();
        assert_eq!(at("circles") + 1, at("settlement-major-label"));
    }

    #[test]
    fn malformed_filter_is_rejected() {
        let (_backend, mut engine, _bus) = engine();
        engine.add_source(&points()).unwrap();
        let layer = LayerSpec::new("bad", LayerType::Circle, "points")
            .with_filter(Expression::new(json!(["all", ["==", ["get", "kind"]]])));
        assert!(matches!(
            engine.add_layer(&layer, None),
            Err(EngineError::InvalidExpression { .. })
        ));
        assert!(!engine.has_layer("bad"));
    }

    #[test]
    fn filters_outside_the_evaluated_subset_are_accepted() {
        let (_backend, mut engine, _bus) = engine();
        engine.add_source(&points()).unwrap();
        let layer = LayerSpec::new("dots", LayerType::Circle, "points")
            .with_filter(Expression::new(json!(["==", ["geometry-type"], "Point"])));
        assert_eq!(engine.add_layer(&layer, None), Ok(()));
        let legacy = Expression::new(json!(["in", "class", "park", "cemetery"]));
        assert_eq!(engine.set_filter("dots", Some(&legacy)), Ok(()));
    }

    #[test]
    fn signals_reach_the_bus_until_destroyed() {
        let (backend, mut engine, bus) = engine();
        assert!(!engine.is_style_loaded());
        assert!(backend.emit_ready());
        assert!(engine.is_style_loaded());
        assert_eq!(bus.drain(), vec![EngineSignal::Ready]);

        engine.destroy();
        engine.destroy();
        assert_eq!(backend.destroyed(), 1);
        assert_eq!(backend.live_instances(), 0);
        assert!(!backend.emit_ready());
        assert_eq!(engine.add_source(&points()), Err(EngineError::Destroyed));
    }

    #[test]
    fn failed_construction_is_one_shot() {
        let mut backend = HeadlessBackend::new();
        let bus = SignalBus::new();
        let options = crate::EngineConfig::new("pk.test").engine_options();
        backend.fail_next_construction("webgl unavailable");
        let first = backend.create(&"map".to_string(), &options, bus.sender());
        assert_eq!(first.err().as_deref(), Some("webgl unavailable"));
        assert!(backend.create(&"map".to_string(), &options, bus.sender()).is_ok());
        assert_eq!(backend.constructed(), 1);
    }
}
