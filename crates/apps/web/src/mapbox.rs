//! `mapboxgl.Map` behind the [`MapEngine`] trait.

use std::collections::BTreeMap;
use std::rc::Rc;

use engine::{
    Control, Corner, EngineBackend, EngineError, EngineOptions, EngineSignal, InteractionEvent,
    InteractionHandler, InteractionKind, MapEngine,
};
use foundation::{CameraOptions, FitBoundsOptions, LngLat, LngLatBounds, Transition, Viewport};
use layers::{Expression, LayerSpec, Properties, SourceSpec};
use runtime::SignalSender;
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::options::{bounds_value, camera_value, error_signal, fit_value, map_options};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = mapboxgl, js_name = Map)]
    pub type MapboxMap;

    #[wasm_bindgen(constructor, catch, js_namespace = mapboxgl, js_class = "Map")]
    fn new(options: &JsValue) -> Result<MapboxMap, JsValue>;

    #[wasm_bindgen(method, js_name = getSource)]
    fn get_source(this: &MapboxMap, id: &str) -> JsValue;

    #[wasm_bindgen(method, catch, js_name = addSource)]
    fn add_source(this: &MapboxMap, id: &str, source: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = removeSource)]
    fn remove_source(this: &MapboxMap, id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = getLayer)]
    fn get_layer(this: &MapboxMap, id: &str) -> JsValue;

    #[wasm_bindgen(method, catch, js_name = addLayer)]
    fn add_layer(this: &MapboxMap, layer: &JsValue, before: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = removeLayer)]
    fn remove_layer(this: &MapboxMap, id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = getStyle)]
    fn get_style(this: &MapboxMap) -> JsValue;

    #[wasm_bindgen(method, js_name = isStyleLoaded)]
    fn is_style_loaded(this: &MapboxMap) -> bool;

    #[wasm_bindgen(method, catch, js_name = setFilter)]
    fn set_filter(this: &MapboxMap, layer: &str, filter: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = setPaintProperty)]
    fn set_paint_property(
        this: &MapboxMap,
        layer: &str,
        name: &str,
        value: &JsValue,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = setLayoutProperty)]
    fn set_layout_property(
        this: &MapboxMap,
        layer: &str,
        name: &str,
        value: &JsValue,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = getLayoutProperty)]
    fn get_layout_property(this: &MapboxMap, layer: &str, name: &str) -> JsValue;

    #[wasm_bindgen(method, js_name = getCenter)]
    fn get_center(this: &MapboxMap) -> JsValue;

    #[wasm_bindgen(method, js_name = getZoom)]
    fn get_zoom(this: &MapboxMap) -> f64;

    #[wasm_bindgen(method, js_name = getPitch)]
    fn get_pitch(this: &MapboxMap) -> f64;

    #[wasm_bindgen(method, js_name = getBearing)]
    fn get_bearing(this: &MapboxMap) -> f64;

    #[wasm_bindgen(method, js_name = jumpTo)]
    fn jump_to(this: &MapboxMap, options: &JsValue);

    #[wasm_bindgen(method, js_name = easeTo)]
    fn ease_to(this: &MapboxMap, options: &JsValue);

    #[wasm_bindgen(method, js_name = flyTo)]
    fn fly_to(this: &MapboxMap, options: &JsValue);

    #[wasm_bindgen(method, js_name = fitBounds)]
    fn fit_bounds(this: &MapboxMap, bounds: &JsValue, options: &JsValue);

    #[wasm_bindgen(method)]
    fn on(this: &MapboxMap, event: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method)]
    fn off(this: &MapboxMap, event: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_name = addControl)]
    fn add_control(this: &MapboxMap, control: &JsValue, position: &str);

    #[wasm_bindgen(method, js_name = removeControl)]
    fn remove_control(this: &MapboxMap, control: &JsValue);

    #[wasm_bindgen(method)]
    fn remove(this: &MapboxMap);
}

type Listener = Closure<dyn FnMut(JsValue)>;

pub fn js_error_message(err: &JsValue) -> String {
    if let Some(e) = err.dyn_ref::<js_sys::Error>() {
        return String::from(e.message());
    }
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

fn to_js(value: &Value) -> Result<JsValue, EngineError> {
    let text = serde_json::to_string(value).map_err(|e| EngineError::Backend(e.to_string()))?;
    js_sys::JSON::parse(&text).map_err(|e| EngineError::Backend(js_error_message(&e)))
}

fn from_js(value: &JsValue) -> Option<Value> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    let text: String = js_sys::JSON::stringify(value).ok()?.into();
    serde_json::from_str(&text).ok()
}

fn backend_error(err: JsValue) -> EngineError {
    EngineError::Backend(js_error_message(&err))
}

fn is_present(value: &JsValue) -> bool {
    !value.is_undefined() && !value.is_null()
}

/// Builds [`MapboxEngine`]s. `wake` runs after every lifecycle signal so the
/// host can pump its session outside the engine callback.
pub struct MapboxBackend {
    wake: Rc<dyn Fn()>,
}

impl MapboxBackend {
    pub fn new(wake: impl Fn() + 'static) -> Self {
        Self {
            wake: Rc::new(wake),
        }
    }

    fn signal_listener(
        &self,
        signals: &SignalSender<EngineSignal>,
        to_signal: fn(&JsValue) -> EngineSignal,
    ) -> Listener {
        let signals = signals.clone();
        let wake = self.wake.clone();
        Closure::wrap(Box::new(move |event: JsValue| {
            if signals.emit(to_signal(&event)) {
                wake();
            }
        }) as Box<dyn FnMut(JsValue)>)
    }
}

impl EngineBackend for MapboxBackend {
    /// Id of the container element.
    type Container = String;
    type Engine = MapboxEngine;

    fn create(
        &mut self,
        container: &String,
        options: &EngineOptions,
        signals: SignalSender<EngineSignal>,
    ) -> Result<MapboxEngine, String> {
        let js_options = to_js(&map_options(container, options)).map_err(|e| e.to_string())?;
        let map = MapboxMap::new(&js_options).map_err(|e| js_error_message(&e))?;

        let lifecycle = vec![
            ("load", self.signal_listener(&signals, |_| EngineSignal::Ready)),
            ("styledata", self.signal_listener(&signals, |_| EngineSignal::StyleData)),
            (
                "error",
                self.signal_listener(&signals, |event| error_signal(&error_payload(event))),
            ),
        ];
        for (event, listener) in &lifecycle {
            map.on(event, listener.as_ref().unchecked_ref());
        }

        Ok(MapboxEngine {
            map,
            lifecycle,
            handlers: Vec::new(),
            controls: BTreeMap::new(),
            destroyed: false,
        })
    }
}

pub struct MapboxEngine {
    map: MapboxMap,
    lifecycle: Vec<(&'static str, Listener)>,
    handlers: Vec<(InteractionKind, InteractionHandler, Listener)>,
    controls: BTreeMap<Control, JsValue>,
    destroyed: bool,
}

fn field(value: &JsValue, name: &str) -> JsValue {
    js_sys::Reflect::get(value, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
}

fn number_pair(value: &JsValue, a: &str, b: &str) -> Option<[f64; 2]> {
    Some([field(value, a).as_f64()?, field(value, b).as_f64()?])
}

/// `{ error: { message, status } }` read off an engine error event.
fn error_payload(event: &JsValue) -> Value {
    let error = field(event, "error");
    let mut out = serde_json::Map::new();
    if let Some(message) = field(&error, "message").as_string() {
        out.insert("message".into(), Value::from(message));
    }
    let status = field(&error, "status");
    if let Some(status) = status.as_f64() {
        out.insert("status".into(), Value::from(status as i64));
    } else if let Some(status) = status.as_string() {
        out.insert("status".into(), Value::from(status));
    }
    serde_json::json!({ "error": out })
}

/// Mouse events hold a reference to the map, so they are read field by
/// field rather than stringified whole.
fn interaction_event(kind: InteractionKind, event: &JsValue) -> InteractionEvent {
    let mut out = InteractionEvent::new(kind);
    if let Some([lng, lat]) = number_pair(&field(event, "lngLat"), "lng", "lat") {
        out.lng_lat = Some(LngLat::new(lng, lat));
    }
    out.point = number_pair(&field(event, "point"), "x", "y");
    let features = field(event, "features");
    if js_sys::Array::is_array(&features) {
        out.features = js_sys::Array::from(&features)
            .iter()
            .filter_map(|f| match from_js(&field(&f, "properties")) {
                Some(Value::Object(props)) => Some(props),
                _ => None,
            })
            .collect::<Vec<Properties>>();
    }
    out
}

fn control_class(control: Control) -> &'static str {
    match control {
        Control::Navigation => "NavigationControl",
        Control::Geolocate => "GeolocateControl",
        Control::Fullscreen => "FullscreenControl",
        Control::Scale => "ScaleControl",
    }
}

fn construct_control(control: Control) -> Result<JsValue, JsValue> {
    let namespace = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("mapboxgl"))?;
    let class = js_sys::Reflect::get(&namespace, &JsValue::from_str(control_class(control)))?;
    let class: js_sys::Function = class.dyn_into()?;
    js_sys::Reflect::construct(&class, &js_sys::Array::new())
}

impl MapboxEngine {
    fn live(&self) -> Result<&MapboxMap, EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        Ok(&self.map)
    }
}

impl MapEngine for MapboxEngine {
    fn has_source(&self, id: &str) -> bool {
        !self.destroyed && is_present(&self.map.get_source(id))
    }

    fn add_source(&mut self, source: &SourceSpec) -> Result<(), EngineError> {
        let map = self.live()?;
        let spec = source
            .engine_options()
            .map_err(|e| EngineError::Backend(e.to_string()))?;
        map.add_source(&source.id, &to_js(&spec)?)
            .map_err(backend_error)
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineError> {
        let map = self.live()?;
        if !is_present(&map.get_source(id)) {
            return Err(EngineError::UnknownSource(id.to_string()));
        }
        map.remove_source(id).map_err(backend_error)
    }

    fn has_layer(&self, id: &str) -> bool {
        !self.destroyed && is_present(&self.map.get_layer(id))
    }

    fn add_layer(&mut self, layer: &LayerSpec, before: Option<&str>) -> Result<(), EngineError> {
        let map = self.live()?;
        let spec = layer
            .engine_options()
            .map_err(|e| EngineError::Backend(e.to_string()))?;
        let before = before.map(JsValue::from_str).unwrap_or(JsValue::UNDEFINED);
        map.add_layer(&to_js(&spec)?, &before).map_err(backend_error)
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError> {
        let map = self.live()?;
        if !is_present(&map.get_layer(id)) {
            return Err(EngineError::UnknownLayer(id.to_string()));
        }
        map.remove_layer(id).map_err(backend_error)
    }

    fn style_layer_ids(&self) -> Vec<String> {
        if self.destroyed {
            return Vec::new();
        }
        let Some(style) = from_js(&self.map.get_style()) else {
            return Vec::new();
        };
        style
            .get("layers")
            .and_then(Value::as_array)
            .map(|layers| {
                layers
                    .iter()
                    .filter_map(|l| l.get("id").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_style_loaded(&self) -> bool {
        !self.destroyed && self.map.is_style_loaded()
    }

    fn set_filter(
        &mut self,
        layer_id: &str,
        filter: Option<&Expression>,
    ) -> Result<(), EngineError> {
        let map = self.live()?;
        let filter = match filter {
            Some(expression) => to_js(expression.as_value())?,
            None => JsValue::NULL,
        };
        map.set_filter(layer_id, &filter).map_err(backend_error)
    }

    fn set_paint_property(
        &mut self,
        layer_id: &str,
        name: &str,
        value: &Value,
    ) -> Result<(), EngineError> {
        let map = self.live()?;
        map.set_paint_property(layer_id, name, &to_js(value)?)
            .map_err(backend_error)
    }

    fn set_layout_property(
        &mut self,
        layer_id: &str,
        name: &str,
        value: &Value,
    ) -> Result<(), EngineError> {
        let map = self.live()?;
        map.set_layout_property(layer_id, name, &to_js(value)?)
            .map_err(backend_error)
    }

    fn layout_property(&self, layer_id: &str, name: &str) -> Option<Value> {
        if self.destroyed {
            return None;
        }
        from_js(&self.map.get_layout_property(layer_id, name))
    }

    fn camera(&self) -> Viewport {
        let center = from_js(&self.map.get_center())
            .and_then(|c| Some(LngLat::new(c.get("lng")?.as_f64()?, c.get("lat")?.as_f64()?)))
            .unwrap_or(LngLat::new(0.0, 0.0));
        Viewport::from_engine_state(
            center,
            self.map.get_zoom(),
            self.map.get_pitch(),
            self.map.get_bearing(),
        )
    }

    fn move_camera(&mut self, target: &CameraOptions, transition: Transition) {
        let Ok(map) = self.live() else { return };
        let mut options = camera_value(target);
        if let (Value::Object(fields), Transition::Ease { duration_ms } | Transition::Fly { duration_ms }) =
            (&mut options, transition)
        {
            fields.insert("duration".into(), Value::from(duration_ms));
        }
        let Ok(options) = to_js(&options) else { return };
        match transition {
            Transition::Jump => map.jump_to(&options),
            Transition::Ease { .. } => map.ease_to(&options),
            Transition::Fly { .. } => map.fly_to(&options),
        }
    }

    fn fit_bounds(&mut self, bounds: &LngLatBounds, options: &FitBoundsOptions) {
        let Ok(map) = self.live() else { return };
        if let (Ok(bounds), Ok(options)) = (to_js(&bounds_value(bounds)), to_js(&fit_value(options))) {
            map.fit_bounds(&bounds, &options);
        }
    }

    fn on(&mut self, kind: InteractionKind, handler: &InteractionHandler) {
        if self.destroyed {
            return;
        }
        let callback = handler.clone();
        let listener: Listener = Closure::wrap(Box::new(move |event: JsValue| {
            callback(&interaction_event(kind, &event));
        }) as Box<dyn FnMut(JsValue)>);
        self.map
            .on(kind.event_name(), listener.as_ref().unchecked_ref());
        self.handlers.push((kind, handler.clone(), listener));
    }

    fn off(&mut self, kind: InteractionKind, handler: &InteractionHandler) {
        let Some(index) = self.handlers.iter().position(|(k, h, _)| {
            *k == kind && std::ptr::addr_eq(Rc::as_ptr(h), Rc::as_ptr(handler))
        }) else {
            return;
        };
        let (_, _, listener) = self.handlers.remove(index);
        if !self.destroyed {
            self.map
                .off(kind.event_name(), listener.as_ref().unchecked_ref());
        }
    }

    fn add_control(&mut self, control: Control, position: Corner) {
        if self.destroyed || self.controls.contains_key(&control) {
            return;
        }
        match construct_control(control) {
            Ok(instance) => {
                self.map.add_control(&instance, position.as_str());
                self.controls.insert(control, instance);
            }
            Err(e) => web_sys::console::warn_1(&JsValue::from_str(&format!(
                "{} unavailable: {}",
                control_class(control),
                js_error_message(&e)
            ))),
        }
    }

    fn remove_control(&mut self, control: Control) {
        if let Some(instance) = self.controls.remove(&control) {
            if !self.destroyed {
                self.map.remove_control(&instance);
            }
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        for (event, listener) in self.lifecycle.drain(..) {
            self.map.off(event, listener.as_ref().unchecked_ref());
        }
        for (kind, _, listener) in self.handlers.drain(..) {
            self.map
                .off(kind.event_name(), listener.as_ref().unchecked_ref());
        }
        self.controls.clear();
        self.map.remove();
        self.destroyed = true;
    }
}
