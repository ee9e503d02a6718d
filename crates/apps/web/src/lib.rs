use console_error_panic_hook::set_once;
use gloo_net::http::Request;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::fmt::Display;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use catalog::{AddOutcome, OverlayOptions};
use engine::{ControlsConfig, EngineConfig, InteractionEvent, InteractionHandlers, InteractionKind};
use foundation::{CameraTarget, LngLat, Timestamp};
use layers::{DatasetConfig, GeoJsonData, SourceKind};
use runtime::TaskId;
use session::{HandlerId, MapSession};

mod mapbox;
pub mod options;

use mapbox::{MapboxBackend, js_error_message};

thread_local! {
    static SESSION: RefCell<Option<MapSession<MapboxBackend>>> = const { RefCell::new(None) };
}

/// Runs `f` against the page's session, creating it on first use. Returns
/// `None` on re-entrant access from inside an engine callback.
fn with_session<R>(f: impl FnOnce(&mut MapSession<MapboxBackend>) -> R) -> Option<R> {
    SESSION
        .try_with(|cell| {
            let mut slot = cell.try_borrow_mut().ok()?;
            let session =
                slot.get_or_insert_with(|| MapSession::new(MapboxBackend::new(schedule_pump)));
            Some(f(session))
        })
        .ok()
        .flatten()
}

// Engine callbacks can fire while the session is borrowed (e.g. from inside
// `addLayer`), so signals are applied on the next microtask.
fn schedule_pump() {
    spawn_local(async {
        with_session(|session| {
            session.tick(Timestamp::now().as_millis());
        });
    });
}

fn busy() -> JsValue {
    JsValue::from_str("map session is busy")
}

fn js_err(err: impl Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

fn warn(msg: &str) {
    web_sys::console::warn_1(&JsValue::from_str(msg));
}

fn outcome_str(outcome: AddOutcome) -> &'static str {
    match outcome {
        AddOutcome::Added => "added",
        AddOutcome::AlreadyPresent => "present",
        AddOutcome::Replaced => "replaced",
        AddOutcome::Restored => "restored",
    }
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    Ok(())
}

/// Binds the map to the element with `container_id`. `config_json` is an
/// engine config object; returns the resulting loading state.
#[wasm_bindgen]
pub fn map_bind(container_id: &str, config_json: &str) -> Result<String, JsValue> {
    let config: EngineConfig = serde_json::from_str(config_json).map_err(js_err)?;
    let container = container_id.to_string();
    let state = with_session(|session| session.bind(&container, &config)).ok_or_else(busy)?;
    if let Some(error) = with_session(|session| session.error().map(|e| e.to_string())).flatten() {
        warn(&format!("map bind failed: {error}"));
    }
    Ok(state.as_str().to_string())
}

#[wasm_bindgen]
pub fn map_unbind() -> bool {
    with_session(|session| session.unbind()).unwrap_or(false)
}

#[wasm_bindgen]
pub fn map_retry() -> Result<String, JsValue> {
    with_session(|session| session.retry().as_str().to_string()).ok_or_else(busy)
}

/// Applies pending engine signals and runs due scheduled work.
#[wasm_bindgen]
pub fn map_tick() -> String {
    with_session(|session| {
        session.tick(Timestamp::now().as_millis());
        session.state().as_str().to_string()
    })
    .unwrap_or_default()
}

#[wasm_bindgen]
pub fn map_state() -> String {
    with_session(|session| session.state().as_str().to_string()).unwrap_or_default()
}

/// `{ kind, message, code, timestamp }` of the current error, or `null`.
#[wasm_bindgen]
pub fn map_error() -> String {
    with_session(|session| {
        session.error().map(|e| {
            json!({
                "kind": format!("{:?}", e.kind),
                "message": e.message,
                "code": e.code,
                "timestamp": e.timestamp.as_millis(),
            })
        })
    })
    .flatten()
    .unwrap_or(Value::Null)
    .to_string()
}

#[wasm_bindgen]
pub fn add_dataset(dataset_json: &str) -> Result<String, JsValue> {
    let dataset: DatasetConfig = serde_json::from_str(dataset_json).map_err(js_err)?;
    let outcome = with_session(|session| session.add_dataset(&dataset))
        .ok_or_else(busy)?
        .map_err(js_err)?;
    Ok(outcome_str(outcome).to_string())
}

#[wasm_bindgen]
pub fn remove_dataset(id: &str) -> Result<bool, JsValue> {
    with_session(|session| session.remove_dataset(id))
        .ok_or_else(busy)?
        .map_err(js_err)
}

/// New visibility of the dataset's layers, or `undefined` when it is not
/// registered.
#[wasm_bindgen]
pub fn toggle_dataset(id: &str) -> Result<Option<bool>, JsValue> {
    with_session(|session| session.toggle_dataset(id))
        .ok_or_else(busy)?
        .map_err(js_err)
}

#[wasm_bindgen]
pub fn is_dataset_active(id: &str) -> bool {
    with_session(|session| session.is_active(id)).unwrap_or(false)
}

fn tick_after(delay_ms: u32) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let callback = Closure::once_into_js(|| {
        map_tick();
    });
    if let Err(e) = window.set_timeout_with_callback_and_timeout_and_arguments_0(
        callback.unchecked_ref(),
        delay_ms.min(i32::MAX as u32) as i32,
    ) {
        warn(&format!("setTimeout failed: {}", js_error_message(&e)));
    }
}

/// Mounts the dataset after `delay_ms` unless the map is unbound first.
/// Returns a task id for [`cancel_scheduled`].
#[wasm_bindgen]
pub fn schedule_dataset(dataset_json: &str, delay_ms: u32) -> Result<f64, JsValue> {
    let dataset: DatasetConfig = serde_json::from_str(dataset_json).map_err(js_err)?;
    let task = with_session(|session| {
        session.tick(Timestamp::now().as_millis());
        session.schedule_dataset(dataset, u64::from(delay_ms))
    })
    .ok_or_else(busy)?;
    tick_after(delay_ms);
    Ok(task.0 as f64)
}

#[wasm_bindgen]
pub fn cancel_scheduled(task_id: f64) -> bool {
    with_session(|session| session.cancel_scheduled(TaskId(task_id as u64))).unwrap_or(false)
}

/// Fetches GeoJSON from `url`, inlines it into the dataset's source and
/// mounts the dataset.
#[wasm_bindgen]
pub fn load_dataset_url(url: String, dataset_json: &str) -> Result<(), JsValue> {
    let mut dataset: DatasetConfig = serde_json::from_str(dataset_json).map_err(js_err)?;
    spawn_local(async move {
        let data = match fetch_geojson(&url).await {
            Ok(data) => data,
            Err(e) => {
                warn(&format!("dataset fetch failed ({url}): {}", js_error_message(&e)));
                return;
            }
        };
        if let SourceKind::GeoJson { data: slot, .. } = &mut dataset.source.kind {
            *slot = GeoJsonData::Inline(data);
        }
        match with_session(|session| session.add_dataset(&dataset)) {
            Some(Ok(outcome)) => log(&format!("dataset {}: {}", dataset.id, outcome_str(outcome))),
            Some(Err(e)) => warn(&format!("dataset {} not mounted: {e}", dataset.id)),
            None => warn("map session is busy"),
        }
    });
    Ok(())
}

async fn fetch_geojson(url: &str) -> Result<Value, JsValue> {
    let resp = Request::get(url)
        .send()
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let text = resp
        .text()
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Returns `true` when the overlay was drawn now, `false` when it waits for
/// the style to finish loading.
#[wasm_bindgen]
pub fn apply_country_overlay(options_json: &str) -> Result<bool, JsValue> {
    let options: OverlayOptions = serde_json::from_str(options_json).map_err(js_err)?;
    with_session(|session| session.apply_overlay(options))
        .ok_or_else(busy)?
        .map_err(js_err)
}

#[wasm_bindgen]
pub fn clear_country_overlay() {
    with_session(|session| session.clear_overlay());
}

#[wasm_bindgen]
pub fn set_map_controls(controls_json: &str) -> Result<bool, JsValue> {
    let controls: ControlsConfig = serde_json::from_str(controls_json).map_err(js_err)?;
    with_session(|session| session.set_controls(&controls)).ok_or_else(busy)
}

fn camera_target(target_json: &str) -> Result<CameraTarget, JsValue> {
    serde_json::from_str(target_json).map_err(js_err)
}

#[wasm_bindgen]
pub fn fly_to(target_json: &str) -> Result<bool, JsValue> {
    let target = camera_target(target_json)?;
    with_session(|session| session.fly_to(&target)).ok_or_else(busy)
}

#[wasm_bindgen]
pub fn ease_to(target_json: &str) -> Result<bool, JsValue> {
    let target = camera_target(target_json)?;
    with_session(|session| session.ease_to(&target)).ok_or_else(busy)
}

#[wasm_bindgen]
pub fn jump_to(target_json: &str) -> Result<bool, JsValue> {
    let target = camera_target(target_json)?;
    with_session(|session| session.jump_to(&target)).ok_or_else(busy)
}

/// `points_json` is an array of `[lng, lat]` pairs.
#[wasm_bindgen]
pub fn fit_bounds(points_json: &str) -> Result<bool, JsValue> {
    let points: Vec<LngLat> = serde_json::from_str(points_json).map_err(js_err)?;
    with_session(|session| session.fit_bounds(&points)).ok_or_else(busy)
}

#[wasm_bindgen]
pub fn viewport_json() -> String {
    with_session(|session| session.viewport())
        .flatten()
        .and_then(|viewport| serde_json::to_string(&viewport).ok())
        .unwrap_or_else(|| "null".to_string())
}

fn event_value(event: &InteractionEvent) -> Value {
    json!({
        "type": event.kind.event_name(),
        "lngLat": event.lng_lat.map(|p| [p.lng, p.lat]),
        "point": event.point,
        "features": event.features,
    })
}

/// Subscribes `callback` to `kind` (`click`, `mousemove`, `mouseenter`,
/// `mouseleave`, `zoom` or `move`). Returns a handler id for
/// [`off_map_events`], or `undefined` when no engine exists yet.
#[wasm_bindgen]
pub fn on_map_event(kind: &str, callback: js_sys::Function) -> Result<Option<f64>, JsValue> {
    let kind = InteractionKind::ALL
        .into_iter()
        .find(|k| k.event_name() == kind)
        .ok_or_else(|| JsValue::from_str(&format!("unknown map event: {kind}")))?;
    let handlers = InteractionHandlers::new().on(kind, move |event| {
        let payload = js_sys::JSON::parse(&event_value(event).to_string());
        if let Ok(payload) = payload {
            if let Err(e) = callback.call1(&JsValue::NULL, &payload) {
                warn(&format!("map event handler threw: {}", js_error_message(&e)));
            }
        }
    });
    let id = with_session(|session| session.attach_handlers(&handlers)).ok_or_else(busy)?;
    Ok(id.map(|HandlerId(id)| id as f64))
}

#[wasm_bindgen]
pub fn off_map_events(handler_id: f64) -> bool {
    with_session(|session| session.detach_handlers(HandlerId(handler_id as u64))).unwrap_or(false)
}

#[wasm_bindgen]
pub fn distance_km(lng1: f64, lat1: f64, lng2: f64, lat2: f64) -> f64 {
    foundation::math::distance_between(LngLat::new(lng1, lat1), LngLat::new(lng2, lat2))
}
