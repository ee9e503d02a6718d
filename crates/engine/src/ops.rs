//! Small idempotent helpers over [`MapEngine`].

use foundation::{FitBoundsOptions, LngLat, LngLatBounds};
use layers::{VISIBILITY, Visibility};
use tracing::debug;

use crate::engine::MapEngine;
use crate::error::EngineError;

/// Removes the layer if the engine has it. Returns whether it was removed.
pub fn remove_layer_if_present<E: MapEngine + ?Sized>(engine: &mut E, id: &str) -> bool {
    if !engine.has_layer(id) {
        return false;
    }
    match engine.remove_layer(id) {
        Ok(()) => true,
        Err(e) => {
            debug!(layer = id, error = %e, "layer removal failed");
            false
        }
    }
}

pub fn remove_source_if_present<E: MapEngine + ?Sized>(engine: &mut E, id: &str) -> bool {
    if !engine.has_source(id) {
        return false;
    }
    match engine.remove_source(id) {
        Ok(()) => true,
        Err(e) => {
            debug!(source = id, error = %e, "source removal failed");
            false
        }
    }
}

/// Flips a layer between visible and hidden and returns the new visibility.
/// A missing `visibility` layout property counts as visible; a missing layer
/// is ignored.
pub fn toggle_layer_visibility<E: MapEngine + ?Sized>(
    engine: &mut E,
    layer_id: &str,
) -> Result<Option<Visibility>, EngineError> {
    if !engine.has_layer(layer_id) {
        return Ok(None);
    }
    let current =
        Visibility::from_layout_value(engine.layout_property(layer_id, VISIBILITY).as_ref());
    let next = current.toggled();
    engine.set_layout_property(layer_id, VISIBILITY, &next.to_value())?;
    Ok(Some(next))
}

/// Fits the camera to the given points. Returns false for an empty slice.
pub fn fit_to_points<E: MapEngine + ?Sized>(
    engine: &mut E,
    points: &[LngLat],
    options: &FitBoundsOptions,
) -> bool {
    match LngLatBounds::from_coords(points) {
        Some(bounds) => {
            engine.fit_bounds(&bounds, options);
            true
        }
        None => false,
    }
}
