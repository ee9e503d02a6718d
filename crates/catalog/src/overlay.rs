use engine::ops::{remove_layer_if_present, remove_source_if_present};
use engine::{EngineError, MapEngine};
use layers::{Expression, FILL_COLOR, FILL_OPACITY, LayerSpec, LayerType, SourceSpec};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::registry::Created;

pub const BOUNDARY_SOURCE_ID: &str = "country-boundaries";
pub const BOUNDARY_TILESET_URL: &str = "mapbox://mapbox.country-boundaries-v1";
pub const BOUNDARY_SOURCE_LAYER: &str = "country_boundaries";
/// Feature property holding the ISO 3166-1 alpha-3 region code.
pub const REGION_CODE_PROPERTY: &str = "iso_3166_1_alpha_3";

pub const DEFAULT_MASK_LAYER_ID: &str = "country-gray-overlay";
pub const HIGHLIGHT_LAYER_ID: &str = "country-color-layer";

pub const DEFAULT_GRAY_COLOR: &str = "#e5e7eb";
pub const DEFAULT_GRAY_OPACITY: f64 = 0.7;
pub const DEFAULT_COLOR_OPACITY: f64 = 0.8;

fn default_gray_color() -> String {
    DEFAULT_GRAY_COLOR.to_string()
}

fn default_gray_opacity() -> f64 {
    DEFAULT_GRAY_OPACITY
}

fn default_color_opacity() -> f64 {
    DEFAULT_COLOR_OPACITY
}

fn default_layer_id() -> String {
    DEFAULT_MASK_LAYER_ID.to_string()
}

/// Gray out every region outside `country_codes`, optionally coloring the
/// rest with a data-driven expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayOptions {
    pub country_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_expression: Option<Expression>,
    #[serde(default = "default_gray_color")]
    pub gray_color: String,
    #[serde(default = "default_gray_opacity")]
    pub gray_opacity: f64,
    #[serde(default = "default_color_opacity")]
    pub color_opacity: f64,
    #[serde(default = "default_layer_id")]
    pub layer_id: String,
}

impl OverlayOptions {
    pub fn new<I, S>(country_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            country_codes: country_codes.into_iter().map(Into::into).collect(),
            color_expression: None,
            gray_color: default_gray_color(),
            gray_opacity: DEFAULT_GRAY_OPACITY,
            color_opacity: DEFAULT_COLOR_OPACITY,
            layer_id: default_layer_id(),
        }
    }

    pub fn with_color_expression(mut self, expression: Expression) -> Self {
        self.color_expression = Some(expression);
        self
    }

    /// Selects every region whose code is not in the allow-list.
    pub fn mask_filter(&self) -> Expression {
        Expression::not_in(REGION_CODE_PROPERTY, self.country_codes.as_slice())
    }
}

/// First style layer carrying text (`label` or `place` in its id), skipping
/// the overlay's own layers.
pub fn label_insertion_point(layer_ids: &[String], own: &[&str]) -> Option<String> {
    layer_ids
        .iter()
        .filter(|id| !own.contains(&id.as_str()))
        .find(|id| id.contains("label") || id.contains("place"))
        .cloned()
}

/// Two-layer region overlay over the shared boundary tileset.
///
/// Requests wait until the engine reports its style loaded; a newer request
/// replaces one still waiting.
#[derive(Debug, Default)]
pub struct OverlayController {
    pending: Option<OverlayOptions>,
    applied: Option<OverlayOptions>,
}

impl OverlayController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, options: OverlayOptions) {
        if self.pending.is_some() {
            debug!("replacing pending overlay request");
        }
        self.pending = Some(options);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn applied(&self) -> Option<&OverlayOptions> {
        self.applied.as_ref()
    }

    pub fn cancel_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Applies the pending request once the style is loaded. Returns whether
    /// a request was applied. A failed apply drops the request.
    pub fn poll<E: MapEngine + ?Sized>(&mut self, engine: &mut E) -> Result<bool, EngineError> {
        if self.pending.is_none() || !engine.is_style_loaded() {
            return Ok(false);
        }
        let Some(options) = self.pending.take() else {
            return Ok(false);
        };
        self.apply(engine, &options).map(|()| true).inspect_err(|e| {
            warn!(error = %e, "failed to apply country overlay");
        })
    }

    /// Creates or updates both layers immediately.
    ///
    /// `layer_id` must not name a style layer the overlay did not create. On
    /// failure whatever this call added is removed again; layers that were
    /// updated in place stay reachable from `teardown`.
    pub fn apply<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        options: &OverlayOptions,
    ) -> Result<(), EngineError> {
        let mask_id = options.layer_id.as_str();
        let owned = self.applied.as_ref().is_some_and(|a| a.layer_id == mask_id);
        if mask_id == HIGHLIGHT_LAYER_ID || (engine.has_layer(mask_id) && !owned) {
            warn!(layer = mask_id, "overlay layer id is taken by the style");
            return Err(EngineError::DuplicateLayer(mask_id.to_string()));
        }

        let mut created = Created::default();
        if let Err(e) = self.build(engine, options, &mut created) {
            created.roll_back(engine);
            if engine.has_layer(mask_id) || engine.has_layer(HIGHLIGHT_LAYER_ID) {
                self.applied = Some(options.clone());
            }
            return Err(e);
        }

        info!(
            regions = options.country_codes.len(),
            highlight = options.color_expression.is_some(),
            "country overlay applied"
        );
        self.applied = Some(options.clone());
        Ok(())
    }

    fn build<E: MapEngine + ?Sized>(
        &self,
        engine: &mut E,
        options: &OverlayOptions,
        created: &mut Created,
    ) -> Result<(), EngineError> {
        if !engine.has_source(BOUNDARY_SOURCE_ID) {
            engine.add_source(&SourceSpec::vector(BOUNDARY_SOURCE_ID, BOUNDARY_TILESET_URL))?;
            created.source = Some(BOUNDARY_SOURCE_ID.to_string());
        }
        if let Some(previous) = &self.applied {
            if previous.layer_id != options.layer_id {
                remove_layer_if_present(engine, &previous.layer_id);
            }
        }

        let mask_id = options.layer_id.as_str();
        let before = label_insertion_point(&engine.style_layer_ids(), &[mask_id, HIGHLIGHT_LAYER_ID]);
        let gray = json!(options.gray_color);
        let gray_opacity = json!(options.gray_opacity);

        if engine.has_layer(mask_id) {
            engine.set_filter(mask_id, Some(&options.mask_filter()))?;
            engine.set_paint_property(mask_id, FILL_COLOR, &gray)?;
            engine.set_paint_property(mask_id, FILL_OPACITY, &gray_opacity)?;
            debug!(layer = mask_id, "mask layer updated");
        } else {
            let mask = boundary_layer(mask_id)
                .with_filter(options.mask_filter())
                .with_paint(FILL_COLOR, gray)
                .with_paint(FILL_OPACITY, gray_opacity);
            engine.add_layer(&mask, before.as_deref())?;
            created.layers.push(mask_id.to_string());
            debug!(layer = mask_id, before = ?before, "mask layer added");
        }

        match &options.color_expression {
            Some(expression) => {
                let color = expression.as_value().clone();
                let opacity = json!(options.color_opacity);
                if engine.has_layer(HIGHLIGHT_LAYER_ID) {
                    engine.set_paint_property(HIGHLIGHT_LAYER_ID, FILL_COLOR, &color)?;
                    engine.set_paint_property(HIGHLIGHT_LAYER_ID, FILL_OPACITY, &opacity)?;
                } else {
                    let highlight = boundary_layer(HIGHLIGHT_LAYER_ID)
                        .with_paint(FILL_COLOR, color)
                        .with_paint(FILL_OPACITY, opacity);
                    engine.add_layer(&highlight, before.as_deref())?;
                    created.layers.push(HIGHLIGHT_LAYER_ID.to_string());
                }
            }
            None => {
                if remove_layer_if_present(engine, HIGHLIGHT_LAYER_ID) {
                    debug!("stale highlight layer removed");
                }
            }
        }
        Ok(())
    }

    /// Removes both layers, then the boundary source.
    pub fn teardown<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        self.pending = None;
        let Some(applied) = self.applied.take() else {
            return;
        };
        remove_layer_if_present(engine, HIGHLIGHT_LAYER_ID);
        remove_layer_if_present(engine, &applied.layer_id);
        remove_source_if_present(engine, BOUNDARY_SOURCE_ID);
        info!("country overlay removed");
    }

    pub fn forget(&mut self) {
        self.pending = None;
        self.applied = None;
    }
}

fn boundary_layer(id: &str) -> LayerSpec {
    LayerSpec::new(id, LayerType::Fill, BOUNDARY_SOURCE_ID).with_source_layer(BOUNDARY_SOURCE_LAYER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingEngine, ready_binding, ready_engine};
    use layers::{Properties, TRANSPARENT};
    use pretty_assertions::assert_eq;

    fn region(code: &str) -> Properties {
        let mut props = Properties::new();
        props.insert(REGION_CODE_PROPERTY.to_string(), json!(code));
        props
    }

    fn position(ids: &[String], id: &str) -> usize {
        ids.iter().position(|l| l == id).unwrap()
    }

    #[test]
    fn mask_filter_grays_out_everything_else() {
        let filter = OverlayOptions::new(["USA"]).mask_filter();
        assert_eq!(filter.matches(&region("FRA")), Ok(true));
        assert_eq!(filter.matches(&region("USA")), Ok(false));
    }

    #[test]
    fn waits_for_style_then_inserts_below_labels() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        backend.set_style_loaded(false);

        let mut overlay = OverlayController::new();
        overlay.request(
            OverlayOptions::new(["USA", "FRA"]).with_color_expression(Expression::match_colors(
                REGION_CODE_PROPERTY,
                [("USA", "#3b82f6"), ("FRA", "#8b5cf6")],
                TRANSPARENT,
            )),
        );
        assert_eq!(overlay.poll(engine), Ok(false));
        assert!(backend.layer(DEFAULT_MASK_LAYER_ID).is_none());

        backend.set_style_loaded(true);
        assert_eq!(overlay.poll(engine), Ok(true));
        assert!(!overlay.is_pending());

        let ids = backend.layer_ids();
        let mask = position(&ids, DEFAULT_MASK_LAYER_ID);
        let highlight = position(&ids, HIGHLIGHT_LAYER_ID);
        let label = position(&ids, "settlement-major-label");
        assert!(mask < highlight);
        assert_eq!(highlight + 1, label);

        let filter = backend.layer(DEFAULT_MASK_LAYER_ID).unwrap().filter.unwrap();
        assert_eq!(filter.matches(&region("DEU")), Ok(true));
        assert_eq!(filter.matches(&region("FRA")), Ok(false));
        assert!(backend.layer(HIGHLIGHT_LAYER_ID).unwrap().filter.is_none());
    }

    #[test]
    fn reapply_updates_in_place() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut overlay = OverlayController::new();
        overlay.apply(engine, &OverlayOptions::new(["USA"])).unwrap();
        let before = backend.layer_ids();

        let mut options = OverlayOptions::new(["USA", "JPN"]);
        options.gray_opacity = 0.5;
        overlay.apply(engine, &options).unwrap();

        assert_eq!(backend.layer_ids(), before);
        let mask = backend.layer(DEFAULT_MASK_LAYER_ID).unwrap();
        assert_eq!(mask.filter.unwrap().matches(&region("JPN")), Ok(false));
        assert_eq!(mask.paint.unwrap()[FILL_OPACITY], json!(0.5));
    }

    #[test]
    fn highlight_removed_when_expression_dropped() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut overlay = OverlayController::new();
        let colored = OverlayOptions::new(["USA"]).with_color_expression(Expression::match_colors(
            REGION_CODE_PROPERTY,
            [("USA", "#3b82f6")],
            TRANSPARENT,
        ));
        overlay.apply(engine, &colored).unwrap();
        assert!(backend.layer(HIGHLIGHT_LAYER_ID).is_some());

        overlay.apply(engine, &OverlayOptions::new(["USA"])).unwrap();
        assert!(backend.layer(HIGHLIGHT_LAYER_ID).is_none());
    }

    #[test]
    fn newer_request_replaces_pending() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        backend.set_style_loaded(false);
        let mut overlay = OverlayController::new();
        overlay.request(OverlayOptions::new(["USA"]));
        overlay.request(OverlayOptions::new(["BRA"]));
        backend.set_style_loaded(true);
        overlay.poll(engine).unwrap();
        assert_eq!(overlay.applied().unwrap().country_codes, vec!["BRA"]);
    }

    #[test]
    fn teardown_removes_layers_then_source() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut overlay = OverlayController::new();
        overlay
            .apply(
                engine,
                &OverlayOptions::new(["USA"]).with_color_expression(Expression::get("color")),
            )
            .unwrap();
        overlay.teardown(engine);
        assert!(backend.layer(DEFAULT_MASK_LAYER_ID).is_none());
        assert!(backend.layer(HIGHLIGHT_LAYER_ID).is_none());
        assert!(!backend.source_ids().contains(&BOUNDARY_SOURCE_ID.to_string()));
        assert!(overlay.applied().is_none());
    }

    fn colored(codes: &[&str]) -> OverlayOptions {
        OverlayOptions::new(codes.iter().copied()).with_color_expression(Expression::get("color"))
    }

    #[test]
    fn failed_highlight_removes_what_the_call_added() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut overlay = OverlayController::new();
        let mut failing = FailingEngine {
            inner: engine,
            fail_layer: HIGHLIGHT_LAYER_ID,
        };

        assert!(overlay.apply(&mut failing, &colored(&["USA"])).is_err());
        assert!(overlay.applied().is_none());
        assert!(backend.layer(DEFAULT_MASK_LAYER_ID).is_none());
        assert!(!backend.source_ids().contains(&BOUNDARY_SOURCE_ID.to_string()));
    }

    #[test]
    fn mask_updated_before_failed_highlight_is_still_torn_down() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut overlay = OverlayController::new();
        overlay.apply(engine, &OverlayOptions::new(["USA"])).unwrap();

        let mut failing = FailingEngine {
            inner: engine,
            fail_layer: HIGHLIGHT_LAYER_ID,
        };
        assert!(overlay.apply(&mut failing, &colored(&["USA", "PER"])).is_err());
        assert!(backend.layer(DEFAULT_MASK_LAYER_ID).is_some());

        overlay.teardown(&mut failing);
        assert!(backend.layer(DEFAULT_MASK_LAYER_ID).is_none());
        assert!(!backend.source_ids().contains(&BOUNDARY_SOURCE_ID.to_string()));
    }

    #[test]
    fn refuses_to_take_over_a_style_layer() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut overlay = OverlayController::new();
        let label = backend.layer("country-label").unwrap();
        backend.clear_journal();

        let mut options = OverlayOptions::new(["USA"]);
        options.layer_id = "country-label".to_string();
        assert_eq!(
            overlay.apply(engine, &options),
            Err(EngineError::DuplicateLayer("country-label".to_string()))
        );
        options.layer_id = HIGHLIGHT_LAYER_ID.to_string();
        assert!(overlay.apply(engine, &options).is_err());

        assert!(backend.journal().is_empty());
        assert_eq!(backend.layer("country-label").unwrap(), label);
        overlay.teardown(engine);
        assert!(backend.layer("country-label").is_some());
    }

    #[test]
    fn insertion_point_appends_without_labels() {
        let ids = vec!["background".to_string(), "water".to_string()];
        assert_eq!(label_insertion_point(&ids, &[]), None);
        let ids = vec![
            DEFAULT_MASK_LAYER_ID.to_string(),
            "road-label".to_string(),
        ];
        assert_eq!(
            label_insertion_point(&ids, &[DEFAULT_MASK_LAYER_ID]),
            Some("road-label".to_string())
        );
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: OverlayOptions =
            serde_json::from_value(json!({ "countryCodes": ["USA", "CAN"] })).unwrap();
        assert_eq!(options, OverlayOptions::new(["USA", "CAN"]));
    }
}
