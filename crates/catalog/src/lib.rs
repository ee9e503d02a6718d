//! Dataset and overlay bookkeeping on top of a ready engine.
//!
//! Both controllers borrow the engine per call; the caller re-derives them
//! whenever the engine instance changes.

pub mod error;
pub mod overlay;
pub mod registry;

pub use error::*;
pub use overlay::*;
pub use registry::*;

#[cfg(test)]
pub(crate) mod testing {
    use engine::headless::{HeadlessBackend, HeadlessEngine};
    use engine::{
        Control, Corner, EngineBinding, EngineConfig, EngineError, InteractionHandler,
        InteractionKind, MapEngine,
    };
    use foundation::{CameraOptions, FitBoundsOptions, LngLatBounds, Transition, Viewport};
    use layers::{Expression, LayerSpec, SourceSpec};
    use serde_json::Value;

    pub const TOKEN: &str = "pk.eyJ1IjoidGVzdCIsImEiOiJjbGFiYyJ9.abc";

    /// A binding whose engine has already reported ready.
    pub fn ready_binding() -> (HeadlessBackend, EngineBinding<HeadlessBackend>) {
        let backend = HeadlessBackend::new();
        let mut binding = EngineBinding::new(backend.clone());
        binding.bind(&"map".to_string(), &EngineConfig::new(TOKEN));
        backend.emit_ready();
        binding.pump();
        (backend, binding)
    }

    pub fn ready_engine(binding: &mut EngineBinding<HeadlessBackend>) -> &mut HeadlessEngine {
        binding.engine_mut().expect("engine is ready")
    }

    /// Wraps a headless engine and rejects layer adds and layout updates
    /// aimed at one layer id.
    pub struct FailingEngine<'a> {
        pub inner: &'a mut HeadlessEngine,
        pub fail_layer: &'static str,
    }

    impl FailingEngine<'_> {
        fn check(&self, layer_id: &str) -> Result<(), EngineError> {
            if layer_id == self.fail_layer {
                return Err(EngineError::Backend(format!("{layer_id} rejected")));
            }
            Ok(())
        }
    }

    impl MapEngine for FailingEngine<'_> {
        fn has_source(&self, id: &str) -> bool {
            self.inner.has_source(id)
        }
        fn add_source(&mut self, source: &SourceSpec) -> Result<(), EngineError> {
            self.inner.add_source(source)
        }
        fn remove_source(&mut self, id: &str) -> Result<(), EngineError> {
            self.inner.remove_source(id)
        }
        fn has_layer(&self, id: &str) -> bool {
            self.inner.has_layer(id)
        }
        fn add_layer(&mut self, layer: &LayerSpec, before: Option<&str>) -> Result<(), EngineError> {
            self.check(&layer.id)?;
            self.inner.add_layer(layer, before)
        }
        fn remove_layer(&mut self, id: &str) -> Result<(), EngineError> {
            self.inner.remove_layer(id)
        }
        fn style_layer_ids(&self) -> Vec<String> {
            self.inner.style_layer_ids()
        }
        fn is_style_loaded(&self) -> bool {
            self.inner.is_style_loaded()
        }
        fn set_filter(
            &mut self,
            layer_id: &str,
            filter: Option<&Expression>,
        ) -> Result<(), EngineError> {
            self.inner.set_filter(layer_id, filter)
        }
        fn set_paint_property(
            &mut self,
            layer_id: &str,
            name: &str,
            value: &Value,
        ) -> Result<(), EngineError> {
            self.inner.set_paint_property(layer_id, name, value)
        }
        fn set_layout_property(
            &mut self,
            layer_id: &str,
            name: &str,
            value: &Value,
        ) -> Result<(), EngineError> {
            self.check(layer_id)?;
            self.inner.set_layout_property(layer_id, name, value)
        }
        fn layout_property(&self, layer_id: &str, name: &str) -> Option<Value> {
            self.inner.layout_property(layer_id, name)
        }
        fn camera(&self) -> Viewport {
            self.inner.camera()
        }
        fn move_camera(&mut self, target: &CameraOptions, transition: Transition) {
            self.inner.move_camera(target, transition)
        }
        fn fit_bounds(&mut self, bounds: &LngLatBounds, options: &FitBoundsOptions) {
            self.inner.fit_bounds(bounds, options)
        }
        fn on(&mut self, kind: InteractionKind, handler: &InteractionHandler) {
            self.inner.on(kind, handler)
        }
        fn off(&mut self, kind: InteractionKind, handler: &InteractionHandler) {
            self.inner.off(kind, handler)
        }
        fn add_control(&mut self, control: Control, position: Corner) {
            self.inner.add_control(control, position)
        }
        fn remove_control(&mut self, control: Control) {
            self.inner.remove_control(control)
        }
        fn destroy(&mut self) {
            self.inner.destroy()
        }
    }
}
