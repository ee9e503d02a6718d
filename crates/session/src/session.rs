use std::collections::BTreeMap;

use catalog::{AddOutcome, DatasetError, DatasetRegistry, OverlayController, OverlayOptions};
use engine::ops::fit_to_points;
use engine::{
    Attachment, Control, ControlsConfig, EngineBackend, EngineBinding, EngineConfig, EngineSignal,
    InteractionHandlers, LoadingState, MapEngine, MapError, attach,
};
use foundation::{CameraTarget, FitBoundsOptions, LngLat, Transition, Viewport};
use layers::DatasetConfig;
use runtime::{DeferredQueue, TaskId};
use tracing::{debug, error, info, warn};

use crate::task::{Scheduled, SessionTask};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(pub u64);

/// Everything the map shows for one container: the engine binding plus the
/// datasets, overlay, handlers and controls layered on top of it.
///
/// Drive it with [`tick`](MapSession::tick) from the host's frame or timer
/// loop. Dropping the session tears everything down in order.
pub struct MapSession<B: EngineBackend> {
    binding: EngineBinding<B>,
    registry: DatasetRegistry,
    overlay: OverlayController,
    attachments: BTreeMap<HandlerId, Attachment>,
    next_handler: u64,
    controls: Vec<Control>,
    tasks: DeferredQueue<Scheduled>,
    now_ms: u64,
}

impl<B: EngineBackend> MapSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            binding: EngineBinding::new(backend),
            registry: DatasetRegistry::new(),
            overlay: OverlayController::new(),
            attachments: BTreeMap::new(),
            next_handler: 1,
            controls: Vec::new(),
            tasks: DeferredQueue::new(),
            now_ms: 0,
        }
    }

    pub fn binding(&self) -> &EngineBinding<B> {
        &self.binding
    }

    pub fn state(&self) -> LoadingState {
        self.binding.state()
    }

    pub fn is_loaded(&self) -> bool {
        self.binding.is_loaded()
    }

    pub fn error(&self) -> Option<&MapError> {
        self.binding.error()
    }

    pub fn engine(&self) -> Option<&B::Engine> {
        self.binding.engine()
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    pub fn overlay(&self) -> &OverlayController {
        &self.overlay
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Binds the container. An identical rebind is a no-op; a changed config
    /// tears down every dataset, overlay, handler and control of the old
    /// engine before the new one is constructed.
    pub fn bind(&mut self, container: &B::Container, config: &EngineConfig) -> LoadingState {
        if self.binding.container() == Some(container) && self.binding.config() == Some(config) {
            return self.binding.bind(container, config);
        }
        if self.binding.has_instance() {
            self.release();
        }
        self.binding.bind(container, config)
    }

    /// Binds again with the last container and config after an error.
    pub fn retry(&mut self) -> LoadingState {
        let bound = self
            .binding
            .container()
            .cloned()
            .zip(self.binding.config().cloned());
        let Some((container, config)) = bound else {
            return self.state();
        };
        self.unbind();
        self.bind(&container, &config)
    }

    /// Tears down everything layered on the engine, then destroys it.
    pub fn unbind(&mut self) -> bool {
        self.release();
        self.binding.unbind()
    }

    /// Applies pending engine signals. The overlay is retried on ready and
    /// style-data signals.
    pub fn pump(&mut self) -> Vec<EngineSignal> {
        let signals = self.binding.pump();
        if signals
            .iter()
            .any(|s| matches!(s, EngineSignal::Ready | EngineSignal::StyleData))
        {
            self.poll_overlay();
        }
        signals
    }

    /// Advances the session clock: pumps signals, runs due tasks once the
    /// engine is loaded and retries a waiting overlay.
    pub fn tick(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
        self.pump();
        if self.binding.is_loaded() {
            for (id, scheduled) in self.tasks.take_due(self.now_ms) {
                self.run_task(id, scheduled);
            }
        }
        self.poll_overlay();
    }

    pub fn add_dataset(&mut self, dataset: &DatasetConfig) -> Result<AddOutcome, DatasetError> {
        let Some(engine) = self.binding.loaded_engine_mut() else {
            warn!(dataset = %dataset.id, "cannot add dataset: map is not loaded yet");
            return Err(DatasetError::EngineNotReady);
        };
        self.registry.add(engine, dataset)
    }

    pub fn remove_dataset(&mut self, id: &str) -> Result<bool, DatasetError> {
        let Some(engine) = self.binding.loaded_engine_mut() else {
            warn!(dataset = id, "cannot remove dataset: map is not loaded");
            return Err(DatasetError::EngineNotReady);
        };
        Ok(self.registry.remove(engine, id))
    }

    pub fn toggle_dataset(&mut self, id: &str) -> Result<Option<bool>, DatasetError> {
        let Some(engine) = self.binding.loaded_engine_mut() else {
            warn!(dataset = id, "cannot toggle dataset: map is not loaded");
            return Err(DatasetError::EngineNotReady);
        };
        self.registry.toggle(engine, id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.registry.is_active(id)
    }

    /// Mounts the dataset once `delay_ms` has passed on the session clock.
    pub fn schedule_dataset(&mut self, dataset: DatasetConfig, delay_ms: u64) -> TaskId {
        self.schedule(SessionTask::MountDataset(dataset), delay_ms)
    }

    pub fn schedule_removal(&mut self, id: impl Into<String>, delay_ms: u64) -> TaskId {
        self.schedule(SessionTask::UnmountDataset(id.into()), delay_ms)
    }

    pub fn cancel_scheduled(&mut self, id: TaskId) -> bool {
        self.tasks.cancel(id)
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn schedule(&mut self, task: SessionTask, delay_ms: u64) -> TaskId {
        let generation = self.binding.generation();
        debug!(dataset = task.dataset_id(), delay_ms, generation, "task scheduled");
        self.tasks
            .schedule(self.now_ms, delay_ms, Scheduled { generation, task })
    }

    fn run_task(&mut self, id: TaskId, scheduled: Scheduled) {
        if scheduled.generation != self.binding.generation() {
            debug!(task = id.0, "stale task dropped");
            return;
        }
        match scheduled.task {
            SessionTask::MountDataset(dataset) => {
                if let Err(e) = self.add_dataset(&dataset) {
                    error!(task = id.0, error = %e, "scheduled mount failed");
                }
            }
            SessionTask::UnmountDataset(dataset) => {
                if let Err(e) = self.remove_dataset(&dataset) {
                    error!(task = id.0, error = %e, "scheduled unmount failed");
                }
            }
        }
    }

    /// Queues the overlay and applies it as soon as the style is loaded,
    /// possibly right away. Returns whether it was applied now.
    pub fn apply_overlay(&mut self, options: OverlayOptions) -> Result<bool, DatasetError> {
        if !self.binding.is_loaded() {
            warn!("cannot apply overlay: map is not loaded yet");
            return Err(DatasetError::EngineNotReady);
        }
        let layer = options.layer_id.clone();
        self.overlay.request(options);
        let Some(engine) = self.binding.loaded_engine_mut() else {
            return Ok(false);
        };
        self.overlay
            .poll(engine)
            .map_err(|error| DatasetError::Engine {
                dataset: layer,
                error,
            })
    }

    pub fn clear_overlay(&mut self) {
        match self.binding.engine_mut() {
            Some(engine) => self.overlay.teardown(engine),
            None => self.overlay.forget(),
        }
    }

    fn poll_overlay(&mut self) {
        if !self.overlay.is_pending() {
            return;
        }
        if let Some(engine) = self.binding.loaded_engine_mut() {
            // Failures are logged by the controller.
            let _ = self.overlay.poll(engine);
        }
    }

    /// Registers the handlers on the live engine. Returns `None` while no
    /// engine is usable.
    ///
    /// Handlers already registered through an earlier attachment are not
    /// registered again; if that leaves nothing to add, the earlier
    /// attachment's id is returned.
    pub fn attach_handlers(&mut self, handlers: &InteractionHandlers) -> Option<HandlerId> {
        if self.binding.engine().is_none() {
            return None;
        }
        let fresh = handlers.without(|kind, handler| {
            self.attachments.values().any(|a| a.holds(kind, handler))
        });
        if fresh.is_empty() && !handlers.is_empty() {
            debug!("handlers already attached");
            return self
                .attachments
                .iter()
                .find(|(_, a)| handlers.iter().any(|(kind, h)| a.holds(kind, h)))
                .map(|(id, _)| *id);
        }
        let engine = self.binding.engine_mut()?;
        let attachment = attach(engine, &fresh);
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.attachments.insert(id, attachment);
        Some(id)
    }

    pub fn detach_handlers(&mut self, id: HandlerId) -> bool {
        let Some(attachment) = self.attachments.remove(&id) else {
            return false;
        };
        if let Some(engine) = self.binding.instance_mut() {
            attachment.detach(engine);
        }
        true
    }

    /// Replaces the current controls with the ones `config` asks for.
    pub fn set_controls(&mut self, config: &ControlsConfig) -> bool {
        let Some(engine) = self.binding.engine_mut() else {
            return false;
        };
        for control in self.controls.drain(..) {
            engine.remove_control(control);
        }
        for (control, corner) in config.placements() {
            engine.add_control(control, corner);
            self.controls.push(control);
        }
        true
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.binding.engine().map(|engine| engine.camera())
    }

    pub fn fly_to(&mut self, target: &CameraTarget) -> bool {
        self.move_camera(target, Transition::fly())
    }

    pub fn ease_to(&mut self, target: &CameraTarget) -> bool {
        self.move_camera(target, Transition::ease())
    }

    pub fn jump_to(&mut self, target: &CameraTarget) -> bool {
        self.move_camera(target, Transition::Jump)
    }

    pub fn move_camera(&mut self, target: &CameraTarget, transition: Transition) -> bool {
        let Some(engine) = self.binding.engine_mut() else {
            return false;
        };
        engine.move_camera(&target.to_camera_options(), transition);
        true
    }

    /// Fits the camera around `points` with the default padding and
    /// duration. An empty list does nothing.
    pub fn fit_bounds(&mut self, points: &[LngLat]) -> bool {
        self.fit_bounds_with(points, &FitBoundsOptions::default())
    }

    pub fn fit_bounds_with(&mut self, points: &[LngLat], options: &FitBoundsOptions) -> bool {
        let Some(engine) = self.binding.engine_mut() else {
            return false;
        };
        fit_to_points(engine, points, options)
    }

    /// Cancels tasks, detaches handlers, then removes the overlay, datasets
    /// and controls from the current instance. The engine stays alive.
    fn release(&mut self) {
        let cancelled = self.tasks.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "pending tasks cancelled");
        }
        self.overlay.cancel_pending();

        let Some(engine) = self.binding.instance_mut() else {
            self.attachments.clear();
            self.overlay.forget();
            self.registry.forget();
            self.controls.clear();
            return;
        };
        for (_, attachment) in std::mem::take(&mut self.attachments) {
            attachment.detach(engine);
        }
        self.overlay.teardown(engine);
        self.registry.clear(engine);
        for control in self.controls.drain(..) {
            engine.remove_control(control);
        }
        info!("session released");
    }
}

impl<B: EngineBackend> Drop for MapSession<B> {
    fn drop(&mut self) {
        self.unbind();
    }
}
