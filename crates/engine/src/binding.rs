use runtime::SignalBus;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::engine::{EngineBackend, EngineSignal, MapEngine};
use crate::error::MapError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingState {
    Idle,
    Loading,
    Loaded,
    Error,
}

impl LoadingState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadingState::Idle => "idle",
            LoadingState::Loading => "loading",
            LoadingState::Loaded => "loaded",
            LoadingState::Error => "error",
        }
    }
}

enum Phase<E> {
    Idle,
    Loading(E),
    Loaded(E),
    /// `engine` is kept when construction succeeded so it can still be
    /// destroyed; `ready` records whether it ever reported ready.
    Failed {
        engine: Option<E>,
        ready: bool,
        error: MapError,
    },
}

/// Owns at most one engine instance for one container.
///
/// Lifecycle signals from the engine are queued and applied by [`pump`],
/// never from inside the engine's callback.
///
/// [`pump`]: EngineBinding::pump
pub struct EngineBinding<B: EngineBackend> {
    backend: B,
    bound: Option<(B::Container, EngineConfig)>,
    phase: Phase<B::Engine>,
    signals: SignalBus<EngineSignal>,
    generation: u64,
}

impl<B: EngineBackend> EngineBinding<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            bound: None,
            phase: Phase::Idle,
            signals: SignalBus::new(),
            generation: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> LoadingState {
        match self.phase {
            Phase::Idle => LoadingState::Idle,
            Phase::Loading(_) => LoadingState::Loading,
            Phase::Loaded(_) => LoadingState::Loaded,
            Phase::Failed { .. } => LoadingState::Error,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.phase, Phase::Loaded(_))
    }

    pub fn error(&self) -> Option<&MapError> {
        match &self.phase {
            Phase::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Bumped every time a new engine instance is constructed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> Option<&EngineConfig> {
        self.bound.as_ref().map(|(_, config)| config)
    }

    pub fn container(&self) -> Option<&B::Container> {
        self.bound.as_ref().map(|(container, _)| container)
    }

    /// The engine, once it has reported ready. An instance that failed after
    /// becoming ready stays reachable.
    pub fn engine(&self) -> Option<&B::Engine> {
        match &self.phase {
            Phase::Loaded(engine) => Some(engine),
            Phase::Failed {
                engine: Some(engine),
                ready: true,
                ..
            } => Some(engine),
            _ => None,
        }
    }

    pub fn engine_mut(&mut self) -> Option<&mut B::Engine> {
        match &mut self.phase {
            Phase::Loaded(engine) => Some(engine),
            Phase::Failed {
                engine: Some(engine),
                ready: true,
                ..
            } => Some(engine),
            _ => None,
        }
    }

    /// The engine only while loaded; dataset work is refused after an error.
    pub fn loaded_engine_mut(&mut self) -> Option<&mut B::Engine> {
        match &mut self.phase {
            Phase::Loaded(engine) => Some(engine),
            _ => None,
        }
    }

    /// Any constructed instance regardless of readiness. Teardown only.
    pub fn instance_mut(&mut self) -> Option<&mut B::Engine> {
        match &mut self.phase {
            Phase::Loading(engine) | Phase::Loaded(engine) => Some(engine),
            Phase::Failed { engine, .. } => engine.as_mut(),
            Phase::Idle => None,
        }
    }

    pub fn has_instance(&self) -> bool {
        match &self.phase {
            Phase::Loading(_) | Phase::Loaded(_) => true,
            Phase::Failed { engine, .. } => engine.is_some(),
            Phase::Idle => false,
        }
    }

    /// Constructs an engine for `container`. Binding again with an equal
    /// container and config is a no-op; anything else replaces the current
    /// instance.
    pub fn bind(&mut self, container: &B::Container, config: &EngineConfig) -> LoadingState {
        if let Some((bound_container, bound_config)) = &self.bound {
            if bound_container == container && bound_config == config {
                debug!(?container, "already bound");
                return self.state();
            }
            info!(?container, "configuration changed, rebuilding engine");
            self.unbind();
        }
        self.bound = Some((container.clone(), config.clone()));

        if let Err(e) = config.validate() {
            warn!(error = %e, "engine configuration rejected");
            self.phase = Phase::Failed {
                engine: None,
                ready: false,
                error: MapError::config_validation(&e),
            };
            return self.state();
        }

        self.signals = SignalBus::new();
        let options = config.engine_options();
        match self.backend.create(container, &options, self.signals.sender()) {
            Ok(engine) => {
                self.generation += 1;
                info!(generation = self.generation, style = %options.style_url, "engine constructed");
                self.phase = Phase::Loading(engine);
            }
            Err(message) => {
                error!(%message, "engine construction failed");
                self.phase = Phase::Failed {
                    engine: None,
                    ready: false,
                    error: MapError::engine_init(message),
                };
            }
        }
        self.state()
    }

    /// Applies queued engine signals and returns them in arrival order.
    pub fn pump(&mut self) -> Vec<EngineSignal> {
        let signals = self.signals.drain();
        for signal in &signals {
            let phase = std::mem::replace(&mut self.phase, Phase::Idle);
            self.phase = match (phase, signal) {
                (Phase::Loading(engine), EngineSignal::Ready) => {
                    info!(generation = self.generation, "engine ready");
                    Phase::Loaded(engine)
                }
                (
                    Phase::Failed {
                        engine: Some(engine),
                        error,
                        ..
                    },
                    EngineSignal::Ready,
                ) => Phase::Failed {
                    engine: Some(engine),
                    ready: true,
                    error,
                },
                (Phase::Loading(engine), EngineSignal::Error { message, code }) => {
                    let error = MapError::engine_runtime(message.clone(), code.clone());
                    error!(%error, "engine failed while loading");
                    Phase::Failed {
                        engine: Some(engine),
                        ready: false,
                        error,
                    }
                }
                (Phase::Loaded(engine), EngineSignal::Error { message, code }) => {
                    let error = MapError::engine_runtime(message.clone(), code.clone());
                    error!(%error, "engine reported an error");
                    Phase::Failed {
                        engine: Some(engine),
                        ready: true,
                        error,
                    }
                }
                (Phase::Failed { engine, ready, .. }, EngineSignal::Error { message, code }) => {
                    let error = MapError::engine_runtime(message.clone(), code.clone());
                    error!(%error, "engine reported another error");
                    Phase::Failed {
                        engine,
                        ready,
                        error,
                    }
                }
                (phase, _) => phase,
            };
        }
        signals
    }

    /// Destroys the current instance, if any, and returns to idle. Returns
    /// whether an instance was destroyed.
    pub fn unbind(&mut self) -> bool {
        self.bound = None;
        self.signals = SignalBus::new();
        let engine = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Loading(engine) | Phase::Loaded(engine) => Some(engine),
            Phase::Failed { engine, .. } => engine,
            Phase::Idle => None,
        };
        match engine {
            Some(mut engine) => {
                engine.destroy();
                info!(generation = self.generation, "engine destroyed");
                true
            }
            None => false,
        }
    }
}

impl<B: EngineBackend> Drop for EngineBinding<B> {
    fn drop(&mut self) {
        self.unbind();
    }
}
