use std::rc::Rc;

use foundation::LngLat;
use layers::Properties;
use tracing::debug;

use crate::engine::MapEngine;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InteractionKind {
    Click,
    PointerMove,
    PointerEnter,
    PointerLeave,
    Zoom,
    Move,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 6] = [
        InteractionKind::Click,
        InteractionKind::PointerMove,
        InteractionKind::PointerEnter,
        InteractionKind::PointerLeave,
        InteractionKind::Zoom,
        InteractionKind::Move,
    ];

    /// Event name the engine uses for this interaction.
    pub fn event_name(self) -> &'static str {
        match self {
            InteractionKind::Click => "click",
            InteractionKind::PointerMove => "mousemove",
            InteractionKind::PointerEnter => "mouseenter",
            InteractionKind::PointerLeave => "mouseleave",
            InteractionKind::Zoom => "zoom",
            InteractionKind::Move => "move",
        }
    }
}

/// Payload delivered to interaction handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub lng_lat: Option<LngLat>,
    /// Screen position in pixels.
    pub point: Option<[f64; 2]>,
    /// Properties of the rendered features under the pointer, topmost first.
    pub features: Vec<Properties>,
}

impl InteractionEvent {
    pub fn new(kind: InteractionKind) -> Self {
        Self {
            kind,
            lng_lat: None,
            point: None,
            features: Vec::new(),
        }
    }

    pub fn at(mut self, lng_lat: LngLat) -> Self {
        self.lng_lat = Some(lng_lat);
        self
    }
}

pub type InteractionHandler = Rc<dyn Fn(&InteractionEvent)>;

/// Up to one handler per interaction kind.
#[derive(Clone, Default)]
pub struct InteractionHandlers {
    handlers: Vec<(InteractionKind, InteractionHandler)>,
}

impl InteractionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handler for `kind`, replacing any earlier one.
    pub fn on(self, kind: InteractionKind, f: impl Fn(&InteractionEvent) + 'static) -> Self {
        self.with_handler(kind, Rc::new(f))
    }

    pub fn with_handler(mut self, kind: InteractionKind, handler: InteractionHandler) -> Self {
        self.handlers.retain(|(k, _)| *k != kind);
        self.handlers.push((kind, handler));
        self
    }

    pub fn get(&self, kind: InteractionKind) -> Option<&InteractionHandler> {
        self.handlers.iter().find(|(k, _)| *k == kind).map(|(_, h)| h)
    }

    pub fn kinds(&self) -> Vec<InteractionKind> {
        let mut kinds: Vec<_> = self.handlers.iter().map(|(k, _)| *k).collect();
        kinds.sort();
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InteractionKind, &InteractionHandler)> {
        self.handlers.iter().map(|(k, h)| (*k, h))
    }

    /// The handlers for which `skip` returns false.
    pub fn without(
        &self,
        mut skip: impl FnMut(InteractionKind, &InteractionHandler) -> bool,
    ) -> InteractionHandlers {
        InteractionHandlers {
            handlers: self
                .handlers
                .iter()
                .filter(|(k, h)| !skip(*k, h))
                .cloned()
                .collect(),
        }
    }
}

impl std::fmt::Debug for InteractionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionHandlers")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Registrations made by [`attach`]; hand back to [`Attachment::detach`] to
/// unregister exactly those handlers.
#[must_use = "dropping an Attachment leaves its handlers registered"]
pub struct Attachment {
    registrations: Vec<(InteractionKind, InteractionHandler)>,
}

impl Attachment {
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Whether this exact handler is registered for `kind` through this
    /// attachment. Handlers compare by allocation.
    pub fn holds(&self, kind: InteractionKind, handler: &InteractionHandler) -> bool {
        self.registrations
            .iter()
            .any(|(k, h)| *k == kind && std::ptr::addr_eq(Rc::as_ptr(h), Rc::as_ptr(handler)))
    }

    pub fn detach<E: MapEngine + ?Sized>(self, engine: &mut E) {
        for (kind, handler) in &self.registrations {
            engine.off(*kind, handler);
        }
        debug!(count = self.registrations.len(), "interaction handlers detached");
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<_> = self.registrations.iter().map(|(k, _)| *k).collect();
        f.debug_struct("Attachment").field("kinds", &kinds).finish()
    }
}

/// Registers every present handler on the engine.
pub fn attach<E: MapEngine + ?Sized>(engine: &mut E, handlers: &InteractionHandlers) -> Attachment {
    let mut registrations = Vec::new();
    for kind in InteractionKind::ALL {
        if let Some(handler) = handlers.get(kind) {
            engine.on(kind, handler);
            registrations.push((kind, handler.clone()));
        }
    }
    debug!(count = registrations.len(), "interaction handlers attached");
    Attachment { registrations }
}
