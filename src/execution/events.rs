//! Executor events
//!
//! Listeners are registered per executor. When a request is dispatched the
//! registry is snapshotted into an [`EventEmitter`] whose events are queued
//! on a channel and delivered by a separate task, so a handler never runs
//! inside the call that raised the event and never blocks it. A single
//! delivery task per dispatch keeps events in emission order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Named events an executor can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Progress,
}

/// Transfer direction of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDirection {
    Upload,
    Download,
}

/// Bytes transferred so far. `total` is 0 when the size is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub direction: ProgressDirection,
    pub loaded: u64,
    pub total: u64,
}

impl ProgressEvent {
    pub fn upload(loaded: u64, total: u64) -> Self {
        Self {
            direction: ProgressDirection::Upload,
            loaded,
            total,
        }
    }

    pub fn download(loaded: u64, total: u64) -> Self {
        Self {
            direction: ProgressDirection::Download,
            loaded,
            total,
        }
    }

    /// Completion percentage when the total is known.
    pub fn percent(&self) -> Option<f64> {
        (self.total > 0).then(|| self.loaded as f64 / self.total as f64 * 100.0)
    }
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Progress(ProgressEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Progress(_) => EventKind::Progress,
        }
    }
}

/// Event listener. Identity (for `off`) is the `Arc` pointer.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Per-executor listener registry.
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: HashMap<EventKind, Vec<EventHandler>>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventHandlers")
            .field("handlers", &counts)
            .finish()
    }
}

impl EventHandlers {
    pub fn on(&mut self, kind: EventKind, handler: EventHandler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Remove `handler`, or every handler for `kind` when `None`.
    pub fn off(&mut self, kind: EventKind, handler: Option<&EventHandler>) {
        let Some(registered) = self.handlers.get_mut(&kind) else {
            return;
        };
        match handler {
            Some(handler) => registered.retain(|h| !Arc::ptr_eq(h, handler)),
            None => registered.clear(),
        }
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.handlers.get(&kind).is_some_and(|h| !h.is_empty())
    }

    pub fn len(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Snapshot the registry into an emitter for one dispatch.
    ///
    /// Spawns the delivery task, so this must be called within a Tokio
    /// runtime when any listener is registered.
    pub fn emitter(&self) -> EventEmitter {
        if self.handlers.values().all(Vec::is_empty) {
            return EventEmitter::disabled();
        }
        let handlers = self.handlers.clone();
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Some(listeners) = handlers.get(&event.kind()) {
                    for listener in listeners {
                        listener(&event);
                    }
                }
            }
        });
        EventEmitter {
            tx: Some(tx),
            kinds: self
                .handlers
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, _)| *k)
                .collect(),
        }
    }
}

/// Sending half handed to transports. Emitting never blocks.
#[derive(Clone, Debug, Default)]
pub struct EventEmitter {
    tx: Option<mpsc::UnboundedSender<Event>>,
    kinds: Vec<EventKind>,
}

impl EventEmitter {
    /// Emitter that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.tx.is_some() && self.kinds.contains(&kind)
    }

    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.tx
            && self.kinds.contains(&event.kind())
        {
            // Receiver only goes away with the runtime.
            let _ = tx.send(event);
        }
    }

    pub fn progress(&self, event: ProgressEvent) {
        self.emit(Event::Progress(event));
    }
}
