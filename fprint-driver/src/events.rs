//! Event bus: a single registered callback, invoked from the dispatcher
//! task (spec §4.8 "register_handler(fn) installs a single callback;
//! trigger(event) invokes it if set").

use std::sync::{Arc, Mutex};

use fprint_protocol::Event;

type Handler = dyn Fn(Event) + Send + Sync;

/// Thread-safe single-slot event callback registry.
#[derive(Clone, Default)]
pub struct EventBus {
    handler: Arc<Mutex<Option<Box<Handler>>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the callback, replacing any previously registered one.
    pub fn register_handler<F>(&self, handler: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        *self.handler.lock().expect("event bus mutex poisoned") = Some(Box::new(handler));
    }

    /// Remove the registered callback, if any.
    pub fn clear_handler(&self) {
        *self.handler.lock().expect("event bus mutex poisoned") = None;
    }

    /// Invoke the callback with `event`, if one is registered.
    pub fn trigger(&self, event: Event) {
        if let Some(handler) = self.handler.lock().expect("event bus mutex poisoned").as_ref() {
            handler(event);
        }
    }
}
