//! Shared mutable state touched by both async tasks and the
//! synchronous, ISR-adjacent [`crate::finger::FingerEdgeSink::notify`]
//! (spec §5 "Shared state", "the few ISR-visible fields must be
//! atomic").

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use fprint_protocol::OperationMode;
use tokio::sync::Mutex as AsyncMutex;

/// State shared between the operation orchestrator and the finger-edge
/// detection task.
pub struct SharedState {
    /// Set for the duration of a presence-confirmation capture; read from
    /// the (synchronous) ISR-side `notify()` to suppress posts while a
    /// capture is already underway (spec §5).
    pub is_validating: AtomicBool,
    /// Milliseconds since `start` of the last accepted finger edge, for
    /// the ISR-side debounce check. `u64::MAX` means "no edge yet".
    last_edge_millis: AtomicU64,
    /// Current operation mode (spec §3 `OperationMode`), read by the
    /// detection task to choose which character buffer to target.
    pub operation_mode: StdMutex<OperationMode>,
    /// The "finger-detect" mutex from spec §5: only one capture attempt
    /// runs at a time.
    pub finger_detect: AsyncMutex<()>,
    /// Woken by the detection task on every confirmed presence, for
    /// [`crate::driver::Driver::wait_for_finger`]'s event-driven path.
    pub finger_notify: tokio::sync::Notify,
    /// Set by the dispatcher on a positive search match (spec §4.8
    /// "start match-cooldown (1 s) to suppress duplicate echoes"),
    /// reset at the start of `verify` (spec §4.5).
    match_cooldown_until: StdMutex<Option<std::time::Instant>>,
    start: std::time::Instant,
}

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            is_validating: AtomicBool::new(false),
            last_edge_millis: AtomicU64::new(u64::MAX),
            operation_mode: StdMutex::new(OperationMode::default()),
            finger_detect: AsyncMutex::new(()),
            finger_notify: tokio::sync::Notify::new(),
            match_cooldown_until: StdMutex::new(None),
            start: std::time::Instant::now(),
        }
    }

    /// ISR-side debounce check: accept the edge and update the
    /// timestamp, or reject it as a bounce (spec §5 "debounce 300 ms").
    pub fn accept_edge(&self, debounce: Duration) -> bool {
        let now_millis = self.start.elapsed().as_millis() as u64;
        let previous = self.last_edge_millis.load(Ordering::Acquire);
        if previous != u64::MAX && now_millis.saturating_sub(previous) < debounce.as_millis() as u64 {
            return false;
        }
        self.last_edge_millis.store(now_millis, Ordering::Release);
        true
    }

    #[must_use]
    pub fn is_validating(&self) -> bool {
        self.is_validating.load(Ordering::Acquire)
    }

    pub fn set_validating(&self, value: bool) {
        self.is_validating.store(value, Ordering::Release);
    }

    #[must_use]
    pub fn operation_mode(&self) -> OperationMode {
        *self.operation_mode.lock().expect("operation_mode mutex poisoned")
    }

    pub fn set_operation_mode(&self, mode: OperationMode) {
        *self.operation_mode.lock().expect("operation_mode mutex poisoned") = mode;
    }

    pub fn start_match_cooldown(&self, duration: Duration) {
        *self.match_cooldown_until.lock().expect("match_cooldown mutex poisoned") =
            Some(std::time::Instant::now() + duration);
    }

    pub fn reset_match_cooldown(&self) {
        *self.match_cooldown_until.lock().expect("match_cooldown mutex poisoned") = None;
    }

    #[must_use]
    pub fn match_cooldown_active(&self) -> bool {
        self.match_cooldown_until
            .lock()
            .expect("match_cooldown mutex poisoned")
            .is_some_and(|until| std::time::Instant::now() < until)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
