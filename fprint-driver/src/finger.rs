//! Finger-presence pipeline (spec §4.6): an ISR-side edge sink, a queue,
//! and a detection task that confirms presence and captures a feature.
//!
//! Confirmed presence plus a successful mode-specific gen-char is what
//! wakes whichever orchestrated operation (`enroll`/`verify`) is waiting
//! on [`crate::driver::Driver::wait_for_finger`]; the reg-model/search
//! that follows still belongs to that caller — the driver-level invariant
//! that only one orchestrated operation runs at a time (spec §5) means
//! there is always exactly one owner of the wire past that point, and
//! keeping those steps there avoids two tasks racing to dispatch the same
//! follow-up command.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fprint_protocol::command_table::{CommandTemplate, GEN_CHAR_BUFFER1, GEN_CHAR_BUFFER2, GET_IMAGE};
use fprint_protocol::{DEFAULT_ADDRESS, Event, EventKind, OperationMode, OutcomeBit, Packet, PacketId, StatusContext};
use tokio::sync::mpsc;

use crate::config::FingerConfig;
use crate::driver::CommandSender;
use crate::events::EventBus;
use crate::guard::OperationGuard;
use crate::state::SharedState;

/// The synchronous half a GPIO rising-edge ISR calls (spec §5 "Interrupt
/// discipline": timestamp check, presence flag check, queue-post, nothing
/// else — no allocation, no logging, no I/O).
#[derive(Clone)]
pub struct FingerEdgeSink {
    tx: mpsc::Sender<()>,
    state: Arc<SharedState>,
    debounce: Duration,
}

impl FingerEdgeSink {
    /// Called from interrupt context (or, in a hosted/CLI setting, from
    /// whatever polls the interrupt pin). Never blocks.
    pub fn notify(&self) {
        if self.state.is_validating() {
            return;
        }
        if !self.state.accept_edge(self.debounce) {
            return;
        }
        let _ = self.tx.try_send(());
    }
}

/// The detection task's half of the queue.
pub struct FingerEdgeSource {
    rx: mpsc::Receiver<()>,
}

/// Build a connected debounced edge sink/source pair (spec §5
/// "finger-detected" queue, capacity 1 — only presence, not count,
/// matters).
#[must_use]
pub fn pair(state: Arc<SharedState>, debounce: Duration) -> (FingerEdgeSink, FingerEdgeSource) {
    let (tx, rx) = mpsc::channel(1);
    (FingerEdgeSink { tx, state, debounce }, FingerEdgeSource { rx })
}

/// Drive the detection task until `source` closes: on every accepted
/// edge, try to acquire the finger-detect mutex, and confirm presence
/// with up to `config.confirm_attempts` get-image captures (spec §4.6).
pub async fn run_detection(
    mut source: FingerEdgeSource,
    sender: CommandSender,
    events: EventBus,
    state: Arc<SharedState>,
    config: FingerConfig,
) {
    while source.rx.recv().await.is_some() {
        let Ok(_detect_guard) = tokio::time::timeout(config.detect_lock_wait, state.finger_detect.lock()).await
        else {
            log::trace!("finger: could not acquire finger-detect mutex in time, dropping edge");
            continue;
        };

        if state.is_validating() {
            continue;
        }
        // Cleared on every exit path below, including an early `continue`,
        // by `OperationGuard::drop` (spec §5 "validation flag cleared on
        // every exit path").
        let _guard = OperationGuard::acquire(state.clone());
        let started = Instant::now();

        if confirm_presence(&sender, &config).await
            && capture_feature(&sender, state.operation_mode(), &config).await
        {
            state.finger_notify.notify_waiters();
            events.trigger(synthetic_event(EventKind::FingerDetected));
        }

        if started.elapsed() > config.validating_watchdog {
            log::warn!("finger: capture exceeded watchdog ceiling");
        }
    }
}

async fn confirm_presence(sender: &CommandSender, config: &FingerConfig) -> bool {
    for attempt in 0..config.confirm_attempts {
        if attempt > 0 {
            tokio::time::sleep(config.confirm_spacing).await;
        }
        let outcome = sender.dispatch(GET_IMAGE, &[], StatusContext::default(), config.confirm_wait).await;
        if matches!(outcome, Ok(outcome) if outcome.bits.contains(&OutcomeBit::Success)) {
            return true;
        }
    }
    false
}

/// Buffer 1 for every mode except the enrollment's second capture (spec
/// §4.6 "selects buffer 1 or 2 by current `OperationMode`").
#[must_use]
pub fn buffer_template_for_mode(mode: OperationMode) -> CommandTemplate {
    match mode {
        OperationMode::EnrollSecond => GEN_CHAR_BUFFER2,
        _ => GEN_CHAR_BUFFER1,
    }
}

async fn capture_feature(sender: &CommandSender, mode: OperationMode, config: &FingerConfig) -> bool {
    let outcome = sender
        .dispatch(buffer_template_for_mode(mode), &[], StatusContext::default(), config.capture_wait)
        .await;
    matches!(outcome, Ok(outcome) if outcome.bits.contains(&OutcomeBit::Success))
}

fn synthetic_event(kind: EventKind) -> Event {
    Event {
        kind,
        status: 0x00,
        opcode: fprint_protocol::command_table::Opcode::GetImage as u8,
        packet: Packet::new(DEFAULT_ADDRESS, PacketId::Ack, Some(0x00), Vec::new()),
    }
}
