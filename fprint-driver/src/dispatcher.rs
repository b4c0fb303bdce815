//! Dispatcher task (spec §4.3 "Dispatcher loop"): FIFO-correlates ACKs
//! with in-flight commands and runs the status handler (spec §4.8).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fprint_protocol::{Event, EventKind, MultiPacketResponse, PacketId, StatusContext, classify_status};
use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};

use crate::error::{DriverError, DriverResult};
use crate::events::EventBus;
use crate::state::SharedState;

/// One outbound command awaiting its ACK.
pub struct InFlightCommand {
    pub opcode: u8,
    pub ctx: StatusContext,
    pub reply_tx: oneshot::Sender<fprint_protocol::StatusOutcome>,
}

/// Bounded FIFO of in-flight commands (spec §4.3 "Command queue").
///
/// Capacity is enforced with a semaphore rather than a fixed-size ring:
/// `enqueue` acquires a permit (waiting up to `enqueue_wait`) before
/// pushing, and the dispatcher releases the permit back when it pops the
/// matching ACK.
pub struct CommandQueue {
    queue: Mutex<VecDeque<InFlightCommand>>,
    capacity: Arc<Semaphore>,
}

impl CommandQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Enqueue a command record, failing with [`DriverError::Busy`] if no
    /// slot frees up within `wait` (spec §4.3).
    pub async fn enqueue(&self, record: InFlightCommand, wait: Duration) -> DriverResult<()> {
        let permit = tokio::time::timeout(wait, self.capacity.clone().acquire_owned())
            .await
            .map_err(|_| DriverError::Busy)?
            .expect("semaphore never closed");
        permit.forget();
        self.queue.lock().await.push_back(record);
        Ok(())
    }

    async fn pop_front(&self) -> Option<InFlightCommand> {
        let record = self.queue.lock().await.pop_front();
        if record.is_some() {
            self.capacity.add_permits(1);
        }
        record
    }
}

/// Drive the dispatcher until `response_rx` closes: for every ACK packet
/// in a [`MultiPacketResponse`], correlate it with the oldest in-flight
/// command and resolve that command's outcome channel. DATA/END_DATA
/// frames and fast-path template responses are forwarded whole to
/// `template_tx`, since they are not FIFO-correlated (spec §5 "Ordering
/// guarantees").
pub async fn run_dispatcher(
    mut response_rx: mpsc::Receiver<MultiPacketResponse>,
    commands: Arc<CommandQueue>,
    events: EventBus,
    template_tx: mpsc::Sender<MultiPacketResponse>,
    post_upload_cooldown: Duration,
    state: Arc<SharedState>,
    match_cooldown: Duration,
) {
    let mut cooldown_until: Option<Instant> = None;

    while let Some(response) = response_rx.recv().await {
        if response.collecting_template {
            cooldown_until = Some(Instant::now() + post_upload_cooldown);
            let _ = template_tx.send(response).await;
            continue;
        }

        for packet in response.packets {
            if packet.packet_id != PacketId::Ack {
                let _ = template_tx
                    .send(MultiPacketResponse::single(packet))
                    .await;
                continue;
            }

            if cooldown_until.is_some_and(|until| Instant::now() < until) {
                log::trace!("dispatcher: post-upload cooldown active, dropping stray ACK");
                continue;
            }

            let Some(in_flight) = commands.pop_front().await else {
                log::warn!("dispatcher: ACK with no in-flight command, dropping");
                continue;
            };

            let status = packet.code.unwrap_or(0);
            let outcome = classify_status(in_flight.opcode, status, &packet, in_flight.ctx);

            let is_duplicate_match_echo =
                matches!(outcome.event, Some(EventKind::SearchSuccess(_))) && state.match_cooldown_active();

            if outcome.start_match_cooldown {
                state.start_match_cooldown(match_cooldown);
            }

            if is_duplicate_match_echo {
                log::trace!("dispatcher: suppressing duplicate search-success echo within match cooldown");
            } else if let Some(kind) = outcome.event.clone() {
                events.trigger(Event {
                    kind,
                    status,
                    opcode: in_flight.opcode,
                    packet: packet.clone(),
                });
            }

            let _ = in_flight.reply_tx.send(outcome);
        }
    }
}
