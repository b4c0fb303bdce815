//! The `Driver` facade: wires the reader, dispatcher, and finger-detection
//! tasks together behind the host-side API surface of spec §6.

use std::sync::Arc;
use std::time::Duration;

use fprint_protocol::command_table::CommandTemplate;
use fprint_protocol::{MultiPacketResponse, OperationMode, Packet, ParserConfig, StatusContext, StatusOutcome};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::DriverConfig;
use crate::dispatcher::{CommandQueue, InFlightCommand, run_dispatcher};
use crate::error::{DriverError, DriverResult};
use crate::events::EventBus;
use crate::finger::{self, FingerEdgeSink};
use crate::reader::run_reader;
use crate::state::SharedState;
use crate::transport::{PowerControl, TransportReader, TransportWriter};

/// Everything needed to send one command and wait for its correlated ACK;
/// cheap to clone (every field is an `Arc` or a plain value) so both
/// orchestrated operations and the finger-detection task can hold one.
#[derive(Clone)]
pub struct CommandSender {
    writer: Arc<AsyncMutex<Box<dyn TransportWriter>>>,
    commands: Arc<CommandQueue>,
    note_tx: mpsc::UnboundedSender<u8>,
    address: u32,
    enqueue_wait: Duration,
}

impl CommandSender {
    /// Instantiate `template` with `params`, enqueue it, write it to the
    /// transport, and wait up to `timeout` for its ACK (spec §4.3, §4.5).
    ///
    /// Ordering matters here: the command is enqueued, then the parser is
    /// notified of the opcode, then the bytes go on the wire — mirroring
    /// spec §5's "`last_sent_command` is updated ... immediately before
    /// UART write".
    pub async fn dispatch(
        &self,
        template: CommandTemplate,
        params: &[u8],
        ctx: StatusContext,
        timeout: Duration,
    ) -> DriverResult<StatusOutcome> {
        let packet = template.instantiate(self.address, params);
        self.send_and_await(packet, template.opcode as u8, ctx, timeout).await
    }

    /// Send a pre-built `Data`/`EndData` frame (spec §4.5 `restore`'s
    /// chunked `DownChar` payload) and wait for its ACK, correlated under
    /// `opcode_ctx` since these frames carry no opcode of their own (spec
    /// §4.8: the status handler keys by "the opcode of the most recent
    /// outbound command", which for a chunk is still `DownChar`).
    pub async fn dispatch_raw(
        &self,
        packet: Packet,
        opcode_ctx: u8,
        ctx: StatusContext,
        timeout: Duration,
    ) -> DriverResult<StatusOutcome> {
        self.send_and_await(packet, opcode_ctx, ctx, timeout).await
    }

    async fn send_and_await(
        &self,
        packet: Packet,
        opcode: u8,
        ctx: StatusContext,
        timeout: Duration,
    ) -> DriverResult<StatusOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            // Hold the writer lock across enqueue + write so two tasks
            // dispatching concurrently (e.g. the orchestrator and the
            // finger-detection task) cannot interleave their enqueue/write
            // pairs and break the FIFO correlation invariant (spec §5).
            let mut writer = self.writer.lock().await;
            self.commands
                .enqueue(InFlightCommand { opcode, ctx, reply_tx }, self.enqueue_wait)
                .await?;
            let _ = self.note_tx.send(opcode);
            writer.write_all(&packet.encode()).await?;
        }

        tokio::time::timeout(timeout, reply_rx)
            .await
            .map_err(|_| DriverError::Timeout)?
            .map_err(|_| DriverError::TransportClosed)
    }

    #[must_use]
    pub fn address(&self) -> u32 {
        self.address
    }
}

/// The fingerprint-sensor driver (spec §6 "host-side API surface").
///
/// Owns no pins: `init`'s `tx_pin`/`rx_pin`/`int_pin`/`baud` parameters map
/// to whatever [`crate::transport::TransportReader`] /
/// [`crate::transport::TransportWriter`] the caller constructs (a
/// `tokio-serial` port for real hardware, the loopback pair for tests) and
/// to [`DriverConfig`]; `power_pin`/`power(on|off)` map to an optional
/// [`crate::transport::PowerControl`] installed via
/// [`Driver::with_power_control`] — without one, `power()` fails with
/// [`DriverError::PowerControlUnavailable`] rather than silently no-op'ing.
pub struct Driver {
    sender: CommandSender,
    events: EventBus,
    state: Arc<SharedState>,
    template_rx: AsyncMutex<mpsc::Receiver<MultiPacketResponse>>,
    finger_sink: FingerEdgeSink,
    power: Option<AsyncMutex<Box<dyn PowerControl>>>,
    config: DriverConfig,
    reader_task: JoinHandle<()>,
    dispatcher_task: JoinHandle<()>,
    detection_task: JoinHandle<()>,
}

impl Driver {
    /// Spawn the reader, dispatcher, and finger-detection tasks over the
    /// given transport halves.
    #[must_use]
    pub fn new(
        reader: Box<dyn TransportReader>,
        writer: Box<dyn TransportWriter>,
        config: DriverConfig,
    ) -> Self {
        let (response_tx, response_rx) = mpsc::channel(config.response_queue_capacity);
        let (template_tx, template_rx) = mpsc::channel(config.response_queue_capacity);
        let (note_tx, note_rx) = mpsc::unbounded_channel();

        let commands = Arc::new(CommandQueue::new(config.command_queue_capacity));
        let events = EventBus::new();
        let state = Arc::new(SharedState::new());

        let reader_task = tokio::spawn(run_reader(reader, ParserConfig::default(), response_tx, note_rx));
        let dispatcher_task = tokio::spawn(run_dispatcher(
            response_rx,
            commands.clone(),
            events.clone(),
            template_tx,
            config.post_upload_cooldown,
            state.clone(),
            config.match_cooldown,
        ));

        let sender = CommandSender {
            writer: Arc::new(AsyncMutex::new(writer)),
            commands,
            note_tx,
            address: config.address,
            enqueue_wait: config.enqueue_wait,
        };

        let (finger_sink, finger_source) = finger::pair(state.clone(), config.finger.debounce);
        let detection_task = tokio::spawn(finger::run_detection(
            finger_source,
            sender.clone(),
            events.clone(),
            state.clone(),
            config.finger,
        ));

        Self {
            sender,
            events,
            state,
            template_rx: AsyncMutex::new(template_rx),
            finger_sink,
            power: None,
            config,
            reader_task,
            dispatcher_task,
            detection_task,
        }
    }

    /// Install a power-rail collaborator (spec §6 `init`'s `power_pin`);
    /// without one, [`Driver::power`] fails rather than silently doing
    /// nothing.
    #[must_use]
    pub fn with_power_control(mut self, power: Box<dyn PowerControl>) -> Self {
        self.power = Some(AsyncMutex::new(power));
        self
    }

    /// Toggle the sensor's power rail (spec §6 `power(on|off)`) through
    /// whatever [`crate::transport::PowerControl`] was installed via
    /// [`Driver::with_power_control`].
    pub async fn power(&self, on: bool) -> DriverResult<()> {
        let power = self.power.as_ref().ok_or(DriverError::PowerControlUnavailable)?;
        power.lock().await.set_power(on).await?;
        Ok(())
    }

    /// Install the single event callback (spec §4.8 `register_handler`).
    pub fn set_event_handler<F>(&self, handler: F)
    where
        F: Fn(fprint_protocol::Event) + Send + Sync + 'static,
    {
        self.events.register_handler(handler);
    }

    /// The ISR-side edge sink for wiring to a real GPIO interrupt (or a
    /// test harness) outside this crate.
    #[must_use]
    pub fn finger_sink(&self) -> FingerEdgeSink {
        self.finger_sink.clone()
    }

    /// Switch which buffer the finger-detection task's automatic gen-char
    /// targets (spec §4.6 "selects buffer 1 or 2 by current
    /// `OperationMode`").
    pub fn set_operation_mode(&self, mode: OperationMode) {
        self.state.set_operation_mode(mode);
    }

    pub(crate) fn sender(&self) -> &CommandSender {
        &self.sender
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub(crate) fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub(crate) async fn recv_template(&self) -> Option<MultiPacketResponse> {
        self.template_rx.lock().await.recv().await
    }

    /// Wait for a finger to be detected (spec §4.6 `wait_for_finger`): the
    /// fast path wakes on the detection task's notification; the slow
    /// path independently polls get-image every `poll_fallback` to
    /// recover from a missed interrupt.
    pub async fn wait_for_finger(&self, timeout: Duration) -> DriverResult<()> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(DriverError::Timeout);
            }
            let poll_wait = (deadline - now).min(self.config.finger.poll_fallback);

            tokio::select! {
                () = self.state.finger_notify.notified() => return Ok(()),
                () = tokio::time::sleep(poll_wait) => {
                    let outcome = self
                        .sender
                        .dispatch(
                            fprint_protocol::command_table::GET_IMAGE,
                            &[],
                            StatusContext::default(),
                            self.config.finger.confirm_wait,
                        )
                        .await;
                    if !matches!(outcome, Ok(o) if o.bits.contains(&fprint_protocol::OutcomeBit::Success)) {
                        continue;
                    }
                    // Mirror the detection task's own capture step (spec
                    // §4.6) so a poll-fallback detection is just as good as
                    // an interrupt-driven one by the time this returns.
                    let template = finger::buffer_template_for_mode(self.state.operation_mode());
                    let gen_char = self
                        .sender
                        .dispatch(template, &[], StatusContext::default(), self.config.finger.capture_wait)
                        .await;
                    if matches!(gen_char, Ok(o) if o.bits.contains(&fprint_protocol::OutcomeBit::Success)) {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.dispatcher_task.abort();
        self.detection_task.abort();
    }
}
