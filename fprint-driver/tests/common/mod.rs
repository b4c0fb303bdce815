//! Shared harness: a loopback transport pair plus a hand-rolled fake
//! sensor that decodes outbound commands, so a test can script ACK/Data
//! replies in the exact order the driver expects them rather than
//! racing the dispatcher's FIFO correlation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fprint_driver::transport::{loopback, TransportReader};
use fprint_driver::{Driver, DriverConfig};
use fprint_protocol::{DEFAULT_ADDRESS, Packet, PacketId, PacketParser, ParserConfig};
use tokio::sync::mpsc;

pub struct Harness {
    pub driver: Arc<Driver>,
    commands: mpsc::UnboundedReceiver<Packet>,
    sensor_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Harness {
    /// Wait for the next frame the driver writes to the transport,
    /// decoded (a `Command`, or a raw `Data`/`EndData` chunk).
    pub async fn next_command(&mut self) -> Packet {
        tokio::time::timeout(Duration::from_secs(1), self.commands.recv())
            .await
            .expect("driver should have sent a frame within 1s")
            .expect("outbound frame channel closed")
    }

    pub fn respond_ack(&self, status: u8, params: &[u8]) {
        self.push(PacketId::Ack, Some(status), params);
    }

    pub fn respond_data(&self, params: &[u8]) {
        self.push(PacketId::Data, None, params);
    }

    pub fn respond_end_data(&self, params: &[u8]) {
        self.push(PacketId::EndData, None, params);
    }

    fn push(&self, packet_id: PacketId, code: Option<u8>, params: &[u8]) {
        let mut packet = Packet::new(DEFAULT_ADDRESS, packet_id, code, params.to_vec());
        packet.checksum = packet.compute_checksum();
        self.sensor_tx
            .send(packet.encode())
            .expect("driver's reader half was dropped");
    }
}

/// Short timeouts throughout so a hung exchange fails the test quickly
/// instead of the default (multi-second) production tuning.
pub fn test_config() -> DriverConfig {
    let mut config = DriverConfig::default();
    config.enqueue_wait = Duration::from_millis(200);
    config.steps.no_finger_confirm_window = Duration::from_millis(500);
    config.finger.detect_lock_wait = Duration::from_millis(200);
    config.finger.confirm_spacing = Duration::from_millis(5);
    config.finger.confirm_wait = Duration::from_millis(200);
    config.finger.poll_fallback = Duration::from_millis(300);
    config
}

pub fn spawn() -> Harness {
    spawn_with(test_config())
}

pub fn spawn_with(config: DriverConfig) -> Harness {
    let (driver_writer, mut outbound) = loopback::pair();
    let (sensor_writer, driver_reader) = loopback::pair();
    let sensor_tx = sensor_writer.sender();

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut parser = PacketParser::new(ParserConfig::default());
        let start = Instant::now();
        let mut buf = [0u8; 256];
        loop {
            match outbound.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    if let Some(response) = parser.feed(&buf[..n], start.elapsed()) {
                        for packet in response.packets {
                            if commands_tx.send(packet).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    });

    let driver = Arc::new(Driver::new(Box::new(driver_reader), Box::new(driver_writer), config));
    Harness {
        driver,
        commands: commands_rx,
        sensor_tx,
    }
}
