//! Reader task (spec §4.3 "Reader loop"): repeatedly invokes the parser
//! and routes what comes out to the dispatcher or the template channel.

use std::time::Instant;

use fprint_protocol::{MultiPacketResponse, PacketParser, ParserConfig};
use tokio::sync::mpsc;

use crate::transport::TransportReader;

/// Drive `reader` until it closes, feeding every chunk read into a
/// [`PacketParser`] and forwarding completed [`MultiPacketResponse`]s to
/// `response_tx`. `note_rx` carries opcodes the sender side has just
/// dispatched, so the parser's template-stream fast path knows an
/// upload is in progress (spec §4.2).
pub async fn run_reader(
    mut reader: Box<dyn TransportReader>,
    parser_config: ParserConfig,
    response_tx: mpsc::Sender<MultiPacketResponse>,
    mut note_rx: mpsc::UnboundedReceiver<u8>,
) {
    let mut parser = PacketParser::new(parser_config);
    let start = Instant::now();
    let mut buf = [0u8; 256];

    loop {
        while let Ok(opcode) = note_rx.try_recv() {
            parser.note_command_sent(opcode);
        }

        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                log::debug!("reader: transport closed");
                return;
            }
            Ok(n) => n,
            Err(error) => {
                log::warn!("reader: transport error: {error}");
                return;
            }
        };

        let now = start.elapsed();
        if let Some(response) = parser.feed(&buf[..n], now) {
            if response_tx.send(response).await.is_err() {
                log::debug!("reader: dispatcher gone, stopping");
                return;
            }
        }
    }
}
