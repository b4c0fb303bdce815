//! Resumable byte-stream packet parser (spec §4.2).
//!
//! [`PacketParser`] owns a scan buffer and a small amount of in-flight
//! frame state; [`PacketParser::feed`] can be called with however many
//! bytes a transport read produced — a handful, a whole frame, several
//! frames, or half a header — and picks up where the last call left off.

use core::time::Duration;

use alloc::vec::Vec;

use crate::command_table::Opcode;
use crate::packet::{DEFAULT_ADDRESS, HEADER, MAX_PARAMETERS, Packet, PacketId};
use crate::response::MultiPacketResponse;

#[cfg(not(feature = "log"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}
#[cfg(feature = "log")]
macro_rules! trace_log {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

/// Stuck-header recovery: a buffer of ≤2 bytes that hasn't grown in this
/// long is discarded (spec §4.2 invariant (a)).
pub const STUCK_BUFFER_TIMEOUT: Duration = Duration::from_secs(2);
/// No-progress recovery: if the state machine hasn't advanced in this
/// long, resync to the next header or give up and drop the buffer (spec
/// §4.2 invariant (b)).
pub const NO_PROGRESS_TIMEOUT: Duration = Duration::from_secs(10);
/// Minimum buffered bytes before the template-stream fast path starts
/// looking for an end marker (spec §4.2).
pub const FAST_PATH_MIN_BYTES: usize = 100;
/// Buffer size beyond which the fast path fires unconditionally (spec
/// §4.2).
pub const FAST_PATH_FORCE_BYTES: usize = 400;
/// Once the fast path has fired for an upload, it will not fire again
/// for this long (spec §4.2 "local latch").
pub const FOOF_LATCH_COOLDOWN: Duration = Duration::from_secs(5);

const FOOF_MARKER: [u8; 4] = *b"FOOF";

/// Tunables for [`PacketParser`] (spec §4.2 "checksum policy").
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    /// When `true`, a checksum mismatch causes the frame to be dropped
    /// (logged) rather than delivered with its on-wire checksum intact.
    /// Defaults to `false`: the sensor is known to emit frames whose
    /// declared length straddles a logical boundary, and rejecting them
    /// loses templates (spec §4.2).
    pub strict_checksum: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            strict_checksum: false,
        }
    }
}

/// Logical phase of frame assembly (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    WaitHeader,
    ReadAddress,
    ReadPacketId,
    ReadLength,
    ReadContent,
    ReadChecksum,
}

/// Resumable frame decoder plus the template-stream fast path and
/// defensive-recovery invariants of spec §4.2.
#[derive(Debug)]
pub struct PacketParser {
    config: ParserConfig,
    state: ParserState,
    buf: Vec<u8>,

    address: u32,
    packet_id: Option<PacketId>,
    length: u16,
    code: Option<u8>,
    parameters: Vec<u8>,

    /// Opcode of the most recently sent command (spec §4.2/§4.3
    /// "last_sent_command"), used to gate the template-stream fast path
    /// and the truncated-DATA recovery invariant.
    last_sent_opcode: Option<u8>,

    last_progress: Duration,
    stuck_since: Option<(usize, Duration)>,
    fast_path_latched_until: Option<Duration>,
}

impl PacketParser {
    #[must_use]
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            state: ParserState::WaitHeader,
            buf: Vec::with_capacity(256),
            address: DEFAULT_ADDRESS,
            packet_id: None,
            length: 0,
            code: None,
            parameters: Vec::new(),
            last_sent_opcode: None,
            last_progress: Duration::ZERO,
            stuck_since: None,
            fast_path_latched_until: None,
        }
    }

    /// Record the opcode of a command as it is sent (spec §4.2/§4.3): the
    /// template-stream fast path only engages after an `UpChar`.
    pub fn note_command_sent(&mut self, opcode: u8) {
        self.last_sent_opcode = Some(opcode);
        self.fast_path_latched_until = None;
    }

    fn uploading(&self) -> bool {
        self.last_sent_opcode == Some(Opcode::UpChar as u8)
    }

    /// Feed freshly-read bytes into the parser and drive the state
    /// machine forward. `now` is a caller-supplied monotonic timestamp
    /// (elapsed since an arbitrary epoch); the parser never reads a clock
    /// itself, so it stays pure and `no_std`-friendly.
    ///
    /// Returns `Some` once at least one packet (natural or
    /// fast-path-synthesized) has been assembled from the buffered bytes;
    /// `None` means "keep feeding, nothing is ready yet".
    pub fn feed(&mut self, bytes: &[u8], now: Duration) -> Option<MultiPacketResponse> {
        self.buf.extend_from_slice(bytes);

        self.apply_stuck_buffer_recovery(now);

        let mut response = MultiPacketResponse::default();
        while let Some(outcome) = self.advance_once(now) {
            match outcome {
                Advance::Packet(packet) => {
                    self.last_progress = now;
                    response.packets.push(packet);
                }
                Advance::Progressed => {
                    self.last_progress = now;
                }
            }
        }

        self.apply_no_progress_recovery(now, &mut response);
        self.apply_template_fast_path(now, &mut response);

        if response.packets.is_empty() && !response.collecting_template {
            None
        } else {
            Some(response)
        }
    }

    /// Invariant (a): a buffer of ≤2 bytes that hasn't changed size in
    /// over [`STUCK_BUFFER_TIMEOUT`] is almost certainly noise (a lone
    /// stray byte that will never become a header); clear it.
    fn apply_stuck_buffer_recovery(&mut self, now: Duration) {
        if self.buf.len() > 2 {
            self.stuck_since = None;
            return;
        }
        match self.stuck_since {
            Some((len, since)) if len == self.buf.len() => {
                if now.saturating_sub(since) > STUCK_BUFFER_TIMEOUT {
                    trace_log!("parser: clearing stuck {}-byte buffer", self.buf.len());
                    self.buf.clear();
                    self.stuck_since = None;
                }
            }
            _ => self.stuck_since = Some((self.buf.len(), now)),
        }
    }

    /// Invariant (b): resync to the next header, or give up, if the
    /// state machine has been stuck mid-frame for over
    /// [`NO_PROGRESS_TIMEOUT`]. Invariant (c) is folded in here: a stuck
    /// `ReadContent` for a `Data` packet mid-upload instead emits a
    /// truncated packet with the bytes collected so far.
    fn apply_no_progress_recovery(&mut self, now: Duration, response: &mut MultiPacketResponse) {
        if self.state == ParserState::WaitHeader {
            return;
        }
        if now.saturating_sub(self.last_progress) <= NO_PROGRESS_TIMEOUT {
            return;
        }

        if self.state == ParserState::ReadContent
            && self.packet_id == Some(PacketId::Data)
            && self.uploading()
        {
            // Invariant (c): whatever content bytes arrived before the
            // upload stalled, not the (not-yet-populated) `parameters`
            // field, which only gets written once a full frame decodes.
            let available = self.buf.len();
            trace_log!("parser: emitting truncated DATA packet, {available} bytes available");
            let mut truncated = Packet::new(self.address, PacketId::Data, None, self.buf.clone());
            truncated.checksum = truncated.compute_checksum();
            response.packets.push(truncated);
            self.buf.clear();
            self.reset_frame();
            self.last_progress = now;
            return;
        }

        trace_log!("parser: no progress for >{NO_PROGRESS_TIMEOUT:?}, resyncing");
        self.reset_frame();
        if let Some(offset) = memchr::memmem::find(&self.buf, &HEADER) {
            self.buf.drain(..offset);
        } else {
            self.buf.clear();
        }
        self.last_progress = now;
    }

    fn reset_frame(&mut self) {
        self.state = ParserState::WaitHeader;
        self.address = DEFAULT_ADDRESS;
        self.packet_id = None;
        self.length = 0;
        self.code = None;
        self.parameters.clear();
    }

    /// Spec §4.2 "Template-stream fast path": if the last command was an
    /// upload and the buffer has grown large enough (or already holds an
    /// end marker), forcibly emit what has been collected so far instead
    /// of waiting for the normal state machine to see a clean `EndData`.
    fn apply_template_fast_path(&mut self, now: Duration, response: &mut MultiPacketResponse) {
        if !self.uploading() || self.buf.len() <= FAST_PATH_MIN_BYTES {
            return;
        }
        if let Some(until) = self.fast_path_latched_until {
            if now < until {
                return;
            }
        }

        let has_end_data = memchr::memmem::find(&self.buf, &HEADER)
            .is_some_and(|offset| self.buf.get(offset + 6) == Some(&(PacketId::EndData as u8)));
        let foof_offset = memchr::memmem::find(&self.buf, &FOOF_MARKER);
        let has_foof = foof_offset.is_some();
        let buffer_too_large = self.buf.len() > FAST_PATH_FORCE_BYTES;

        if !(has_end_data || has_foof || buffer_too_large) {
            return;
        }

        trace_log!(
            "parser: template fast path firing ({} bytes, end_data={has_end_data}, foof={has_foof})",
            self.buf.len()
        );

        // Bytes past the FOOF marker are not part of the template (spec §8
        // scenario 3); anything else still takes the whole buffer.
        if let Some(offset) = foof_offset {
            self.buf.truncate(offset + FOOF_MARKER.len());
        }

        let data = Packet::new(self.address, PacketId::Data, None, self.buf.clone());
        response.packets.push(data);
        if !has_end_data {
            let end_data = Packet::new(self.address, PacketId::EndData, None, Vec::new());
            response.packets.push(end_data);
        }
        response.collecting_template = true;
        response.template_data = core::mem::take(&mut self.buf);

        self.fast_path_latched_until = Some(now + FOOF_LATCH_COOLDOWN);
        self.reset_frame();
    }

    /// Drive exactly one state transition, if enough bytes are buffered
    /// for the current phase. Returns `None` when more bytes are needed.
    fn advance_once(&mut self, now: Duration) -> Option<Advance> {
        match self.state {
            ParserState::WaitHeader => self.advance_wait_header(),
            ParserState::ReadAddress => self.advance_read_address(),
            ParserState::ReadPacketId => self.advance_read_packet_id(),
            ParserState::ReadLength => self.advance_read_length(),
            ParserState::ReadContent => self.advance_read_content(),
            ParserState::ReadChecksum => self.advance_read_checksum(now),
        }
    }

    fn advance_wait_header(&mut self) -> Option<Advance> {
        let offset = memchr::memmem::find(&self.buf, &HEADER)?;
        if offset > 0 {
            self.buf.drain(..offset);
        }
        if self.buf.len() < HEADER.len() {
            return None;
        }
        self.buf.drain(..HEADER.len());
        self.state = ParserState::ReadAddress;
        Some(Advance::Progressed)
    }

    fn advance_read_address(&mut self) -> Option<Advance> {
        if self.buf.len() < 4 {
            return None;
        }
        let bytes: Vec<u8> = self.buf.drain(..4).collect();
        self.address = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        self.state = ParserState::ReadPacketId;
        Some(Advance::Progressed)
    }

    fn advance_read_packet_id(&mut self) -> Option<Advance> {
        let byte = *self.buf.first()?;
        let Some(packet_id) = PacketId::from_u8(byte) else {
            trace_log!("parser: bad packet_id byte {byte:#04x}, resyncing");
            self.buf.remove(0);
            self.state = ParserState::WaitHeader;
            return Some(Advance::Progressed);
        };
        self.buf.remove(0);
        self.packet_id = Some(packet_id);
        self.state = ParserState::ReadLength;
        Some(Advance::Progressed)
    }

    fn advance_read_length(&mut self) -> Option<Advance> {
        if self.buf.len() < 2 {
            return None;
        }
        let bytes: Vec<u8> = self.buf.drain(..2).collect();
        self.length = u16::from_be_bytes([bytes[0], bytes[1]]);
        self.state = ParserState::ReadContent;
        Some(Advance::Progressed)
    }

    fn advance_read_content(&mut self) -> Option<Advance> {
        let carries_code = self.packet_id.is_some_and(PacketId::carries_code);
        let content_len = usize::from(self.length.saturating_sub(2));
        if self.buf.len() < content_len {
            return None;
        }
        let content: Vec<u8> = self.buf.drain(..content_len).collect();
        if carries_code {
            let (code, params) = content.split_first().unwrap_or((&0, &[]));
            self.code = Some(*code);
            self.parameters = params.to_vec();
        } else {
            self.code = None;
            self.parameters = content;
        }
        if self.parameters.len() > MAX_PARAMETERS {
            self.parameters.truncate(MAX_PARAMETERS);
        }
        self.state = ParserState::ReadChecksum;
        Some(Advance::Progressed)
    }

    fn advance_read_checksum(&mut self, _now: Duration) -> Option<Advance> {
        if self.buf.len() < 2 {
            return None;
        }
        let bytes: Vec<u8> = self.buf.drain(..2).collect();
        let checksum = u16::from_be_bytes([bytes[0], bytes[1]]);

        let packet_id = self.packet_id.expect("ReadChecksum implies packet_id set");
        let mut packet = Packet::new(self.address, packet_id, self.code, self.parameters.clone());
        packet.checksum = checksum;

        let computed = packet.compute_checksum();
        self.reset_frame();

        if self.config.strict_checksum && computed != checksum {
            trace_log!("parser: checksum mismatch (wire {checksum:#06x}, computed {computed:#06x}), dropping");
            return Some(Advance::Progressed);
        }

        Some(Advance::Packet(packet))
    }
}

enum Advance {
    Packet(Packet),
    Progressed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack_bytes(code: u8, params: &[u8]) -> Vec<u8> {
        let mut packet = Packet::new(DEFAULT_ADDRESS, PacketId::Ack, Some(code), params.to_vec());
        packet.checksum = packet.compute_checksum();
        packet.encode()
    }

    #[test]
    fn parses_one_ack_in_one_feed() {
        // spec §8 scenario 2.
        let mut parser = PacketParser::new(ParserConfig::default());
        let wire = ack_bytes(0x00, &[]);
        let response = parser.feed(&wire, Duration::from_secs(1)).unwrap();
        assert_eq!(response.packets.len(), 1);
        assert_eq!(response.packets[0].packet_id, PacketId::Ack);
        assert_eq!(response.packets[0].code, Some(0x00));
    }

    #[test]
    fn header_split_across_feeds() {
        let mut parser = PacketParser::new(ParserConfig::default());
        let wire = ack_bytes(0x00, &[0x01, 0x02]);
        assert!(parser.feed(&wire[..1], Duration::from_secs(1)).is_none());
        let response = parser.feed(&wire[1..], Duration::from_secs(1)).unwrap();
        assert_eq!(response.packets.len(), 1);
        assert_eq!(response.packets[0].parameters, vec![0x01, 0x02]);
    }

    #[test]
    fn length_split_across_feeds() {
        let mut parser = PacketParser::new(ParserConfig::default());
        let wire = ack_bytes(0x09, &[0xAA; 10]);
        let split = 9; // header(2)+address(4)+id(1)+length(2), no content yet
        assert!(parser.feed(&wire[..split], Duration::from_secs(1)).is_none());
        let response = parser.feed(&wire[split..], Duration::from_secs(1)).unwrap();
        assert_eq!(response.packets.len(), 1);
        assert_eq!(response.packets[0].parameters.len(), 10);
    }

    #[test]
    fn two_packets_in_one_feed() {
        let mut parser = PacketParser::new(ParserConfig::default());
        let mut wire = ack_bytes(0x00, &[]);
        wire.extend(ack_bytes(0x09, &[0x01]));
        let response = parser.feed(&wire, Duration::from_secs(1)).unwrap();
        assert_eq!(response.packets.len(), 2);
        assert_eq!(response.packets[1].code, Some(0x09));
    }

    #[test]
    fn garbage_prefix_is_discarded() {
        let mut parser = PacketParser::new(ParserConfig::default());
        let mut wire = vec![0x00, 0xAB, 0xEF]; // stray bytes, including a lone 0xEF
        wire.extend(ack_bytes(0x00, &[]));
        let response = parser.feed(&wire, Duration::from_secs(1)).unwrap();
        assert_eq!(response.packets.len(), 1);
    }

    #[test]
    fn stuck_tiny_buffer_is_cleared_after_timeout() {
        let mut parser = PacketParser::new(ParserConfig::default());
        assert!(parser.feed(&[0xEF], Duration::from_secs(0)).is_none());
        assert!(parser.feed(&[], Duration::from_secs(3)).is_none());
        assert_eq!(parser.buf.len(), 0);
    }

    #[test]
    fn fast_path_fires_on_foof_during_upload() {
        // spec §8 scenario 3.
        let mut parser = PacketParser::new(ParserConfig::default());
        parser.note_command_sent(Opcode::UpChar as u8);
        let mut payload = vec![0xAAu8; FAST_PATH_MIN_BYTES + 1];
        payload.extend_from_slice(b"FOOF");
        let response = parser.feed(&payload, Duration::from_secs(1)).unwrap();
        assert!(response.collecting_template);
        assert!(response.template_data.ends_with(b"FOOF"));
        assert_eq!(response.packets.len(), 2);
        assert_eq!(response.packets[1].packet_id, PacketId::EndData);
    }

    #[test]
    fn fast_path_truncates_trailing_bytes_past_foof_marker() {
        // spec §8 scenario 3: 520 bytes in, 484 out (up to and including
        // the marker; anything past it is discarded).
        let mut parser = PacketParser::new(ParserConfig::default());
        parser.note_command_sent(Opcode::UpChar as u8);
        let mut payload = vec![0xAAu8; 480];
        payload.extend_from_slice(b"FOOF");
        payload.extend_from_slice(&[0xBBu8; 36]);
        assert_eq!(payload.len(), 520);

        let response = parser.feed(&payload, Duration::from_secs(1)).unwrap();
        assert_eq!(response.template_data.len(), 484);
        assert!(response.template_data.ends_with(b"FOOF"));
        assert_eq!(response.packets[0].parameters.len(), 484);
    }

    #[test]
    fn fast_path_forces_on_oversized_buffer() {
        let mut parser = PacketParser::new(ParserConfig::default());
        parser.note_command_sent(Opcode::UpChar as u8);
        let payload = vec![0xAAu8; FAST_PATH_FORCE_BYTES + 1];
        let response = parser.feed(&payload, Duration::from_secs(1)).unwrap();
        assert!(response.collecting_template);
    }

    #[test]
    fn fast_path_does_not_fire_outside_upload() {
        let mut parser = PacketParser::new(ParserConfig::default());
        let mut payload = vec![0xAAu8; FAST_PATH_MIN_BYTES + 1];
        payload.extend_from_slice(b"FOOF");
        assert!(parser.feed(&payload, Duration::from_secs(1)).is_none());
    }

    #[test]
    fn truncated_data_during_upload_emits_partial_packet() {
        let mut parser = PacketParser::new(ParserConfig::default());
        parser.note_command_sent(Opcode::UpChar as u8);
        // Header + address + packet_id + a length declaring far more
        // content than will ever arrive.
        let mut partial = Vec::new();
        partial.extend_from_slice(&HEADER);
        partial.extend_from_slice(&DEFAULT_ADDRESS.to_be_bytes());
        partial.push(PacketId::Data as u8);
        partial.extend_from_slice(&200u16.to_be_bytes());
        partial.extend_from_slice(&[0x01, 0x02, 0x03]);

        assert!(parser.feed(&partial, Duration::from_secs(0)).is_none());
        let response = parser.feed(&[], Duration::from_secs(11)).unwrap();
        assert_eq!(response.packets.len(), 1);
        assert_eq!(response.packets[0].parameters, vec![0x01, 0x02, 0x03]);
    }
}
