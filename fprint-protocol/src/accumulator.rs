//! Buffers multi-packet template payloads until an end-marker is observed
//! (spec §4.7 "Template accumulator").


use core::time::Duration;

use alloc::vec;
use alloc::vec::Vec;

use crate::event::TemplateBuffer;
use crate::packet::{Packet, PacketId};

/// Literal ASCII end-marker the sensor sometimes embeds in-band instead of
/// (or in addition to) sending a well-formed `EndData` frame (spec §6).
pub const FOOF_MARKER: [u8; 4] = *b"FOOF";

/// Raw buffer size beyond which, combined with `FORCED_AFTER_BYTES_DELAY`,
/// the accumulator considers itself complete (spec §4.7).
pub const FORCED_AFTER_BYTES: usize = 500;
/// Minimum elapsed time before the size-based completion criterion applies.
pub const FORCED_AFTER_BYTES_DELAY: Duration = Duration::from_millis(1500);
/// Absolute forced-completion deadline, regardless of buffer size (spec §4.7).
pub const FORCED_AFTER_TIMEOUT: Duration = Duration::from_secs(3);

#[cfg(not(feature = "log"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}
#[cfg(feature = "log")]
macro_rules! trace_log {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

/// Accumulates `Data`/`EndData` packets for a single template transfer
/// (spec §4.7). One instance lives for the duration of one backup/upload;
/// the caller is responsible for allocating it when a transfer begins and
/// discarding it once [`TemplateAccumulator::finish`] has been called.
#[derive(Debug, Clone)]
pub struct TemplateAccumulator {
    address: u32,
    raw: Vec<u8>,
    packets: Vec<Packet>,
}

impl TemplateAccumulator {
    #[must_use]
    pub fn new(address: u32) -> Self {
        Self {
            address,
            raw: Vec::new(),
            packets: Vec::new(),
        }
    }

    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    /// Feed one `Data`/`EndData` packet into the accumulator.
    ///
    /// Deep-copies `packet`, recomputes its checksum (spec §4.7 invariant
    /// (a)), appends its parameters to the raw stream (invariant (b)), and
    /// performs embedded-final-packet reconciliation (spec §4.7) if the
    /// sensor's `EF 01 <address> 08` header shows up mid-payload.
    pub fn push(&mut self, mut packet: Packet) {
        debug_assert!(matches!(packet.packet_id, PacketId::Data | PacketId::EndData));

        self.raw.extend_from_slice(&packet.parameters);

        if let Some(offset) = self.find_embedded_final_packet(&packet.parameters) {
            self.reconcile_embedded_final_packet(&mut packet, offset);
        }

        packet.checksum = packet.compute_checksum();
        self.packets.push(packet);
    }

    /// Search `parameters` for the literal sub-sequence `EF 01 <address
    /// big-endian> 08` (a complete sensor header naming an `EndData`
    /// packet_id, spec §4.7).
    fn find_embedded_final_packet(&self, parameters: &[u8]) -> Option<usize> {
        let mut needle = Vec::with_capacity(7);
        needle.extend_from_slice(&crate::packet::HEADER);
        needle.extend_from_slice(&self.address.to_be_bytes());
        needle.push(PacketId::EndData as u8);
        memchr::memmem::find(parameters, &needle)
    }

    fn reconcile_embedded_final_packet(&mut self, packet: &mut Packet, offset: usize) {
        const NEEDLE_LEN: usize = 7; // header(2) + address(4) + packet_id(1)
        let tail = &packet.parameters[offset + NEEDLE_LEN..];
        if tail.len() < 2 {
            return; // not enough bytes for a declared length; leave as-is.
        }
        let declared_length = u16::from_be_bytes([tail[0], tail[1]]) as usize;
        let body_len = declared_length.saturating_sub(2);
        if tail.len() < 2 + body_len + 2 {
            return; // truncated embedded frame; nothing to reconcile yet.
        }
        let embedded_params = tail[2..2 + body_len].to_vec();

        // (1) truncate the containing DATA packet at the embedded header.
        packet.parameters.truncate(offset);
        packet.checksum = packet.compute_checksum();

        // (2) synthesize the new EndData packet, recomputing its checksum.
        let mut end_data = Packet::new(self.address, PacketId::EndData, None, embedded_params);
        end_data.checksum = end_data.compute_checksum();

        trace_log!(
            "accumulator: reconciled embedded EndData at offset {offset}, length {declared_length}"
        );

        // (3) append it.
        self.packets.push(end_data);
    }

    fn has_end_data_packet(&self) -> bool {
        self.packets
            .iter()
            .any(|p| p.packet_id == PacketId::EndData)
    }

    fn raw_has_foof(&self) -> bool {
        memchr::memmem::find(&self.raw, &FOOF_MARKER).is_some()
    }

    /// Any of the four completion criteria of spec §4.7 is met.
    #[must_use]
    pub fn is_complete(&self, elapsed: Duration) -> bool {
        self.has_end_data_packet()
            || self.raw_has_foof()
            || (self.raw.len() > FORCED_AFTER_BYTES && elapsed > FORCED_AFTER_BYTES_DELAY)
            || elapsed > FORCED_AFTER_TIMEOUT
    }

    /// Finalize the accumulator into a deep-copied [`TemplateBuffer`] for
    /// event dispatch (spec §4.7 "deep-copy the accumulator into an Event
    /// payload"), deleting any empty `EndData` packets first (spec §4.7) and
    /// truncating the raw stream at the FOOF marker, if any, since bytes
    /// past it are not part of the template (spec §8 scenario 3).
    #[must_use]
    pub fn finish(mut self, elapsed: Duration) -> TemplateBuffer {
        self.packets
            .retain(|p| !(p.packet_id == PacketId::EndData && p.wire_length() <= 2));
        let is_complete = self.is_complete(elapsed);
        let data = truncate_at_foof(&self.raw).unwrap_or(self.raw);
        TemplateBuffer { is_complete, data }
    }

    /// Deep-copied packets observed so far (for diagnostics/tests).
    #[must_use]
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }
}

/// Split a raw byte stream at the first occurrence of [`FOOF_MARKER`],
/// returning the bytes up to and including the marker (spec §4.2's
/// template-stream fast path and §8 scenario 3: "truncated at FOOF +
/// marker included").
#[must_use]
pub fn truncate_at_foof(raw: &[u8]) -> Option<Vec<u8>> {
    let position = memchr::memmem::find(raw, &FOOF_MARKER)?;
    let end = position + FOOF_MARKER.len();
    Some(raw[..end].to_vec())
}
