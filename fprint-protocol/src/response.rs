//! Output of one [`crate::parser::PacketParser::feed`] call (spec §4.2).

use alloc::vec::Vec;

use crate::packet::Packet;

/// One or more packets decoded from a single `feed` call.
///
/// `template_data`/`collecting_template` are only populated by the
/// template-stream fast path: a forced emission of the accumulated bytes
/// of an in-progress template upload, before a natural `EndData` frame
/// (or none at all) has been seen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiPacketResponse {
    pub packets: Vec<Packet>,
    pub collecting_template: bool,
    pub template_data: Vec<u8>,
}

impl MultiPacketResponse {
    #[must_use]
    pub fn single(packet: Packet) -> Self {
        Self {
            packets: alloc::vec![packet],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
