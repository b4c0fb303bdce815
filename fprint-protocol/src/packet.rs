//! The wire packet type and its frame codec (spec §3, §4.1, §6).


use alloc::vec::Vec;

use crate::error::{ProtocolError, ProtocolResult};

/// Header sentinel that begins every frame on the wire.
pub const HEADER: [u8; 2] = [0xEF, 0x01];

/// Default device address used when none is configured.
pub const DEFAULT_ADDRESS: u32 = 0xFFFF_FFFF;

/// Upper bound on the number of parameter bytes a single packet can carry.
pub const MAX_PARAMETERS: usize = 64;

/// Discriminant of a [`Packet`]'s role on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketId {
    Command = 0x01,
    Data = 0x02,
    Ack = 0x07,
    EndData = 0x08,
}

impl PacketId {
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Command),
            0x02 => Some(Self::Data),
            0x07 => Some(Self::Ack),
            0x08 => Some(Self::EndData),
            _ => None,
        }
    }

    /// Whether this packet kind carries a `code` byte (command opcode on
    /// `Command`, confirmation status on `Ack`). `Data`/`EndData` frames
    /// carry no `code` byte (spec §3's packet-shape invariant).
    #[must_use]
    pub const fn carries_code(self) -> bool {
        matches!(self, Self::Command | Self::Ack)
    }
}

/// A single protocol frame (spec §3 "Packet").
///
/// `parameters` is a `Vec` rather than a fixed array: the sensor never
/// sends more than [`MAX_PARAMETERS`] bytes, but template `Data`/`EndData`
/// payloads vary in length packet to packet, so a fixed-size buffer would
/// need its own length tracking anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub address: u32,
    pub packet_id: PacketId,
    /// Command opcode (outbound) or confirmation status (inbound `Ack`).
    /// `None` for `Data`/`EndData`.
    pub code: Option<u8>,
    pub parameters: Vec<u8>,
    /// Checksum as observed on the wire (decode) or as computed (encode).
    pub checksum: u16,
}

impl Packet {
    #[must_use]
    pub fn new(address: u32, packet_id: PacketId, code: Option<u8>, parameters: Vec<u8>) -> Self {
        let mut packet = Self {
            address,
            packet_id,
            code,
            parameters,
            checksum: 0,
        };
        packet.checksum = packet.compute_checksum();
        packet
    }

    /// `length` field as it appears on the wire: `code + parameters + checksum`.
    #[must_use]
    pub fn wire_length(&self) -> u16 {
        let code_len = usize::from(self.code.is_some());
        (code_len + self.parameters.len() + 2) as u16
    }

    /// 16-bit unsigned sum of every byte from `packet_id` through the last
    /// parameter byte, inclusive (spec §4.1/§6).
    #[must_use]
    pub fn compute_checksum(&self) -> u16 {
        let mut sum: u16 = self.packet_id as u8 as u16;
        let length = self.wire_length();
        sum = sum.wrapping_add(length.to_be_bytes()[0] as u16);
        sum = sum.wrapping_add(length.to_be_bytes()[1] as u16);
        if let Some(code) = self.code {
            sum = sum.wrapping_add(code as u16);
        }
        for &byte in &self.parameters {
            sum = sum.wrapping_add(byte as u16);
        }
        sum
    }

    /// Overwrite `code`/`parameters` and recompute `length`/`checksum`
    /// (spec §4.1 `set_command`).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TooManyParameters`] if `parameters.len() >
    /// MAX_PARAMETERS`. There is no "null packet" case to reject: Rust's
    /// ownership rules make that state unrepresentable, unlike the C source
    /// this crate is modeled on.
    pub fn set_command(&mut self, opcode: u8, parameters: &[u8]) -> ProtocolResult<()> {
        if parameters.len() > MAX_PARAMETERS {
            return Err(ProtocolError::TooManyParameters {
                got: parameters.len(),
                max: MAX_PARAMETERS,
            });
        }
        self.packet_id = PacketId::Command;
        self.code = Some(opcode);
        self.parameters.clear();
        self.parameters.extend_from_slice(parameters);
        self.checksum = self.compute_checksum();
        Ok(())
    }

    /// Encode into a freshly-allocated buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9 + self.parameters.len() + usize::from(self.code.is_some()));
        self.encode_into(&mut buf);
        buf
    }

    /// Encode, appending to `buf` (spec §4.1 wire layout).
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&HEADER);
        buf.extend_from_slice(&self.address.to_be_bytes());
        buf.push(self.packet_id as u8);
        buf.extend_from_slice(&self.wire_length().to_be_bytes());
        if let Some(code) = self.code {
            buf.push(code);
        }
        buf.extend_from_slice(&self.parameters);
        buf.extend_from_slice(&self.checksum.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_search_command_matches_wire_example() {
        // spec §8 scenario 1.
        let mut packet = Packet::new(DEFAULT_ADDRESS, PacketId::Command, Some(0), Vec::new());
        packet
            .set_command(0x04, &[0x01, 0x00, 0x00, 0x00, 0x64])
            .unwrap();
        let encoded = packet.encode();
        assert_eq!(
            encoded,
            vec![
                0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x08, 0x04, 0x01, 0x00, 0x00,
                0x00, 0x64, 0x00, 0x72,
            ]
        );
    }

    #[test]
    fn wire_length_matches_invariant() {
        let packet = Packet::new(
            DEFAULT_ADDRESS,
            PacketId::Command,
            Some(0x04),
            vec![1, 2, 3],
        );
        let encoded = packet.encode();
        assert_eq!(encoded.len(), 9 + packet.parameters.len() + 1);
        assert_eq!(usize::from(packet.wire_length()), 1 + 3 + 2);
    }

    #[test]
    fn set_command_rejects_too_many_parameters() {
        let mut packet = Packet::new(DEFAULT_ADDRESS, PacketId::Command, Some(0), Vec::new());
        let too_many = vec![0u8; MAX_PARAMETERS + 1];
        assert!(matches!(
            packet.set_command(0x01, &too_many),
            Err(ProtocolError::TooManyParameters { .. })
        ));
    }

    #[test]
    fn set_command_accepts_exactly_max_parameters() {
        let mut packet = Packet::new(DEFAULT_ADDRESS, PacketId::Command, Some(0), Vec::new());
        let max = vec![0u8; MAX_PARAMETERS];
        assert!(packet.set_command(0x01, &max).is_ok());
    }

    #[test]
    fn data_packet_has_no_code() {
        let packet = Packet::new(DEFAULT_ADDRESS, PacketId::Data, None, vec![1, 2]);
        assert_eq!(packet.wire_length(), 2 + 2);
        let encoded = packet.encode();
        // header(2) + address(4) + id(1) + length(2) + params(2) + checksum(2)
        assert_eq!(encoded.len(), 13);
    }
}
