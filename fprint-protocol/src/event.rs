//! Typed events and the values they carry (spec §3 "Event").


use alloc::vec::Vec;

use crate::packet::Packet;

/// Process-wide operation mode (spec §3 "OperationMode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationMode {
    #[default]
    None,
    EnrollFirst,
    EnrollSecond,
    Verify,
    Custom,
}

/// `{page_id, template_id, score}` payload of a successful search/match
/// (spec §3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchInfo {
    pub page_id: u16,
    pub template_id: u16,
    pub score: u16,
}

/// Decoded 16-byte system-parameters block (spec §4.8 "read-sys-para").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysParams {
    pub status_register: u16,
    pub system_id: u16,
    pub library_size: u16,
    pub security_level: u16,
    pub device_address: u32,
    pub data_packet_size: u16,
    pub baud_setting: u16,
}

impl SysParams {
    /// Parse the 16-byte parameter block the sensor returns for
    /// `ReadSysPara` (big-endian fields, spec §4.8).
    #[must_use]
    pub fn parse(bytes: &[u8; 16]) -> Self {
        let u16_at = |offset: usize| u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        Self {
            status_register: u16_at(0),
            system_id: u16_at(2),
            library_size: u16_at(4),
            security_level: u16_at(6),
            device_address: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            data_packet_size: u16_at(12),
            baud_setting: u16_at(14),
        }
    }
}

/// A completed (or forcibly-completed) template payload, as delivered to
/// the event bus (spec §3 "template buffer {data, size, is_complete}").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateBuffer {
    pub data: Vec<u8>,
    pub is_complete: bool,
}

impl TemplateBuffer {
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// 32-byte occupancy bitmap for one index-table page (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexTable {
    pub bitmap: [u8; 32],
}

impl IndexTable {
    /// Position `p` is occupied iff `bitmap[p/8] & (1 << (p%8))` (spec §8).
    #[must_use]
    pub fn is_occupied(&self, position: u8) -> bool {
        let byte = self.bitmap[(position / 8) as usize];
        byte & (1 << (position % 8)) != 0
    }
}

/// Discriminated payload carried by an [`Event`] (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    FingerDetected,
    NoFinger,
    ImageValid,
    ImageFail,
    FeatureExtracted,
    FeatureExtractFail,
    ModelCreated,
    TemplateStored,
    TemplateExists,
    TemplateLoaded,
    TemplateUploaded(TemplateBuffer),
    TemplateStorePacketError,
    SearchSuccess(MatchInfo),
    SearchFail,
    TemplateCount(u16),
    SysParamsRead(SysParams),
    IndexTableRead(IndexTable),
    /// Any status byte this crate does not specifically classify (spec
    /// §4.8 "other errors").
    Error(u8),
}

/// A single dispatched event (spec §3 "Event").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub status: u8,
    /// Opcode of the command this event answers.
    pub opcode: u8,
    /// The packet that caused this event (deep-copied, spec §3).
    pub packet: Packet,
}
