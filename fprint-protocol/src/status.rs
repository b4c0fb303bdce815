//! Maps an ACK status byte to an event, keyed by the opcode of the most
//! recent outbound command (spec §4.8).


use alloc::vec::Vec;

use crate::command_table::Opcode;
use crate::event::{EventKind, IndexTable, MatchInfo, SysParams};
use crate::packet::Packet;

/// Confirmation status codes this driver recognizes (spec §4.8).
pub mod status_codes {
    pub const OK: u8 = 0x00;
    pub const PACKET_ERROR: u8 = 0x01;
    pub const NO_FINGER: u8 = 0x02;
    pub const IMAGE_FAIL: u8 = 0x03;
    pub const TOO_DRY: u8 = 0x26;
    pub const TOO_WET: u8 = 0x27;
    pub const TOO_CHAOTIC: u8 = 0x06;
    pub const TOO_FEW_POINTS: u8 = 0x07;
    pub const MISMATCH: u8 = 0x08;
    pub const NOT_FOUND: u8 = 0x09;
    pub const IMAGE_AREA_SMALL: u8 = 0x15;
    pub const DB_EMPTY: u8 = 0x22;
    pub const ENTRY_COUNT_ERROR: u8 = 0x23;
    pub const ALREADY_EXISTS: u8 = 0x25;
    pub const DELETE_FAIL: u8 = 0x10;
    pub const UPLOAD_IMAGE_FAIL: u8 = 0x0F;
    pub const IMAGE_NOT_AVAILABLE: u8 = 0x15;
    pub const DATA_PACKET_ERROR: u8 = 0x0E;
    pub const ENCRYPTION_MISMATCH: u8 = 0x1A;
}
use status_codes as sc;

/// An outcome bit an orchestrated operation (C5) waits on (spec §4.5's
/// named event-group bits, minus `TemplateUploadComplete`: the accumulator,
/// C7, signals its own completion by returning from `accumulate_template`
/// and publishing `EventKind::TemplateUploaded` directly, rather than
/// setting a bit here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeBit {
    Success,
    Fail,
    CheckingLocationSuccess,
    CheckingLocationFail,
}

/// Everything [`classify_status`] derives from one ACK: the event to
/// publish (if any) and the outcome bits an orchestrated operation waits
/// on. The DownChar/encryption quirks of spec §4.8 are expressed purely
/// through `bits` — they set `Success` even though the sensor's own
/// status byte reported an error — so there is no separate "force
/// success" signal for a caller to consult beyond `bits` itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusOutcome {
    pub event: Option<EventKind>,
    pub bits: Vec<OutcomeBit>,
    pub start_match_cooldown: bool,
}

impl StatusOutcome {
    fn event_and_bit(event: EventKind, bit: OutcomeBit) -> Self {
        Self {
            event: Some(event),
            bits: alloc::vec![bit],
            ..Self::default()
        }
    }

    fn bit_only(bit: OutcomeBit) -> Self {
        Self {
            bits: alloc::vec![bit],
            ..Self::default()
        }
    }
}

/// Extra context `classify_status` needs beyond the raw status byte (spec
/// §4.8's `enrollment_in_progress` flag and the `CHECKING_LOCATION` bit).
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusContext {
    pub checking_location: bool,
    pub enrollment_in_progress: bool,
    /// Bit position to test within the index-table page, when
    /// `checking_location` is set (the low byte of the target location).
    pub location_bit: Option<u8>,
}

/// Classify one ACK's status byte, given the opcode of the command it
/// answers and the packet it arrived in (spec §4.8 table).
#[must_use]
pub fn classify_status(opcode: u8, status: u8, packet: &Packet, ctx: StatusContext) -> StatusOutcome {
    use OutcomeBit::{CheckingLocationFail, CheckingLocationSuccess, Fail, Success};

    // Image/feature faults are reported across many different opcodes with
    // the same small set of status bytes (spec §4.8: "any").
    match status {
        sc::NO_FINGER => return StatusOutcome::event_and_bit(EventKind::NoFinger, Fail),
        sc::IMAGE_FAIL
        | sc::TOO_DRY
        | sc::TOO_WET
        | sc::TOO_CHAOTIC
        | sc::IMAGE_AREA_SMALL
        | sc::UPLOAD_IMAGE_FAIL
        | sc::IMAGE_NOT_AVAILABLE => {
            return StatusOutcome::event_and_bit(EventKind::ImageFail, Fail);
        }
        sc::TOO_FEW_POINTS => {
            return StatusOutcome::event_and_bit(EventKind::FeatureExtractFail, Fail);
        }
        _ => {}
    }

    if opcode == Opcode::DownChar as u8 {
        if status == sc::PACKET_ERROR || status == sc::DATA_PACKET_ERROR {
            return StatusOutcome {
                event: Some(EventKind::TemplateStorePacketError),
                bits: alloc::vec![Success],
                start_match_cooldown: false,
            };
        }
        if status == sc::ENCRYPTION_MISMATCH {
            return StatusOutcome {
                bits: alloc::vec![Success],
                ..StatusOutcome::default()
            };
        }
    }

    if opcode == Opcode::StoreChar as u8
        && matches!(
            status,
            sc::ALREADY_EXISTS | sc::DB_EMPTY | sc::DELETE_FAIL | sc::ENTRY_COUNT_ERROR
        )
    {
        return StatusOutcome::event_and_bit(EventKind::TemplateExists, Fail);
    }

    if opcode == Opcode::Search as u8 && matches!(status, sc::MISMATCH | sc::NOT_FOUND) {
        return if ctx.enrollment_in_progress {
            StatusOutcome::bit_only(Success)
        } else {
            StatusOutcome::event_and_bit(EventKind::SearchFail, Fail)
        };
    }

    if status != sc::OK {
        return StatusOutcome::event_and_bit(EventKind::Error(status), Fail);
    }

    // status == OK from here on; dispatch purely by opcode (spec §4.8).
    if opcode == Opcode::GetImage as u8 {
        // One successful capture is "image valid"; the higher-level
        // "finger detected" event is raised once by the detection task
        // (C6) after it confirms presence across several of these.
        return StatusOutcome::event_and_bit(EventKind::ImageValid, Success);
    }
    if opcode == Opcode::GenChar as u8 {
        return StatusOutcome::event_and_bit(EventKind::FeatureExtracted, Success);
    }
    if opcode == Opcode::RegModel as u8 {
        return StatusOutcome::event_and_bit(EventKind::ModelCreated, Success);
    }
    if opcode == Opcode::StoreChar as u8 {
        return StatusOutcome::event_and_bit(EventKind::TemplateStored, Success);
    }
    if opcode == Opcode::Search as u8 {
        // spec §4.8/§8 scenario 6: score=0 on an OK ACK is "no match", even
        // though the status byte itself is OK.
        if packet.parameters.len() >= 4 {
            let page_id = u16::from_be_bytes([packet.parameters[0], packet.parameters[1]]);
            let score = u16::from_be_bytes([packet.parameters[2], packet.parameters[3]]);
            if score > 0 {
                return StatusOutcome {
                    event: Some(EventKind::SearchSuccess(MatchInfo {
                        page_id,
                        template_id: page_id,
                        score,
                    })),
                    bits: alloc::vec![Success],
                    start_match_cooldown: true,
                };
            }
        }
        return if ctx.enrollment_in_progress {
            StatusOutcome::bit_only(Fail)
        } else {
            // Verify: silent, the orchestrator just keeps waiting for a
            // later reply or its own timeout (spec §4.8).
            StatusOutcome::default()
        };
    }
    if opcode == Opcode::ReadIndexTable as u8 {
        if ctx.checking_location {
            if packet.parameters.len() >= 32 {
                let mut bitmap = [0u8; 32];
                bitmap.copy_from_slice(&packet.parameters[..32]);
                let table = IndexTable { bitmap };
                let occupied = ctx.location_bit.is_some_and(|bit| table.is_occupied(bit));
                return StatusOutcome {
                    event: Some(EventKind::IndexTableRead(table)),
                    bits: alloc::vec![
                        if occupied {
                            CheckingLocationFail
                        } else {
                            CheckingLocationSuccess
                        }
                    ],
                    ..StatusOutcome::default()
                };
            }
            return StatusOutcome::bit_only(CheckingLocationFail);
        }
        return StatusOutcome::bit_only(Success);
    }
    if opcode == Opcode::ValidTemplateNum as u8 {
        let count = if packet.parameters.len() >= 2 {
            u16::from_be_bytes([packet.parameters[0], packet.parameters[1]])
        } else {
            0
        };
        return StatusOutcome::event_and_bit(EventKind::TemplateCount(count), Success);
    }
    if opcode == Opcode::ReadSysPara as u8 {
        if packet.parameters.len() >= 16 {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&packet.parameters[..16]);
            return StatusOutcome::event_and_bit(
                EventKind::SysParamsRead(SysParams::parse(&bytes)),
                Success,
            );
        }
        return StatusOutcome::bit_only(Success);
    }
    if opcode == Opcode::UpChar as u8 {
        return StatusOutcome::bit_only(Success);
    }
    if opcode == Opcode::LoadChar as u8 {
        return StatusOutcome::event_and_bit(EventKind::TemplateLoaded, Success);
    }

    StatusOutcome::bit_only(Success)
}
