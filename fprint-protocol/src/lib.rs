//! Wire codec, packet parser, command table and event types for a serial
//! fingerprint-sensor module.
//!
//! This crate is the pure, non-concurrent half of the driver: everything
//! here is a plain value transformation with no I/O and no threads, so it
//! can run on a microcontroller behind a `no_std` + `alloc` build (the
//! transport, GPIO and allocator are all external collaborators, per the
//! scope of this driver) or in a hosted test binary.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod accumulator;
pub mod command_table;
pub mod error;
pub mod event;
pub mod packet;
pub mod parser;
pub mod response;
pub mod status;

pub use accumulator::TemplateAccumulator;
pub use command_table::{CommandTemplate, Opcode};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{Event, EventKind, IndexTable, MatchInfo, OperationMode, SysParams, TemplateBuffer};
pub use packet::{DEFAULT_ADDRESS, HEADER, MAX_PARAMETERS, Packet, PacketId};
pub use parser::{PacketParser, ParserConfig};
pub use response::MultiPacketResponse;
pub use status::{OutcomeBit, StatusContext, StatusOutcome, classify_status};
