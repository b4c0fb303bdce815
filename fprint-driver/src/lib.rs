//! Async orchestration layer over [`fprint_protocol`]: owns the transport
//! tasks, the command/ACK correlation queue, the finger-presence
//! pipeline, and the multi-step operations built on top of them (spec §4).

mod config;
mod dispatcher;
mod driver;
mod error;
mod events;
mod finger;
mod guard;
mod orchestrator;
mod reader;
mod state;
pub mod transport;

pub use config::{DriverConfig, FingerConfig, StepTimeouts};
pub use driver::{CommandSender, Driver};
pub use error::{DriverError, DriverResult};
pub use events::EventBus;
pub use finger::{FingerEdgeSink, FingerEdgeSource};
pub use guard::OperationGuard;

pub use fprint_protocol::{
    Event, EventKind, IndexTable, MatchInfo, OperationMode, Packet, PacketId, StatusContext, SysParams,
    TemplateBuffer,
};
