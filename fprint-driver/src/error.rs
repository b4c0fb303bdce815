//! Errors produced by the orchestrator (spec §4.5, §7).

use thiserror::Error;

/// Everything a `Driver` operation can fail with.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DriverError {
    /// A step's timeout elapsed with no reply.
    #[error("timed out waiting for a reply")]
    Timeout,
    /// The command queue was full for the configured enqueue wait (spec
    /// §4.3 "on overflow the send fails with busy").
    #[error("command queue busy")]
    Busy,
    /// Enroll step 2: the target location is already occupied.
    #[error("location {location} is already occupied")]
    Occupied { location: u16 },
    /// Enroll step 7: the new fingerprint already matches an existing
    /// template.
    #[error("duplicate of template {template_id}")]
    Duplicate { template_id: u16 },
    /// Verify/search found no match.
    #[error("no match found")]
    NotFound,
    /// The sensor reported a status this crate does not treat as a
    /// distinguished case (spec §4.8 "other errors").
    #[error("sensor reported status {status:#04x}")]
    SensorError { status: u8 },
    /// The reader task (and with it, the transport) has shut down.
    #[error("transport closed")]
    TransportClosed,
    /// Underlying transport I/O error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Frame codec error surfaced from `fprint-protocol`.
    #[error(transparent)]
    Protocol(#[from] fprint_protocol::ProtocolError),
    /// `power()` was called but no [`crate::transport::PowerControl`] was
    /// configured via [`crate::driver::Driver::with_power_control`].
    #[error("no power control configured")]
    PowerControlUnavailable,
}

pub type DriverResult<T> = Result<T, DriverError>;
