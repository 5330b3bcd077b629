// src/error.rs
//
// Error taxonomy for the engine. Driver-level return codes are collapsed
// into DriverError at the façade boundary; the engine only ever reacts to
// this small vocabulary, never to vendor-library status codes directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    // Retry-bounded; the engine returns to polling at the next iteration.
    #[error("transient radio error: {0}")]
    Transient(String),

    #[error("external RF off or peer disconnected")]
    RfOff,

    // Fatal: the engine exits with a startup error.
    #[error("driver initialization failed: {0}")]
    InitFailed(String),

    #[error("presence check failed")]
    PresenceLost,

    #[error("driver rejected command: {0}")]
    Nak(String),
}

// Parse failures are never fatal to the owning tag/device: the caller gets
// back whatever records were accepted before the truncation point.
#[derive(Debug, Error)]
pub enum NdefError {
    #[error("truncated record at offset {offset}")]
    Truncated { offset: usize },

    #[error("record missing required field: {0}")]
    MissingField(&'static str),

    #[error("message-begin bit not set on first record")]
    NotMessageStart,

    #[error("chunked records are not supported")]
    ChunkedUnsupported,
}

// Only DriverInit is fatal; every other variant is logged and absorbed by
// the caller without panicking the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("driver initialization failure: {0}")]
    DriverInit(String),

    #[error("unknown tag id {0}")]
    UnknownTag(u32),

    #[error("unknown device id {0}")]
    UnknownDevice(u32),

    #[error("tag {0} is not connected")]
    TagDisconnected(u32),

    #[error("device {0} is not connected")]
    DeviceDisconnected(u32),
}
