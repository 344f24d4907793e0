//! Error taxonomy for the host.
//!
//! Internal plumbing carries `anyhow::Error` with context; these variants mark
//! where a failure stops propagating and what the host does with it.

use thiserror::Error;

use crate::protocol::FramingError;
use crate::tracking::ProbeError;

#[derive(Debug, Error)]
pub enum HostError {
    /// Malformed, truncated or oversized frame.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Bad command payload or record item. Reported back to the client.
    #[error("{0}")]
    Validation(String),

    /// Database could not be opened or the schema could not be applied.
    #[error("storage initialization failed: {0:#}")]
    StorageInit(anyhow::Error),

    /// A write against an initialized database failed.
    #[error("storage write failed: {0:#}")]
    StorageWrite(anyhow::Error),

    /// The active-window probe failed for one tick.
    #[error("window probe failed: {0}")]
    Capability(#[from] ProbeError),
}

impl HostError {
    pub fn validation(message: impl Into<String>) -> Self {
        HostError::Validation(message.into())
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;
