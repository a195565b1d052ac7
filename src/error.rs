use std::io;

use os_api::HostError;
use thiserror::Error;
use topology::TopologyError;

/// Any failure that aborts a command.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}
