//! Error types for host topology scraping.

use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;
use topology::TopologyError;

/// Errors that can occur while reading topology data from the host.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HostError {
    /// A host file or directory could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A `/proc/cpuinfo` field held a value that is not an integer
    #[error("invalid value {value:?} for cpuinfo field {key:?}")]
    InvalidField {
        key: String,
        value: String,
        #[source]
        source: ParseIntError,
    },

    /// A CPU list or affinity mask file held malformed content
    #[error("malformed content in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: TopologyError,
    },

    /// No `nodeN` entry exists for the CPU in sysfs
    #[error("no NUMA node found for CPU {0}")]
    NoNumaNode(usize),

    /// The affinity system call failed
    #[error("failed to query CPU affinity of process {pid}: {source}")]
    Affinity {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// Operation not supported on this platform
    #[error("process affinity queries are not supported on this platform")]
    NotSupported,
}

impl HostError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> HostError {
        let path = path.into();
        move |source| HostError::Io { path, source }
    }
}
