//! Small readers for single-value sysfs attribute files.

use std::fs;
use std::path::Path;

use topology::{Bitset, TopologyError};

use crate::error::HostError;

/// Reads the first line of a file, trimmed.
pub(crate) fn read_line(path: &Path) -> Result<String, HostError> {
    let text = fs::read_to_string(path).map_err(HostError::io(path))?;
    Ok(text.lines().next().unwrap_or_default().trim().to_string())
}

/// Reads and parses an affinity mask file such as `node0/cpumap` or `local_cpus`.
pub(crate) fn read_affinity_mask(path: &Path) -> Result<Bitset, HostError> {
    let mask = read_line(path)?;
    parse_affinity_mask(&mask).map_err(|source| HostError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses the kernel's comma-grouped hex mask format (`00000000,0000ffff`).
pub fn parse_affinity_mask(mask: &str) -> Result<Bitset, TopologyError> {
    let digits: String = mask.trim().chars().filter(|&c| c != ',').collect();
    Bitset::parse_hex(&digits)
}
