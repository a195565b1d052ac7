//! Error types for topology addressing.

use thiserror::Error;

/// Errors raised while decoding CPU sets or converting between address spaces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TopologyError {
    /// Hex bitset text contained a character that is not a hex digit
    #[error("invalid hex bitset {input:?}: unexpected {found:?} at offset {offset}")]
    InvalidHex {
        input: String,
        found: char,
        offset: usize,
    },

    /// CPU list text could not be parsed
    #[error("invalid CPU list {input:?}: {reason}")]
    InvalidCpuList { input: String, reason: String },

    /// Machine CPU is not part of the topology map
    #[error("machine CPU {0} is not part of the topology map")]
    UnknownCpu(usize),

    /// Abstract CPU is beyond the abstract id space
    #[error("abstract CPU {index} is out of range (map has {len} abstract CPUs)")]
    OutOfRange { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TopologyError::UnknownCpu(42);
        assert_eq!(err.to_string(), "machine CPU 42 is not part of the topology map");

        let err = TopologyError::OutOfRange { index: 4, len: 2 };
        assert_eq!(
            err.to_string(),
            "abstract CPU 4 is out of range (map has 2 abstract CPUs)"
        );

        let err = TopologyError::InvalidHex {
            input: "0xzz".to_string(),
            found: 'z',
            offset: 2,
        };
        assert_eq!(
            err.to_string(),
            "invalid hex bitset \"0xzz\": unexpected 'z' at offset 2"
        );

        let err = TopologyError::InvalidCpuList {
            input: "3-1".to_string(),
            reason: "range start 3 > end 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid CPU list \"3-1\": range start 3 > end 1"
        );
    }
}
