//! CPU topology addressing.
//!
//! Maps the sparse, machine-specific CPU numbering reported by the OS onto a
//! dense, deterministic "abstract" numbering of hardware-thread sibling groups,
//! and converts CPU sets between the two address spaces.
//!
//! # Examples
//!
//! ```
//! use topology::{Bitset, CpuMap, CpuRecord, MachineCpuSet};
//!
//! # fn main() -> Result<(), topology::TopologyError> {
//! let map = CpuMap::new([
//!     CpuRecord::new(0, 0, 0),
//!     CpuRecord::new(1, 0, 0),
//!     CpuRecord::new(2, 1, 0),
//! ]);
//!
//! let abstract_cpus = map.to_abstract(&"2".parse::<MachineCpuSet>()?)?;
//! assert_eq!(abstract_cpus.to_hex(), "0x2");
//!
//! let machine = map.to_machine(&Bitset::parse_hex("0x1")?)?;
//! assert_eq!(machine.to_string(), "0-1");
//! # Ok(())
//! # }
//! ```

mod bitset;
mod cpu_map;
mod cpuset;
mod error;

pub use bitset::{Bitset, Iter};
pub use cpu_map::{CpuMap, CpuRecord};
pub use cpuset::MachineCpuSet;
pub use error::TopologyError;
