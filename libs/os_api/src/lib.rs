//! Host topology scraping: `/proc/cpuinfo`, NUMA and PCIe data from sysfs,
//! and process affinity, all read relative to an explicit [`HostRoot`].

mod cpuinfo;
mod error;
mod host_root;
mod pcie;
mod sysfs;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod other;

pub use cpuinfo::{CpuInfo, CpuInfoReader, cpu_records, parse_model_name, parse_processors};
pub use error::HostError;
pub use host_root::{HOST_ROOT_ENV, HostRoot};
pub use pcie::{PcieDevice, PcieDeviceKey, PcieInfo};
pub use sysfs::parse_affinity_mask;

// platform implementation behind a common interface
#[cfg(target_os = "linux")]
pub use linux::OS;
#[cfg(not(target_os = "linux"))]
pub use other::OS;
