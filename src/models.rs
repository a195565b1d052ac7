use os_api::{CpuInfo, PcieDevice};
use serde::Serialize;
use topology::{Bitset, CpuMap, MachineCpuSet};

/// Everything printed by the `report` command.
#[derive(Debug, Clone)]
pub struct TopologyReport {
    pub model: Option<String>,
    pub cpus: Vec<CpuInfo>,
    pub cpu_map: CpuMap,
    pub pcie_devices: Option<Vec<PcieDevice>>,
}

/// CPUs a process may run on, in both address spaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffinityReport {
    pub pid: u32,
    pub machine_cpus: MachineCpuSet,
    pub abstract_cpus: Bitset,
}
