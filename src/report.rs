use log::{info, warn};
use os_api::{cpu_records, CpuInfoReader, HostRoot, PcieInfo, OS};
use topology::CpuMap;

use crate::error::ReportError;
use crate::models::{AffinityReport, TopologyReport};

/// Reads CPUs from the host and builds the abstract CPU map.
pub fn load_map(reader: &CpuInfoReader) -> Result<CpuMap, ReportError> {
    let cpus = reader.read()?;
    Ok(CpuMap::new(cpu_records(&cpus)))
}

impl TopologyReport {
    /// Gathers the report; PCIe devices are scanned only when `pcie_host` is set.
    pub fn collect(
        reader: &CpuInfoReader,
        pcie_host: Option<&HostRoot>,
    ) -> Result<Self, ReportError> {
        let model = reader.model_name()?;
        let cpus = reader.read()?;
        let cpu_map = CpuMap::new(cpu_records(&cpus));
        info!(
            "found {} CPUs in {} sibling groups",
            cpus.len(),
            cpu_map.len()
        );

        let pcie_devices = pcie_host
            .map(PcieInfo::scan)
            .transpose()?
            .map(|pcie| pcie.devices().to_vec());

        Ok(Self {
            model,
            cpus,
            cpu_map,
            pcie_devices,
        })
    }

    /// Renders every section. Encoding happens up front, so a failure leaves
    /// nothing half-printed.
    pub fn render(&self) -> Result<String, ReportError> {
        let mut out = String::new();
        section(&mut out, "CPU Model", self.model.as_deref().unwrap_or_default());
        section(&mut out, "CPU Info", &serde_json::to_string_pretty(&self.cpus)?);
        section(&mut out, "CPU Map", &serde_json::to_string_pretty(&self.cpu_map)?);
        if let Some(devices) = &self.pcie_devices {
            section(&mut out, "PCIe Devices", &serde_json::to_string_pretty(devices)?);
        }
        Ok(out)
    }
}

fn section(out: &mut String, title: &str, body: &str) {
    out.push_str(&format!("===== {title} =====\n{body}\n\n"));
}

impl AffinityReport {
    /// Affinity of `pid` (the current process when `None`), restricted to CPUs
    /// the map knows about.
    pub fn collect(map: &CpuMap, pid: Option<u32>) -> Result<Self, ReportError> {
        let allowed = OS::process_affinity(pid)?;
        let known = map.machine_cpus();

        let unmapped = allowed.difference(&known);
        if !unmapped.is_empty() {
            warn!("CPUs {unmapped} are not in the topology map and are left out");
        }

        let machine_cpus = allowed.intersection(&known);
        let abstract_cpus = map.to_abstract(&machine_cpus)?;
        Ok(Self {
            pid: pid.unwrap_or_else(std::process::id),
            machine_cpus,
            abstract_cpus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology::CpuRecord;

    fn small_report() -> TopologyReport {
        TopologyReport {
            model: Some("Test CPU".to_string()),
            cpus: Vec::new(),
            cpu_map: CpuMap::new([
                CpuRecord::new(0, 0, 0),
                CpuRecord::new(1, 0, 0),
                CpuRecord::new(2, 1, 0),
            ]),
            pcie_devices: None,
        }
    }

    #[test]
    fn test_render_sections() {
        let rendered = small_report().render().unwrap();

        assert!(rendered.starts_with("===== CPU Model =====\nTest CPU\n\n"));
        assert!(rendered.contains("===== CPU Info =====\n[]\n\n"));
        let map_section = concat!(
            "===== CPU Map =====\n",
            "{\n",
            "  \"abstractToMachine\": [\n",
            "    \"0-1\",\n",
            "    \"2\"\n",
            "  ],",
        );
        assert!(rendered.contains(map_section));
        assert!(!rendered.contains("PCIe"));
    }

    #[test]
    fn test_render_pcie_section() {
        let mut report = small_report();
        report.model = None;
        report.pcie_devices = Some(Vec::new());
        let rendered = report.render().unwrap();

        assert!(rendered.starts_with("===== CPU Model =====\n\n\n"));
        assert!(rendered.ends_with("===== PCIe Devices =====\n[]\n\n"));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_affinity_report() {
        let allowed = OS::process_affinity(None).unwrap();
        let map = CpuMap::new(allowed.iter().map(|cpu| CpuRecord::new(cpu, cpu, 0)));

        let report = AffinityReport::collect(&map, None).unwrap();
        assert_eq!(report.pid, std::process::id());
        assert_eq!(report.machine_cpus, allowed);
        assert_eq!(report.abstract_cpus, map.ones_bitset());

        // CPUs missing from the map are left out rather than failing
        let first = allowed.iter().next().unwrap();
        let partial = CpuMap::new([CpuRecord::new(first, 0, 0)]);
        let report = AffinityReport::collect(&partial, None).unwrap();
        assert_eq!(report.machine_cpus.list(), vec![first]);
        assert_eq!(report.abstract_cpus.to_hex(), "0x1");
    }
}
