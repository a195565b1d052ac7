//! PCIe device inventory from `/sys/bus/pci/devices`.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::Path;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use topology::Bitset;

use crate::error::HostError;
use crate::host_root::HostRoot;
use crate::sysfs::{read_affinity_mask, read_line};

/// `domain:bus:device.function`, e.g. `0000:3b:00.0`. VMD domains are wider
/// than four digits (`10000:e1:00.0`).
static PCI_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{4,}:[0-9a-f]{2}:[0-9a-f]{2}\.[0-7]$")
        .expect("PCI address pattern is valid")
});

/// Information about a single PCIe device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcieDevice {
    pub address: String,
    pub vendor: String,
    pub device: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_vendor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_device: String,
    pub class: String,
    /// Bound driver name, empty when unbound
    pub driver: String,
    /// Host bridge the device hangs off, e.g. `pci0000:00`
    pub pcie_root_complex_id: String,
    /// NUMA node, -1 when unknown
    pub numa_node: i32,
    /// CPUs local to the device, serialized as canonical hex (`null` when
    /// unknown) rather than the raw `local_cpus` text
    pub numa_node_affinity_mask: Option<Bitset>,
}

/// Vendor/device identity of a PCIe device, ids without the `0x` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PcieDeviceKey {
    pub vendor: String,
    pub device: String,
    pub sub_vendor: String,
    pub sub_device: String,
}

impl PcieDevice {
    pub fn key(&self) -> PcieDeviceKey {
        PcieDeviceKey {
            vendor: self.vendor.clone(),
            device: self.device.clone(),
            sub_vendor: self.sub_vendor.clone(),
            sub_device: self.sub_device.clone(),
        }
    }
}

/// All PCIe devices found on a host, ordered by address.
#[derive(Debug, Clone, Default)]
pub struct PcieInfo {
    devices: Vec<PcieDevice>,
}

impl PcieInfo {
    /// Scans `<root>/sys/bus/pci/devices`.
    ///
    /// A host without that directory has no PCIe devices. Individual attribute
    /// files are read best-effort and left empty when missing.
    pub fn scan(host: &HostRoot) -> Result<Self, HostError> {
        let pci_dir = host.sys("bus/pci/devices");
        debug!("reading PCIe devices from {}", pci_dir.display());

        let entries = match fs::read_dir(&pci_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(HostError::Io { path: pci_dir, source }),
        };

        let mut devices = Vec::new();
        for entry in entries {
            let entry = entry.map_err(HostError::io(&pci_dir))?;
            let is_link = entry
                .file_type()
                .map_err(HostError::io(entry.path()))?
                .is_symlink();
            let address = entry.file_name().to_string_lossy().into_owned();
            if !is_link || !PCI_ADDRESS.is_match(&address) {
                debug!("skipping non-device entry {address}");
                continue;
            }

            let link = entry.path();
            match fs::canonicalize(&link) {
                Ok(real_path) => devices.push(read_device(&link, &real_path, address)),
                Err(err) => warn!("cannot resolve PCIe device {address}: {err}"),
            }
        }

        devices.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(Self { devices })
    }

    pub fn devices(&self) -> &[PcieDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// First device, by address, with the given ids.
    pub fn find_device(
        &self,
        vendor: &str,
        device: &str,
        sub_vendor: &str,
        sub_device: &str,
    ) -> Option<&PcieDevice> {
        self.devices.iter().find(|d| {
            d.vendor == vendor
                && d.device == device
                && d.sub_vendor == sub_vendor
                && d.sub_device == sub_device
        })
    }
}

fn read_id(dir: &Path, name: &str) -> String {
    read_line(&dir.join(name))
        .map(|id| id.trim_start_matches("0x").to_string())
        .unwrap_or_default()
}

fn read_device(link: &Path, real_path: &Path, address: String) -> PcieDevice {
    let driver = fs::read_link(link.join("driver"))
        .ok()
        .and_then(|target| target.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_default();
    let numa_node = read_line(&link.join("numa_node"))
        .ok()
        .and_then(|node| node.parse().ok())
        .unwrap_or(-1);
    let numa_node_affinity_mask = match read_affinity_mask(&link.join("local_cpus")) {
        Ok(mask) => Some(mask),
        Err(err) => {
            debug!("no local CPU mask for {address}: {err}");
            None
        }
    };
    let pcie_root_complex_id = root_complex_id(real_path).unwrap_or_else(|| address.clone());

    PcieDevice {
        vendor: read_id(link, "vendor"),
        device: read_id(link, "device"),
        sub_vendor: read_id(link, "subsystem_vendor"),
        sub_device: read_id(link, "subsystem_device"),
        class: read_line(&link.join("class")).unwrap_or_default(),
        driver,
        pcie_root_complex_id,
        numa_node,
        numa_node_affinity_mask,
        address,
    }
}

/// Name of the ancestor directly below a `devices` directory, e.g. `pci0000:00`
/// in `/sys/devices/pci0000:00/0000:00:01.0/0000:01:00.0`.
fn root_complex_id(device_path: &Path) -> Option<String> {
    device_path.ancestors().skip(1).find_map(|dir| {
        let name = dir.file_name()?;
        (dir.parent()?.file_name() == Some(OsStr::new("devices")))
            .then(|| name.to_string_lossy().into_owned())
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;

    fn write(path: PathBuf, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Lays out a device under `sys/devices/<bridge>/.../<address>` and links it
    /// from `sys/bus/pci/devices`.
    fn add_device(root: &Path, bridge_path: &str, address: &str, attrs: &[(&str, &str)]) {
        let device_dir = root.join("sys/devices").join(bridge_path).join(address);
        fs::create_dir_all(&device_dir).unwrap();
        for (name, value) in attrs {
            write(device_dir.join(name), value);
        }
        let bus_dir = root.join("sys/bus/pci/devices");
        fs::create_dir_all(&bus_dir).unwrap();
        symlink(&device_dir, bus_dir.join(address)).unwrap();
    }

    #[test]
    fn test_root_complex_id() {
        assert_eq!(
            root_complex_id(Path::new("/sys/devices/pci0000:00/0000:00:01.0/0000:01:00.0")),
            Some("pci0000:00".to_string())
        );
        assert_eq!(
            root_complex_id(Path::new("/sys/devices/pci0000:3a/0000:3a:00.0")),
            Some("pci0000:3a".to_string())
        );
        assert_eq!(root_complex_id(Path::new("/tmp/0000:01:00.0")), None);
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let info = PcieInfo::scan(&HostRoot::new(dir.path())).unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn test_scan_devices() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        add_device(
            root,
            "pci0000:00/0000:00:01.0",
            "0000:01:00.0",
            &[
                ("vendor", "0x144d\n"),
                ("device", "0xa808\n"),
                ("subsystem_vendor", "0x144d\n"),
                ("subsystem_device", "0xa801\n"),
                ("class", "0x010802\n"),
                ("numa_node", "1\n"),
                ("local_cpus", "00000000,0000ff00\n"),
            ],
        );
        add_device(
            root,
            "pci0000:00",
            "0000:00:1f.0",
            &[("vendor", "0x8086\n"), ("device", "0x7a84\n"), ("class", "0x060100\n")],
        );
        let driver_dir = root.join("sys/bus/pci/drivers/nvme");
        fs::create_dir_all(&driver_dir).unwrap();
        symlink(
            &driver_dir,
            root.join("sys/devices/pci0000:00/0000:00:01.0/0000:01:00.0/driver"),
        )
        .unwrap();

        let info = PcieInfo::scan(&HostRoot::new(root)).unwrap();
        assert_eq!(info.len(), 2);

        let bridge = &info.devices()[0];
        assert_eq!(bridge.address, "0000:00:1f.0");
        assert_eq!(bridge.pcie_root_complex_id, "pci0000:00");
        assert_eq!(bridge.driver, "");
        assert_eq!(bridge.numa_node, -1);
        assert_eq!(bridge.numa_node_affinity_mask, None);

        let nvme = info.find_device("144d", "a808", "144d", "a801").unwrap();
        assert_eq!(nvme.address, "0000:01:00.0");
        assert_eq!(nvme.class, "0x010802");
        assert_eq!(nvme.driver, "nvme");
        assert_eq!(nvme.pcie_root_complex_id, "pci0000:00");
        assert_eq!(nvme.numa_node, 1);
        assert_eq!(nvme.numa_node_affinity_mask, Some("0xff00".parse().unwrap()));
        assert_eq!(
            nvme.key(),
            PcieDeviceKey {
                vendor: "144d".to_string(),
                device: "a808".to_string(),
                sub_vendor: "144d".to_string(),
                sub_device: "a801".to_string(),
            }
        );
        assert!(info.find_device("144d", "a808", "", "").is_none());
    }

    #[test]
    fn test_scan_vmd_domain() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        add_device(
            root,
            "pci0000:00/0000:00:0e.0/pci10000:e0/10000:e0:06.0",
            "10000:e1:00.0",
            &[("vendor", "0x8086\n"), ("device", "0x0b60\n")],
        );
        let bus_dir = root.join("sys/bus/pci/devices");
        fs::create_dir_all(bus_dir.join("not-a-device")).unwrap();

        let info = PcieInfo::scan(&HostRoot::new(root)).unwrap();
        assert_eq!(info.len(), 1);
        let device = &info.devices()[0];
        assert_eq!(device.address, "10000:e1:00.0");
        assert_eq!(device.pcie_root_complex_id, "pci0000:00");
        assert_eq!(device.vendor, "8086");
    }

    #[test]
    fn test_json_omits_empty_subsystem_ids() {
        let device = PcieDevice {
            address: "0000:00:1f.0".to_string(),
            vendor: "8086".to_string(),
            device: "7a84".to_string(),
            sub_vendor: String::new(),
            sub_device: String::new(),
            class: "0x060100".to_string(),
            driver: String::new(),
            pcie_root_complex_id: "pci0000:00".to_string(),
            numa_node: -1,
            numa_node_affinity_mask: None,
        };
        assert_eq!(
            serde_json::to_string(&device).unwrap(),
            r#"{"address":"0000:00:1f.0","vendor":"8086","device":"7a84","class":"0x060100","driver":"","pcieRootComplexId":"pci0000:00","numaNode":-1,"numaNodeAffinityMask":null}"#
        );
    }
}
