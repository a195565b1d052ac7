//! `/proc/cpuinfo` parsing and per-CPU NUMA enrichment.

use std::fs;
use std::io;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use topology::{Bitset, CpuRecord, MachineCpuSet};

use crate::error::HostError;
use crate::host_root::HostRoot;
use crate::sysfs::{read_affinity_mask, read_line};

static NODE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^node(\d+)$").expect("node entry pattern is valid"));

/// Topology and NUMA placement of one machine CPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    /// Enumerated CPU id
    pub cpu_id: usize,
    /// Core id, unique within each socket
    pub core_id: usize,
    /// Physical socket id
    pub socket_id: usize,
    /// NUMA node, -1 when unknown
    pub numa_node: i32,
    /// CPUs local to the NUMA node, serialized as canonical hex (`null` when
    /// unknown) rather than the raw sysfs `cpumap` text
    pub numa_node_affinity_mask: Option<Bitset>,
}

impl From<CpuRecord> for CpuInfo {
    fn from(record: CpuRecord) -> Self {
        Self {
            cpu_id: record.cpu_id,
            core_id: record.core_id,
            socket_id: record.socket_id,
            numa_node: -1,
            numa_node_affinity_mask: None,
        }
    }
}

impl From<&CpuInfo> for CpuRecord {
    fn from(info: &CpuInfo) -> Self {
        CpuRecord::new(info.cpu_id, info.core_id, info.socket_id)
    }
}

/// Topology records for building a [`topology::CpuMap`].
pub fn cpu_records(infos: &[CpuInfo]) -> Vec<CpuRecord> {
    infos.iter().map(CpuRecord::from).collect()
}

/// Fields gathered from one blank-line-delimited processor block.
#[derive(Debug, Default)]
struct ProcessorBlock {
    cpu_id: Option<usize>,
    socket_id: Option<usize>,
    core_id: Option<usize>,
}

impl ProcessorBlock {
    fn read_line(&mut self, line: &str) -> Result<(), HostError> {
        let Some((key, value)) = line.split_once(':') else {
            return Ok(());
        };
        let key = key.trim();
        let slot = match key {
            "processor" => &mut self.cpu_id,
            "physical id" => &mut self.socket_id,
            "core id" => &mut self.core_id,
            _ => return Ok(()),
        };
        let value = value.trim();
        let parsed = value.parse::<i64>().map_err(|source| HostError::InvalidField {
            key: key.to_string(),
            value: value.to_string(),
            source,
        })?;
        // negative ids are the kernel's "unresolved" sentinel
        *slot = usize::try_from(parsed).ok();
        Ok(())
    }

    /// Blocks missing any of the three ids do not describe a usable CPU.
    fn finish(self) -> Option<CpuRecord> {
        Some(CpuRecord::new(self.cpu_id?, self.core_id?, self.socket_id?))
    }
}

/// Parses the processor blocks of `/proc/cpuinfo` text.
///
/// Blocks without `processor`, `physical id` and `core id` are skipped, which
/// is the case on platforms that do not report sockets. Blocks where one of
/// them is negative (unresolved, e.g. `-1`) are skipped too.
///
/// # Errors
///
/// Returns [`HostError::InvalidField`] if one of those fields is not an
/// integer.
pub fn parse_processors(text: &str) -> Result<Vec<CpuRecord>, HostError> {
    let mut records = Vec::new();
    let mut block = ProcessorBlock::default();
    for line in text.lines() {
        if line.trim().is_empty() {
            records.extend(std::mem::take(&mut block).finish());
        } else {
            block.read_line(line)?;
        }
    }
    records.extend(block.finish());
    Ok(records)
}

/// First `model name` value in `/proc/cpuinfo` text.
pub fn parse_model_name(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "model name")
        .map(|(_, value)| value.trim().to_string())
}

/// Reads CPU topology records from a host root.
#[derive(Debug, Clone)]
pub struct CpuInfoReader {
    host: HostRoot,
    no_ecores: bool,
}

impl CpuInfoReader {
    pub fn new(host: HostRoot) -> Self {
        Self {
            host,
            no_ecores: false,
        }
    }

    /// Leaves Intel E-cores out of the results.
    pub fn without_ecores(mut self) -> Self {
        self.no_ecores = true;
        self
    }

    /// Reads every CPU from `/proc/cpuinfo`, in file order.
    ///
    /// NUMA data is best-effort: CPUs whose node cannot be determined are kept
    /// with `numa_node == -1` and a warning is logged.
    pub fn read(&self) -> Result<Vec<CpuInfo>, HostError> {
        let path = self.host.proc("cpuinfo");
        let text = fs::read_to_string(&path).map_err(HostError::io(&path))?;
        let ecores = if self.no_ecores {
            self.ecores()?
        } else {
            MachineCpuSet::new()
        };

        let mut infos = Vec::new();
        for record in parse_processors(&text)? {
            if ecores.contains(record.cpu_id) {
                debug!("skipping E-core CPU {}", record.cpu_id);
                continue;
            }
            let mut info = CpuInfo::from(record);
            if let Err(err) = self.populate_numa(&mut info) {
                warn!("failed to populate NUMA info for CPU {}: {err}", info.cpu_id);
            }
            infos.push(info);
        }
        Ok(infos)
    }

    /// CPU model name, if `/proc/cpuinfo` reports one.
    pub fn model_name(&self) -> Result<Option<String>, HostError> {
        let path = self.host.proc("cpuinfo");
        let text = fs::read_to_string(&path).map_err(HostError::io(&path))?;
        Ok(parse_model_name(&text))
    }

    /// CPUs listed as E-cores; empty when the host has no hybrid CPU.
    fn ecores(&self) -> Result<MachineCpuSet, HostError> {
        let path = self.host.sys("devices/cpu_atom/cpus");
        let list = match read_line(&path) {
            Ok(list) => list,
            Err(HostError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(MachineCpuSet::new());
            }
            Err(err) => return Err(err),
        };
        list.parse()
            .map_err(|source| HostError::Malformed { path, source })
    }

    fn populate_numa(&self, info: &mut CpuInfo) -> Result<(), HostError> {
        let cpu_dir = self
            .host
            .sys(format!("devices/system/cpu/cpu{}", info.cpu_id));
        let entries = fs::read_dir(&cpu_dir).map_err(HostError::io(&cpu_dir))?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(node) = name
                .to_str()
                .and_then(|name| NODE_ENTRY.captures(name))
                .and_then(|caps| caps[1].parse::<i32>().ok())
            else {
                continue;
            };

            info.numa_node = node;
            let mask_path = self
                .host
                .sys(format!("devices/system/node/node{node}/cpumap"));
            match read_affinity_mask(&mask_path) {
                Ok(mask) => info.numa_node_affinity_mask = Some(mask),
                Err(err) => warn!("no affinity mask for NUMA node {node}: {err}"),
            }
            return Ok(());
        }
        Err(HostError::NoNumaNode(info.cpu_id))
    }
}
