//! Abstract/machine CPU address mapping.
//!
//! Machine CPU ids are whatever the platform reports: sparse, and dependent on
//! offlining and enumeration order. The map groups hardware-thread siblings
//! (CPUs sharing a `(socket, core)` pair) and numbers those groups densely in
//! socket-major, core-minor order. An abstract id always stands for a whole
//! sibling group, so one abstract CPU usually expands to several machine CPUs.

use std::collections::{BTreeMap, HashMap};

use log::warn;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::bitset::Bitset;
use crate::cpuset::MachineCpuSet;
use crate::error::TopologyError;

/// Topology of a single machine CPU, as scraped from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuRecord {
    /// OS-assigned CPU number
    pub cpu_id: usize,
    /// Core number, unique only within a socket
    pub core_id: usize,
    /// Physical package number
    pub socket_id: usize,
}

impl CpuRecord {
    pub fn new(cpu_id: usize, core_id: usize, socket_id: usize) -> Self {
        Self {
            cpu_id,
            core_id,
            socket_id,
        }
    }
}

/// Bidirectional mapping between abstract CPU ids and machine CPU sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMap {
    /// Sibling group per abstract id; the index is the abstract id
    abstract_to_machine: Vec<MachineCpuSet>,
    /// Abstract id of the sibling group containing each machine CPU
    #[serde(serialize_with = "serialize_ordered")]
    machine_to_abstract: HashMap<usize, usize>,
}

fn serialize_ordered<S: Serializer>(
    map: &HashMap<usize, usize>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(map.iter().collect::<BTreeMap<_, _>>())
}

impl CpuMap {
    /// Builds the map from per-CPU records.
    ///
    /// Records are stable-sorted by `(socket_id, core_id, cpu_id)` first, so the
    /// result does not depend on input order. Abstract ids are handed out to
    /// sibling groups in order of first appearance in that sorted sequence.
    ///
    /// Repeated records for a CPU are absorbed. If a CPU is reported under more
    /// than one `(socket_id, core_id)` pair, the first one in sorted order wins
    /// and the others are dropped with a warning.
    pub fn new(records: impl IntoIterator<Item = CpuRecord>) -> Self {
        let mut records: Vec<CpuRecord> = records.into_iter().collect();
        records.sort_by_key(|r| (r.socket_id, r.core_id, r.cpu_id));

        let mut abstract_to_machine: Vec<MachineCpuSet> = Vec::new();
        let mut machine_to_abstract = HashMap::with_capacity(records.len());
        let mut core_to_abstract: HashMap<(usize, usize), usize> = HashMap::new();

        for record in &records {
            let core = (record.socket_id, record.core_id);

            if let Some(&existing) = machine_to_abstract.get(&record.cpu_id) {
                if core_to_abstract.get(&core) != Some(&existing) {
                    warn!(
                        "CPU {} reported on socket {} core {} after an earlier placement; ignoring",
                        record.cpu_id, record.socket_id, record.core_id
                    );
                }
                continue;
            }

            let next = abstract_to_machine.len();
            let abstract_id = *core_to_abstract.entry(core).or_insert(next);
            if abstract_id == next {
                abstract_to_machine.push(MachineCpuSet::new());
            }
            abstract_to_machine[abstract_id].insert(record.cpu_id);
            machine_to_abstract.insert(record.cpu_id, abstract_id);
        }

        Self {
            abstract_to_machine,
            machine_to_abstract,
        }
    }

    /// Number of abstract CPUs.
    pub fn len(&self) -> usize {
        self.abstract_to_machine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abstract_to_machine.is_empty()
    }

    pub fn abstract_to_machine(&self) -> &[MachineCpuSet] {
        &self.abstract_to_machine
    }

    /// Sibling group behind one abstract id.
    pub fn siblings(&self, abstract_id: usize) -> Option<&MachineCpuSet> {
        self.abstract_to_machine.get(abstract_id)
    }

    pub fn abstract_id(&self, machine_cpu: usize) -> Option<usize> {
        self.machine_to_abstract.get(&machine_cpu).copied()
    }

    /// Every machine CPU known to the map.
    pub fn machine_cpus(&self) -> MachineCpuSet {
        self.machine_to_abstract.keys().copied().collect()
    }

    /// All abstract ids `0..len()`.
    pub fn ones_bitset(&self) -> Bitset {
        (0..self.len()).collect()
    }

    /// Converts machine CPUs to the abstract ids of their sibling groups.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::UnknownCpu`] for the first CPU not in the map.
    pub fn to_abstract(&self, cpus: &MachineCpuSet) -> Result<Bitset, TopologyError> {
        cpus.iter()
            .map(|cpu| self.abstract_id(cpu).ok_or(TopologyError::UnknownCpu(cpu)))
            .collect()
    }

    /// Expands abstract ids to every machine CPU of their sibling groups.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::OutOfRange`] for the first id `>= len()`.
    pub fn to_machine(&self, abstract_cpus: &Bitset) -> Result<MachineCpuSet, TopologyError> {
        let mut cpus = MachineCpuSet::new();
        for index in abstract_cpus {
            let siblings = self.siblings(index).ok_or(TopologyError::OutOfRange {
                index,
                len: self.len(),
            })?;
            cpus.extend(siblings.iter());
        }
        Ok(cpus)
    }
}
