//! Machine-numbered CPU sets in the kernel "cpulist" text format (e.g. `0-3,8,10-11`).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::TopologyError;

/// A set of OS-assigned CPU ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MachineCpuSet {
    cpus: BTreeSet<usize>,
}

impl MachineCpuSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cpu: usize) -> bool {
        self.cpus.insert(cpu)
    }

    pub fn contains(&self, cpu: usize) -> bool {
        self.cpus.contains(&cpu)
    }

    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// CPU ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpus.iter().copied()
    }

    pub fn list(&self) -> Vec<usize> {
        self.iter().collect()
    }

    pub fn union(&self, other: &MachineCpuSet) -> MachineCpuSet {
        self.cpus.union(&other.cpus).copied().collect()
    }

    pub fn intersection(&self, other: &MachineCpuSet) -> MachineCpuSet {
        self.cpus.intersection(&other.cpus).copied().collect()
    }

    pub fn difference(&self, other: &MachineCpuSet) -> MachineCpuSet {
        self.cpus.difference(&other.cpus).copied().collect()
    }
}

impl FromIterator<usize> for MachineCpuSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        MachineCpuSet {
            cpus: iter.into_iter().collect(),
        }
    }
}

impl Extend<usize> for MachineCpuSet {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        self.cpus.extend(iter);
    }
}

fn parse_cpu(item: &str, input: &str) -> Result<usize, TopologyError> {
    item.trim()
        .parse()
        .map_err(|_| TopologyError::InvalidCpuList {
            input: input.to_string(),
            reason: format!("invalid CPU id {item:?}"),
        })
}

impl FromStr for MachineCpuSet {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cpus = BTreeSet::new();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(MachineCpuSet { cpus });
        }

        for item in trimmed.split(',') {
            match item.split_once('-') {
                Some((start, end)) => {
                    let start = parse_cpu(start, s)?;
                    let end = parse_cpu(end, s)?;
                    if start > end {
                        return Err(TopologyError::InvalidCpuList {
                            input: s.to_string(),
                            reason: format!("range start {start} > end {end}"),
                        });
                    }
                    cpus.extend(start..=end);
                }
                None => {
                    cpus.insert(parse_cpu(item, s)?);
                }
            }
        }
        Ok(MachineCpuSet { cpus })
    }
}

impl fmt::Display for MachineCpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_range(f: &mut fmt::Formatter<'_>, start: usize, end: usize) -> fmt::Result {
            if start == end {
                write!(f, "{start}")
            } else {
                write!(f, "{start}-{end}")
            }
        }

        let mut cpus = self.iter();
        let Some(first) = cpus.next() else {
            return Ok(());
        };
        let (mut start, mut end) = (first, first);
        for cpu in cpus {
            if cpu == end + 1 {
                end = cpu;
            } else {
                write_range(f, start, end)?;
                f.write_str(",")?;
                start = cpu;
                end = cpu;
            }
        }
        write_range(f, start, end)
    }
}

impl Serialize for MachineCpuSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MachineCpuSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
