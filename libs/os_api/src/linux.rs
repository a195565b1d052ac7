use std::io;

use nix::sched::{CpuSet, sched_getaffinity};
use nix::unistd::Pid;
use topology::MachineCpuSet;

use crate::error::HostError;

pub struct OS;

impl OS {
    /// Gets the machine CPUs a process is allowed to run on.
    ///
    /// `None` queries the calling process.
    pub fn process_affinity(pid: Option<u32>) -> Result<MachineCpuSet, HostError> {
        let pid = pid.unwrap_or(0);
        let raw = i32::try_from(pid).map_err(|_| HostError::Affinity {
            pid,
            source: io::Error::new(io::ErrorKind::InvalidInput, "pid does not fit in pid_t"),
        })?;
        let set = sched_getaffinity(Pid::from_raw(raw)).map_err(|errno| HostError::Affinity {
            pid,
            source: errno.into(),
        })?;
        Ok((0..CpuSet::count())
            .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_current_process_affinity() {
        let cpus = OS::process_affinity(None).unwrap();
        assert!(!cpus.is_empty(), "Should be allowed on at least one CPU");
        assert_eq!(OS::process_affinity(Some(std::process::id())).unwrap(), cpus);
    }

    #[test]
    fn test_missing_process() {
        // pid_max is at most 2^22
        assert_matches!(
            OS::process_affinity(Some(i32::MAX as u32)),
            Err(HostError::Affinity { .. })
        );
    }

    #[test]
    fn test_pid_beyond_pid_t() {
        assert_matches!(
            OS::process_affinity(Some(u32::MAX)),
            Err(HostError::Affinity { pid: u32::MAX, source })
                if source.kind() == std::io::ErrorKind::InvalidInput
        );
    }
}
