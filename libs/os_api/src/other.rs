use topology::MachineCpuSet;

use crate::error::HostError;

pub struct OS;

impl OS {
    pub fn process_affinity(_pid: Option<u32>) -> Result<MachineCpuSet, HostError> {
        Err(HostError::NotSupported)
    }
}
