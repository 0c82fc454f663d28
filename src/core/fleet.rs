//! Static fleet catalog.

use std::collections::BTreeMap;

use crate::core::cloud_api::CloudApi;
use crate::core::common::{CpuArch, MachineId};

/// Cached machine attributes. Read once at init, never refreshed: capacity
/// and CPU architecture do not change over a machine lifetime.
#[derive(Clone, Debug)]
pub struct MachineAttrs {
    pub cpu: CpuArch,
    pub memory_size: u64,
    pub gpus: u32,
}

/// Catalog of all machines, indexed by id and grouped by CPU architecture.
/// Pure read side; populated once during init and never mutated.
#[derive(Clone, Default)]
pub struct FleetCatalog {
    attrs: BTreeMap<MachineId, MachineAttrs>,
    by_cpu: BTreeMap<CpuArch, Vec<MachineId>>,
}

impl FleetCatalog {
    /// Enumerates all platform machines and caches their attributes.
    pub fn build(api: &dyn CloudApi) -> Self {
        let mut catalog = Self::default();
        for machine in 0..api.machine_count() {
            if let Some(info) = api.machine_info(machine) {
                catalog.attrs.insert(
                    machine,
                    MachineAttrs {
                        cpu: info.cpu,
                        memory_size: info.memory_size,
                        gpus: info.gpus,
                    },
                );
                catalog.by_cpu.entry(info.cpu).or_default().push(machine);
            }
        }
        catalog
    }

    /// Returns the cached attributes of the specified machine.
    pub fn attrs(&self, machine: MachineId) -> &MachineAttrs {
        &self.attrs[&machine]
    }

    /// Returns IDs of all machines with the specified CPU, in discovery order.
    pub fn machines_by_cpu(&self, cpu: CpuArch) -> &[MachineId] {
        self.by_cpu.get(&cpu).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns IDs of all machines in discovery order.
    pub fn machines(&self) -> Vec<MachineId> {
        self.attrs.keys().cloned().collect()
    }

    /// Returns the CPU groups of the fleet.
    pub fn cpu_groups(&self) -> &BTreeMap<CpuArch, Vec<MachineId>> {
        &self.by_cpu
    }

    /// Returns the number of machines.
    pub fn machine_count(&self) -> u32 {
        self.attrs.len() as u32
    }
}
