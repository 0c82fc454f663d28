//! Registry of VMs created by the scheduler.

use std::collections::BTreeMap;

use crate::core::cloud_api::{ApiError, CloudApi};
use crate::core::common::{CpuArch, MachineId, VmFlavor, VmId};
use crate::core::fleet::FleetCatalog;

/// Flavor of the VMs created when a machine joins the RUNNING tier without a
/// task in hand.
pub const BOOTSTRAP_FLAVOR: VmFlavor = VmFlavor::Linux;

/// Maps every (machine, flavor) pair in use to its VM and creates VMs on
/// demand. The scheduler holds ids only; the VMs themselves are owned by the
/// platform.
#[derive(Clone, Default)]
pub struct VmRegistry {
    vms: BTreeMap<(MachineId, VmFlavor), VmId>,
    created: Vec<VmId>,
}

impl VmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the VM bound to the machine with the given flavor, creating
    /// and attaching one if absent.
    ///
    /// The VM is always bound to the machine's own CPU: placement filters by
    /// CPU before reaching here, so a differing `cpu` argument is a caller
    /// bug and the machine's CPU supersedes it.
    pub fn ensure_vm(
        &mut self,
        api: &mut dyn CloudApi,
        fleet: &FleetCatalog,
        machine: MachineId,
        flavor: VmFlavor,
        cpu: CpuArch,
    ) -> Result<VmId, ApiError> {
        if let Some(&vm) = self.vms.get(&(machine, flavor)) {
            return Ok(vm);
        }
        let machine_cpu = fleet.attrs(machine).cpu;
        debug_assert_eq!(cpu, machine_cpu);
        let vm = api.create_vm(flavor, machine_cpu);
        api.attach_vm(vm, machine)?;
        self.vms.insert((machine, flavor), vm);
        self.created.push(vm);
        Ok(vm)
    }

    /// Returns the machine's VM of any flavor, creating a bootstrap VM if the
    /// machine has none.
    pub fn ensure_bootstrap(
        &mut self,
        api: &mut dyn CloudApi,
        fleet: &FleetCatalog,
        machine: MachineId,
    ) -> Result<VmId, ApiError> {
        if let Some(vm) = self.vms_on(machine).first() {
            return Ok(*vm);
        }
        let cpu = fleet.attrs(machine).cpu;
        self.ensure_vm(api, fleet, machine, BOOTSTRAP_FLAVOR, cpu)
    }

    /// Returns the VM bound to the machine with the given flavor, if any.
    pub fn vm_on(&self, machine: MachineId, flavor: VmFlavor) -> Option<VmId> {
        self.vms.get(&(machine, flavor)).cloned()
    }

    /// Returns all VMs bound to the machine, in flavor order.
    pub fn vms_on(&self, machine: MachineId) -> Vec<VmId> {
        self.vms
            .iter()
            .filter(|((m, _), _)| *m == machine)
            .map(|(_, &vm)| vm)
            .collect()
    }

    /// Shuts down and forgets every VM bound to the machine. Used before a
    /// machine leaves the RUNNING tier.
    pub fn shutdown_machine_vms(&mut self, api: &mut dyn CloudApi, machine: MachineId) {
        let gone: Vec<(MachineId, VmFlavor)> = self
            .vms
            .keys()
            .filter(|(m, _)| *m == machine)
            .cloned()
            .collect();
        for key in gone {
            if let Some(vm) = self.vms.remove(&key) {
                api.shutdown_vm(vm);
                self.created.retain(|&v| v != vm);
            }
        }
    }

    /// Shuts down every VM the scheduler created, in creation order.
    pub fn shutdown_all(&mut self, api: &mut dyn CloudApi) {
        for vm in self.created.drain(..) {
            api.shutdown_vm(vm);
        }
        self.vms.clear();
    }

    /// Returns the number of live VMs.
    pub fn vm_count(&self) -> usize {
        self.created.len()
    }
}
