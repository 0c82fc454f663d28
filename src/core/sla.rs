//! SLA-warning remediation planning.

use crate::core::cloud_api::{CloudApi, TaskInfo};
use crate::core::common::MachineId;
use crate::core::fleet::FleetCatalog;
use crate::core::tier::{Tier, TierController};
use crate::core::utilization::machine_util;

/// Powered-on machines the at-risk task could move to, ordered by memory
/// utilization ascending. The current host is excluded; candidates must
/// match the task CPU and admit its footprint.
pub fn remediation_candidates(
    task: &TaskInfo,
    current: MachineId,
    api: &dyn CloudApi,
    fleet: &FleetCatalog,
    tiers: &TierController,
) -> Vec<MachineId> {
    let mut candidates: Vec<(MachineId, f64)> = Vec::new();
    for machine in tiers.machines_in(Tier::Running) {
        if machine == current {
            continue;
        }
        let attrs = fleet.attrs(machine);
        if attrs.cpu != task.required_cpu {
            continue;
        }
        let Some(info) = api.machine_info(machine) else { continue };
        if info.memory_used + task.memory > attrs.memory_size {
            continue;
        }
        candidates.push((machine, machine_util(api, machine)));
    }
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
    candidates.into_iter().map(|(machine, _)| machine).collect()
}

/// Off machines with the task's CPU, in discovery order. Waking one is the
/// last resort when no active machine fits.
pub fn wake_candidates(task: &TaskInfo, fleet: &FleetCatalog, tiers: &TierController) -> Vec<MachineId> {
    fleet
        .machines_by_cpu(task.required_cpu)
        .iter()
        .cloned()
        .filter(|&machine| tiers.tier(machine) == Tier::Off)
        .collect()
}
