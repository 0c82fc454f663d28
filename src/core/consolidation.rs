//! Workload consolidation planning.
//!
//! After a task completes, the engine tries to empty the least-utilized
//! powered-on machine by migrating its smallest task onto a more utilized
//! compatible machine, so that the emptied machine can be powered off.
//! Planning is pure: the scheduler executes the returned plan against the
//! platform and owns the counter updates.

use std::collections::HashSet;

use crate::core::cloud_api::CloudApi;
use crate::core::common::{MachineId, TaskId, VmId};
use crate::core::fleet::FleetCatalog;
use crate::core::tier::{Tier, TierController};
use crate::core::utilization::{machine_util, UtilizationTracker};
use crate::core::vm_registry::VmRegistry;

/// A planned migration of one task between two machines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationPlan {
    pub task: TaskId,
    pub memory: u64,
    pub source: MachineId,
    pub source_vm: VmId,
    pub target: MachineId,
}

/// Picks the consolidation migration, if any: the smallest task on the
/// least-utilized powered-on machine, moved to the first CPU-compatible
/// machine with room, scanning the utilization-sorted upper half from the
/// most utilized end downward.
///
/// Machines hosting a VM with an in-flight migration are skipped entirely,
/// both as source and as target.
pub fn plan_migration(
    api: &dyn CloudApi,
    fleet: &FleetCatalog,
    tracker: &UtilizationTracker,
    tiers: &TierController,
    registry: &VmRegistry,
    migrating: &HashSet<VmId>,
) -> Option<MigrationPlan> {
    let mut powered_on: Vec<(MachineId, f64)> = tiers
        .machines_in(Tier::Running)
        .into_iter()
        .filter(|&machine| !registry.vms_on(machine).iter().any(|vm| migrating.contains(vm)))
        .map(|machine| (machine, machine_util(api, machine)))
        .collect();
    if powered_on.len() < 2 {
        return None;
    }
    powered_on.sort_by(|a, b| a.1.total_cmp(&b.1));

    let (low, _) = powered_on[0];

    // smallest in-flight task on the least-utilized machine
    let mut smallest: Option<(TaskId, u64, VmId)> = None;
    for vm in registry.vms_on(low) {
        let Some(info) = api.vm_info(vm) else { continue };
        for task in info.active_tasks {
            let Some(memory) = tracker.task_memory(task) else { continue };
            if smallest.map_or(true, |(_, best, _)| memory < best) {
                smallest = Some((task, memory, vm));
            }
        }
    }
    let (task, memory, source_vm) = smallest?;
    let cpu = api.task_info(task)?.required_cpu;

    let half = (powered_on.len() + 1) / 2;
    for idx in (half..powered_on.len()).rev() {
        let (target, _) = powered_on[idx];
        if target == low {
            continue;
        }
        let attrs = fleet.attrs(target);
        if attrs.cpu != cpu {
            continue;
        }
        let Some(info) = api.machine_info(target) else { continue };
        if info.memory_used + memory <= attrs.memory_size {
            return Some(MigrationPlan {
                task,
                memory,
                source: low,
                source_vm,
                target,
            });
        }
    }
    None
}
