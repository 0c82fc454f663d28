//! Per-machine load accounting.

use std::collections::{BTreeMap, HashMap};

use crate::core::cloud_api::CloudApi;
use crate::core::common::{MachineId, TaskId};
use crate::core::fleet::FleetCatalog;

/// Tracks the in-flight footprint of every machine: the memory sum and count
/// of currently assigned tasks plus the task-to-machine reverse index.
///
/// These counters are the authoritative placement state. The platform's own
/// `memory_used` readings may lag momentarily after a placement, so they are
/// used only for the utilization ratios ([`machine_util`], [`system_load`])
/// that order machines for consolidation and remediation.
#[derive(Clone, Default)]
pub struct UtilizationTracker {
    loads: BTreeMap<MachineId, u64>,
    task_counts: BTreeMap<MachineId, u32>,
    locations: HashMap<TaskId, MachineId>,
    task_memory: HashMap<TaskId, u64>,
}

impl UtilizationTracker {
    /// Creates a tracker with zeroed counters for every fleet machine.
    pub fn new(fleet: &FleetCatalog) -> Self {
        let mut tracker = Self::default();
        for machine in fleet.machines() {
            tracker.loads.insert(machine, 0);
            tracker.task_counts.insert(machine, 0);
        }
        tracker
    }

    /// Records a successful placement of `task` on `machine`.
    pub fn on_add(&mut self, machine: MachineId, task: TaskId, memory: u64) {
        *self.loads.entry(machine).or_insert(0) += memory;
        *self.task_counts.entry(machine).or_insert(0) += 1;
        self.locations.insert(task, machine);
        self.task_memory.insert(task, memory);
    }

    /// Clears a task from the model on completion or outbound migration.
    /// Returns the machine it ran on and its memory footprint.
    pub fn on_remove(&mut self, task: TaskId) -> Option<(MachineId, u64)> {
        let machine = self.locations.remove(&task)?;
        let memory = self.task_memory.remove(&task).unwrap_or(0);
        if let Some(load) = self.loads.get_mut(&machine) {
            *load = load.saturating_sub(memory);
        }
        if let Some(count) = self.task_counts.get_mut(&machine) {
            *count = count.saturating_sub(1);
        }
        Some((machine, memory))
    }

    /// Returns the memory sum of tasks currently assigned to the machine.
    pub fn load(&self, machine: MachineId) -> u64 {
        self.loads.get(&machine).cloned().unwrap_or(0)
    }

    /// Returns the number of tasks currently assigned to the machine.
    pub fn task_count(&self, machine: MachineId) -> u32 {
        self.task_counts.get(&machine).cloned().unwrap_or(0)
    }

    /// Returns the machine the task is currently assigned to.
    pub fn locate(&self, task: TaskId) -> Option<MachineId> {
        self.locations.get(&task).cloned()
    }

    /// Returns the cached memory footprint of an in-flight task.
    pub fn task_memory(&self, task: TaskId) -> Option<u64> {
        self.task_memory.get(&task).cloned()
    }
}

/// Memory utilization of a machine from live platform introspection.
pub fn machine_util(api: &dyn CloudApi, machine: MachineId) -> f64 {
    match api.machine_info(machine) {
        Some(info) if info.memory_size > 0 => info.memory_used as f64 / info.memory_size as f64,
        _ => 0.,
    }
}

/// Memory utilization across the given machines, used as the system load proxy.
pub fn system_load(api: &dyn CloudApi, machines: &[MachineId]) -> f64 {
    let mut total = 0u64;
    let mut used = 0u64;
    for &machine in machines {
        if let Some(info) = api.machine_info(machine) {
            total += info.memory_size;
            used += info.memory_used;
        }
    }
    if total > 0 {
        used as f64 / total as f64
    } else {
        0.
    }
}
