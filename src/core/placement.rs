//! Task placement policies.

use crate::core::cloud_api::{CloudApi, TaskInfo};
use crate::core::common::MachineId;
use crate::core::energy::EnergyRanker;
use crate::core::fleet::FleetCatalog;
use crate::core::tier::{Tier, TierController};
use crate::core::utilization::UtilizationTracker;

/// Trait for implementation of task placement policies.
///
/// The policy is defined as a function of a task demand and the current
/// model state, which returns machine candidates in preference order. The
/// engine attempts the candidates in that order: an admission may still fail
/// at the platform (a machine mid-transition, a stale memory reading), in
/// which case the next candidate is tried.
///
/// Only the RUNNING tier is a policy concern; the fallback paths that wake
/// standby or off machines are policy-independent and live in the scheduler.
pub trait PlacementPolicy {
    fn rank(
        &self,
        task: &TaskInfo,
        api: &dyn CloudApi,
        fleet: &FleetCatalog,
        tracker: &UtilizationTracker,
        tiers: &TierController,
        ranker: &EnergyRanker,
    ) -> Vec<MachineId>;
}

/// Enumerates machines in cumulative-energy order (ascending), keeps the
/// RUNNING, CPU-compatible, memory-admissible ones and orders them by load
/// counter ascending. Ties keep the energy order.
#[derive(Default)]
pub struct EnergyFirstFit;

impl EnergyFirstFit {
    pub fn new() -> Self {
        Default::default()
    }
}

impl PlacementPolicy for EnergyFirstFit {
    fn rank(
        &self,
        task: &TaskInfo,
        api: &dyn CloudApi,
        fleet: &FleetCatalog,
        tracker: &UtilizationTracker,
        tiers: &TierController,
        ranker: &EnergyRanker,
    ) -> Vec<MachineId> {
        let order: Vec<MachineId> = if ranker.is_empty() {
            fleet.machines()
        } else {
            ranker.ranked().to_vec()
        };

        let mut suitable: Vec<(MachineId, u64)> = Vec::new();
        for machine in order {
            if !admissible(task, machine, api, fleet, tiers) {
                continue;
            }
            suitable.push((machine, tracker.load(machine)));
        }
        suitable.sort_by_key(|&(_, load)| load);
        suitable.into_iter().map(|(machine, _)| machine).collect()
    }
}

/// Ignores the energy ranking: orders admissible RUNNING machines by load
/// counter ascending over the fleet discovery order.
#[derive(Default)]
pub struct LeastLoadedFirst;

impl LeastLoadedFirst {
    pub fn new() -> Self {
        Default::default()
    }
}

impl PlacementPolicy for LeastLoadedFirst {
    fn rank(
        &self,
        task: &TaskInfo,
        api: &dyn CloudApi,
        fleet: &FleetCatalog,
        tracker: &UtilizationTracker,
        tiers: &TierController,
        _ranker: &EnergyRanker,
    ) -> Vec<MachineId> {
        let mut suitable: Vec<(MachineId, u64)> = Vec::new();
        for machine in fleet.machines() {
            if !admissible(task, machine, api, fleet, tiers) {
                continue;
            }
            suitable.push((machine, tracker.load(machine)));
        }
        suitable.sort_by_key(|&(_, load)| load);
        suitable.into_iter().map(|(machine, _)| machine).collect()
    }
}

/// A machine admits a task when it is RUNNING, its CPU matches and the live
/// memory reading leaves room for the task footprint.
fn admissible(
    task: &TaskInfo,
    machine: MachineId,
    api: &dyn CloudApi,
    fleet: &FleetCatalog,
    tiers: &TierController,
) -> bool {
    if tiers.tier(machine) != Tier::Running {
        return false;
    }
    let attrs = fleet.attrs(machine);
    if attrs.cpu != task.required_cpu {
        return false;
    }
    match api.machine_info(machine) {
        Some(info) => info.memory_used + task.memory <= attrs.memory_size,
        None => false,
    }
}
