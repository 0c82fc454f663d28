//! Machine tier state machine.
//!
//! Every machine is a member of exactly one tier: RUNNING (power state S0,
//! accepts placements), INTERMEDIATE (S3 standby, quickly awakened) or OFF
//! (S5). Tier membership is intent: the underlying power transition is an
//! asynchronous request, and a machine may be observed mid-transition.
//! Placement attempts against such machines fail at the platform and the
//! engines fall through to the next candidate.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::cloud_api::CloudApi;
use crate::core::common::{MachineId, PowerState, Time};
use crate::core::config::SchedulerConfig;
use crate::core::fleet::FleetCatalog;
use crate::core::utilization::{system_load, UtilizationTracker};
use crate::core::vm_registry::VmRegistry;

/// Scheduler-managed membership of a machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Tier {
    Running,
    Intermediate,
    Off,
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Tier::Running => write!(f, "running"),
            Tier::Intermediate => write!(f, "intermediate"),
            Tier::Off => write!(f, "off"),
        }
    }
}

/// Maintains tier membership for the whole fleet and issues power-state
/// transitions. The only component allowed to mutate tiers.
#[derive(Clone, Default)]
pub struct TierController {
    tiers: BTreeMap<MachineId, Tier>,
    last_adjustment: Option<Time>,
}

impl TierController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tier of the specified machine.
    pub fn tier(&self, machine: MachineId) -> Tier {
        self.tiers.get(&machine).cloned().unwrap_or(Tier::Off)
    }

    /// Returns the number of machines in the specified tier.
    pub fn count(&self, tier: Tier) -> u32 {
        self.tiers.values().filter(|&&t| t == tier).count() as u32
    }

    /// Returns IDs of all machines in the specified tier, in id order.
    pub fn machines_in(&self, tier: Tier) -> Vec<MachineId> {
        self.tiers
            .iter()
            .filter(|(_, &t)| t == tier)
            .map(|(&machine, _)| machine)
            .collect()
    }

    /// Splits the fleet into initial tiers: ~80% RUNNING, ~15% INTERMEDIATE,
    /// the remainder OFF. RUNNING machines are distributed across CPU groups
    /// so that every architecture keeps at least one active machine when
    /// possible. Standby and off machines get their power-state requests
    /// here; RUNNING machines are already active at startup.
    pub fn init_tiers(&mut self, api: &mut dyn CloudApi, fleet: &FleetCatalog, config: &SchedulerConfig) {
        let n = fleet.machine_count();
        let desired_running = share_ceil(n, config.running_tier_share)
            .max(config.min_running)
            .min(n);
        let desired_intermediate = share_ceil(n, config.intermediate_tier_share)
            .max(config.min_intermediate)
            .min(n - desired_running);

        let groups = fleet.cpu_groups();
        let mut running = 0u32;
        if !groups.is_empty() {
            let per_group = (desired_running / groups.len() as u32).max(1);
            for members in groups.values() {
                let mut allocated = 0u32;
                for &machine in members {
                    if allocated < per_group && running < desired_running {
                        self.tiers.insert(machine, Tier::Running);
                        running += 1;
                        allocated += 1;
                    }
                }
            }
        }

        let mut intermediate = 0u32;
        for members in groups.values() {
            for &machine in members {
                if self.tiers.contains_key(&machine) {
                    continue;
                }
                if running < desired_running {
                    self.tiers.insert(machine, Tier::Running);
                    running += 1;
                } else if intermediate < desired_intermediate {
                    self.tiers.insert(machine, Tier::Intermediate);
                    api.set_machine_state(machine, PowerState::S3);
                    intermediate += 1;
                } else {
                    self.tiers.insert(machine, Tier::Off);
                    api.set_machine_state(machine, PowerState::S5);
                }
            }
        }
    }

    /// Moves a standby or off machine into the RUNNING tier and requests S0.
    /// Returns false if the machine is already RUNNING.
    pub fn activate(&mut self, api: &mut dyn CloudApi, machine: MachineId) -> bool {
        match self.tier(machine) {
            Tier::Intermediate | Tier::Off => {
                api.set_machine_state(machine, PowerState::S0);
                self.tiers.insert(machine, Tier::Running);
                true
            }
            Tier::Running => false,
        }
    }

    /// Moves an idle RUNNING machine to standby: shuts down its VMs,
    /// requests S3 and marks it INTERMEDIATE. Refused while the machine
    /// still carries load.
    pub fn deactivate(
        &mut self,
        api: &mut dyn CloudApi,
        registry: &mut VmRegistry,
        tracker: &UtilizationTracker,
        machine: MachineId,
    ) -> bool {
        if self.tier(machine) != Tier::Running || tracker.load(machine) != 0 {
            return false;
        }
        registry.shutdown_machine_vms(api, machine);
        api.set_machine_state(machine, PowerState::S3);
        self.tiers.insert(machine, Tier::Intermediate);
        true
    }

    /// Powers a machine off entirely. Refused unless both the load counter
    /// and the task count are zero.
    pub fn power_off(
        &mut self,
        api: &mut dyn CloudApi,
        registry: &mut VmRegistry,
        tracker: &UtilizationTracker,
        machine: MachineId,
    ) -> bool {
        if self.tier(machine) == Tier::Off {
            return false;
        }
        if tracker.load(machine) != 0 || tracker.task_count(machine) != 0 {
            return false;
        }
        registry.shutdown_machine_vms(api, machine);
        api.set_machine_state(machine, PowerState::S5);
        self.tiers.insert(machine, Tier::Off);
        true
    }

    /// True when enough time has elapsed since the previous successful
    /// adjustment for `adjust_tiers` to run.
    pub fn adjustment_due(&self, now: Time, config: &SchedulerConfig) -> bool {
        self.last_adjustment
            .map_or(true, |last| now.saturating_sub(last) >= config.adjust_interval)
    }

    /// Recomputes desired tier sizes from a sampled workload estimate and
    /// activates or deactivates machines toward them.
    ///
    /// Gated: a run within `adjust_interval` of the previous successful run
    /// is a no-op, returning false. Activation prefers standby machines over
    /// off ones and is capped per call; deactivation only happens with a
    /// comfortable running surplus and low system memory utilization.
    pub fn adjust_tiers(
        &mut self,
        now: Time,
        api: &mut dyn CloudApi,
        fleet: &FleetCatalog,
        tracker: &UtilizationTracker,
        registry: &mut VmRegistry,
        config: &SchedulerConfig,
    ) -> bool {
        if !self.adjustment_due(now, config) {
            return false;
        }
        self.last_adjustment = Some(now);

        let workload = sample_workload(api, config);
        let (desired_running, _) = tier_sizes(fleet.machine_count(), workload, config);
        let current_running = self.count(Tier::Running);

        if current_running < desired_running {
            let mut budget = (desired_running - current_running).min(config.max_activations_per_adjust);
            for machine in self.machines_in(Tier::Intermediate) {
                if budget == 0 {
                    break;
                }
                if self.activate(api, machine) {
                    registry.ensure_bootstrap(api, fleet, machine).ok();
                    budget -= 1;
                }
            }
            for machine in self.machines_in(Tier::Off) {
                if budget == 0 {
                    break;
                }
                if self.activate(api, machine) {
                    registry.ensure_bootstrap(api, fleet, machine).ok();
                    budget -= 1;
                }
            }
        } else if current_running > desired_running + config.running_surplus {
            let running = self.machines_in(Tier::Running);
            if system_load(api, &running) < config.low_load_threshold {
                let mut budget = config.max_deactivations_per_adjust;
                for machine in running {
                    if budget == 0 {
                        break;
                    }
                    if self.deactivate(api, registry, tracker, machine) {
                        budget -= 1;
                    }
                }
            }
        }
        true
    }
}

/// Desired (running, intermediate) tier sizes for a fleet of `n` machines
/// under the estimated active workload.
fn tier_sizes(n: u32, workload: u32, config: &SchedulerConfig) -> (u32, u32) {
    let running = share_ceil(n, config.running_tier_share)
        .max(config.min_running)
        .max((workload + 1) / 2 + 1)
        .max(3)
        .min(n);
    let intermediate = share_ceil(n, config.intermediate_tier_share)
        .max(config.min_intermediate)
        .min(n - running);
    (running, intermediate)
}

/// Estimates the number of not-yet-completed tasks by sampling the platform
/// task table: at most `workload_sample_limit` tasks, strided when the table
/// is large, scaled back to the full population with a safety margin on top.
fn sample_workload(api: &dyn CloudApi, config: &SchedulerConfig) -> u32 {
    let task_count = api.task_count();
    if task_count == 0 {
        return 0;
    }
    let stride = if task_count > config.sparse_sample_threshold { 10 } else { 1 };
    let limit = task_count.min(config.workload_sample_limit);

    let mut sampled = 0u64;
    let mut active = 0u64;
    let mut id = 0;
    while id < limit {
        if let Some(task) = api.task_info(id) {
            sampled += 1;
            if !task.completed {
                active += 1;
            }
        }
        id += stride;
    }

    let estimate = if stride > 1 && sampled > 0 {
        active * task_count as u64 / sampled
    } else {
        active
    };
    let estimate = (estimate as f64 * config.workload_safety_margin) as u64;
    estimate.min(u32::MAX as u64) as u32
}

fn share_ceil(n: u32, share: f64) -> u32 {
    (n as f64 * share).ceil() as u32
}
