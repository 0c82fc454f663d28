//! The scheduler: callback surface and engines.
//!
//! The external simulator drives the scheduler through the callback methods
//! below, one event at a time. Engines run to completion per event and
//! commit all model mutations before returning; no error escapes a callback.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use sugars::{rc, refcell};

use crate::core::cloud_api::{CloudApi, TaskInfo};
use crate::core::common::{MachineId, Priority, SlaClass, TaskId, Time, VmId};
use crate::core::config::SchedulerConfig;
use crate::core::consolidation::{plan_migration, MigrationPlan};
use crate::core::energy::EnergyRanker;
use crate::core::fleet::FleetCatalog;
use crate::core::logger::{Logger, StdoutLogger};
use crate::core::placement::{EnergyFirstFit, PlacementPolicy};
use crate::core::sla;
use crate::core::tier::{Tier, TierController};
use crate::core::utilization::{machine_util, UtilizationTracker};
use crate::core::vm_registry::VmRegistry;

const SCOPE: &str = "scheduler";

/// Energy-aware workload scheduler.
///
/// Owns the whole placement model: fleet catalog, utilization tracker, VM
/// registry, energy ranking and tier controller. Single-threaded cooperative:
/// the hosting simulator never invokes two callbacks concurrently.
pub struct Scheduler {
    api: Rc<RefCell<dyn CloudApi>>,
    config: Rc<SchedulerConfig>,
    logger: Rc<RefCell<Box<dyn Logger>>>,
    policy: Box<dyn PlacementPolicy>,
    fleet: FleetCatalog,
    tracker: UtilizationTracker,
    registry: VmRegistry,
    ranker: EnergyRanker,
    tiers: TierController,
    migrating: HashSet<VmId>,
    util_snapshot: Vec<(MachineId, f64)>,
    completed_tasks: u64,
    periodic_ticks: u64,
    last_util_refresh: Option<Time>,
}

impl Scheduler {
    /// Creates a scheduler over the given platform with the default
    /// energy-first-fit policy and stdout logging.
    pub fn new(api: Rc<RefCell<dyn CloudApi>>, config: SchedulerConfig) -> Self {
        Self {
            api,
            config: rc!(config),
            logger: rc!(refcell!(Box::new(StdoutLogger::new()) as Box<dyn Logger>)),
            policy: Box::new(EnergyFirstFit::new()),
            fleet: FleetCatalog::default(),
            tracker: UtilizationTracker::default(),
            registry: VmRegistry::new(),
            ranker: EnergyRanker::new(),
            tiers: TierController::new(),
            migrating: HashSet::new(),
            util_snapshot: Vec::new(),
            completed_tasks: 0,
            periodic_ticks: 0,
            last_util_refresh: None,
        }
    }

    /// Replaces the placement policy.
    pub fn with_placement_policy(mut self, policy: Box<dyn PlacementPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the logger.
    pub fn with_logger(mut self, logger: Rc<RefCell<Box<dyn Logger>>>) -> Self {
        self.logger = logger;
        self
    }

    // CALLBACK SURFACE ////////////////////////////////////////////////////////////////////////////

    /// Discovers the fleet, splits it into tiers and creates the bootstrap
    /// VMs for the RUNNING tier. Called once at startup.
    pub fn init(&mut self) {
        let api_rc = self.api.clone();
        let mut api = api_rc.borrow_mut();
        self.fleet = FleetCatalog::build(&*api);
        self.tracker = UtilizationTracker::new(&self.fleet);
        self.tiers.init_tiers(&mut *api, &self.fleet, &self.config);
        for machine in self.tiers.machines_in(Tier::Running) {
            if let Err(e) = self.registry.ensure_bootstrap(&mut *api, &self.fleet, machine) {
                self.log_error(0, format!("failed to create vm on machine {}: {}", machine, e));
            }
        }
        self.ranker.rebuild(&*api, &self.fleet.machines());
        self.log_info(
            0,
            format!(
                "initialized: {} machines, {} running, {} standby",
                self.fleet.machine_count(),
                self.tiers.count(Tier::Running),
                self.tiers.count(Tier::Intermediate)
            ),
        );
    }

    /// Places a newly arrived task, escalating from the RUNNING tier through
    /// standby and off machines of the required CPU.
    pub fn new_task(&mut self, now: Time, task_id: TaskId) {
        let api_rc = self.api.clone();
        let mut api = api_rc.borrow_mut();
        let Some(task) = api.task_info(task_id) else {
            self.log_error(now, format!("arrival of unknown task {}", task_id));
            return;
        };
        if self.place_task(now, &mut *api, &task) {
            self.tiers
                .adjust_tiers(now, &mut *api, &self.fleet, &self.tracker, &mut self.registry, &self.config);
        } else {
            self.log_warn(now, format!("sla violation - could not place task {}", task_id));
        }
    }

    /// Releases the completed task and runs the consolidation pass: migrate
    /// the smallest task off the least-utilized machine, power off emptied
    /// machines, and periodically pre-activate capacity.
    pub fn task_complete(&mut self, now: Time, task_id: TaskId) {
        let api_rc = self.api.clone();
        let mut api = api_rc.borrow_mut();
        let Some((machine, _)) = self.tracker.on_remove(task_id) else {
            self.log_debug(now, format!("completion of unknown task {}", task_id));
            return;
        };
        self.log_trace(now, format!("task {} completed on machine {}", task_id, machine));

        if let Some(plan) = plan_migration(
            &*api,
            &self.fleet,
            &self.tracker,
            &self.tiers,
            &self.registry,
            &self.migrating,
        ) {
            self.execute_migration(now, &mut *api, &plan);
        }

        self.sweep_idle(now, &mut *api);

        self.completed_tasks += 1;
        if self.completed_tasks % self.config.backstop_period == 0 {
            self.backstop(now, &mut *api);
        }
    }

    /// Tries to move an at-risk task to a less utilized compatible machine,
    /// waking an off machine as the last resort.
    pub fn sla_warning(&mut self, now: Time, task_id: TaskId) {
        let api_rc = self.api.clone();
        let mut api = api_rc.borrow_mut();
        let Some(current) = self.tracker.locate(task_id) else {
            self.log_warn(now, format!("sla warning for task {} with unknown location", task_id));
            return;
        };
        let Some(task) = api.task_info(task_id) else {
            self.log_error(now, format!("sla warning for unknown task {}", task_id));
            return;
        };
        let priority = Priority::from(task.sla);

        let Some(source_vm) = self
            .registry
            .vms_on(current)
            .into_iter()
            .find(|&vm| api.vm_info(vm).map_or(false, |info| info.active_tasks.contains(&task_id)))
        else {
            self.log_warn(now, format!("task {} not found on machine {}", task_id, current));
            return;
        };

        if let Err(e) = api.remove_task(source_vm, task_id) {
            self.log_warn(now, format!("cannot move at-risk task {}: {}", task_id, e));
            return;
        }

        let mut target: Option<MachineId> = None;
        for machine in sla::remediation_candidates(&task, current, &*api, &self.fleet, &self.tiers) {
            if self.try_admit(now, &mut *api, machine, &task, priority) {
                target = Some(machine);
                break;
            }
        }
        if target.is_none() {
            for machine in sla::wake_candidates(&task, &self.fleet, &self.tiers) {
                self.tiers.activate(&mut *api, machine);
                self.log_info(now, format!("activated machine {} for at-risk task {}", machine, task_id));
                if self.try_admit(now, &mut *api, machine, &task, priority) {
                    target = Some(machine);
                    break;
                }
            }
        }

        match target {
            Some(machine) => {
                self.tracker.on_remove(task_id);
                self.tracker.on_add(machine, task_id, task.memory);
                self.migrating.insert(source_vm);
                self.log_info(
                    now,
                    format!("migrated at-risk task {} from machine {} to machine {}", task_id, current, machine),
                );
            }
            None => {
                // no admissible machine anywhere; put the task back
                if let Err(e) = api.add_task(source_vm, task_id, priority) {
                    self.tracker.on_remove(task_id);
                    self.log_error(now, format!("task {} lost during remediation: {}", task_id, e));
                } else {
                    self.log_warn(now, format!("sla violation - no better machine for task {}", task_id));
                }
            }
        }
    }

    /// Observational: a machine reported memory over-commit.
    pub fn memory_warning(&mut self, now: Time, machine: MachineId) {
        self.log_warn(now, format!("memory overcommit reported on machine {}", machine));
    }

    /// Clears the migration-in-flight flag of the VM.
    pub fn migration_done(&mut self, now: Time, vm: VmId) {
        if self.migrating.remove(&vm) {
            self.log_debug(now, format!("migration involving vm {} finished", vm));
        }
    }

    /// Observational: a previously requested power transition finished.
    pub fn state_change_complete(&mut self, now: Time, machine: MachineId) {
        let api_rc = self.api.clone();
        let api = api_rc.borrow();
        if let Some(info) = api.machine_info(machine) {
            self.log_debug(now, format!("machine {} reached {}", machine, info.s_state));
        }
    }

    /// Periodic maintenance: refresh the utilization snapshot, adjust tiers
    /// (self-gated), sweep idle machines and rebuild the energy ranking.
    pub fn periodic_check(&mut self, now: Time) {
        let api_rc = self.api.clone();
        let mut api = api_rc.borrow_mut();
        self.periodic_ticks += 1;

        let refresh_due = self
            .last_util_refresh
            .map_or(true, |last| now.saturating_sub(last) >= self.config.util_refresh_interval);
        if refresh_due {
            self.last_util_refresh = Some(now);
            self.util_snapshot = self
                .fleet
                .machines()
                .into_iter()
                .map(|machine| (machine, machine_util(&*api, machine)))
                .collect();
            self.log_trace(now, format!("refreshed utilization snapshot of {} machines", self.util_snapshot.len()));
        }

        if self.tiers.adjustment_due(now, &self.config) {
            self.sweep_idle(now, &mut *api);
            self.tiers
                .adjust_tiers(now, &mut *api, &self.fleet, &self.tracker, &mut self.registry, &self.config);
        }

        if self.periodic_ticks % self.config.energy_rank_rebuild_period == 0 {
            self.ranker.rebuild(&*api, &self.fleet.machines());
        }
    }

    /// Prints the final SLA and energy report, then shuts the scheduler down.
    pub fn simulation_complete(&mut self, now: Time) {
        {
            let api_rc = self.api.clone();
            let api = api_rc.borrow();
            println!("SLA violation report");
            println!("SLA0: {}%", api.sla_report(SlaClass::Sla0));
            println!("SLA1: {}%", api.sla_report(SlaClass::Sla1));
            println!("SLA2: {}%", api.sla_report(SlaClass::Sla2));
            println!("Total Energy {}KW-Hour", api.cluster_energy());
            println!("Simulation run finished in {} seconds", now as f64 / 1_000_000.);
        }
        self.shutdown(now);
    }

    /// Shuts down every VM the scheduler created.
    pub fn shutdown(&mut self, now: Time) {
        let api_rc = self.api.clone();
        let mut api = api_rc.borrow_mut();
        self.registry.shutdown_all(&mut *api);
        self.log_info(now, "scheduler shut down".to_string());
    }

    // ENGINES /////////////////////////////////////////////////////////////////////////////////////

    /// The placement ladder: policy-ranked RUNNING machines, then the first
    /// standby machine of the required CPU, then off ones, then any machine
    /// of the CPU group still not running as the emergency step.
    fn place_task(&mut self, now: Time, api: &mut dyn CloudApi, task: &TaskInfo) -> bool {
        if self.ranker.is_empty() {
            self.ranker.rebuild(api, &self.fleet.machines());
        }
        let priority = Priority::from(task.sla);

        for machine in self
            .policy
            .rank(task, &*api, &self.fleet, &self.tracker, &self.tiers, &self.ranker)
        {
            if self.try_place_on(now, api, machine, task, priority) {
                return true;
            }
        }

        // wake a single standby machine; a failed admission falls through to
        // the off-machine step, leaving the other standby machines untouched
        // for the emergency step
        let standby = self
            .fleet
            .machines_by_cpu(task.required_cpu)
            .iter()
            .find(|&&machine| self.tiers.tier(machine) == Tier::Intermediate)
            .cloned();
        if let Some(machine) = standby {
            self.tiers.activate(api, machine);
            self.log_info(now, format!("activated machine {} for task {}", machine, task.id));
            if self.try_place_on(now, api, machine, task, priority) {
                return true;
            }
        }

        for machine in self.fleet.machines_by_cpu(task.required_cpu).to_vec() {
            if self.tiers.tier(machine) != Tier::Off {
                continue;
            }
            self.tiers.activate(api, machine);
            self.log_info(now, format!("woke machine {} for task {}", machine, task.id));
            if self.try_place_on(now, api, machine, task, priority) {
                return true;
            }
        }

        // emergency: every machine of the group still not running — the
        // standby machines step 2 skipped, plus anything the earlier steps
        // failed to bring up
        for machine in self.fleet.machines_by_cpu(task.required_cpu).to_vec() {
            if self.tiers.tier(machine) == Tier::Running {
                continue;
            }
            self.tiers.activate(api, machine);
            if self.try_place_on(now, api, machine, task, priority) {
                self.log_info(now, format!("emergency activation of machine {} for task {}", machine, task.id));
                return true;
            }
        }
        false
    }

    /// Creates/looks up the VM and adds the task, without touching counters.
    fn try_admit(&mut self, now: Time, api: &mut dyn CloudApi, machine: MachineId, task: &TaskInfo, priority: Priority) -> bool {
        let vm = match self
            .registry
            .ensure_vm(api, &self.fleet, machine, task.required_flavor, task.required_cpu)
        {
            Ok(vm) => vm,
            Err(e) => {
                self.log_trace(now, format!("no vm for task {} on machine {}: {}", task.id, machine, e));
                return false;
            }
        };
        match api.add_task(vm, task.id, priority) {
            Ok(()) => true,
            Err(e) => {
                self.log_trace(now, format!("machine {} rejected task {}: {}", machine, task.id, e));
                false
            }
        }
    }

    /// Admits the task and records the placement in the load counters.
    fn try_place_on(&mut self, now: Time, api: &mut dyn CloudApi, machine: MachineId, task: &TaskInfo, priority: Priority) -> bool {
        if !self.try_admit(now, api, machine, task, priority) {
            return false;
        }
        self.tracker.on_add(machine, task.id, task.memory);
        self.log_debug(now, format!("task {} placed on machine {}", task.id, machine));
        true
    }

    /// Executes a planned consolidation migration: remove from the source VM,
    /// add on the target, move the counters, and power off the source if its
    /// VM emptied. A failed target admission restores the task on the source.
    fn execute_migration(&mut self, now: Time, api: &mut dyn CloudApi, plan: &MigrationPlan) {
        let Some(task) = api.task_info(plan.task) else { return };
        let priority = Priority::from(task.sla);

        if let Err(e) = api.remove_task(plan.source_vm, plan.task) {
            self.log_debug(now, format!("migration of task {} aborted: {}", plan.task, e));
            return;
        }

        if self.try_admit(now, api, plan.target, &task, priority) {
            self.tracker.on_remove(plan.task);
            self.tracker.on_add(plan.target, plan.task, plan.memory);
            self.migrating.insert(plan.source_vm);
            self.log_info(
                now,
                format!("migrated task {} from machine {} to machine {}", plan.task, plan.source, plan.target),
            );
            let source_emptied = api
                .vm_info(plan.source_vm)
                .map_or(false, |info| info.active_tasks.is_empty());
            if source_emptied && self.tiers.power_off(api, &mut self.registry, &self.tracker, plan.source) {
                self.log_info(now, format!("machine {} powered off", plan.source));
            }
        } else if let Err(e) = api.add_task(plan.source_vm, plan.task, priority) {
            self.tracker.on_remove(plan.task);
            self.log_error(now, format!("task {} lost during migration: {}", plan.task, e));
        }
    }

    /// Powers off every powered-on machine with no remaining work.
    fn sweep_idle(&mut self, now: Time, api: &mut dyn CloudApi) {
        for machine in self.tiers.machines_in(Tier::Running) {
            if self.tracker.load(machine) == 0
                && self.tracker.task_count(machine) == 0
                && self.tiers.power_off(api, &mut self.registry, &self.tracker, machine)
            {
                self.log_debug(now, format!("machine {} powered off", machine));
            }
        }
    }

    /// Proactive backstop: when the powered-on share of the fleet has fallen
    /// too low, pre-activate a few machines to absorb the next burst.
    fn backstop(&mut self, now: Time, api: &mut dyn CloudApi) {
        let n = self.fleet.machine_count();
        let powered_on = self.tiers.count(Tier::Running);
        if (powered_on as f64) >= self.config.backstop_powered_share * n as f64 {
            return;
        }
        let cap = ((n as f64 * self.config.backstop_activation_share) as u32).min(self.config.backstop_activation_cap);
        let mut budget = cap;
        for tier in [Tier::Intermediate, Tier::Off] {
            for machine in self.tiers.machines_in(tier) {
                if budget == 0 {
                    break;
                }
                if self.tiers.activate(api, machine) {
                    self.registry.ensure_bootstrap(api, &self.fleet, machine).ok();
                    budget -= 1;
                }
            }
        }
        if budget < cap {
            self.log_info(now, format!("proactively activated {} machines", cap - budget));
        }
    }

    // ACCESSORS ///////////////////////////////////////////////////////////////////////////////////

    /// Returns the fleet catalog.
    pub fn fleet(&self) -> &FleetCatalog {
        &self.fleet
    }

    /// Returns the utilization tracker.
    pub fn tracker(&self) -> &UtilizationTracker {
        &self.tracker
    }

    /// Returns the tier controller.
    pub fn tiers(&self) -> &TierController {
        &self.tiers
    }

    /// Returns the VM registry.
    pub fn registry(&self) -> &VmRegistry {
        &self.registry
    }

    /// Returns the energy ranking.
    pub fn energy_ranker(&self) -> &EnergyRanker {
        &self.ranker
    }

    /// Returns the last periodic utilization snapshot.
    pub fn utilization_snapshot(&self) -> &[(MachineId, f64)] {
        &self.util_snapshot
    }

    fn log_error(&self, time: Time, log: String) {
        self.logger.borrow_mut().log_error(time, SCOPE, log);
    }

    fn log_warn(&self, time: Time, log: String) {
        self.logger.borrow_mut().log_warn(time, SCOPE, log);
    }

    fn log_info(&self, time: Time, log: String) {
        self.logger.borrow_mut().log_info(time, SCOPE, log);
    }

    fn log_debug(&self, time: Time, log: String) {
        self.logger.borrow_mut().log_debug(time, SCOPE, log);
    }

    fn log_trace(&self, time: Time, log: String) {
        self.logger.borrow_mut().log_trace(time, SCOPE, log);
    }
}
