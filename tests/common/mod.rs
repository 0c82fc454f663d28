//! In-memory platform used to drive the scheduler in tests.
//!
//! Implements the `CloudApi` surface the external simulator would provide:
//! machines with power states and energy counters, VMs with admission
//! checks, and a task table. Power-state requests apply immediately by
//! default; with `defer_state_changes` they stay pending until
//! `complete_state_change` is called, which lets tests exercise the
//! transitioning-machine failure paths.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sugars::{rc, refcell};

use ecosched::core::cloud_api::{ApiError, CloudApi, MachineInfo, TaskInfo, VmInfo};
use ecosched::core::common::{CpuArch, MachineId, PowerState, Priority, SlaClass, TaskId, VmFlavor, VmId};
use ecosched::core::config::SchedulerConfig;
use ecosched::core::scheduler::Scheduler;

pub struct MockMachine {
    cpu: CpuArch,
    memory_size: u64,
    gpus: u32,
    state: PowerState,
    pending: Option<PowerState>,
    energy: u64,
}

pub struct MockVm {
    flavor: VmFlavor,
    cpu: CpuArch,
    machine: Option<MachineId>,
    tasks: Vec<TaskId>,
    alive: bool,
}

pub struct MockTask {
    cpu: CpuArch,
    flavor: VmFlavor,
    memory: u64,
    gpu_capable: bool,
    sla: SlaClass,
    completed: bool,
}

#[derive(Default)]
pub struct MockCloud {
    machines: Vec<MockMachine>,
    vms: Vec<MockVm>,
    tasks: Vec<MockTask>,
    priorities: HashMap<TaskId, Priority>,
    /// Every power-state request issued by the scheduler, in order.
    pub state_requests: Vec<(MachineId, PowerState)>,
    defer_state_changes: bool,
    sla_reports: [f64; 4],
    cluster_energy: f64,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_machine(&mut self, cpu: CpuArch, memory_size: u64, gpus: u32) -> MachineId {
        self.machines.push(MockMachine {
            cpu,
            memory_size,
            gpus,
            state: PowerState::S0,
            pending: None,
            energy: 0,
        });
        (self.machines.len() - 1) as MachineId
    }

    pub fn add_task(&mut self, cpu: CpuArch, flavor: VmFlavor, memory: u64, sla: SlaClass) -> TaskId {
        self.tasks.push(MockTask {
            cpu,
            flavor,
            memory,
            gpu_capable: false,
            sla,
            completed: false,
        });
        (self.tasks.len() - 1) as TaskId
    }

    pub fn set_energy(&mut self, machine: MachineId, energy: u64) {
        self.machines[machine as usize].energy = energy;
    }

    pub fn set_sla_report(&mut self, sla: SlaClass, pct: f64) {
        self.sla_reports[sla as usize] = pct;
    }

    pub fn set_cluster_energy(&mut self, energy: f64) {
        self.cluster_energy = energy;
    }

    /// When enabled, power-state requests stay pending until completed.
    pub fn defer_state_changes(&mut self, defer: bool) {
        self.defer_state_changes = defer;
    }

    /// Applies the pending power transition of the machine, if any.
    pub fn complete_state_change(&mut self, machine: MachineId) -> bool {
        match self.machines[machine as usize].pending.take() {
            Some(state) => {
                self.machines[machine as usize].state = state;
                true
            }
            None => false,
        }
    }

    /// Marks the task completed and removes it from its VM, as the simulator
    /// does right before invoking the completion callback.
    pub fn finish_task(&mut self, task: TaskId) {
        self.tasks[task as usize].completed = true;
        for vm in self.vms.iter_mut() {
            vm.tasks.retain(|&t| t != task);
        }
    }

    pub fn machine_state(&self, machine: MachineId) -> PowerState {
        self.machines[machine as usize].state
    }

    pub fn priority_of(&self, task: TaskId) -> Option<Priority> {
        self.priorities.get(&task).cloned()
    }

    /// Tasks currently hosted by the machine, across all its VMs.
    pub fn tasks_on(&self, machine: MachineId) -> Vec<TaskId> {
        self.vms
            .iter()
            .filter(|vm| vm.alive && vm.machine == Some(machine))
            .flat_map(|vm| vm.tasks.iter().cloned())
            .collect()
    }

    pub fn live_vms_on(&self, machine: MachineId) -> Vec<VmId> {
        self.vms
            .iter()
            .enumerate()
            .filter(|(_, vm)| vm.alive && vm.machine == Some(machine))
            .map(|(id, _)| id as VmId)
            .collect()
    }

    pub fn vm_total(&self) -> usize {
        self.vms.len()
    }

    fn memory_used(&self, machine: MachineId) -> u64 {
        self.vms
            .iter()
            .filter(|vm| vm.alive && vm.machine == Some(machine))
            .flat_map(|vm| vm.tasks.iter())
            .map(|&t| self.tasks[t as usize].memory)
            .sum()
    }
}

impl CloudApi for MockCloud {
    fn machine_count(&self) -> u32 {
        self.machines.len() as u32
    }

    fn machine_info(&self, machine: MachineId) -> Option<MachineInfo> {
        let m = self.machines.get(machine as usize)?;
        Some(MachineInfo {
            id: machine,
            cpu: m.cpu,
            memory_size: m.memory_size,
            memory_used: self.memory_used(machine),
            gpus: m.gpus,
            s_state: m.state,
            active_tasks: self.tasks_on(machine).len() as u32,
        })
    }

    fn machine_energy(&self, machine: MachineId) -> u64 {
        self.machines[machine as usize].energy
    }

    fn set_machine_state(&mut self, machine: MachineId, state: PowerState) {
        self.state_requests.push((machine, state));
        let m = &mut self.machines[machine as usize];
        if self.defer_state_changes {
            m.pending = Some(state);
        } else {
            m.state = state;
        }
    }

    fn create_vm(&mut self, flavor: VmFlavor, cpu: CpuArch) -> VmId {
        self.vms.push(MockVm {
            flavor,
            cpu,
            machine: None,
            tasks: Vec::new(),
            alive: true,
        });
        (self.vms.len() - 1) as VmId
    }

    fn attach_vm(&mut self, vm: VmId, machine: MachineId) -> Result<(), ApiError> {
        if machine as usize >= self.machines.len() {
            return Err(ApiError::UnknownMachine(machine));
        }
        let v = self.vms.get_mut(vm as usize).ok_or(ApiError::UnknownVm(vm))?;
        if v.machine.is_some() {
            return Err(ApiError::AlreadyAttached(vm));
        }
        v.machine = Some(machine);
        Ok(())
    }

    fn vm_info(&self, vm: VmId) -> Option<VmInfo> {
        let v = self.vms.get(vm as usize)?;
        if !v.alive {
            return None;
        }
        Some(VmInfo {
            id: vm,
            flavor: v.flavor,
            cpu: v.cpu,
            machine_id: v.machine,
            active_tasks: v.tasks.clone(),
        })
    }

    fn add_task(&mut self, vm: VmId, task: TaskId, priority: Priority) -> Result<(), ApiError> {
        let v = self.vms.get(vm as usize).ok_or(ApiError::UnknownVm(vm))?;
        if !v.alive {
            return Err(ApiError::UnknownVm(vm));
        }
        let machine = v.machine.ok_or(ApiError::NotAttached(vm))?;
        let t = self.tasks.get(task as usize).ok_or(ApiError::UnknownTask(task))?;
        let m = &self.machines[machine as usize];
        if m.state != PowerState::S0 || m.pending.is_some() {
            return Err(ApiError::MachineDown(machine));
        }
        if v.cpu != t.cpu {
            return Err(ApiError::CpuMismatch {
                vm_cpu: v.cpu,
                task_cpu: t.cpu,
            });
        }
        if v.flavor != t.flavor {
            return Err(ApiError::FlavorMismatch);
        }
        if self.memory_used(machine) + t.memory > self.machines[machine as usize].memory_size {
            return Err(ApiError::NotEnoughMemory { machine, task });
        }
        self.vms[vm as usize].tasks.push(task);
        self.priorities.insert(task, priority);
        Ok(())
    }

    fn remove_task(&mut self, vm: VmId, task: TaskId) -> Result<(), ApiError> {
        let v = self.vms.get_mut(vm as usize).ok_or(ApiError::UnknownVm(vm))?;
        let before = v.tasks.len();
        v.tasks.retain(|&t| t != task);
        if v.tasks.len() == before {
            return Err(ApiError::UnknownTask(task));
        }
        Ok(())
    }

    fn migrate_vm(&mut self, vm: VmId, target: MachineId) -> Result<(), ApiError> {
        if target as usize >= self.machines.len() {
            return Err(ApiError::UnknownMachine(target));
        }
        let v = self.vms.get_mut(vm as usize).ok_or(ApiError::UnknownVm(vm))?;
        if !v.alive {
            return Err(ApiError::UnknownVm(vm));
        }
        v.machine = Some(target);
        Ok(())
    }

    fn shutdown_vm(&mut self, vm: VmId) {
        if let Some(v) = self.vms.get_mut(vm as usize) {
            v.alive = false;
            v.machine = None;
            v.tasks.clear();
        }
    }

    fn task_count(&self) -> u32 {
        self.tasks.len() as u32
    }

    fn task_info(&self, task: TaskId) -> Option<TaskInfo> {
        let t = self.tasks.get(task as usize)?;
        Some(TaskInfo {
            id: task,
            required_cpu: t.cpu,
            required_flavor: t.flavor,
            memory: t.memory,
            gpu_capable: t.gpu_capable,
            sla: t.sla,
            completed: t.completed,
        })
    }

    fn sla_report(&self, sla: SlaClass) -> f64 {
        self.sla_reports[sla as usize]
    }

    fn cluster_energy(&self) -> f64 {
        self.cluster_energy
    }
}

/// Wraps the mock platform, builds a scheduler over it and runs `init`.
pub fn setup(cloud: MockCloud, config: SchedulerConfig) -> (Rc<RefCell<MockCloud>>, Scheduler) {
    init_logger();
    let cloud = rc!(refcell!(cloud));
    let api: Rc<RefCell<dyn CloudApi>> = cloud.clone();
    let mut scheduler = Scheduler::new(api, config);
    scheduler.init();
    (cloud, scheduler)
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
