//! The platform surface imported by the scheduler.
//!
//! The scheduler is a pure reactive library: the hosting simulator owns the
//! machines, VMs and tasks and exposes them through the [`CloudApi`] trait.
//! Power-state changes and migrations are non-blocking requests whose
//! completion is signaled later through the scheduler callbacks, so calls
//! made against a machine that is still transitioning may fail and are
//! retried against the next candidate by the engines.

use thiserror::Error;

use crate::core::common::{CpuArch, MachineId, PowerState, Priority, SlaClass, TaskId, VmFlavor, VmId};

/// Failure of a fallible platform primitive. Engines never propagate these;
/// they advance to the next candidate instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("machine {0} is unknown")]
    UnknownMachine(MachineId),
    #[error("vm {0} is unknown")]
    UnknownVm(VmId),
    #[error("task {0} is unknown")]
    UnknownTask(TaskId),
    #[error("vm {0} is already attached")]
    AlreadyAttached(VmId),
    #[error("vm {0} is not attached to a machine")]
    NotAttached(VmId),
    #[error("machine {0} is not powered on")]
    MachineDown(MachineId),
    #[error("not enough memory on machine {machine} for task {task}")]
    NotEnoughMemory { machine: MachineId, task: TaskId },
    #[error("cpu mismatch: vm runs {vm_cpu}, task requires {task_cpu}")]
    CpuMismatch { vm_cpu: CpuArch, task_cpu: CpuArch },
    #[error("flavor mismatch between vm and task")]
    FlavorMismatch,
}

/// Current state of a physical machine as reported by the platform.
///
/// `memory_used` is a live reading and may lag the scheduler's own load
/// counters momentarily after a placement.
#[derive(Clone, Debug)]
pub struct MachineInfo {
    pub id: MachineId,
    pub cpu: CpuArch,
    pub memory_size: u64,
    pub memory_used: u64,
    pub gpus: u32,
    pub s_state: PowerState,
    pub active_tasks: u32,
}

/// Current state of a virtual machine as reported by the platform.
#[derive(Clone, Debug)]
pub struct VmInfo {
    pub id: VmId,
    pub flavor: VmFlavor,
    pub cpu: CpuArch,
    pub machine_id: Option<MachineId>,
    pub active_tasks: Vec<TaskId>,
}

/// Static demand and current status of a task.
#[derive(Clone, Debug)]
pub struct TaskInfo {
    pub id: TaskId,
    pub required_cpu: CpuArch,
    pub required_flavor: VmFlavor,
    pub memory: u64,
    pub gpu_capable: bool,
    pub sla: SlaClass,
    pub completed: bool,
}

/// Platform primitives available to the scheduler.
pub trait CloudApi {
    /// Returns the total number of machines; machine ids are `0..count`.
    fn machine_count(&self) -> u32;

    /// Returns the current state of the specified machine.
    fn machine_info(&self, machine: MachineId) -> Option<MachineInfo>;

    /// Returns the cumulative energy counter of the specified machine.
    fn machine_energy(&self, machine: MachineId) -> u64;

    /// Requests a power-state transition. The request is asynchronous:
    /// completion is signaled via the `state_change_complete` callback.
    fn set_machine_state(&mut self, machine: MachineId, state: PowerState);

    /// Creates a VM with the given flavor bound to the given CPU.
    fn create_vm(&mut self, flavor: VmFlavor, cpu: CpuArch) -> VmId;

    /// Attaches a VM to a machine. Attachment is irrevocable until shutdown.
    fn attach_vm(&mut self, vm: VmId, machine: MachineId) -> Result<(), ApiError>;

    /// Returns the current state of the specified VM.
    fn vm_info(&self, vm: VmId) -> Option<VmInfo>;

    /// Adds a task to a VM. Fails on memory over-commit, CPU or flavor
    /// mismatch, or when the hosting machine is not active.
    fn add_task(&mut self, vm: VmId, task: TaskId, priority: Priority) -> Result<(), ApiError>;

    /// Removes a task from a VM.
    fn remove_task(&mut self, vm: VmId, task: TaskId) -> Result<(), ApiError>;

    /// Requests migration of a VM to another machine. Completion is signaled
    /// via the `migration_done` callback.
    fn migrate_vm(&mut self, vm: VmId, target: MachineId) -> Result<(), ApiError>;

    /// Shuts a VM down, detaching it from its machine.
    fn shutdown_vm(&mut self, vm: VmId);

    /// Returns the total number of tasks submitted so far; task ids are dense.
    fn task_count(&self) -> u32;

    /// Returns the demand and status of the specified task.
    fn task_info(&self, task: TaskId) -> Option<TaskInfo>;

    /// Returns the SLA compliance percentage for the given class.
    fn sla_report(&self, sla: SlaClass) -> f64;

    /// Returns the total cluster energy consumption in kW-hours.
    fn cluster_energy(&self) -> f64;
}
