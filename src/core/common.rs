//! Common data structures.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identifier of a physical machine, assigned by the external platform.
pub type MachineId = u32;
/// Identifier of a virtual machine, assigned by the external platform.
pub type VmId = u32;
/// Identifier of a task, assigned by the external platform.
pub type TaskId = u32;
/// Simulation time in ticks (10^6 ticks per reported second).
pub type Time = u64;

/// CPU architecture of a machine or required by a task. Task and machine must match exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CpuArch {
    X86,
    Arm,
    Power,
    Riscv,
}

impl Display for CpuArch {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CpuArch::X86 => write!(f, "x86"),
            CpuArch::Arm => write!(f, "arm"),
            CpuArch::Power => write!(f, "power"),
            CpuArch::Riscv => write!(f, "riscv"),
        }
    }
}

/// Guest OS kind of a virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VmFlavor {
    Linux,
    LinuxRt,
    Win,
    Aix,
}

/// Service-level agreement tier of a task. `Sla0` is the strictest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SlaClass {
    Sla0,
    Sla1,
    Sla2,
    Sla3,
}

/// Task priority passed to the platform when a task is added to a VM.
///
/// Derived from the task SLA class: `Sla0` maps to `High`, `Sla1` to `Mid`,
/// everything else to `Low`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Mid,
    Low,
}

impl From<SlaClass> for Priority {
    fn from(sla: SlaClass) -> Self {
        match sla {
            SlaClass::Sla0 => Priority::High,
            SlaClass::Sla1 => Priority::Mid,
            SlaClass::Sla2 | SlaClass::Sla3 => Priority::Low,
        }
    }
}

/// ACPI-style power state of a physical machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    /// Active.
    S0,
    /// Standby.
    S3,
    /// Off.
    S5,
}

impl Display for PowerState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PowerState::S0 => write!(f, "S0"),
            PowerState::S3 => write!(f, "S3"),
            PowerState::S5 => write!(f, "S5"),
        }
    }
}
