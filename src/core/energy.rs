//! Energy ranking of machines.

use crate::core::cloud_api::CloudApi;
use crate::core::common::MachineId;

/// Machines ordered by cumulative energy consumption, ascending.
///
/// The ranking is rebuilt periodically rather than per placement; a stale
/// ordering only affects placement quality, never correctness.
#[derive(Clone, Default)]
pub struct EnergyRanker {
    order: Vec<MachineId>,
}

impl EnergyRanker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-reads every machine's energy counter and sorts ascending.
    /// Ties keep the given machine order.
    pub fn rebuild(&mut self, api: &dyn CloudApi, machines: &[MachineId]) {
        let mut ranked: Vec<(MachineId, u64)> = machines
            .iter()
            .map(|&machine| (machine, api.machine_energy(machine)))
            .collect();
        ranked.sort_by_key(|&(_, energy)| energy);
        self.order = ranked.into_iter().map(|(machine, _)| machine).collect();
    }

    /// Returns machine ids sorted by cumulative energy, ascending.
    pub fn ranked(&self) -> &[MachineId] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
