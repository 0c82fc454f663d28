//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::core::common::Time;

/// Auxiliary structure to parse SchedulerConfig from file
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
pub struct SchedulerConfigRaw {
    /// share of the fleet kept in the RUNNING tier
    pub running_tier_share: Option<f64>,
    /// share of the fleet kept in the INTERMEDIATE tier
    pub intermediate_tier_share: Option<f64>,
    /// lower bound on the RUNNING tier size
    pub min_running: Option<u32>,
    /// lower bound on the INTERMEDIATE tier size
    pub min_intermediate: Option<u32>,
    /// minimum time between two tier adjustments
    pub adjust_interval: Option<Time>,
    /// period of the utilization snapshot refresh
    pub util_refresh_interval: Option<Time>,
    /// rebuild the energy ranking every N-th periodic tick
    pub energy_rank_rebuild_period: Option<u64>,
    /// machines activated per tier adjustment at most
    pub max_activations_per_adjust: Option<u32>,
    /// machines deactivated per tier adjustment at most
    pub max_deactivations_per_adjust: Option<u32>,
    /// running machines above the desired size tolerated before deactivation
    pub running_surplus: Option<u32>,
    /// system memory utilization under which idle machines may be deactivated
    pub low_load_threshold: Option<f64>,
    /// tasks inspected per workload sample at most
    pub workload_sample_limit: Option<u32>,
    /// task count above which the workload sample is strided
    pub sparse_sample_threshold: Option<u32>,
    /// safety margin applied to the sampled workload
    pub workload_safety_margin: Option<f64>,
    /// completions between proactive backstop checks
    pub backstop_period: Option<u64>,
    /// powered-on share under which the backstop activates machines
    pub backstop_powered_share: Option<f64>,
    /// fleet share activated by one backstop pass
    pub backstop_activation_share: Option<f64>,
    /// machines activated by one backstop pass at most
    pub backstop_activation_cap: Option<u32>,
}

/// Scheduler tunables. Defaults reproduce the reference policy constants.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// share of the fleet kept in the RUNNING tier
    pub running_tier_share: f64,
    /// share of the fleet kept in the INTERMEDIATE tier
    pub intermediate_tier_share: f64,
    /// lower bound on the RUNNING tier size
    pub min_running: u32,
    /// lower bound on the INTERMEDIATE tier size
    pub min_intermediate: u32,
    /// minimum time between two tier adjustments
    pub adjust_interval: Time,
    /// period of the utilization snapshot refresh
    pub util_refresh_interval: Time,
    /// rebuild the energy ranking every N-th periodic tick
    pub energy_rank_rebuild_period: u64,
    /// machines activated per tier adjustment at most
    pub max_activations_per_adjust: u32,
    /// machines deactivated per tier adjustment at most
    pub max_deactivations_per_adjust: u32,
    /// running machines above the desired size tolerated before deactivation
    pub running_surplus: u32,
    /// system memory utilization under which idle machines may be deactivated
    pub low_load_threshold: f64,
    /// tasks inspected per workload sample at most
    pub workload_sample_limit: u32,
    /// task count above which the workload sample is strided
    pub sparse_sample_threshold: u32,
    /// safety margin applied to the sampled workload
    pub workload_safety_margin: f64,
    /// completions between proactive backstop checks
    pub backstop_period: u64,
    /// powered-on share under which the backstop activates machines
    pub backstop_powered_share: f64,
    /// fleet share activated by one backstop pass
    pub backstop_activation_share: f64,
    /// machines activated by one backstop pass at most
    pub backstop_activation_cap: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfigRaw::default().resolve()
    }
}

impl SchedulerConfigRaw {
    fn resolve(self) -> SchedulerConfig {
        SchedulerConfig {
            running_tier_share: self.running_tier_share.unwrap_or(0.8),
            intermediate_tier_share: self.intermediate_tier_share.unwrap_or(0.15),
            min_running: self.min_running.unwrap_or(4),
            min_intermediate: self.min_intermediate.unwrap_or(2),
            adjust_interval: self.adjust_interval.unwrap_or(200_000_000),
            util_refresh_interval: self.util_refresh_interval.unwrap_or(50_000_000),
            energy_rank_rebuild_period: self.energy_rank_rebuild_period.unwrap_or(5),
            max_activations_per_adjust: self.max_activations_per_adjust.unwrap_or(8),
            max_deactivations_per_adjust: self.max_deactivations_per_adjust.unwrap_or(2),
            running_surplus: self.running_surplus.unwrap_or(4),
            low_load_threshold: self.low_load_threshold.unwrap_or(0.3),
            workload_sample_limit: self.workload_sample_limit.unwrap_or(1000),
            sparse_sample_threshold: self.sparse_sample_threshold.unwrap_or(200),
            workload_safety_margin: self.workload_safety_margin.unwrap_or(1.2),
            backstop_period: self.backstop_period.unwrap_or(500),
            backstop_powered_share: self.backstop_powered_share.unwrap_or(0.7),
            backstop_activation_share: self.backstop_activation_share.unwrap_or(0.1),
            backstop_activation_cap: self.backstop_activation_cap.unwrap_or(4),
        }
    }
}

impl SchedulerConfig {
    /// Creates scheduler config by reading parameter values from .yaml file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let raw: SchedulerConfigRaw = serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name));
        raw.resolve()
    }

    /// Creates scheduler config from a YAML string.
    pub fn from_str(content: &str) -> Self {
        let raw: SchedulerConfigRaw =
            serde_yaml::from_str(content).unwrap_or_else(|_| panic!("Can't parse YAML config"));
        raw.resolve()
    }
}
