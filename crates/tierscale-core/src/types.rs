//! Domain types shared across the tierscale roles.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult, ProtocolError};

/// Identifier of a managed compute instance.
pub type InstanceId = String;

/// Sequence number of a role's loop iteration, starting at 1.
pub type Cycle = u64;

// ── Metrics ───────────────────────────────────────────────────────

/// Resource usage observed for one instance during one cycle.
///
/// Values are non-negative; no upper bound is enforced.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub instance_id: InstanceId,
    /// CPU utilization in percent.
    pub cpu_pct: f64,
    /// Memory in use, in percent of the tier's total memory.
    pub mem_pct: f64,
    /// Disk reads over the lookback window, in MB.
    pub disk_read_mb: f64,
    /// Network ingress over the lookback window, in MB.
    pub net_in_mb: f64,
}

/// Raw telemetry as returned by a `MetricSource`.
///
/// Every series is optional; a missing series counts as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTelemetry {
    /// Last CPU utilization sample in percent.
    pub cpu_pct: Option<f64>,
    /// Last available-memory sample in bytes.
    pub available_memory_bytes: Option<f64>,
    /// Total bytes read from disk in the window.
    pub disk_read_bytes: Option<f64>,
    /// Total bytes received over the network in the window.
    pub network_in_bytes: Option<f64>,
}

// ── Decisions ─────────────────────────────────────────────────────

/// What the decider wants done with an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
    NoAction,
}

impl ScalingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingAction::ScaleUp => "scale_up",
            ScalingAction::ScaleDown => "scale_down",
            ScalingAction::NoAction => "no_action",
        }
    }
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalingAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scale_up" => Ok(ScalingAction::ScaleUp),
            "scale_down" => Ok(ScalingAction::ScaleDown),
            "no_action" => Ok(ScalingAction::NoAction),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

/// A single decision for a single instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingDecision {
    pub instance_id: InstanceId,
    pub action: ScalingAction,
}

// ── Thresholds ────────────────────────────────────────────────────

/// One cutoff per observed resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_read_mb: f64,
    pub net_in_mb: f64,
}

/// Upper and lower cutoffs. The gap between them is the hysteresis band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    /// Exceeding any of these scales up.
    pub upper: Thresholds,
    /// Staying below all of these scales down.
    pub lower: Thresholds,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            upper: Thresholds {
                cpu_pct: 80.0,
                mem_pct: 80.0,
                disk_read_mb: 50.0,
                net_in_mb: 500.0,
            },
            lower: Thresholds {
                cpu_pct: 20.0,
                mem_pct: 20.0,
                disk_read_mb: 10.0,
                net_in_mb: 100.0,
            },
        }
    }
}

// ── Tiers ─────────────────────────────────────────────────────────

/// A named capacity level with a fixed hourly price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeTier {
    pub name: String,
    /// Cost per hour of running at this tier.
    pub hourly_rate: f64,
    /// Total memory of the tier in GB, used to turn available bytes into a percentage.
    pub memory_gb: f64,
}

/// The ordered, non-empty list of tiers, cheapest first.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    tiers: Vec<SizeTier>,
}

impl TierTable {
    /// Build a table, rejecting empty or unordered tier lists.
    pub fn new(tiers: Vec<SizeTier>) -> ConfigResult<Self> {
        if tiers.is_empty() {
            return Err(ConfigError::Invalid("tier list is empty".to_string()));
        }
        for tier in &tiers {
            if !(tier.hourly_rate.is_finite() && tier.hourly_rate >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "tier {} has invalid hourly rate {}",
                    tier.name, tier.hourly_rate
                )));
            }
            if !(tier.memory_gb.is_finite() && tier.memory_gb > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "tier {} has invalid memory size {}",
                    tier.name, tier.memory_gb
                )));
            }
        }
        for pair in tiers.windows(2) {
            if pair[1].hourly_rate < pair[0].hourly_rate {
                return Err(ConfigError::Invalid(format!(
                    "tiers must be ordered by cost: {} is cheaper than {}",
                    pair[1].name, pair[0].name
                )));
            }
        }
        let mut seen = HashSet::new();
        for tier in &tiers {
            if !seen.insert(tier.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate tier {}", tier.name)));
            }
        }
        Ok(Self { tiers })
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Always false for a table built by [`TierTable::new`].
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Index of the most expensive tier.
    pub fn max_index(&self) -> usize {
        self.tiers.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&SizeTier> {
        self.tiers.get(index)
    }

    /// The cheapest tier.
    pub fn smallest(&self) -> &SizeTier {
        &self.tiers[0]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.name == name)
    }

    /// Hourly rate of the tier at `index`, zero for an out-of-range index.
    pub fn rate(&self, index: usize) -> f64 {
        self.tiers.get(index).map(|t| t.hourly_rate).unwrap_or(0.0)
    }

    /// Name of the tier at `index`, or `"?"` when out of range.
    pub fn name(&self, index: usize) -> &str {
        self.tiers.get(index).map(|t| t.name.as_str()).unwrap_or("?")
    }

    pub fn iter(&self) -> impl Iterator<Item = &SizeTier> {
        self.tiers.iter()
    }
}
