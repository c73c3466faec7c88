//! Cost summary emitted when the executor stops.

use serde::Serialize;

use tierscale_core::{InstanceId, TierTable};

use crate::state::ExecutorState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceCost {
    pub instance_id: InstanceId,
    pub tier: String,
    pub tier_index: usize,
    pub accrued_cost: f64,
}

/// Per-instance cost and the overall total, in instance list order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub instances: Vec<InstanceCost>,
    pub total_cost: f64,
}

impl CostReport {
    pub fn from_state(state: &ExecutorState, tiers: &TierTable) -> Self {
        Self {
            instances: state
                .instances()
                .iter()
                .map(|i| InstanceCost {
                    instance_id: i.instance_id.clone(),
                    tier: tiers.name(i.tier_index).to_string(),
                    tier_index: i.tier_index,
                    accrued_cost: i.accrued_cost,
                })
                .collect(),
            total_cost: state.total_cost(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tierscale_core::Config;

    #[test]
    fn serializes_per_instance_costs() {
        let settings = Config::default().resolve().unwrap();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        let mut state = ExecutorState::new(&settings.instances, t0);
        state.set_tier("vm-secondary", 1, &settings.tiers).unwrap();
        state.accrue(t0 + Duration::from_secs(3600), &settings.tiers);

        let report = CostReport::from_state(&state, &settings.tiers);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["instances"][0]["instance_id"], "vm-initiale");
        assert_eq!(json["instances"][0]["tier"], "Standard_B1s");
        assert_eq!(json["instances"][1]["tier"], "Standard_B2s");
        assert_eq!(json["instances"][1]["tier_index"], 1);
        assert_eq!(json["instances"][1]["accrued_cost"], 0.04);
        let total = json["total_cost"].as_f64().unwrap();
        assert!((total - 0.06).abs() < 1e-12);
    }
}
