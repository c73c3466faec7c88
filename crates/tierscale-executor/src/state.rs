//! In-memory run state owned by the executor.

use std::time::{Duration, SystemTime};

use tierscale_core::config::ManagedInstance;
use tierscale_core::{InstanceId, ScalingAction, StepError, TierTable};

const SECS_PER_HOUR: f64 = 3600.0;

/// Running state of one managed instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceState {
    pub instance_id: InstanceId,
    /// Index into the tier table; always in range.
    pub tier_index: usize,
    /// When cost was last charged. Never moves backwards.
    pub last_update_time: SystemTime,
    /// Cost charged so far. Never decreases.
    pub accrued_cost: f64,
}

impl InstanceState {
    fn charge(&mut self, now: SystemTime, tiers: &TierTable) -> Accrual {
        let elapsed = now.duration_since(self.last_update_time).unwrap_or_default();
        let cost = tiers.rate(self.tier_index) * (elapsed.as_secs_f64() / SECS_PER_HOUR);

        self.accrued_cost += cost;
        if now > self.last_update_time {
            self.last_update_time = now;
        }

        Accrual {
            instance_id: self.instance_id.clone(),
            tier_index: self.tier_index,
            elapsed,
            cost,
        }
    }
}

/// Cost charged to one instance by one accrual pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Accrual {
    pub instance_id: InstanceId,
    pub tier_index: usize,
    pub elapsed: Duration,
    pub cost: f64,
}

/// Effect of an action on a tier index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Move { from: usize, to: usize },
    AtMaximum { tier: usize },
    AtMinimum { tier: usize },
    Hold { tier: usize },
}

/// Where `action` takes an instance currently at `current`.
pub fn plan_transition(action: ScalingAction, current: usize, tiers: &TierTable) -> Transition {
    match action {
        ScalingAction::ScaleUp if current < tiers.max_index() => Transition::Move {
            from: current,
            to: current + 1,
        },
        ScalingAction::ScaleUp => Transition::AtMaximum { tier: current },
        ScalingAction::ScaleDown if current > 0 => Transition::Move {
            from: current,
            to: current - 1,
        },
        ScalingAction::ScaleDown => Transition::AtMinimum { tier: current },
        ScalingAction::NoAction => Transition::Hold { tier: current },
    }
}

/// Per-instance state plus the overall cost total.
#[derive(Debug, Clone)]
pub struct ExecutorState {
    instances: Vec<InstanceState>,
    total_cost: f64,
}

impl ExecutorState {
    /// Start tracking `instances` at their initial tiers as of `now`.
    ///
    /// Initial tiers must already be valid indices into the tier table, which
    /// `Config::resolve` guarantees.
    pub fn new(instances: &[ManagedInstance], now: SystemTime) -> Self {
        Self {
            instances: instances
                .iter()
                .map(|i| InstanceState {
                    instance_id: i.id.clone(),
                    tier_index: i.initial_tier,
                    last_update_time: now,
                    accrued_cost: 0.0,
                })
                .collect(),
            total_cost: 0.0,
        }
    }

    pub fn instances(&self) -> &[InstanceState] {
        &self.instances
    }

    pub fn get(&self, instance_id: &str) -> Option<&InstanceState> {
        self.instances.iter().find(|i| i.instance_id == instance_id)
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.get(instance_id).is_some()
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Charge every instance for the time since its last update.
    ///
    /// A clock reading earlier than `last_update_time` charges nothing and
    /// leaves the timestamp where it was.
    pub fn accrue(&mut self, now: SystemTime, tiers: &TierTable) -> Vec<Accrual> {
        let mut accruals = Vec::with_capacity(self.instances.len());
        for inst in &mut self.instances {
            let accrual = inst.charge(now, tiers);
            self.total_cost += accrual.cost;
            accruals.push(accrual);
        }
        accruals
    }

    /// Charge one instance up to `now`, at the tier it holds right now.
    pub fn accrue_instance(
        &mut self,
        instance_id: &str,
        now: SystemTime,
        tiers: &TierTable,
    ) -> Option<Accrual> {
        let inst = self
            .instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)?;
        let accrual = inst.charge(now, tiers);
        self.total_cost += accrual.cost;
        Some(accrual)
    }

    /// Record a tier the controller has confirmed.
    pub fn set_tier(
        &mut self,
        instance_id: &str,
        tier_index: usize,
        tiers: &TierTable,
    ) -> Result<(), StepError> {
        if tier_index >= tiers.len() {
            return Err(StepError::TierOutOfRange {
                instance_id: instance_id.to_string(),
                tier_index,
            });
        }
        let inst = self
            .instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| StepError::UnknownInstance(instance_id.to_string()))?;
        inst.tier_index = tier_index;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierscale_core::Config;

    fn tiers() -> TierTable {
        Config::default().resolve().unwrap().tiers
    }

    fn state_at(t0: SystemTime, tier: usize) -> ExecutorState {
        ExecutorState::new(
            &[ManagedInstance {
                id: "A".to_string(),
                initial_tier: tier,
            }],
            t0,
        )
    }

    #[test]
    fn scale_up_moves_one_tier() {
        assert_eq!(
            plan_transition(ScalingAction::ScaleUp, 0, &tiers()),
            Transition::Move { from: 0, to: 1 }
        );
    }

    #[test]
    fn scale_up_at_max_is_clamped() {
        assert_eq!(
            plan_transition(ScalingAction::ScaleUp, 2, &tiers()),
            Transition::AtMaximum { tier: 2 }
        );
    }

    #[test]
    fn scale_down_at_min_is_clamped() {
        assert_eq!(
            plan_transition(ScalingAction::ScaleDown, 0, &tiers()),
            Transition::AtMinimum { tier: 0 }
        );
        assert_eq!(
            plan_transition(ScalingAction::ScaleDown, 2, &tiers()),
            Transition::Move { from: 2, to: 1 }
        );
    }

    #[test]
    fn no_action_holds() {
        for tier in 0..3 {
            assert_eq!(
                plan_transition(ScalingAction::NoAction, tier, &tiers()),
                Transition::Hold { tier }
            );
        }
    }

    #[test]
    fn one_hour_at_base_rate() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut state = state_at(t0, 0);

        let accruals = state.accrue(t0 + Duration::from_secs(3600), &tiers());
        assert_eq!(accruals.len(), 1);
        assert_eq!(accruals[0].cost, 0.02);
        assert_eq!(state.get("A").unwrap().accrued_cost, 0.02);
        assert_eq!(state.total_cost(), 0.02);
    }

    #[test]
    fn accrual_is_linear_in_time_and_rate() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut state = state_at(t0, 2);

        state.accrue(t0 + Duration::from_secs(1800), &tiers());
        assert!((state.get("A").unwrap().accrued_cost - 0.04).abs() < 1e-12);

        state.accrue(t0 + Duration::from_secs(3600 * 3), &tiers());
        assert!((state.get("A").unwrap().accrued_cost - 0.24).abs() < 1e-12);
    }

    #[test]
    fn accrual_advances_timestamp() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut state = state_at(t0, 0);
        let t1 = t0 + Duration::from_secs(60);
        state.accrue(t1, &tiers());
        assert_eq!(state.get("A").unwrap().last_update_time, t1);

        // Same instant again charges nothing.
        let accruals = state.accrue(t1, &tiers());
        assert_eq!(accruals[0].cost, 0.0);
    }

    #[test]
    fn clock_going_backwards_charges_nothing() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut state = state_at(t0, 1);
        state.accrue(t0 - Duration::from_secs(600), &tiers());

        let inst = state.get("A").unwrap();
        assert_eq!(inst.accrued_cost, 0.0);
        assert_eq!(inst.last_update_time, t0);
    }

    #[test]
    fn total_is_sum_of_instances() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut state = ExecutorState::new(
            &[
                ManagedInstance {
                    id: "A".to_string(),
                    initial_tier: 0,
                },
                ManagedInstance {
                    id: "B".to_string(),
                    initial_tier: 2,
                },
            ],
            t0,
        );
        state.accrue(t0 + Duration::from_secs(7200), &tiers());
        let sum: f64 = state.instances().iter().map(|i| i.accrued_cost).sum();
        assert!((state.total_cost() - sum).abs() < 1e-12);
        assert!((sum - 0.2).abs() < 1e-12);
    }

    #[test]
    fn single_instance_accrual_leaves_others_alone() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut state = ExecutorState::new(
            &[
                ManagedInstance {
                    id: "A".to_string(),
                    initial_tier: 0,
                },
                ManagedInstance {
                    id: "B".to_string(),
                    initial_tier: 0,
                },
            ],
            t0,
        );
        let t1 = t0 + Duration::from_secs(3600);
        let accrual = state.accrue_instance("A", t1, &tiers()).unwrap();
        assert_eq!(accrual.cost, 0.02);
        assert_eq!(state.get("B").unwrap().last_update_time, t0);
        assert_eq!(state.total_cost(), 0.02);
        assert!(state.accrue_instance("ghost", t1, &tiers()).is_none());

        // B still owes the full hour at the next pass.
        state.accrue(t1, &tiers());
        assert_eq!(state.get("B").unwrap().accrued_cost, 0.02);
        assert_eq!(state.get("A").unwrap().accrued_cost, 0.02);
    }

    #[test]
    fn set_tier_validates() {
        let t0 = SystemTime::UNIX_EPOCH;
        let mut state = state_at(t0, 0);
        state.set_tier("A", 2, &tiers()).unwrap();
        assert_eq!(state.get("A").unwrap().tier_index, 2);

        assert!(matches!(
            state.set_tier("A", 3, &tiers()),
            Err(StepError::TierOutOfRange { tier_index: 3, .. })
        ));
        assert!(matches!(
            state.set_tier("ghost", 1, &tiers()),
            Err(StepError::UnknownInstance(_))
        ));
        assert_eq!(state.get("A").unwrap().tier_index, 2);
    }
}
