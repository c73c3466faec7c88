//! Transport-free executor logic: accrual, validation, and tier changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use tierscale_core::protocol::decode_decision;
use tierscale_core::{
    Cycle, Envelope, InstanceController, InstanceId, ScalingAction, Settings, StepError, TierTable,
};

use crate::clock::Clock;
use crate::report::CostReport;
use crate::state::{Accrual, ExecutorState, Transition, plan_transition};

/// Why a valid decision left the tier unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    NoAction,
    AtMaximum,
    AtMinimum,
}

/// Outcome of one executor step.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorReport {
    /// The controller confirmed the resize and local state followed.
    Applied {
        instance_id: InstanceId,
        cycle: Cycle,
        action: ScalingAction,
        from: usize,
        to: usize,
    },
    /// The decision was valid but required no resize.
    Held {
        instance_id: InstanceId,
        cycle: Cycle,
        tier: usize,
        reason: HoldReason,
    },
    /// Nothing was applied.
    Skipped {
        instance_id: Option<InstanceId>,
        error: StepError,
    },
}

/// Owns the executor state and applies decisions through the controller.
pub struct TransitionEngine {
    state: ExecutorState,
    tiers: TierTable,
    controller: Arc<dyn InstanceController>,
    clock: Clock,
    receive_timeout: Duration,
    /// Newest decision cycle applied per instance.
    latest_cycle: HashMap<InstanceId, Cycle>,
}

impl TransitionEngine {
    /// Cost is charged from `clock()` at construction onwards.
    pub fn new(settings: &Settings, controller: Arc<dyn InstanceController>, clock: Clock) -> Self {
        Self {
            state: ExecutorState::new(&settings.instances, clock()),
            tiers: settings.tiers.clone(),
            controller,
            clock,
            receive_timeout: settings.receive_timeout,
            latest_cycle: HashMap::new(),
        }
    }

    pub fn state(&self) -> &ExecutorState {
        &self.state
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn now(&self) -> SystemTime {
        (self.clock)()
    }

    /// Adopt the tier each instance actually runs at.
    ///
    /// Failures and unknown tier names keep the configured initial tier.
    pub async fn discover_tiers(&mut self) {
        let ids: Vec<InstanceId> = self
            .state
            .instances()
            .iter()
            .map(|i| i.instance_id.clone())
            .collect();

        for id in ids {
            match self.controller.get_current_tier(&id).await {
                Ok(name) => match self.tiers.index_of(&name) {
                    Some(index) => {
                        if let Err(e) = self.state.set_tier(&id, index, &self.tiers) {
                            warn!(instance = %id, error = %e, "failed to record initial tier");
                        } else {
                            info!(instance = %id, tier = %name, "initial tier");
                        }
                    }
                    None => {
                        warn!(instance = %id, tier = %name, "controller reported unknown tier, keeping configured tier");
                    }
                },
                Err(e) => {
                    warn!(
                        instance = %id,
                        kind = "external_call_failure",
                        error = %e,
                        "failed to fetch initial tier, keeping configured tier"
                    );
                }
            }
        }
    }

    /// Charge every instance up to `now`.
    pub fn accrue(&mut self, now: SystemTime) -> Vec<Accrual> {
        let accruals = self.state.accrue(now, &self.tiers);
        for a in &accruals {
            self.log_accrual(a);
        }
        accruals
    }

    fn log_accrual(&self, a: &Accrual) {
        let total = self.state.get(&a.instance_id).map(|i| i.accrued_cost).unwrap_or(0.0);
        debug!(
            instance = %a.instance_id,
            tier = %self.tiers.name(a.tier_index),
            elapsed_secs = a.elapsed.as_secs_f64(),
            cost = a.cost,
            instance_total = total,
            total = self.state.total_cost(),
            "cost accrued"
        );
    }

    /// Handle the outcome of waiting for a decision. `None` means timeout.
    pub async fn step(&mut self, incoming: Option<Envelope>) -> ExecutorReport {
        let Some(envelope) = incoming else {
            return ExecutorReport::Skipped {
                instance_id: None,
                error: StepError::ReceiveTimeout(self.receive_timeout),
            };
        };

        let decision = match decode_decision(&envelope.body) {
            Ok(d) => d,
            Err(e) => {
                return ExecutorReport::Skipped {
                    instance_id: Some(envelope.instance_id),
                    error: e.into(),
                };
            }
        };
        let instance_id = decision.instance_id;
        let skipped = |id: &str, error: StepError| ExecutorReport::Skipped {
            instance_id: Some(id.to_string()),
            error,
        };

        let Some(current) = self.state.get(&instance_id).map(|i| i.tier_index) else {
            return skipped(&instance_id, StepError::UnknownInstance(instance_id.clone()));
        };

        let latest = self.latest_cycle.get(&instance_id).copied();
        if let Some(latest) = latest
            && envelope.cycle <= latest
        {
            return skipped(
                &instance_id,
                StepError::StaleMessage {
                    instance_id: instance_id.clone(),
                    cycle: envelope.cycle,
                    latest,
                },
            );
        }
        self.latest_cycle.insert(instance_id.clone(), envelope.cycle);

        let cycle = envelope.cycle;
        let held = |tier: usize, reason: HoldReason| ExecutorReport::Held {
            instance_id: instance_id.clone(),
            cycle,
            tier,
            reason,
        };

        match plan_transition(decision.action, current, &self.tiers) {
            Transition::Hold { tier } => held(tier, HoldReason::NoAction),
            Transition::AtMaximum { tier } => held(tier, HoldReason::AtMaximum),
            Transition::AtMinimum { tier } => held(tier, HoldReason::AtMinimum),
            Transition::Move { from, to } => {
                let target = self.tiers.name(to).to_string();
                info!(
                    instance = %instance_id,
                    action = %decision.action,
                    from = %self.tiers.name(from),
                    to = %target,
                    "resizing instance"
                );
                if let Err(e) = self.controller.set_tier(&instance_id, &target).await {
                    return skipped(&instance_id, e.into());
                }
                // Time up to the confirmed resize is billed at the old tier.
                let now = self.now();
                if let Some(accrual) = self.state.accrue_instance(&instance_id, now, &self.tiers) {
                    self.log_accrual(&accrual);
                }
                if let Err(e) = self.state.set_tier(&instance_id, to, &self.tiers) {
                    return skipped(&instance_id, e);
                }
                ExecutorReport::Applied {
                    instance_id: instance_id.clone(),
                    cycle,
                    action: decision.action,
                    from,
                    to,
                }
            }
        }
    }

    pub fn cost_report(&self) -> CostReport {
        CostReport::from_state(&self.state, &self.tiers)
    }
}
